use p25_core::{BitBuffer, DecodeErr};

use crate::fields::freq_ident::FreqIdent;

/// IDEN_UP (0x3d), 700/800/900 MHz band plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdenUp {
    pub iden: u8,
    pub bw: u16,
    pub ident: FreqIdent,
}

impl IdenUp {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let iden = buffer.read_field(4, "iden")? as u8;
        let bw = buffer.read_field(9, "bw")? as u16;
        let toff0 = buffer.read_field(9, "toff0")?;
        let spac = buffer.read_field(10, "spac")?;
        let freq = buffer.read_field(32, "freq")?;
        Ok(IdenUp { iden, bw, ident: FreqIdent::from_iden_up(toff0, spac, freq) })
    }
}

/// IDEN_UP_VU (0x34), VHF/UHF band plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdenUpVu {
    pub iden: u8,
    pub bwvu: u8,
    pub ident: FreqIdent,
}

impl IdenUpVu {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let iden = buffer.read_field(4, "iden")? as u8;
        let bwvu = buffer.read_field(4, "bwvu")? as u8;
        let toff0 = buffer.read_field(14, "toff0")?;
        let spac = buffer.read_field(10, "spac")?;
        let freq = buffer.read_field(32, "freq")?;
        Ok(IdenUpVu { iden, bwvu, ident: FreqIdent::from_iden_up_vu(toff0, spac, freq) })
    }
}

/// IDEN_UP_TDMA (0x33); also carried by the TDMA MAC with the same body layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdenUpTdma {
    pub iden: u8,
    pub channel_type: u8,
    pub ident: FreqIdent,
}

impl IdenUpTdma {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let iden = buffer.read_field(4, "iden")? as u8;
        let channel_type = buffer.read_field(4, "channel_type")?;
        let toff0 = buffer.read_field(14, "toff0")?;
        let spac = buffer.read_field(10, "spac")?;
        let freq = buffer.read_field(32, "freq")?;
        let ident = FreqIdent::from_iden_up_tdma(channel_type, toff0, spac, freq)?;
        Ok(IdenUpTdma { iden, channel_type: channel_type as u8, ident })
    }
}
