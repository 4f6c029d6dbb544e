//! Phase 2 TDMA MAC control-channel messages. Only the broadcast messages needed for
//! channel resolution and site identity are decoded; the block may carry further messages
//! after the decoded one, which are currently left alone.

use p25_core::{BitBuffer, DecodeErr};

use crate::fields::channel_id::ChannelId;
use crate::fields::freq_ident::FreqIdent;
use crate::tsbk::iden_up::IdenUpTdma;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TdmaMsg {
    /// moc 0x3c
    AdjStsBcst { syid: u16, rfid: u8, stid: u8, channel: ChannelId, class: u8 },
    /// moc 0x33
    IdenUpTdma(IdenUpTdma),
    /// moc 0x3b
    NetStsBcst { wacn: u32, syid: u16, channel: ChannelId, color_code: u16 },
    /// moc 0x3a
    RfssStsBcst { syid: u16, rfid: u8, stid: u8, channel: ChannelId },
    /// moc 0x39
    SccbExp { rfid: u8, stid: u8, channel1: ChannelId, channel2: ChannelId },
    /// moc 0x3d
    IdenUp { iden: u8, bw: u16, ident: FreqIdent },
    Unknown { op: u8, moc: u8 },
}

impl TdmaMsg {
    /// Message length in octets, None for messages that were not recognised
    pub fn len(&self) -> Option<usize> {
        match self {
            TdmaMsg::NetStsBcst { .. } => Some(11),
            TdmaMsg::Unknown { .. } => None,
            _ => Some(9),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TdmaMsg::Unknown { .. })
    }

    /// Decodes the first message of a MAC block.
    pub fn from_bytes(blk: &[u8]) -> Result<Self, DecodeErr> {
        let Some(&first) = blk.first() else {
            return Err(DecodeErr::BufferEnded { field: Some("op") });
        };
        let op = (first >> 6) & 3;
        let moc = first & 0x3f;
        if op != 1 {
            return Ok(TdmaMsg::Unknown { op, moc });
        }
        let msglen = match moc {
            0x3b => 11,
            0x33 | 0x39 | 0x3a | 0x3c | 0x3d => 9,
            _ => return Ok(TdmaMsg::Unknown { op, moc }),
        };
        let mut buf = BitBuffer::from_bytes_truncated(blk, msglen * 8)
            .ok_or(DecodeErr::InconsistentLength { expected: msglen, found: blk.len() })?;
        buf.skip_field(8, "op_moc")?;

        let msg = match moc {
            0x3c => {
                buf.skip_field(12, "lra")?;
                let syid = buf.read_field(12, "syid")? as u16;
                let rfid = buf.read_field(8, "rfid")? as u8;
                let stid = buf.read_field(8, "stid")? as u8;
                let channel = ChannelId::from_raw(buf.read_field(16, "channel")?);
                let class = buf.read_field(8, "class")? as u8;
                TdmaMsg::AdjStsBcst { syid, rfid, stid, channel, class }
            }
            0x33 => TdmaMsg::IdenUpTdma(IdenUpTdma::from_bitbuf(&mut buf)?),
            0x3b => {
                buf.skip_field(8, "lra")?;
                let wacn = buf.read_field(20, "wacn")? as u32;
                let syid = buf.read_field(12, "syid")? as u16;
                let channel = ChannelId::from_raw(buf.read_field(16, "channel")?);
                buf.skip_field(12, "ssc")?;
                let color_code = buf.read_field(12, "color_code")? as u16;
                TdmaMsg::NetStsBcst { wacn, syid, channel, color_code }
            }
            0x3a => {
                buf.skip_field(12, "lra")?;
                let syid = buf.read_field(12, "syid")? as u16;
                let rfid = buf.read_field(8, "rfid")? as u8;
                let stid = buf.read_field(8, "stid")? as u8;
                let channel = ChannelId::from_raw(buf.read_field(16, "channel")?);
                TdmaMsg::RfssStsBcst { syid, rfid, stid, channel }
            }
            0x39 => {
                let rfid = buf.read_field(8, "rfid")? as u8;
                let stid = buf.read_field(8, "stid")? as u8;
                let channel1 = ChannelId::from_raw(buf.read_field(16, "channel1")?);
                buf.skip_field(8, "ssc1")?;
                let channel2 = ChannelId::from_raw(buf.read_field(16, "channel2")?);
                TdmaMsg::SccbExp { rfid, stid, channel1, channel2 }
            }
            _ => {
                let iden = buf.read_field(4, "iden")? as u8;
                let bw = buf.read_field(9, "bw")? as u16;
                let toff0 = buf.read_field(9, "toff0")?;
                let spac = buf.read_field(10, "spac")?;
                let freq = buf.read_field(32, "freq")?;
                TdmaMsg::IdenUp { iden, bw, ident: FreqIdent::from_iden_up(toff0, spac, freq) }
            }
        };
        tracing::trace!("tdma op {} moc {:02x}: {:?}", op, moc, msg);
        Ok(msg)
    }
}
