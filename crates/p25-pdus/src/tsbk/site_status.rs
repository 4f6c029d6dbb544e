use p25_core::{BitBuffer, DecodeErr, let_field};

use crate::fields::channel_id::ChannelId;

/// RFSS_STS_BCST (0x3a)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfssStsBcst {
    pub syid: u16,
    pub rfid: u8,
    pub stid: u8,
    pub channel: ChannelId,
}

impl RfssStsBcst {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        // LRA and flags
        buffer.skip_field(12, "lra")?;
        let syid = buffer.read_field(12, "syid")? as u16;
        let rfid = buffer.read_field(8, "rfid")? as u8;
        let stid = buffer.read_field(8, "stid")? as u8;
        let channel = ChannelId::from_raw(buffer.read_field(16, "channel")?);
        Ok(RfssStsBcst { syid, rfid, stid, channel })
    }
}

/// SCCB_EXP (0x39), secondary control channels of the site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SccbExp {
    pub rfid: u8,
    pub stid: u8,
    pub channel1: ChannelId,
    pub channel2: ChannelId,
}

impl SccbExp {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let_field!(buffer, rfid, 8);
        let_field!(buffer, stid, 8);
        let_field!(buffer, channel1, 16);
        buffer.skip_field(8, "ssc1")?;
        let_field!(buffer, channel2, 16);
        Ok(SccbExp {
            rfid: rfid as u8,
            stid: stid as u8,
            channel1: ChannelId::from_raw(channel1),
            channel2: ChannelId::from_raw(channel2),
        })
    }
}

/// NET_STS_BCST (0x3b)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetStsBcst {
    pub wacn: u32,
    pub syid: u16,
    pub channel: ChannelId,
}

impl NetStsBcst {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        buffer.skip_field(8, "lra")?;
        let_field!(buffer, wacn, 20);
        let_field!(buffer, syid, 12);
        let_field!(buffer, channel, 16);
        Ok(NetStsBcst { wacn: wacn as u32, syid: syid as u16, channel: ChannelId::from_raw(channel) })
    }
}

/// ADJ_STS_BCST (0x3c)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjStsBcst {
    pub syid: u16,
    pub rfid: u8,
    pub stid: u8,
    pub channel: ChannelId,
}

impl AdjStsBcst {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        buffer.skip_field(12, "lra")?;
        let syid = buffer.read_field(12, "syid")? as u16;
        let rfid = buffer.read_field(8, "rfid")? as u8;
        let stid = buffer.read_field(8, "stid")? as u8;
        let channel = ChannelId::from_raw(buffer.read_field(16, "channel")?);
        Ok(AdjStsBcst { syid, rfid, stid, channel })
    }
}
