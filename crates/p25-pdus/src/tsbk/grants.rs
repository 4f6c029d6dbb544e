use p25_core::{BitBuffer, DecodeErr};

use crate::fields::channel_id::ChannelId;

/// GRP_V_CH_GRANT (0x00)
/// Assigns a group call to a voice channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpVChGrant {
    /// 8 bits, service options; bit 6 marks an encrypted call
    pub opts: u8,
    /// 16 bits
    pub channel: ChannelId,
    /// 16 bits
    pub group_address: u32,
    /// 24 bits
    pub source_address: u32,
}

impl GrpVChGrant {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let opts = buffer.read_field(8, "opts")? as u8;
        let channel = ChannelId::from_raw(buffer.read_field(16, "channel")?);
        let group_address = buffer.read_field(16, "group_address")? as u32;
        let source_address = buffer.read_field(24, "source_address")? as u32;
        Ok(GrpVChGrant { opts, channel, group_address, source_address })
    }

    pub fn protected(&self) -> bool {
        self.opts & 0x40 != 0
    }
}

/// GRP_V_CH_GRANT_UPDT (0x02)
/// Two (channel, group) pairs currently active on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpVChGrantUpdt {
    pub channel1: ChannelId,
    pub group_address1: u32,
    pub channel2: ChannelId,
    pub group_address2: u32,
}

impl GrpVChGrantUpdt {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let channel1 = ChannelId::from_raw(buffer.read_field(16, "channel1")?);
        let group_address1 = buffer.read_field(16, "group_address1")? as u32;
        let channel2 = ChannelId::from_raw(buffer.read_field(16, "channel2")?);
        let group_address2 = buffer.read_field(16, "group_address2")? as u32;
        Ok(GrpVChGrantUpdt { channel1, group_address1, channel2, group_address2 })
    }
}

/// GRP_V_CH_GRANT_UPDT_EXP (0x03)
/// Explicit update carrying separate transmit and receive channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpVChGrantUpdtExp {
    pub opts: u8,
    /// Downlink channel
    pub channel_t: ChannelId,
    /// Uplink channel
    pub channel_r: ChannelId,
    pub group_address: u32,
}

impl GrpVChGrantUpdtExp {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let opts = buffer.read_field(8, "opts")? as u8;
        buffer.skip_field(8, "reserved")?;
        let channel_t = ChannelId::from_raw(buffer.read_field(16, "channel_t")?);
        let channel_r = ChannelId::from_raw(buffer.read_field(16, "channel_r")?);
        let group_address = buffer.read_field(16, "group_address")? as u32;
        Ok(GrpVChGrantUpdtExp { opts, channel_t, channel_r, group_address })
    }
}

/// SN-DATA_CHN_GNT (0x16)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnDataChnGnt {
    pub channel_t: ChannelId,
    pub channel_r: ChannelId,
}

impl SnDataChnGnt {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        buffer.skip_field(16, "service_options")?;
        let channel_t = ChannelId::from_raw(buffer.read_field(16, "channel_t")?);
        let channel_r = ChannelId::from_raw(buffer.read_field(16, "channel_r")?);
        Ok(SnDataChnGnt { channel_t, channel_r })
    }
}
