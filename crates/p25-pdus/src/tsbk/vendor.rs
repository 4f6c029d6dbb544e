//! Manufacturer specific TSBKs: Motorola supergroup (patch) messages and the Harris
//! encrypted regroup command.

use p25_core::{BitBuffer, DecodeErr};

use crate::fields::channel_id::ChannelId;

/// MOT_GRG_ADD_CMD (0x00) / MOT_GRG_DEL_CMD (0x01)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotGrgCmd {
    pub supergroup: u32,
    pub group1: u32,
    pub group2: u32,
    pub group3: u32,
}

impl MotGrgCmd {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let supergroup = buffer.read_field(16, "supergroup")? as u32;
        let group1 = buffer.read_field(16, "group1")? as u32;
        let group2 = buffer.read_field(16, "group2")? as u32;
        let group3 = buffer.read_field(16, "group3")? as u32;
        Ok(MotGrgCmd { supergroup, group1, group2, group3 })
    }
}

/// MOT_GRG_CN_GRANT (0x02), voice grant addressed to a supergroup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotGrgCnGrant {
    pub channel: ChannelId,
    pub supergroup: u32,
    pub source_address: u32,
}

impl MotGrgCnGrant {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        buffer.skip_field(8, "opts")?;
        let channel = ChannelId::from_raw(buffer.read_field(16, "channel")?);
        let supergroup = buffer.read_field(16, "supergroup")? as u32;
        let source_address = buffer.read_field(24, "source_address")? as u32;
        Ok(MotGrgCnGrant { channel, supergroup, source_address })
    }
}

/// MOT_GRG_CN_GRANT_UPDT (0x03)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotGrgCnGrantUpdt {
    pub channel1: ChannelId,
    pub supergroup1: u32,
    pub channel2: ChannelId,
    pub supergroup2: u32,
}

impl MotGrgCnGrantUpdt {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let channel1 = ChannelId::from_raw(buffer.read_field(16, "channel1")?);
        let supergroup1 = buffer.read_field(16, "supergroup1")? as u32;
        let channel2 = ChannelId::from_raw(buffer.read_field(16, "channel2")?);
        let supergroup2 = buffer.read_field(16, "supergroup2")? as u32;
        Ok(MotGrgCnGrantUpdt { channel1, supergroup1, channel2, supergroup2 })
    }
}

/// Target of a Harris regroup command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrgTarget {
    Group(u32),
    Unit(u32),
}

/// HARRIS GRG_EXENC_CMD (0x30)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrgExencCmd {
    pub opt_2way: bool,
    pub opt_group: bool,
    pub opt_act: bool,
    pub opt_ssn: u8,
    pub supergroup: u32,
    pub keyid: u16,
    pub algid: u8,
    pub target: GrgTarget,
}

impl GrgExencCmd {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let opts = buffer.read_field(8, "grg_options")? as u8;
        let supergroup = buffer.read_field(16, "supergroup")? as u32;
        let keyid = buffer.read_field(16, "keyid")? as u16;
        let raw_target = buffer.read_field(24, "target")? as u32;

        let opt_group = opts & 0x40 != 0;
        // group targets carry the algorithm id in the top octet
        let (algid, target) = if opt_group {
            (((raw_target >> 16) & 0xff) as u8, GrgTarget::Group(raw_target & 0xffff))
        } else {
            (128, GrgTarget::Unit(raw_target))
        };

        Ok(GrgExencCmd {
            opt_2way: opts & 0x80 == 0,
            opt_group,
            opt_act: opts & 0x20 != 0,
            opt_ssn: opts & 0x1f,
            supergroup,
            keyid,
            algid,
            target,
        })
    }
}
