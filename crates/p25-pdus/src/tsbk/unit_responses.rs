use p25_core::{BitBuffer, DecodeErr};

/// ACK_RSP_FNE (0x20)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckRspFne {
    pub aiv: bool,
    /// Extended addressing: additional info holds WACN and system id instead of a source unit
    pub ex: bool,
    pub additional: u32,
    pub target: u32,
}

impl AckRspFne {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let aiv = buffer.read_flag("aiv")?;
        let ex = buffer.read_flag("ex")?;
        buffer.skip_field(6, "service_type")?;
        let additional = buffer.read_field(32, "additional")? as u32;
        let target = buffer.read_field(24, "target")? as u32;
        Ok(AckRspFne { aiv, ex, additional, target })
    }

    pub fn wacn(&self) -> Option<u32> {
        self.ex.then_some((self.additional >> 12) & 0xfffff)
    }

    pub fn sysid(&self) -> Option<u16> {
        self.ex.then_some((self.additional & 0xfff) as u16)
    }

    pub fn source(&self) -> Option<u32> {
        (!self.ex).then_some(self.additional & 0xffffff)
    }
}

/// DENY_RSP (0x27)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenyRsp {
    pub aiv: bool,
    pub reason: u8,
    pub additional: u32,
    pub target: u32,
}

impl DenyRsp {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let aiv = buffer.read_flag("aiv")?;
        buffer.skip_field(7, "service_type")?;
        let reason = buffer.read_field(8, "reason")? as u8;
        let additional = buffer.read_field(24, "additional")? as u32;
        let target = buffer.read_field(24, "target")? as u32;
        Ok(DenyRsp { aiv, reason, additional, target })
    }
}

/// GRP_AFF_RSP (0x28)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpAffRsp {
    /// false: local, true: global affiliation
    pub global: bool,
    pub gav: u8,
    pub announce_group: u32,
    pub group: u32,
    pub target: u32,
}

impl GrpAffRsp {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let global = buffer.read_flag("lg")?;
        buffer.skip_field(5, "reserved")?;
        let gav = buffer.read_field(2, "gav")? as u8;
        let announce_group = buffer.read_field(16, "announce_group")? as u32;
        let group = buffer.read_field(16, "group")? as u32;
        let target = buffer.read_field(24, "target")? as u32;
        Ok(GrpAffRsp { global, gav, announce_group, group, target })
    }
}

/// GRP_AFF_Q (0x2a)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpAffQ {
    pub target: u32,
    pub source: u32,
}

impl GrpAffQ {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        buffer.skip_field(16, "reserved")?;
        let target = buffer.read_field(24, "target")? as u32;
        let source = buffer.read_field(24, "source")? as u32;
        Ok(GrpAffQ { target, source })
    }
}

/// LOC_REG_RSP (0x2b)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocRegRsp {
    pub rv: u8,
    pub group: u32,
    pub rfss: u8,
    pub site: u8,
    pub target: u32,
}

impl LocRegRsp {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        buffer.skip_field(6, "reserved")?;
        let rv = buffer.read_field(2, "rv")? as u8;
        let group = buffer.read_field(16, "group")? as u32;
        let rfss = buffer.read_field(8, "rfss")? as u8;
        let site = buffer.read_field(8, "site")? as u8;
        let target = buffer.read_field(24, "target")? as u32;
        Ok(LocRegRsp { rv, group, rfss, site, target })
    }
}

/// U_REG_RSP (0x2c)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct URegRsp {
    pub rv: u8,
    pub sysid: u16,
    pub target: u32,
    pub source: u32,
}

impl URegRsp {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        buffer.skip_field(3, "reserved")?;
        let rv = buffer.read_field(1, "rv")? as u8;
        let sysid = buffer.read_field(12, "sysid")? as u16;
        let target = buffer.read_field(24, "target")? as u32;
        let source = buffer.read_field(24, "source")? as u32;
        Ok(URegRsp { rv, sysid, target, source })
    }
}

/// U_REG_CMD (0x2d)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct URegCmd {
    pub target: u32,
    pub source: u32,
}

impl URegCmd {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        buffer.skip_field(16, "reserved")?;
        let target = buffer.read_field(24, "target")? as u32;
        let source = buffer.read_field(24, "source")? as u32;
        Ok(URegCmd { target, source })
    }
}

/// U_DE_REG_ACK (0x2f)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UDeRegAck {
    pub wacn: u32,
    pub sysid: u16,
    pub source: u32,
}

impl UDeRegAck {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        buffer.skip_field(8, "reserved")?;
        let wacn = buffer.read_field(20, "wacn")? as u32;
        let sysid = buffer.read_field(12, "sysid")? as u16;
        let source = buffer.read_field(24, "source")? as u32;
        Ok(UDeRegAck { wacn, sysid, source })
    }
}

/// EXT_FNCT_CMD (0x24)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtFnctCmd {
    pub class: u8,
    pub operand: u8,
    pub args: u32,
    pub target: u32,
}

impl ExtFnctCmd {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let class = buffer.read_field(8, "efclass")? as u8;
        let operand = buffer.read_field(8, "efoperand")? as u8;
        let args = buffer.read_field(24, "efargs")? as u32;
        let target = buffer.read_field(24, "target")? as u32;
        Ok(ExtFnctCmd { class, operand, args, target })
    }
}
