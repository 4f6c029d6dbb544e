/// TIA-102.AABC outbound TSBK opcodes understood by the decoder (standard manufacturer id)
/// Bits: 6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TsbkOpcode {
    GrpVChGrant = 0x00,
    GrpVChGrantUpdt = 0x02,
    GrpVChGrantUpdtExp = 0x03,
    SnDataChnGnt = 0x16,
    AckRspFne = 0x20,
    ExtFnctCmd = 0x24,
    DenyRsp = 0x27,
    GrpAffRsp = 0x28,
    GrpAffQ = 0x2a,
    LocRegRsp = 0x2b,
    URegRsp = 0x2c,
    URegCmd = 0x2d,
    UDeRegAck = 0x2f,
    IdenUpTdma = 0x33,
    IdenUpVu = 0x34,
    SccbExp = 0x39,
    RfssStsBcst = 0x3a,
    NetStsBcst = 0x3b,
    AdjStsBcst = 0x3c,
    IdenUp = 0x3d,
}

impl std::convert::TryFrom<u64> for TsbkOpcode {
    type Error = ();
    fn try_from(x: u64) -> Result<Self, Self::Error> {
        match x {
            0x00 => Ok(TsbkOpcode::GrpVChGrant),
            0x02 => Ok(TsbkOpcode::GrpVChGrantUpdt),
            0x03 => Ok(TsbkOpcode::GrpVChGrantUpdtExp),
            0x16 => Ok(TsbkOpcode::SnDataChnGnt),
            0x20 => Ok(TsbkOpcode::AckRspFne),
            0x24 => Ok(TsbkOpcode::ExtFnctCmd),
            0x27 => Ok(TsbkOpcode::DenyRsp),
            0x28 => Ok(TsbkOpcode::GrpAffRsp),
            0x2a => Ok(TsbkOpcode::GrpAffQ),
            0x2b => Ok(TsbkOpcode::LocRegRsp),
            0x2c => Ok(TsbkOpcode::URegRsp),
            0x2d => Ok(TsbkOpcode::URegCmd),
            0x2f => Ok(TsbkOpcode::UDeRegAck),
            0x33 => Ok(TsbkOpcode::IdenUpTdma),
            0x34 => Ok(TsbkOpcode::IdenUpVu),
            0x39 => Ok(TsbkOpcode::SccbExp),
            0x3a => Ok(TsbkOpcode::RfssStsBcst),
            0x3b => Ok(TsbkOpcode::NetStsBcst),
            0x3c => Ok(TsbkOpcode::AdjStsBcst),
            0x3d => Ok(TsbkOpcode::IdenUp),
            _ => Err(()),
        }
    }
}

impl TsbkOpcode {
    /// Convert this enum back into the raw integer value
    pub fn into_raw(self) -> u64 {
        self as u64
    }
}

impl From<TsbkOpcode> for u64 {
    fn from(e: TsbkOpcode) -> Self { e.into_raw() }
}

impl core::fmt::Display for TsbkOpcode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TsbkOpcode::GrpVChGrant => write!(f, "GrpVChGrant"),
            TsbkOpcode::GrpVChGrantUpdt => write!(f, "GrpVChGrantUpdt"),
            TsbkOpcode::GrpVChGrantUpdtExp => write!(f, "GrpVChGrantUpdtExp"),
            TsbkOpcode::SnDataChnGnt => write!(f, "SnDataChnGnt"),
            TsbkOpcode::AckRspFne => write!(f, "AckRspFne"),
            TsbkOpcode::ExtFnctCmd => write!(f, "ExtFnctCmd"),
            TsbkOpcode::DenyRsp => write!(f, "DenyRsp"),
            TsbkOpcode::GrpAffRsp => write!(f, "GrpAffRsp"),
            TsbkOpcode::GrpAffQ => write!(f, "GrpAffQ"),
            TsbkOpcode::LocRegRsp => write!(f, "LocRegRsp"),
            TsbkOpcode::URegRsp => write!(f, "URegRsp"),
            TsbkOpcode::URegCmd => write!(f, "URegCmd"),
            TsbkOpcode::UDeRegAck => write!(f, "UDeRegAck"),
            TsbkOpcode::IdenUpTdma => write!(f, "IdenUpTdma"),
            TsbkOpcode::IdenUpVu => write!(f, "IdenUpVu"),
            TsbkOpcode::SccbExp => write!(f, "SccbExp"),
            TsbkOpcode::RfssStsBcst => write!(f, "RfssStsBcst"),
            TsbkOpcode::NetStsBcst => write!(f, "NetStsBcst"),
            TsbkOpcode::AdjStsBcst => write!(f, "AdjStsBcst"),
            TsbkOpcode::IdenUp => write!(f, "IdenUp"),
        }
    }
}
