/// Manufacturer id carried in octet 1 of every TSBK
/// Bits: 8
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mfrid {
    Standard = 0x00,
    Motorola = 0x90,
    Harris = 0xa4,
}

impl std::convert::TryFrom<u64> for Mfrid {
    type Error = ();
    fn try_from(x: u64) -> Result<Self, Self::Error> {
        match x {
            0x00 => Ok(Mfrid::Standard),
            0x90 => Ok(Mfrid::Motorola),
            0xa4 => Ok(Mfrid::Harris),
            _ => Err(()),
        }
    }
}

impl Mfrid {
    pub fn into_raw(self) -> u64 {
        self as u64
    }
}

impl core::fmt::Display for Mfrid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Mfrid::Standard => write!(f, "Standard"),
            Mfrid::Motorola => write!(f, "Motorola"),
            Mfrid::Harris => write!(f, "Harris"),
        }
    }
}
