use core::fmt;

/// 16-bit channel field: identifier in the high nibble, channel number in the low 12 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u16);

impl ChannelId {
    pub fn from_raw(raw: u64) -> Self {
        ChannelId((raw & 0xffff) as u16)
    }

    /// Frequency identifier table index (0..=15)
    pub fn iden(self) -> u8 {
        ((self.0 >> 12) & 0xf) as u8
    }

    /// Channel number within the identifier's band plan
    pub fn number(self) -> u16 {
        self.0 & 0xfff
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}-{}", self.iden(), self.number())
    }
}
