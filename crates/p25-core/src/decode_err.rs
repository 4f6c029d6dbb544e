use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeErr {
    BufferEnded { field: Option<&'static str> },
    InvalidValue { field: &'static str, value: u64 },
    InconsistentLength { expected: usize, found: usize },
    CrcMismatch { computed: u16 },
    UnsupportedFormat { fmt: u8 },
}

impl fmt::Display for DecodeErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeErr::BufferEnded { field: Some(field) } => write!(f, "buffer ended while reading {}", field),
            DecodeErr::BufferEnded { field: None } => write!(f, "buffer ended"),
            DecodeErr::InvalidValue { field, value } => write!(f, "invalid value {} for {}", value, field),
            DecodeErr::InconsistentLength { expected, found } => {
                write!(f, "inconsistent length: expected {} found {}", expected, found)
            }
            DecodeErr::CrcMismatch { computed } => write!(f, "crc mismatch (residue 0x{:04x})", computed),
            DecodeErr::UnsupportedFormat { fmt } => write!(f, "unsupported format 0x{:02x}", fmt),
        }
    }
}

impl std::error::Error for DecodeErr {}

/// Fails with DecodeErr::InconsistentLength unless at least `$min` bits are present
#[macro_export]
macro_rules! expect_min_len {
    ($len:expr, $min:expr) => {{
        let found: usize = $len;
        let expected: usize = $min;
        if found < expected {
            Err($crate::DecodeErr::InconsistentLength { expected, found })
        } else {
            Ok(())
        }
    }};
}

/// Reads a named field at the current position, binding it to a local of the same name
#[macro_export]
macro_rules! let_field {
    ($buf:expr, $ident:ident, $bits:expr) => {
        let $ident = $buf.read_field($bits, stringify!($ident))?;
    };
}

#[cfg(test)]
mod tests {
    use crate::BitBuffer;
    use super::DecodeErr;

    fn parse_two(data: &[u8]) -> Result<(u64, u64), DecodeErr> {
        let mut buf = BitBuffer::from_bytes(data);
        let_field!(buf, hi, 4);
        let_field!(buf, lo, 4);
        Ok((hi, lo))
    }

    #[test]
    fn test_field_macros() {
        assert_eq!(parse_two(&[0x3a]), Ok((0x3, 0xa)));
        assert_eq!(parse_two(&[0x4a]), Ok((0x4, 0xa)));
        assert_eq!(parse_two(&[]), Err(DecodeErr::BufferEnded { field: Some("hi") }));
    }

    #[test]
    fn test_min_len() {
        let r: Result<(), DecodeErr> = expect_min_len!(64, 72);
        assert_eq!(r, Err(DecodeErr::InconsistentLength { expected: 72, found: 64 }));
        assert!(expect_min_len!(80, 72).is_ok());
    }
}
