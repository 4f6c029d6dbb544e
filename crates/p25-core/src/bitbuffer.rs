use std::{cmp::max, fmt};

use crate::decode_err::DecodeErr;

/// MSB-first bit window over a byte vector.
/// Control messages arrive as big-endian byte strings; every field is read at a fixed
/// offset from the start of the window.
pub struct BitBuffer {
    buffer: Vec<u8>,
    start: usize,       // bits before this are out of window
    pos: usize,         // next bit offset for read/write (absolute)
    end: usize,         // bits at or after this are out of window
    flag_autoexpand: bool,   // if true, writes past end grow the buffer
}

impl BitBuffer {
    /// Create a zeroed buffer capable of holding exactly `len_bits` bits.
    pub fn new(len_bits: usize) -> Self {
        let byte_len = (len_bits + 7) / 8;
        BitBuffer {
            buffer: vec![0; byte_len],
            start: 0,
            pos: 0,
            end: len_bits,
            flag_autoexpand: false,
        }
    }

    /// Create a zeroed buffer with an inital capacity but zero length (end is set to 0).
    /// Writes to this buffer will automatically advance the end pointer and reallocate the buffer if needed
    pub fn new_autoexpand(initial_max_len_bits: usize) -> Self {
        let byte_len = (initial_max_len_bits + 7) / 8;
        BitBuffer {
            buffer: vec![0; byte_len],
            start: 0,
            pos: 0,
            end: 0,
            flag_autoexpand: true,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        let len_bits = data.len() * 8;
        BitBuffer {
            buffer: data.to_vec(),
            start: 0,
            pos: 0,
            end: len_bits,
            flag_autoexpand: false,
        }
    }

    /// Window over `data` that only exposes the first `len_bits` bits.
    /// Returns None if the data is shorter than requested.
    pub fn from_bytes_truncated(data: &[u8], len_bits: usize) -> Option<Self> {
        if data.len() * 8 < len_bits {
            return None;
        }
        let mut buf = Self::from_bytes(data);
        buf.end = len_bits;
        Some(buf)
    }

    /// Peek `num_bits` with offset from window start, without advancing.
    /// Returns None on overflow or if `num_bits>64`.
    pub fn peek_bits_startoffset(&self, offset: usize, num_bits: usize) -> Option<u64> {
        let abs_pos = self.start + offset;
        if num_bits > 64 || abs_pos + num_bits > self.end {
            return None;
        }
        Some(self.read_bits_at_unchecked(abs_pos, num_bits))
    }

    /// Read `num_bits` at the current pos, advancing on success.
    pub fn read_bits(&mut self, num_bits: usize) -> Option<u64> {
        let v = self.peek_bits_startoffset(self.pos - self.start, num_bits)?;
        self.pos += num_bits;
        Some(v)
    }

    /// Similar to read_bits, but returns DecodeErr::BufferEnded naming the field if not enough bits are available.
    pub fn read_field(&mut self, num_bits: usize, field: &'static str) -> Result<u64, DecodeErr> {
        self.read_bits(num_bits).ok_or(DecodeErr::BufferEnded { field: Some(field) })
    }

    /// Reads a single-bit flag
    pub fn read_flag(&mut self, field: &'static str) -> Result<bool, DecodeErr> {
        Ok(self.read_field(1, field)? == 1)
    }

    /// Skips reserved or unused bits. Fails like read_field when the window ends first.
    pub fn skip_field(&mut self, num_bits: usize, field: &'static str) -> Result<(), DecodeErr> {
        if self.pos + num_bits > self.end {
            return Err(DecodeErr::BufferEnded { field: Some(field) });
        }
        self.pos += num_bits;
        Ok(())
    }

    /// When a write would exceed the end, but the BitBuffer is set to automatically expand,
    /// this function is called to increase `end` and if needed, allocate more space in the buffer.
    fn move_end(&mut self, needed_extra_bits: usize) {
        let free_cap_bits = self.buffer.len() * 8 - self.end;
        let needed_total_bits = self.end + needed_extra_bits;

        if needed_extra_bits > free_cap_bits {
            let double_cap_bits = self.buffer.len() * 8 * 2;
            let new_cap_bits = max(needed_total_bits, double_cap_bits);
            self.buffer.resize((new_cap_bits + 7) / 8, 0);
        }

        self.end += needed_extra_bits;
    }

    /// Write up to 64 bits, advancing pos.
    /// If autoexpand is enabled, will advance end as well and/or realloc if buffer full
    /// If disabled, panics if exceeds end.
    pub fn write_bits(&mut self, value: u64, num_bits: usize) {
        assert!(num_bits <= 64, "can only write up to 64 bits");
        assert!(num_bits == 64 || value >> num_bits == 0, "value exceeds num_bits {} {}", value, num_bits);

        if self.pos + num_bits > self.end {
            if self.flag_autoexpand {
                let overshoot = self.pos + num_bits - self.end;
                self.move_end(overshoot);
            } else {
                panic!("write would exceed buffer end");
            }
        }

        for i in 0..num_bits {
            let bit = ((value >> (num_bits - 1 - i)) & 1) as u8;
            let abs = self.pos + i;
            let mask = 1u8 << (7 - (abs % 8));
            if bit == 1 {
                self.buffer[abs / 8] |= mask;
            } else {
                self.buffer[abs / 8] &= !mask;
            }
        }
        self.pos += num_bits;
    }

    /// Returns the window contents as bytes, padding the last byte with zero bits.
    pub fn into_bytes(self) -> Vec<u8> {
        let start_byte = self.start / 8;
        let end_byte = (self.end + 7) / 8;
        self.buffer[start_byte..end_byte].to_vec()
    }

    /// Length of the window in bits
    pub fn get_len(&self) -> usize {
        self.end - self.start
    }

    /// Bits left between pos and end
    pub fn get_len_remaining(&self) -> usize {
        self.end - self.pos
    }

    /// Position relative to window start
    pub fn get_pos(&self) -> usize {
        self.pos - self.start
    }

    /// Seek to an offset relative to the window start
    pub fn seek(&mut self, offset: usize) {
        assert!(self.start + offset <= self.end, "seek beyond window end");
        self.pos = self.start + offset;
    }

    /// Hex dump of the window, whole bytes only
    pub fn dump_hex(&self) -> String {
        let mut s = String::with_capacity(self.get_len() / 4 + 1);
        let mut offset = 0;
        while offset + 8 <= self.get_len() {
            let byte = self.read_bits_at_unchecked(self.start + offset, 8);
            s.push_str(&format!("{:02x}", byte));
            offset += 8;
        }
        s
    }

    /// Reads exactly `num_bits` bits starting at absolute `bit_pos`, MSB first.
    /// **Caller must ensure** `num_bits <= 64` and `bit_pos + num_bits <= end`.
    fn read_bits_at_unchecked(&self, mut bit_pos: usize, num_bits: usize) -> u64 {
        let mut result = 0u64;
        let mut bits_remaining = num_bits;

        // head bits to align to next byte
        let head = bit_pos % 8;
        if head != 0 && bits_remaining > 0 {
            let take = usize::min(8 - head, bits_remaining);
            let byte = self.buffer[bit_pos / 8];
            let shift = 8 - head - take;
            let mask = ((1u16 << take) - 1) as u8;
            result = ((byte >> shift) & mask) as u64;
            bit_pos += take;
            bits_remaining -= take;
        }

        while bits_remaining >= 8 {
            let byte = self.buffer[bit_pos / 8] as u64;
            result = (result << 8) | byte;
            bit_pos += 8;
            bits_remaining -= 8;
        }

        // tail bits
        if bits_remaining > 0 {
            let byte = self.buffer[bit_pos / 8];
            for i in 0..bits_remaining {
                let shift = 7 - ((bit_pos % 8) + i);
                let bit = ((byte >> shift) & 1) as u64;
                result = (result << 1) | bit;
            }
        }

        result
    }
}

impl fmt::Debug for BitBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitBuffer {{ <{} ^{} >{} {} }}", self.start, self.pos, self.end, self.dump_hex())
    }
}
