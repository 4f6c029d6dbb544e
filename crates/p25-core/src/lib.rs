//! Core utilities for the P25 trunking receiver
//!
//! This crate provides fundamental types and utilities used across the workspace:
//! - BitBuffer for MSB-first field extraction from control messages
//! - DecodeErr and the field macros used by every decoder
//! - CRC-16 for TSBK and PDU header blocks
//! - Wall clock helpers and logging setup

pub mod bitbuffer;
pub mod crc;
pub mod debug;
pub mod decode_err;
pub mod timebase;

pub use bitbuffer::BitBuffer;
pub use decode_err::DecodeErr;

/// Frequency in Hz
pub type Hz = u64;

/// Network Access Code, 12 bits on air. Wider values only appear for unconfigured queue ids.
pub type Nac = u16;

/// Talkgroup id
pub type Tgid = u32;

/// Subscriber unit id (24 bits)
pub type UnitId = u32;
