//! Control channel PDUs for P25 Phase 1 (TSBK, MBT), Phase 2 TDMA MAC broadcasts and NXDN CAC.

pub mod enums;
pub mod fields;
pub mod mbt;
pub mod nxdn;
pub mod tdma;
pub mod tsbk;
