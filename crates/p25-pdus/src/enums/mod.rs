pub mod mfrid;
pub mod tsbk_opcode;
