pub mod channel_id;
pub mod freq_ident;
