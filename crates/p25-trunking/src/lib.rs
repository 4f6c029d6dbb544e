//! P25 trunking control
//!
//! - `TrunkedSystem`: per-NAC state built from control channel messages (frequency identifiers,
//!   site identity, voice grants, talkgroups, calls)
//! - `FrequencyTracker`: call lifetime per frequency and TDMA slot
//! - `RxCtl`: the receiver state machine driving frequency changes across systems
//! - Inbound queue message parsing and the outbound sink

pub mod events;
pub mod freq_tracking;
pub mod outbound;
pub mod qmsg;
pub mod rx_ctl;
pub mod trunked_system;

pub use events::{CcEvent, CcEventRecord, EndReason, TgRecord, UnitRecord};
pub use outbound::{ChannelSink, ChannelType, FreqChangeParams, Outbound, RxCtlSink, SinkErr};
pub use qmsg::{InboundMsg, QmsgErr, QueueMsg};
pub use rx_ctl::{Command, CommandErr, RxCtl, RxCtlErr, RxState};
pub use trunked_system::{TalkgroupSelection, TrunkedSystem};
