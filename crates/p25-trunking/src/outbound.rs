//! Outbound side of the control loop: frequency change requests and control channel events.

use core::fmt;

use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;

use p25_core::{Hz, Nac, Tgid, UnitId};

use crate::events::CcEventRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Cc,
    Vc,
}

/// Everything the front end needs to retune, plus the metadata shown next to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreqChangeParams {
    pub freq: Hz,
    pub tgid: Option<Tgid>,
    pub offset: i64,
    pub tag: String,
    pub nac: Nac,
    pub system: String,
    pub center_frequency: Option<Hz>,
    /// TDMA slot, None on single-slot channels
    pub tdma: Option<u8>,
    pub wacn: Option<u32>,
    pub sysid: Option<u16>,
    pub srcaddr: UnitId,
    pub grpaddr: Tgid,
    pub alg: String,
    pub algid: u8,
    pub channel_type: ChannelType,
    pub keyid: u16,
    pub prio: u32,
    pub tag_color: u32,
    pub srcaddr_color: u32,
    pub srcaddr_tag: String,
    pub effective_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErr {
    QueueFull,
    Disconnected,
}

impl fmt::Display for SinkErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkErr::QueueFull => write!(f, "outbound queue full"),
            SinkErr::Disconnected => write!(f, "outbound queue disconnected"),
        }
    }
}

impl std::error::Error for SinkErr {}

impl<T> From<TrySendError<T>> for SinkErr {
    fn from(e: TrySendError<T>) -> Self {
        match e {
            TrySendError::Full(_) => SinkErr::QueueFull,
            TrySendError::Disconnected(_) => SinkErr::Disconnected,
        }
    }
}

/// Receives the output of the control loop. Implementations must not block: they are called
/// inline while a message is being processed.
pub trait RxCtlSink {
    fn set_frequency(&mut self, params: &FreqChangeParams) -> Result<(), SinkErr>;

    /// `None` is a status refresh tick, sent once per processed message
    fn send_event(&mut self, event: Option<&CcEventRecord>) -> Result<(), SinkErr>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    FrequencyChange(FreqChangeParams),
    Event(CcEventRecord),
    Heartbeat,
}

#[derive(Serialize)]
struct ChangeFreqMsg<'a> {
    json_type: &'static str,
    #[serde(flatten)]
    params: &'a FreqChangeParams,
}

#[derive(Serialize)]
struct HeartbeatMsg {
    json_type: &'static str,
}

impl Outbound {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Outbound::FrequencyChange(params) => serde_json::to_string(&ChangeFreqMsg { json_type: "change_freq", params }),
            Outbound::Event(ev) => serde_json::to_string(ev),
            Outbound::Heartbeat => serde_json::to_string(&HeartbeatMsg { json_type: "heartbeat" }),
        }
    }
}

/// Hands everything to a bounded crossbeam channel drained by another thread.
/// A full channel drops the item and reports `SinkErr::QueueFull`.
pub struct ChannelSink {
    tx: Sender<Outbound>,
    heartbeats: bool,
}

impl ChannelSink {
    pub fn new(tx: Sender<Outbound>) -> Self {
        Self { tx, heartbeats: false }
    }

    /// Also forward status refresh ticks as `Outbound::Heartbeat`
    pub fn with_heartbeats(tx: Sender<Outbound>) -> Self {
        Self { tx, heartbeats: true }
    }
}

impl RxCtlSink for ChannelSink {
    fn set_frequency(&mut self, params: &FreqChangeParams) -> Result<(), SinkErr> {
        self.tx.try_send(Outbound::FrequencyChange(params.clone()))?;
        Ok(())
    }

    fn send_event(&mut self, event: Option<&CcEventRecord>) -> Result<(), SinkErr> {
        match event {
            Some(ev) => self.tx.try_send(Outbound::Event(ev.clone()))?,
            None if self.heartbeats => self.tx.try_send(Outbound::Heartbeat)?,
            None => {}
        }
        Ok(())
    }
}
