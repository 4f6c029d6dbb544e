use p25_trunking::{CcEventRecord, FreqChangeParams, Outbound, RxCtlSink, SinkErr};

/// An outbound sink for testing purposes
/// Collects all frequency changes and events for later inspection
pub struct Sink {
    msgqueue: Vec<Outbound>,
    /// When set, every delivery fails as if the consumer had gone away
    pub fail: bool,
}

impl Sink {
    pub fn new() -> Self {
        Self { msgqueue: vec![], fail: false }
    }

    pub fn take_msgqueue(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.msgqueue)
    }
}

impl RxCtlSink for Sink {
    fn set_frequency(&mut self, params: &FreqChangeParams) -> Result<(), SinkErr> {
        tracing::debug!("set_frequency: {:?}", params);
        if self.fail {
            return Err(SinkErr::Disconnected);
        }
        self.msgqueue.push(Outbound::FrequencyChange(params.clone()));
        Ok(())
    }

    fn send_event(&mut self, event: Option<&CcEventRecord>) -> Result<(), SinkErr> {
        if self.fail {
            return Err(SinkErr::Disconnected);
        }
        // status ticks are not interesting here
        if let Some(ev) = event {
            tracing::debug!("send_event: {:?}", ev);
            self.msgqueue.push(Outbound::Event(ev.clone()));
        }
        Ok(())
    }
}

/// Frequency changes among the collected messages
pub fn freq_changes(msgs: &[Outbound]) -> Vec<&FreqChangeParams> {
    msgs.iter()
        .filter_map(|m| match m {
            Outbound::FrequencyChange(p) => Some(p),
            _ => None,
        })
        .collect()
}

/// Control channel events among the collected messages
pub fn events(msgs: &[Outbound]) -> Vec<&CcEventRecord> {
    msgs.iter()
        .filter_map(|m| match m {
            Outbound::Event(ev) => Some(ev),
            _ => None,
        })
        .collect()
}
