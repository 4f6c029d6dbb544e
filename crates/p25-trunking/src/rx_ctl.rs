//! Receiver control loop: owns every trunked system, consumes inbound queue messages and decides
//! where the receiver should be tuned.
//!
//! The receiver sits on a control channel (`Cc`) until a talkgroup worth following shows up,
//! requests a tune to its voice channel (`ToVc`), follows the voice traffic (`Vc`) and returns
//! to the control channel when the call is released or goes quiet. With several systems
//! configured, an idle receiver rotates through them.

use core::fmt;
use core::str::FromStr;
use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value, json};

use p25_config::{RxConfig, SystemConfig, TagRegistry, TrunkTiming, parse_int_auto, read_tags_file};
use p25_core::{Hz, Nac, Tgid, timebase};
use p25_pdus::nxdn::{CacBody, CacMessage};

use crate::outbound::{ChannelType, FreqChangeParams, RxCtlSink};
use crate::qmsg::{CallInfo, InboundMsg, NAC_INVALID, QueueMsg};
use crate::trunked_system::{CallCrypto, TrunkedSystem};

/// Hold expiry used for a pinned talkgroup
const HOLD_FOREVER: f64 = 86400.0 * 10000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    /// Never entered
    Acq,
    Cc,
    ToVc,
    Vc,
}

/// Input to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Nothing received within the expected interval
    Timeout,
    /// New grants were seen, look for something to follow
    Update,
    /// Terminator without channel release
    Duid3,
    /// Terminator with channel release
    Duid15,
    /// Voice header or LDU
    Voice,
    /// TSBK or MBT that updated nothing
    ControlData,
    Hold,
    SetHold,
    UnsetHold,
    Skip,
    Lockout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandErr {
    Unknown(String),
}

impl fmt::Display for CommandErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandErr::Unknown(cmd) => write!(f, "unknown command '{}'", cmd),
        }
    }
}

impl std::error::Error for CommandErr {}

impl FromStr for Command {
    type Err = CommandErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "timeout" => Command::Timeout,
            "update" => Command::Update,
            "duid3" | "tdma_duid3" => Command::Duid3,
            "duid15" | "tdma_duid15" => Command::Duid15,
            "duid0" | "duid5" | "duid10" | "tdma_duid5" => Command::Voice,
            "duid7" | "duid12" => Command::ControlData,
            "hold" => Command::Hold,
            "set_hold" => Command::SetHold,
            "unset_hold" => Command::UnsetHold,
            "skip" => Command::Skip,
            "lockout" => Command::Lockout,
            other => return Err(CommandErr::Unknown(other.to_string())),
        })
    }
}

impl Command {
    pub fn from_duid(duid: i32) -> Result<Self, CommandErr> {
        format!("duid{}", duid).parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxCtlErr {
    DuplicateNac(Nac),
    UnknownNac(Nac),
    InvalidNacList(String),
    Tags { path: String, error: String },
}

impl fmt::Display for RxCtlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RxCtlErr::DuplicateNac(nac) => write!(f, "duplicate nac 0x{:x}", nac),
            RxCtlErr::UnknownNac(nac) => write!(f, "unknown nac 0x{:x}", nac),
            RxCtlErr::InvalidNacList(e) => write!(f, "invalid nac list: {}", e),
            RxCtlErr::Tags { path, error } => write!(f, "reading tags {}: {}", path, error),
        }
    }
}

impl std::error::Error for RxCtlErr {}

/// Round-robin over the configured NACs, skipping disabled ones. Pre-increments the cursor,
/// wraps at most once and falls back to the first NAC.
fn next_tsys(nacs: &[Nac], enabled: Option<&[Nac]>, cursor: &mut usize) -> Option<Nac> {
    let mut wrapped = false;
    loop {
        *cursor += 1;
        if *cursor >= nacs.len() {
            if wrapped {
                break;
            }
            *cursor = 0;
            wrapped = true;
        }
        let Some(&nac) = nacs.get(*cursor) else {
            break;
        };
        if enabled.is_some_and(|e| !e.contains(&nac)) {
            continue;
        }
        return Some(nac);
    }
    nacs.first().copied()
}

pub struct RxCtl<S: RxCtlSink> {
    sink: S,
    timing: TrunkTiming,
    configs: HashMap<Nac, SystemConfig>,
    /// Configured NACs in rotation order
    nacs: Vec<Nac>,
    systems: BTreeMap<Nac, TrunkedSystem>,
    enabled_nacs: Option<Vec<Nac>>,

    state: RxState,
    current_nac: Option<Nac>,
    current_id: usize,
    current_tgid: Option<Tgid>,
    tgid_hold: Option<Tgid>,
    tgid_hold_until: f64,
    hold_mode: bool,
    /// Earliest time to move on to the next system
    wait_until: f64,
    last_command: Option<&'static str>,
    last_command_time: f64,
    next_hunt_time: f64,
    status_msg: String,
}

impl<S: RxCtlSink> RxCtl<S> {
    /// Without a configuration the controller runs in manual mode: systems are added as their
    /// control channels are heard and the receiver is never retuned.
    pub fn new(config: Option<RxConfig>, sink: S, now: f64) -> Self {
        let mut ctl = RxCtl {
            sink,
            timing: TrunkTiming::default(),
            configs: HashMap::new(),
            nacs: Vec::new(),
            systems: BTreeMap::new(),
            enabled_nacs: None,
            state: RxState::Cc,
            current_nac: None,
            current_id: 0,
            current_tgid: None,
            tgid_hold: None,
            tgid_hold_until: now,
            hold_mode: false,
            wait_until: now,
            last_command: None,
            last_command_time: now,
            next_hunt_time: now,
            status_msg: String::new(),
        };
        let Some(config) = config else {
            return ctl;
        };

        ctl.timing = config.timing;
        ctl.enabled_nacs = config.enabled_nacs.clone();
        ctl.nacs = config.nacs();
        for sys in config.systems {
            ctl.configs.insert(sys.nac, sys);
        }
        for nac in ctl.nacs.clone() {
            if let Err(e) = ctl.add_trunked_system(nac, now) {
                tracing::warn!("{}", e);
            }
        }

        ctl.current_nac = next_tsys(&ctl.nacs, ctl.enabled_nacs.as_deref(), &mut ctl.current_id);
        ctl.state = RxState::Cc;
        if let Some(nac) = ctl.current_nac {
            if let Some(tsys) = ctl.systems.get(&nac) {
                tracing::info!(nac, "starting on {} control channel {:.6}", tsys.sysname, tsys.trunk_cc as f64 / 1e6);
                let params = tsys.frequency_change_params(None, tsys.trunk_cc, nac, None, ChannelType::Cc, now);
                ctl.set_frequency(&params);
            }
        }
        ctl
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    pub fn in_voice_state(&self) -> bool {
        matches!(self.state, RxState::ToVc | RxState::Vc)
    }

    pub fn current_nac(&self) -> Option<Nac> {
        self.current_nac
    }

    pub fn current_tgid(&self) -> Option<Tgid> {
        self.current_tgid
    }

    pub fn tgid_hold(&self) -> Option<Tgid> {
        self.tgid_hold
    }

    pub fn hold_mode(&self) -> bool {
        self.hold_mode
    }

    pub fn enabled_nacs(&self) -> Option<&[Nac]> {
        self.enabled_nacs.as_deref()
    }

    pub fn nacs(&self) -> &[Nac] {
        &self.nacs
    }

    pub fn system(&self, nac: Nac) -> Option<&TrunkedSystem> {
        self.systems.get(&nac)
    }

    pub fn system_mut(&mut self, nac: Nac) -> Option<&mut TrunkedSystem> {
        self.systems.get_mut(&nac)
    }

    pub fn systems(&self) -> impl Iterator<Item = (&Nac, &TrunkedSystem)> {
        self.systems.iter()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// One line summary of the last frequency change
    pub fn status_msg(&self) -> &str {
        &self.status_msg
    }

    fn set_frequency(&mut self, params: &FreqChangeParams) {
        if params.freq == 0 {
            return;
        }
        self.status_msg = format!(
            "F {:.6} TG {} {} at {}",
            params.freq as f64 / 1e6,
            params.tgid.map(|t| t.to_string()).unwrap_or_else(|| "None".to_string()),
            params.tag,
            timebase::format_local(params.effective_time)
        );
        tracing::info!(nac = params.nac, "-> tune {:?} {}", params.channel_type, self.status_msg);
        if let Err(e) = self.sink.set_frequency(params) {
            tracing::warn!(nac = params.nac, "frequency change not delivered: {}", e);
        }
    }

    /// Hands queued control channel events of every system to the sink
    fn flush_events(&mut self) {
        for tsys in self.systems.values_mut() {
            for ev in tsys.take_events() {
                if let Err(e) = self.sink.send_event(Some(&ev)) {
                    tracing::warn!(nac = ev.nac, "event not delivered: {}", e);
                }
            }
        }
    }

    // ----------------------- system management -----------------------

    pub fn add_trunked_system(&mut self, nac: Nac, now: f64) -> Result<(), RxCtlErr> {
        if self.systems.contains_key(&nac) {
            return Err(RxCtlErr::DuplicateNac(nac));
        }
        let tsys = TrunkedSystem::new(nac, self.configs.get(&nac), self.timing, now);
        tracing::debug!(nac, "added trunked system '{}'", tsys.sysname);
        self.systems.insert(nac, tsys);
        Ok(())
    }

    /// Promotes an auto-added system to a configured one once its identity is fully known.
    /// Returns true when the configuration was created.
    pub fn add_default_config(&mut self, nac: Nac) -> bool {
        if self.configs.contains_key(&nac) {
            return false;
        }
        let Some(tsys) = self.systems.get_mut(&nac) else {
            return false;
        };
        if tsys.rfss.chan == 0 || tsys.ns_chan == 0 || tsys.ns_wacn.is_none() || tsys.ns_syid.is_none() {
            tracing::debug!(nac, "add_default_config: system identity not yet known");
            return false;
        }
        let mut cclist: Vec<Hz> = vec![tsys.rfss.chan];
        cclist.extend(tsys.secondary.iter().copied().filter(|f| *f != tsys.rfss.chan));
        let cfg = SystemConfig::new(nac, &format!("NAC 0x{:x}", nac), cclist);
        tsys.apply_config(&cfg);
        tracing::info!(nac, "default config created, control channels {:?}", cfg.cclist);

        self.configs.insert(nac, cfg);
        self.current_nac = Some(nac);
        self.state = RxState::Cc;
        if !self.nacs.contains(&nac) {
            self.nacs.push(nac);
        }
        true
    }

    /// Re-reads the tag files of a configured system. Returns the number of entries loaded.
    pub fn reload_tags(&mut self, nac: Nac) -> Result<usize, RxCtlErr> {
        let Some(tsys) = self.systems.get_mut(&nac) else {
            return Err(RxCtlErr::UnknownNac(nac));
        };
        let Some(cfg) = self.configs.get(&nac) else {
            return Err(RxCtlErr::UnknownNac(nac));
        };
        let load = |path: &str| -> Result<(TagRegistry, usize), RxCtlErr> {
            let mut reg = TagRegistry::new();
            let n = read_tags_file(path, &mut reg)
                .map_err(|e| RxCtlErr::Tags { path: path.to_string(), error: e.to_string() })?;
            Ok((reg, n))
        };

        let mut total = 0;
        if let Some(path) = &cfg.tgid_tags_file {
            let (reg, n) = load(path)?;
            tsys.set_tgid_tags(reg);
            tracing::info!(nac, "reloaded {} ({} entries)", path, n);
            total += n;
        }
        if let Some(path) = &cfg.unit_id_tags_file {
            let (reg, n) = load(path)?;
            tsys.set_unit_id_tags(reg);
            tracing::info!(nac, "reloaded {} ({} entries)", path, n);
            total += n;
        }
        Ok(total)
    }

    /// Restricts service to a comma separated list of NACs (decimal or 0x hex)
    pub fn enable_status(&mut self, list: &str) -> Result<(), RxCtlErr> {
        let list = list.trim();
        if list.is_empty() {
            return Err(RxCtlErr::InvalidNacList("cannot disable all NACs".to_string()));
        }
        let nacs = list
            .split(',')
            .map(|s| {
                parse_int_auto(s.trim())
                    .and_then(|v| Nac::try_from(v).map_err(|_| format!("nac {} out of range", v)))
                    .map_err(RxCtlErr::InvalidNacList)
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!("enabled nacs: {:x?}", nacs);
        self.enabled_nacs = Some(nacs);
        Ok(())
    }

    /// Known talkgroups of every system, sorted
    pub fn dump_tgids(&self) -> BTreeMap<Nac, Vec<Tgid>> {
        self.systems.iter().map(|(nac, tsys)| (*nac, tsys.dump_tgids())).collect()
    }

    // ----------------------- state machine -----------------------

    /// Applies one command. `arg` is the talkgroup for `hold`.
    pub fn update_state(&mut self, command: Command, now: f64, arg: i64) {
        if self.configs.is_empty() {
            return;
        }
        let Some(nac) = self.current_nac else {
            return;
        };
        let timing = self.timing;

        let mut new_frequency: Option<Hz> = None;
        let mut new_state: Option<RxState> = None;
        let mut new_nac: Option<Nac> = None;
        let mut new_slot: Option<u8> = None;
        let mut new_type = ChannelType::Cc;

        {
            let Some(tsys) = self.systems.get_mut(&nac) else {
                tracing::warn!(nac, "update_state: no system for current nac");
                return;
            };

            match command {
                Command::Timeout => {
                    if self.state == RxState::Cc {
                        tracing::debug!(nac, "control channel timeout, current cc {:.6}", tsys.trunk_cc as f64 / 1e6);
                        tsys.cc_timeouts += 1;
                    } else if tsys.last_voice_time + timing.voice_timeout < now {
                        tracing::debug!(nac, "voice timeout");
                        if !self.hold_mode {
                            self.current_tgid = None;
                        }
                        tsys.crypto.srcaddr = 0;
                        new_state = Some(RxState::Cc);
                        new_frequency = Some(tsys.trunk_cc);
                    }
                }
                Command::Update => {
                    if self.state == RxState::Cc {
                        let mut desired = None;
                        match self.tgid_hold {
                            Some(tg) if self.tgid_hold_until > now => {
                                tracing::trace!(nac, "hold active tg({})", tg);
                                desired = Some(tg);
                            }
                            Some(_) if !self.hold_mode => self.tgid_hold = None,
                            _ => {}
                        }
                        if let Some(sel) = tsys.find_talkgroup(now, desired, self.hold_mode) {
                            tracing::debug!(
                                nac,
                                "voice update: tg({}), freq({}), slot({}), prio({})",
                                sel.tgid,
                                sel.frequency,
                                sel.tdma_slot.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                                tsys.get_prio(sel.tgid)
                            );
                            new_frequency = Some(sel.frequency);
                            new_type = ChannelType::Vc;
                            new_state = Some(RxState::ToVc);
                            new_slot = sel.tdma_slot;
                            self.current_tgid = Some(sel.tgid);
                            tsys.crypto.srcaddr = sel.srcaddr;
                            self.tgid_hold = Some(sel.tgid);
                            self.tgid_hold_until = self.tgid_hold_until.max(now + timing.tgid_hold_time);
                            self.wait_until = now + timing.system_hold_time;
                        }
                    }
                }
                Command::Duid3 => {
                    if self.state != RxState::Cc {
                        self.tgid_hold = self.current_tgid;
                        self.tgid_hold_until = self.tgid_hold_until.max(now + timing.tgid_hold_time);
                        self.wait_until = now + timing.system_hold_time;
                    }
                }
                Command::Duid15 => {
                    if self.state != RxState::Cc {
                        tracing::debug!(nac, "channel release, tg({:?})", self.current_tgid);
                        tsys.crypto.srcaddr = 0;
                        tsys.crypto.grpaddr = 0;
                        self.wait_until = now + timing.system_hold_time;
                        self.tgid_hold = self.current_tgid;
                        self.tgid_hold_until = self.tgid_hold_until.max(now + timing.tgid_hold_time);
                        if !self.hold_mode {
                            self.current_tgid = None;
                        }
                        new_state = Some(RxState::Cc);
                        new_frequency = Some(tsys.trunk_cc);
                    }
                }
                Command::Voice => {
                    if self.state == RxState::ToVc {
                        new_state = Some(RxState::Vc);
                    }
                    self.tgid_hold = self.current_tgid;
                    self.tgid_hold_until = self.tgid_hold_until.max(now + timing.tgid_hold_time);
                    self.wait_until = now + timing.system_hold_time;
                }
                Command::ControlData => {}
                Command::Hold => {
                    self.last_command = Some("hold");
                    self.last_command_time = now;
                    let requested = u32::try_from(arg).ok().filter(|tg| *tg >= 1);
                    let mut new_hold_mode = !self.hold_mode;
                    if new_hold_mode && requested.is_none() {
                        tracing::debug!(nac, "set hold failed, unable to determine tgid");
                        new_hold_mode = false;
                    }
                    if new_hold_mode {
                        self.tgid_hold = requested;
                        self.tgid_hold_until = now + HOLD_FOREVER;
                    } else {
                        self.current_tgid = None;
                        self.tgid_hold = None;
                        self.tgid_hold_until = now;
                    }
                    self.hold_mode = new_hold_mode;
                    tracing::info!(nac, "hold tg({:?}) mode {} current tgid {:?}", self.tgid_hold, self.hold_mode, self.current_tgid);
                    if self.current_tgid != self.tgid_hold {
                        self.current_tgid = self.tgid_hold;
                        tsys.crypto = CallCrypto::default();
                        new_state = Some(RxState::Cc);
                        new_frequency = Some(tsys.trunk_cc);
                    }
                }
                Command::SetHold => {
                    self.last_command = Some("set_hold");
                    self.last_command_time = now;
                    if self.current_tgid.is_some() {
                        self.tgid_hold = self.current_tgid;
                        self.tgid_hold_until = now + HOLD_FOREVER;
                        self.hold_mode = true;
                        tracing::info!(nac, "set hold tg({:?})", self.tgid_hold);
                    }
                }
                Command::UnsetHold => {
                    self.last_command = Some("unset_hold");
                    self.last_command_time = now;
                    if self.current_tgid.is_some() {
                        tracing::info!(nac, "clear hold tg({:?})", self.tgid_hold);
                        self.current_tgid = None;
                        self.tgid_hold = None;
                        self.tgid_hold_until = now;
                        self.hold_mode = false;
                    }
                }
                Command::Skip | Command::Lockout => {
                    let skip = command == Command::Skip;
                    self.last_command = Some(if skip { "skip" } else { "lockout" });
                    self.last_command_time = now;
                    if let Some(tg) = self.current_tgid {
                        let end_time = skip.then_some(now + timing.tgid_skip_time);
                        tracing::info!(nac, "{} tg({}) until {:?}", self.last_command.unwrap_or_default(), tg, end_time);
                        tsys.add_blacklist(tg, end_time);
                        self.current_tgid = None;
                        self.tgid_hold = None;
                        self.tgid_hold_until = now;
                        self.hold_mode = false;
                        tsys.crypto.srcaddr = 0;
                        if self.state != RxState::Cc {
                            new_state = Some(RxState::Cc);
                            new_frequency = Some(tsys.trunk_cc);
                        }
                    }
                }
            }

            if new_frequency.is_some() && tsys.trunk_cc != tsys.rfss.chan {
                tracing::debug!(
                    nac,
                    "trunk control channel {:.6} does not match rfss frequency {:.6}",
                    tsys.trunk_cc as f64 / 1e6,
                    tsys.rfss.chan as f64 / 1e6
                );
            }

            tsys.hunt_cc(now);

            let enabled = self.enabled_nacs.as_ref().is_none_or(|e| e.contains(&nac));
            if !enabled {
                tsys.crypto.srcaddr = 0;
                tsys.crypto.grpaddr = 0;
                new_nac = next_tsys(&self.nacs, self.enabled_nacs.as_deref(), &mut self.current_id);
                new_state = Some(RxState::Cc);
            } else if self.state != RxState::Cc && self.tgid_hold_until <= now && !self.hold_mode && new_state.is_none() {
                tracing::debug!(nac, "release tg({:?})", self.current_tgid);
                self.tgid_hold = None;
                self.current_tgid = None;
                tsys.crypto.srcaddr = 0;
                tsys.crypto.grpaddr = 0;
                new_state = Some(RxState::Cc);
                new_frequency = Some(tsys.trunk_cc);
            } else if self.wait_until <= now && self.tgid_hold_until <= now && !self.hold_mode && new_state.is_none() {
                self.wait_until = now + timing.system_hold_time;
                tsys.crypto.srcaddr = 0;
                tsys.crypto.grpaddr = 0;
                new_nac = next_tsys(&self.nacs, self.enabled_nacs.as_deref(), &mut self.current_id);
                new_state = Some(RxState::Cc);
            }
        }

        let nac = match new_nac {
            Some(next) => {
                self.current_nac = Some(next);
                self.current_tgid = None;
                let Some(tsys) = self.systems.get_mut(&next) else {
                    tracing::warn!(nac = next, "update_state: no system for next nac");
                    return;
                };
                if next != nac {
                    tracing::info!(nac = next, "switching to system {}", tsys.sysname);
                }
                tsys.crypto.srcaddr = 0;
                tsys.crypto.grpaddr = 0;
                new_frequency = Some(tsys.trunk_cc);
                new_type = ChannelType::Cc;
                next
            }
            None => nac,
        };

        if let Some(freq) = new_frequency {
            if let Some(tsys) = self.systems.get(&nac) {
                let params = tsys.frequency_change_params(self.current_tgid, freq, nac, new_slot, new_type, now);
                self.set_frequency(&params);
            }
        }

        if let Some(state) = new_state {
            if state != self.state {
                tracing::debug!(nac, "state {:?} -> {:?}", self.state, state);
            }
            self.state = state;
        }
    }

    // ----------------------- inbound messages -----------------------

    pub fn process_qmsg(&mut self, msg: &QueueMsg, now: f64) {
        for tsys in self.systems.values_mut() {
            tsys.frequency_tracking_expire(now, false);
        }
        self.flush_events();
        if let Err(e) = self.sink.send_event(None) {
            tracing::debug!("status tick not delivered: {}", e);
        }

        let inbound = match msg.parse() {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!("dropping queue message: {}", e);
                return;
            }
        };

        match inbound {
            InboundMsg::CallInfo { info, .. } => self.process_call_info(&info, now),
            InboundMsg::Command { name, data, arg } => self.process_command(&name, data.as_deref(), arg, now),
            InboundMsg::Timeout { queue_id } => {
                tracing::trace!("data unit timeout, channel {}", queue_id);
                self.update_state(Command::Timeout, now, 0);
            }
            InboundMsg::Tdma { nac, blk, .. } => {
                let Some(tsys) = self.systems.get_mut(&nac) else {
                    tracing::warn!(nac, "tdma_cc received from unexpected nac");
                    return;
                };
                if let Ok(None) = tsys.decode_tdma_cc(&blk, now) {
                    tracing::trace!(nac, "tdma_cc: nothing decoded");
                }
                self.flush_events();
            }
            InboundMsg::Nxdn { kind, lich, cac, .. } => process_nxdn(kind, lich, &cac),
            InboundMsg::Unknown { mtype } => tracing::warn!("unknown message type {}", mtype),
            InboundMsg::DataUnit { queue_id, nac, duid, body } => self.process_data_unit(queue_id, nac, duid, &body, now),
        }
    }

    fn process_call_info(&mut self, info: &CallInfo, now: f64) {
        if Some(info.nac) != self.current_nac {
            tracing::debug!(nac = info.nac, "call info nac mismatch, current nac {:x?}", self.current_nac);
        }
        let in_cc = self.state == RxState::Cc;
        let Some(tsys) = self.systems.get_mut(&info.nac) else {
            return;
        };
        if !in_cc {
            tsys.last_voice_time = now;
        }
        if let Some(srcaddr) = info.srcaddr {
            tsys.crypto.srcaddr = srcaddr;
        }
        if let Some(grpaddr) = info.grpaddr {
            tsys.crypto.grpaddr = grpaddr;
        }
        if let Some(algid) = info.algid {
            tsys.crypto.algid = algid;
        }
        if let Some(alg) = &info.alg {
            tsys.crypto.alg = alg.clone();
        }
        if let Some(keyid) = info.keyid {
            tsys.crypto.keyid = keyid;
        }
    }

    fn process_command(&mut self, name: &str, data: Option<&str>, arg: i64, now: f64) {
        tracing::debug!("<- command {} {:?} {}", name, data, arg);
        let nac_arg = || Nac::try_from(arg).ok();
        match name {
            "dump_tgids" => {
                self.dump_tgids();
            }
            "reload_tags" => match nac_arg().map(|nac| self.reload_tags(nac)) {
                Some(Ok(_)) => {}
                Some(Err(e)) => tracing::warn!("reload_tags: {}", e),
                None => tracing::warn!("reload_tags: invalid nac {}", arg),
            },
            "add_default_config" => match nac_arg() {
                Some(nac) => {
                    self.add_default_config(nac);
                }
                None => tracing::warn!("add_default_config: invalid nac {}", arg),
            },
            "settings-enable" => {
                if let Err(e) = self.enable_status(data.unwrap_or("")) {
                    tracing::warn!("settings-enable: {}, request ignored", e);
                }
            }
            other => match other.parse::<Command>() {
                Ok(cmd) => self.update_state(cmd, now, arg),
                Err(e) => tracing::warn!("{}", e),
            },
        }
    }

    fn process_data_unit(&mut self, queue_id: u16, nac: Nac, duid: i32, body: &[u8], now: f64) {
        if nac == NAC_INVALID {
            tracing::warn!("received invalid nac 0xffff, duid {} channel {}", duid, queue_id);
            return;
        }
        if (duid == 7 || duid == 12) && !self.systems.contains_key(&nac) {
            if !self.configs.is_empty() {
                tracing::warn!(nac, "nac not configured");
                return;
            }
            if let Err(e) = self.add_trunked_system(nac, now) {
                tracing::warn!("{}", e);
            }
        }
        let in_cc = self.state == RxState::Cc;
        let Some(tsys) = self.systems.get_mut(&nac) else {
            tracing::warn!(nac, "received unknown nac, duid {} channel {}", duid, queue_id);
            return;
        };

        let mut updated = 0;
        match duid {
            0 | 5 | 10 => {
                if !in_cc {
                    tsys.last_voice_time = now;
                }
            }
            7 => match tsys.decode_tsbk(body, now) {
                Ok(n) => updated += n,
                Err(_) => {
                    self.flush_events();
                    return;
                }
            },
            12 => match tsys.decode_mbt(body, now) {
                Ok(n) => updated += n,
                Err(e) => {
                    tracing::trace!(nac, "mbt dropped: {}", e);
                    self.flush_events();
                    return;
                }
            },
            _ => {}
        }
        self.flush_events();

        let command = if updated > 0 {
            Command::Update
        } else {
            match Command::from_duid(duid) {
                Ok(cmd) => cmd,
                Err(e) => {
                    tracing::warn!(nac, "{}", e);
                    return;
                }
            }
        };
        self.update_state(command, now, 0);
    }

    /// Advances the control channel hunt of every system, not just the current one, so that
    /// systems waiting their turn re-acquire quickly. Runs at most once per hunt interval.
    pub fn parallel_hunt_cc(&mut self, now: f64) {
        if now < self.next_hunt_time {
            return;
        }
        self.next_hunt_time = now + self.timing.parallel_hunt_interval;
        let mut requests = Vec::new();
        for (nac, tsys) in self.systems.iter_mut() {
            if tsys.hunt_cc(now) {
                requests.push(tsys.frequency_change_params(None, tsys.trunk_cc, *nac, None, ChannelType::Cc, now));
            }
        }
        for params in requests {
            self.set_frequency(&params);
        }
    }

    // ----------------------- status -----------------------

    /// Status snapshot of every system plus the hold state, for UI polling
    pub fn to_json(&mut self, now: f64) -> Result<String, serde_json::Error> {
        let mut d = Map::new();
        d.insert("json_type".to_string(), json!("trunk_update"));
        for (nac, tsys) in self.systems.iter_mut() {
            d.insert(nac.to_string(), serde_json::to_value(tsys.to_status(now))?);
        }
        d.insert(
            "data".to_string(),
            json!({
                "last_command": self.last_command,
                "last_command_time": (self.last_command_time - now) as i64,
                "tgid_hold": self.tgid_hold,
                "tgid_hold_until": (self.tgid_hold_until - now) as i64,
                "hold_mode": self.hold_mode,
            }),
        );
        d.insert("time".to_string(), json!(now));
        self.flush_events();
        serde_json::to_string(&Value::Object(d))
    }

    /// Text dump of every system
    pub fn describe(&self, now: f64) -> String {
        let mut s = String::new();
        for (nac, tsys) in &self.systems {
            s.push_str(&format!("\n====== NAC 0x{:x} ====== {} ======\n", nac, tsys.sysname));
            s.push_str(&tsys.describe(now));
            s.push('\n');
        }
        s
    }
}

fn process_nxdn(kind: u8, lich: u8, cac: &[u8]) {
    tracing::trace!("nxdn msg {} lich {:x}", kind as char, lich);
    if kind != b'c' {
        return;
    }
    match CacMessage::from_bytes(cac) {
        Ok(CacMessage { ran, body: CacBody::CchInfo { location_id, cc1, cc2, .. }, .. }) => tracing::info!(
            "nxdn cch info {:.6} {:.6} system {:?} site {:?} ran {}",
            cc1 as f64 / 1e6,
            cc2 as f64 / 1e6,
            location_id.system,
            location_id.site,
            ran
        ),
        Ok(msg) => tracing::debug!("nxdn {}: {:?}", msg.msg_type_name(), msg.body),
        Err(e) => tracing::warn!("dropping malformed nxdn cac: {}", e),
    }
}
