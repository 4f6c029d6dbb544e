//! State of one monitored P25 system, keyed by its NAC.
//!
//! A `TrunkedSystem` consumes decoded control channel messages, keeps the frequency identifier
//! table, site identity, voice frequencies, talkgroups and calls up to date, and hunts through
//! its control channel list when the control channel goes quiet. Events are queued internally
//! and collected by the owner with [`TrunkedSystem::take_events`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use p25_config::{IdList, Modulation, SystemConfig, TagRegistry, TrunkTiming};
use p25_core::{DecodeErr, Hz, Nac, Tgid, UnitId};
use p25_pdus::fields::channel_id::ChannelId;
use p25_pdus::fields::freq_ident::IdenTable;
use p25_pdus::mbt::{MBT_SAP_TRUNKING, Mbt, MbtPdu};
use p25_pdus::tdma::TdmaMsg;
use p25_pdus::tsbk::vendor::GrgTarget;
use p25_pdus::tsbk::{Tsbk, TsbkPdu};

use crate::events::{CcEvent, CcEventRecord, TgRecord, UnitRecord};
use crate::freq_tracking::{EndedCall, FrequencyTracker, TrackedFrequency};
use crate::outbound::{ChannelType, FreqChangeParams};

/// Last known whereabouts of a talkgroup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Talkgroup {
    pub counter: u32,
    pub time: f64,
    pub frequency: Hz,
    pub tdma_slot: Option<u8>,
    pub prio: u32,
    pub tag_color: u32,
    /// 0 when the source was not announced
    pub srcaddr: UnitId,
    pub srcaddr_tag: String,
    pub srcaddr_color: u32,
}

/// Display bookkeeping for a voice frequency, per slot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VoiceFrequency {
    pub counter: u32,
    pub time: f64,
    pub tgid: [Option<Tgid>; 2],
    pub srcaddr: [Option<UnitId>; 2],
    pub tg_tag: [Option<String>; 2],
    pub tg_color: [Option<u32>; 2],
    pub srcaddr_tag: [Option<String>; 2],
    pub srcaddr_color: [Option<u32>; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjacentSite {
    pub rfid: u8,
    pub stid: u8,
    pub uplink: Hz,
    /// Frequency identifier of the announcing channel, unknown for MBT announcements
    pub table: Option<u8>,
    pub sysid: u16,
}

/// Identity of the site we are listening to, from RFSS status broadcasts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RfssIdentity {
    pub syid: u16,
    pub rfid: u8,
    pub stid: u8,
    pub chan: Hz,
    pub txchan: Hz,
}

/// Voice channel signalling reported by the front end alongside the audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallCrypto {
    pub srcaddr: UnitId,
    pub grpaddr: Tgid,
    pub alg: String,
    pub algid: u8,
    pub keyid: u16,
}

/// Clear, unencrypted call
pub const ALGID_CLEAR: u8 = 0x80;

impl Default for CallCrypto {
    fn default() -> Self {
        CallCrypto { srcaddr: 0, grpaddr: 0, alg: String::new(), algid: ALGID_CLEAR, keyid: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarrisSupergroup {
    pub supergroup: TgRecord,
    pub target_group: TgRecord,
    pub algid: u8,
    pub keyid: u16,
    pub expires: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub tsbks: u64,
    pub crc: u64,
    pub decode_errors: u64,
}

/// Result of talkgroup selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TalkgroupSelection {
    pub frequency: Hz,
    pub tgid: Tgid,
    pub tdma_slot: Option<u8>,
    pub srcaddr: UnitId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyData {
    pub tgids: [Option<Tgid>; 2],
    pub last_activity: String,
    pub counter: u32,
    pub srcaddr: [Option<UnitId>; 2],
    pub tg_tag: [Option<String>; 2],
    pub tg_color: [Option<u32>; 2],
    pub srcaddr_tag: [Option<String>; 2],
    pub srcaddr_color: [Option<u32>; 2],
}

/// Snapshot of a system for status polling
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub syid: u16,
    pub sysname: String,
    pub rfid: u8,
    pub stid: u8,
    pub sysid: Option<u16>,
    pub rxchan: Hz,
    pub txchan: Hz,
    pub wacn: Option<u32>,
    pub secondary: Vec<Hz>,
    pub tsbks: u64,
    pub frequencies: BTreeMap<Hz, String>,
    pub frequency_data: BTreeMap<Hz, FrequencyData>,
    pub last_tsbk: f64,
    pub srcaddr: UnitId,
    pub grpaddr: Tgid,
    pub algid: u8,
    pub alg: String,
    pub keyid: u16,
    pub adjacent_data: BTreeMap<Hz, AdjacentSite>,
    pub talkgroup_data: BTreeMap<Tgid, Talkgroup>,
    pub frequency_tracking: BTreeMap<Hz, TrackedFrequency>,
    pub harris_supergroups: BTreeMap<String, HarrisSupergroup>,
    pub tgid_tags_file: Option<String>,
    pub unit_id_tags_file: Option<String>,
}

pub struct TrunkedSystem {
    pub nac: Nac,
    pub sysname: String,
    timing: TrunkTiming,

    pub iden_table: IdenTable,
    pub stats: SystemStats,
    pub rfss: RfssIdentity,
    pub ns_syid: Option<u16>,
    pub ns_wacn: Option<u32>,
    pub ns_chan: Hz,
    pub secondary: BTreeSet<Hz>,
    pub adjacent: BTreeMap<Hz, AdjacentSite>,

    pub offset: i64,
    pub modulation: Modulation,
    pub center_frequency: Option<Hz>,
    pub tgid_tags_file: Option<String>,
    pub unit_id_tags_file: Option<String>,
    tgid_tags: Option<TagRegistry>,
    unit_id_tags: Option<TagRegistry>,
    /// tgid to expiry time, None is permanent
    blacklist: HashMap<Tgid, Option<f64>>,
    whitelist: Option<IdList>,

    pub trunk_cc: Hz,
    last_trunk_cc: Hz,
    cc_list: Vec<Hz>,
    cc_list_index: usize,
    next_hunt_cc: f64,
    pub cc_timeouts: u32,
    pub last_tsbk: f64,
    pub last_voice_time: f64,

    pub voice_frequencies: BTreeMap<Hz, VoiceFrequency>,
    pub talkgroups: BTreeMap<Tgid, Talkgroup>,
    tracker: FrequencyTracker,
    pub crypto: CallCrypto,
    harris_sgs: BTreeMap<String, HarrisSupergroup>,

    events: Vec<CcEventRecord>,
}

impl TrunkedSystem {
    pub fn new(nac: Nac, config: Option<&SystemConfig>, timing: TrunkTiming, now: f64) -> Self {
        let mut sys = TrunkedSystem {
            nac,
            sysname: String::new(),
            timing,
            iden_table: IdenTable::new(),
            stats: SystemStats::default(),
            rfss: RfssIdentity::default(),
            ns_syid: None,
            ns_wacn: None,
            ns_chan: 0,
            secondary: BTreeSet::new(),
            adjacent: BTreeMap::new(),
            offset: 0,
            modulation: Modulation::default(),
            center_frequency: None,
            tgid_tags_file: None,
            unit_id_tags_file: None,
            tgid_tags: None,
            unit_id_tags: None,
            blacklist: HashMap::new(),
            whitelist: None,
            trunk_cc: 0,
            last_trunk_cc: 0,
            cc_list: Vec::new(),
            cc_list_index: 0,
            next_hunt_cc: now + timing.cc_hunt_hold,
            cc_timeouts: 0,
            last_tsbk: 0.0,
            last_voice_time: 0.0,
            voice_frequencies: BTreeMap::new(),
            talkgroups: BTreeMap::new(),
            tracker: FrequencyTracker::new(timing.call_timeout, timing.check_interval),
            crypto: CallCrypto::default(),
            harris_sgs: BTreeMap::new(),
            events: Vec::new(),
        };
        if let Some(cfg) = config {
            sys.apply_config(cfg);
        }
        sys
    }

    /// Takes over the static part of a system configuration
    pub fn apply_config(&mut self, cfg: &SystemConfig) {
        self.sysname = cfg.sysname.clone();
        self.offset = cfg.offset;
        self.modulation = cfg.modulation;
        self.center_frequency = cfg.center_frequency;
        self.cc_list = cfg.cclist.clone();
        self.cc_list_index = 0;
        self.trunk_cc = self.cc_list.first().copied().unwrap_or(0);
        self.last_trunk_cc = self.trunk_cc;
        self.whitelist = cfg.whitelist.clone();
        self.blacklist = cfg.blacklist.iter().map(|tg| (tg, None)).collect();
        self.tgid_tags = cfg.tgid_tags.clone();
        self.unit_id_tags = cfg.unit_id_tags.clone();
        self.tgid_tags_file = cfg.tgid_tags_file.clone();
        self.unit_id_tags_file = cfg.unit_id_tags_file.clone();
    }

    pub fn cc_list(&self) -> &[Hz] {
        &self.cc_list
    }

    pub fn set_tgid_tags(&mut self, tags: TagRegistry) {
        self.tgid_tags = Some(tags);
    }

    pub fn set_unit_id_tags(&mut self, tags: TagRegistry) {
        self.unit_id_tags = Some(tags);
    }

    pub fn take_events(&mut self) -> Vec<CcEventRecord> {
        std::mem::take(&mut self.events)
    }

    fn post_event(&mut self, opcode: i32, event: CcEvent, now: f64) {
        if event.is_filtered() {
            return;
        }
        self.events.push(CcEventRecord {
            json_type: "cc_event",
            event,
            opcode,
            sysid: self.rfss.syid,
            sysname: self.sysname.clone(),
            time: now,
            nac: self.nac,
        });
    }

    fn post_ended_calls(&mut self, ended: Vec<EndedCall>, now: f64) {
        for call in ended {
            tracing::debug!(
                nac = self.nac,
                "end call tgid {} src {:?} reason {} duration {:.1}s count {}",
                call.tgid.tg_id,
                call.srcaddr.unit_id,
                call.reason.as_str(),
                call.duration,
                call.count
            );
            let event = CcEvent::EndCall {
                code: call.reason.code(),
                reason: call.reason,
                srcaddr: call.srcaddr,
                tgid: call.tgid,
                duration: call.duration,
                count: call.count,
            };
            self.post_event(-1, event, now);
        }
    }

    /// Records a dropped message and posts a decode_error event for it
    pub fn report_decode_error(&mut self, kind: &'static str, err: &DecodeErr, now: f64) {
        if matches!(err, DecodeErr::CrcMismatch { .. }) {
            self.stats.crc += 1;
        }
        self.stats.decode_errors += 1;
        tracing::warn!(nac = self.nac, "dropping malformed {}: {}", kind, err);
        self.post_event(-1, CcEvent::DecodeError { kind, error: err.to_string() }, now);
    }

    // ----------------------- tags -----------------------

    pub fn get_tag(&self, tgid: Tgid) -> String {
        match &self.tgid_tags {
            _ if tgid == 0 => String::new(),
            None => format!("Talkgroup {}", tgid),
            Some(reg) => reg.get_tag(tgid),
        }
    }

    /// The registry color holds `priority * 100 + color`
    pub fn get_tag_color(&self, tgid: Tgid) -> u32 {
        match &self.tgid_tags {
            Some(reg) if tgid != 0 => reg.get_color(tgid) % 100,
            _ => 0,
        }
    }

    /// Lower value is more important
    pub fn get_prio(&self, tgid: Tgid) -> u32 {
        match &self.tgid_tags {
            Some(reg) if tgid != 0 => reg.get_color(tgid) / 100,
            _ => 0,
        }
    }

    pub fn get_unit_id_tag(&self, unit_id: UnitId) -> String {
        match &self.unit_id_tags {
            _ if unit_id == 0 => String::new(),
            None => format!("Unit {}", unit_id),
            Some(reg) => reg.get_tag(unit_id),
        }
    }

    pub fn get_unit_id_color(&self, unit_id: UnitId) -> u32 {
        match &self.unit_id_tags {
            Some(reg) if unit_id != 0 => reg.get_color(unit_id),
            _ => 0,
        }
    }

    pub fn mk_tg_record(&self, tgid: Tgid) -> TgRecord {
        TgRecord { tg_id: tgid, tag: self.get_tag(tgid), priority: self.get_prio(tgid), color: self.get_tag_color(tgid) }
    }

    pub fn mk_unit_record(&self, unit_id: UnitId) -> UnitRecord {
        UnitRecord { unit_id: Some(unit_id), tag: self.get_unit_id_tag(unit_id), color: self.get_unit_id_color(unit_id) }
    }

    // ----------------------- channels -----------------------

    pub fn channel_id_to_frequency(&self, ch: ChannelId) -> Option<Hz> {
        self.iden_table.channel_id_to_frequency(ch)
    }

    pub fn get_tdma_slot(&self, ch: ChannelId) -> Option<u8> {
        self.iden_table.tdma_slot(ch)
    }

    pub fn channel_id_to_string(&self, ch: ChannelId) -> String {
        self.iden_table.channel_id_to_string(ch)
    }

    // ----------------------- voice tracking -----------------------

    fn update_talkgroup(&mut self, frequency: Hz, tgid: Tgid, tdma_slot: Option<u8>, srcaddr: Option<UnitId>, now: f64) {
        let prio = self.get_prio(tgid);
        let tag_color = self.get_tag_color(tgid);
        let (srcaddr, srcaddr_tag, srcaddr_color) = match srcaddr {
            Some(sa) if sa != 0 => (sa, self.get_unit_id_tag(sa), self.get_unit_id_color(sa)),
            _ => (0, String::new(), 0),
        };
        if !self.talkgroups.contains_key(&tgid) {
            tracing::debug!(nac = self.nac, "new tgid: {} {} prio {}", tgid, self.get_tag(tgid), prio);
        }
        let tg = self.talkgroups.entry(tgid).or_insert_with(|| Talkgroup {
            counter: 0,
            time: now,
            frequency,
            tdma_slot,
            prio,
            tag_color,
            srcaddr: 0,
            srcaddr_tag: String::new(),
            srcaddr_color: 0,
        });
        tg.time = now;
        tg.frequency = frequency;
        tg.tdma_slot = tdma_slot;
        tg.prio = prio;
        tg.tag_color = tag_color;
        tg.srcaddr = srcaddr;
        tg.srcaddr_tag = srcaddr_tag;
        tg.srcaddr_color = srcaddr_color;
    }

    /// Applies one voice grant. A grant on an unresolved channel (None) is ignored.
    pub fn update_voice_frequency(
        &mut self,
        frequency: Option<Hz>,
        tgid: Tgid,
        tdma_slot: Option<u8>,
        srcaddr: Option<UnitId>,
        protected: Option<bool>,
        now: f64,
    ) {
        let Some(frequency) = frequency.filter(|f| *f != 0) else {
            return;
        };

        let tg = self.mk_tg_record(tgid);
        let src = srcaddr.map(|sa| self.mk_unit_record(sa));
        let ended = self.tracker.track(frequency, tg, tdma_slot, src, protected, now);
        self.post_ended_calls(ended, now);
        self.update_talkgroup(frequency, tgid, tdma_slot, srcaddr, now);

        let slot = tdma_slot.map(|s| (s & 1) as usize).unwrap_or(0);
        let tg_tag = self.get_tag(tgid);
        let tg_color = self.get_tag_color(tgid);
        let src_info = srcaddr.map(|sa| (sa, self.get_unit_id_tag(sa), self.get_unit_id_color(sa)));
        if !self.voice_frequencies.contains_key(&frequency) {
            tracing::debug!(nac = self.nac, "new freq: {:.6}", frequency as f64 / 1_000_000.0);
        }
        let vf = self.voice_frequencies.entry(frequency).or_default();
        vf.tgid[slot] = Some(tgid);
        vf.counter += 1;
        vf.time = now;
        vf.tg_tag[slot] = Some(tg_tag);
        vf.tg_color[slot] = Some(tg_color);
        if let Some((sa, tag, color)) = src_info {
            vf.srcaddr[slot] = Some(sa);
            vf.srcaddr_tag[slot] = Some(tag);
            vf.srcaddr_color[slot] = Some(color);
        }
    }

    pub fn frequency_tracking_expire(&mut self, now: f64, always: bool) {
        let ended = self.tracker.expire(now, always);
        self.post_ended_calls(ended, now);
    }

    pub fn frequency_tracker(&self) -> &FrequencyTracker {
        &self.tracker
    }

    // ----------------------- talkgroup selection -----------------------

    pub fn add_blacklist(&mut self, tgid: Tgid, end_time: Option<f64>) {
        if tgid == 0 {
            return;
        }
        self.blacklist.insert(tgid, end_time);
    }

    pub fn is_blacklisted(&self, tgid: Tgid) -> bool {
        self.blacklist.contains_key(&tgid)
    }

    pub fn blacklist_expiry(&self, tgid: Tgid) -> Option<Option<f64>> {
        self.blacklist.get(&tgid).copied()
    }

    /// Drops temporary entries that expired before `start_time`
    pub fn blacklist_update(&mut self, start_time: f64) {
        self.blacklist.retain(|_, expiry| expiry.is_none_or(|t| t >= start_time));
    }

    fn whitelisted(&self, tgid: Tgid) -> bool {
        match &self.whitelist {
            Some(wl) if !wl.is_empty() => wl.contains(tgid),
            _ => true,
        }
    }

    /// Picks the talkgroup to follow among those active since `start_time`.
    ///
    /// `tgid` is the preferred candidate when tracked and not excluded by the black or white list. Unless `hold` is set, every eligible
    /// talkgroup is considered and a strictly lower priority value wins; ties keep the earlier
    /// candidate, so the preferred one or else the lowest id.
    pub fn find_talkgroup(&mut self, start_time: f64, tgid: Option<Tgid>, hold: bool) -> Option<TalkgroupSelection> {
        self.blacklist_update(start_time);

        let mut target =
            tgid.filter(|tg| self.talkgroups.contains_key(tg) && !self.is_blacklisted(*tg) && self.whitelisted(*tg));
        if !hold {
            let identity_known = self.ns_syid.is_some() && self.ns_wacn.is_some();
            for (active, tg) in &self.talkgroups {
                if tg.time < start_time || self.is_blacklisted(*active) || !self.whitelisted(*active) {
                    continue;
                }
                // TDMA voice cannot be descrambled without the network identity
                if tg.tdma_slot.is_some() && !identity_known {
                    continue;
                }
                match target {
                    None => target = Some(*active),
                    Some(t) if tg.prio < self.talkgroups[&t].prio => target = Some(*active),
                    _ => {}
                }
            }
        }

        let tgid = target?;
        let tg = self.talkgroups.get(&tgid)?;
        (tg.time >= start_time).then_some(TalkgroupSelection {
            frequency: tg.frequency,
            tgid,
            tdma_slot: tg.tdma_slot,
            srcaddr: tg.srcaddr,
        })
    }

    /// Known talkgroup ids, sorted
    pub fn dump_tgids(&self) -> Vec<Tgid> {
        let tgids: Vec<Tgid> = self.talkgroups.keys().copied().collect();
        tracing::info!(nac = self.nac, "known tgids: {:?}", tgids);
        tgids
    }

    // ----------------------- control channel hunting -----------------------

    /// Advances to the next control channel candidate once the control channel has been quiet
    /// for the hunt hold time. Returns true when a retune to `trunk_cc` should be requested.
    pub fn hunt_cc(&mut self, now: f64) -> bool {
        let hold = self.timing.cc_hunt_hold;
        if self.cc_list.is_empty() {
            return false;
        }
        if self.last_tsbk + hold > now || self.last_voice_time + hold > now || now < self.next_hunt_cc {
            return false;
        }
        self.next_hunt_cc = now + hold;
        self.cc_timeouts = 0;
        self.cc_list_index += 1;
        if self.cc_list_index >= self.cc_list.len() {
            self.cc_list_index = 0;
        }
        self.trunk_cc = self.cc_list[self.cc_list_index];
        tracing::info!(nac = self.nac, "{}: cycling to next trunk_cc: {:.6}", self.sysname, self.trunk_cc as f64 / 1_000_000.0);
        if self.trunk_cc != self.last_trunk_cc {
            self.last_trunk_cc = self.trunk_cc;
            tracing::debug!(nac = self.nac, "{}: control channel change", self.sysname);
        }
        true
    }

    pub fn frequency_change_params(
        &self,
        current_tgid: Option<Tgid>,
        freq: Hz,
        nac: Nac,
        slot: Option<u8>,
        channel_type: ChannelType,
        now: f64,
    ) -> FreqChangeParams {
        let tg = current_tgid.unwrap_or(0);
        FreqChangeParams {
            freq,
            tgid: current_tgid,
            offset: self.offset,
            tag: self.get_tag(tg),
            nac,
            system: self.sysname.clone(),
            center_frequency: self.center_frequency,
            tdma: slot,
            wacn: self.ns_wacn,
            sysid: self.ns_syid,
            srcaddr: self.crypto.srcaddr,
            grpaddr: self.crypto.grpaddr,
            alg: self.crypto.alg.clone(),
            algid: self.crypto.algid,
            channel_type,
            keyid: self.crypto.keyid,
            prio: self.get_prio(tg),
            tag_color: self.get_tag_color(tg),
            srcaddr_color: self.get_unit_id_color(self.crypto.srcaddr),
            srcaddr_tag: self.get_unit_id_tag(self.crypto.srcaddr),
            effective_time: now,
        }
    }

    // ----------------------- TSBK -----------------------

    /// Decodes one TSBK (with or without CRC). Returns the number of voice frequencies updated.
    pub fn decode_tsbk(&mut self, data: &[u8], now: f64) -> Result<usize, DecodeErr> {
        self.stats.tsbks += 1;
        let pdu = match TsbkPdu::from_bytes(data) {
            Ok(pdu) => pdu,
            Err(e) => {
                self.report_decode_error("tsbk", &e, now);
                return Err(e);
            }
        };
        self.cc_timeouts = 0;
        self.last_tsbk = now;

        let opcode = pdu.header.opcode as i32;
        let mfrid = pdu.header.mfrid;
        let mut updated = 0;
        match pdu.body {
            Tsbk::GrpVChGrant(g) => {
                let f = self.channel_id_to_frequency(g.channel);
                let slot = self.get_tdma_slot(g.channel);
                let event = CcEvent::GrpVChGrant {
                    mfrid,
                    options: g.opts,
                    frequency: f,
                    group: self.mk_tg_record(g.group_address),
                    srcaddr: self.mk_unit_record(g.source_address),
                    tdma_slot: slot,
                };
                self.post_event(opcode, event, now);
                self.update_voice_frequency(f, g.group_address, slot, Some(g.source_address), Some(g.protected()), now);
                updated += f.is_some() as usize;
                tracing::debug!(
                    nac = self.nac,
                    "tsbk00 grant freq {} ga {} sa {}",
                    self.channel_id_to_string(g.channel),
                    g.group_address,
                    g.source_address
                );
            }
            Tsbk::GrpVChGrantUpdt(u) => {
                let f1 = self.channel_id_to_frequency(u.channel1);
                let f2 = self.channel_id_to_frequency(u.channel2);
                let s1 = self.get_tdma_slot(u.channel1);
                self.update_voice_frequency(f1, u.group_address1, s1, None, None, now);
                let mut second = None;
                if f1 != f2 {
                    let s2 = self.get_tdma_slot(u.channel2);
                    self.update_voice_frequency(f2, u.group_address2, s2, None, None, now);
                    second = Some(self.mk_tg_record(u.group_address2));
                }
                updated += f1.is_some() as usize + f2.is_some() as usize;
                let event = CcEvent::GrpVChGrantUpdt {
                    mfrid,
                    frequency1: f1,
                    group1: self.mk_tg_record(u.group_address1),
                    tdma_slot: s1,
                    frequency2: second.as_ref().and(f2),
                    group2: second,
                };
                self.post_event(opcode, event, now);
                tracing::trace!(
                    nac = self.nac,
                    "tsbk02 grant update: chan {} {} {} {}",
                    self.channel_id_to_string(u.channel1),
                    u.group_address1,
                    self.channel_id_to_string(u.channel2),
                    u.group_address2
                );
            }
            Tsbk::GrpVChGrantUpdtExp(u) => {
                let f = self.channel_id_to_frequency(u.channel_t);
                let slot = self.get_tdma_slot(u.channel_t);
                let event = CcEvent::GrpVChGrantUpdtExp {
                    mfrid,
                    options: u.opts,
                    frequency: f,
                    group: self.mk_tg_record(u.group_address),
                    tdma_slot: slot,
                };
                self.post_event(opcode, event, now);
                self.update_voice_frequency(f, u.group_address, slot, None, None, now);
                updated += f.is_some() as usize;
            }
            Tsbk::SnDataChnGnt(d) => {
                tracing::trace!(
                    nac = self.nac,
                    "tsbk16 sndcp data ch: chan {} {}",
                    self.channel_id_to_string(d.channel_t),
                    self.channel_id_to_string(d.channel_r)
                );
            }
            Tsbk::IdenUp(m) => {
                self.iden_table.insert(m.iden, m.ident.clone());
                let event = CcEvent::IdenUp {
                    iden: m.iden,
                    offset: m.ident.offset_hz,
                    step: m.ident.step_hz,
                    freq: m.ident.base_hz,
                };
                self.post_event(opcode, event, now);
                tracing::debug!(nac = self.nac, "tsbk3d iden_up: iden {} bw {} {:?}", m.iden, m.bw, m.ident);
            }
            Tsbk::IdenUpVu(m) => {
                self.iden_table.insert(m.iden, m.ident.clone());
                let event = CcEvent::IdenUpVu {
                    iden: m.iden,
                    bwvu: m.bwvu,
                    offset: m.ident.offset_hz,
                    step: m.ident.step_hz,
                    freq: m.ident.base_hz,
                };
                self.post_event(opcode, event, now);
                tracing::debug!(nac = self.nac, "tsbk34 iden_up_vu: iden {} bwvu {} {:?}", m.iden, m.bwvu, m.ident);
            }
            Tsbk::IdenUpTdma(m) => {
                self.iden_table.insert(m.iden, m.ident.clone());
                let event = CcEvent::IdenUpTdma {
                    iden: m.iden,
                    offset: m.ident.offset_hz,
                    step: m.ident.step_hz,
                    freq: m.ident.base_hz,
                    slots: m.ident.tdma_slots.unwrap_or(1),
                };
                self.post_event(opcode, event, now);
                tracing::debug!(nac = self.nac, "tsbk33 iden_up_tdma: iden {} type {} {:?}", m.iden, m.channel_type, m.ident);
            }
            Tsbk::RfssStsBcst(m) => {
                if let Some(f1) = self.channel_id_to_frequency(m.channel) {
                    let tx = self.iden_table.uplink_frequency(m.channel, f1).unwrap_or(f1);
                    self.set_rfss(m.syid, m.rfid, m.stid, f1, tx);
                }
                tracing::trace!(
                    nac = self.nac,
                    "tsbk3a rfss status: syid {:x} rfid {:x} stid {} ch1 {}",
                    m.syid,
                    m.rfid,
                    m.stid,
                    self.channel_id_to_string(m.channel)
                );
            }
            Tsbk::SccbExp(m) => {
                if let (Some(f1), Some(f2)) = (self.channel_id_to_frequency(m.channel1), self.channel_id_to_frequency(m.channel2)) {
                    self.secondary.insert(f1);
                    self.secondary.insert(f2);
                }
            }
            Tsbk::NetStsBcst(m) => {
                if let Some(f1) = self.channel_id_to_frequency(m.channel) {
                    self.set_network(m.wacn, m.syid, f1);
                }
            }
            Tsbk::AdjStsBcst(m) => {
                self.add_adjacent_via_table(m.channel, m.rfid, m.stid, m.syid);
            }
            Tsbk::AckRspFne(m) => {
                let event = CcEvent::AckRespFne {
                    aiv: m.aiv,
                    ex: m.ex,
                    addl: m.additional,
                    wacn: m.wacn(),
                    tsbk_sysid: m.sysid(),
                    source: m.source().map(|sa| self.mk_unit_record(sa)),
                    target: self.mk_unit_record(m.target),
                };
                self.post_event(opcode, event, now);
            }
            Tsbk::DenyRsp(m) => {
                let event = CcEvent::DenyResp {
                    aiv: m.aiv,
                    reason: m.reason,
                    additional: m.additional,
                    target: self.mk_unit_record(m.target),
                };
                self.post_event(opcode, event, now);
            }
            Tsbk::GrpAffRsp(m) => {
                let event = CcEvent::GrpAffResp {
                    affiliation: if m.global { "global" } else { "local" },
                    group_aff_value: m.gav,
                    announce_group: self.mk_tg_record(m.announce_group),
                    group: self.mk_tg_record(m.group),
                    target: self.mk_unit_record(m.target),
                };
                self.post_event(opcode, event, now);
            }
            Tsbk::GrpAffQ(m) => {
                let event = CcEvent::GrpAffQ { source: self.mk_unit_record(m.source), target: self.mk_unit_record(m.target) };
                self.post_event(opcode, event, now);
            }
            Tsbk::LocRegRsp(m) => {
                let event = CcEvent::LocRegResp {
                    rv: m.rv,
                    rfss: m.rfss,
                    siteid: m.site,
                    group: self.mk_tg_record(m.group),
                    target: self.mk_unit_record(m.target),
                };
                self.post_event(opcode, event, now);
            }
            Tsbk::URegRsp(m) => {
                let event = CcEvent::URegResp {
                    rv: m.rv,
                    tsbk_sysid: m.sysid,
                    source: self.mk_unit_record(m.source),
                    target: self.mk_unit_record(m.target),
                };
                self.post_event(opcode, event, now);
            }
            Tsbk::URegCmd(m) => {
                let event = CcEvent::URegCmd { source: self.mk_unit_record(m.source), target: self.mk_unit_record(m.target) };
                self.post_event(opcode, event, now);
            }
            Tsbk::UDeRegAck(m) => {
                let event = CcEvent::UDeRegAck { wacn: m.wacn, tsbk_sysid: m.sysid, source: self.mk_unit_record(m.source) };
                self.post_event(opcode, event, now);
            }
            Tsbk::ExtFnctCmd(m) => {
                let event = CcEvent::ExtFnctCmd {
                    efclass: m.class,
                    efoperand: m.operand,
                    efargs: self.mk_unit_record(m.args),
                    target: self.mk_unit_record(m.target),
                };
                self.post_event(opcode, event, now);
            }
            Tsbk::MotGrgAddCmd(m) => {
                let event = CcEvent::MotGrgAddCmd {
                    sg: self.mk_tg_record(m.supergroup),
                    ga1: self.mk_tg_record(m.group1),
                    ga2: self.mk_tg_record(m.group2),
                    ga3: self.mk_tg_record(m.group3),
                };
                self.post_event(opcode, event, now);
            }
            Tsbk::MotGrgDelCmd(m) => {
                let event = CcEvent::MotGrgDelCmd {
                    sg: self.mk_tg_record(m.supergroup),
                    ga1: self.mk_tg_record(m.group1),
                    ga2: self.mk_tg_record(m.group2),
                    ga3: self.mk_tg_record(m.group3),
                };
                self.post_event(opcode, event, now);
            }
            Tsbk::MotGrgCnGrant(m) => {
                let f = self.channel_id_to_frequency(m.channel);
                let slot = self.get_tdma_slot(m.channel);
                let event = CcEvent::MotGrgCnGrant {
                    frequency: f,
                    sg: self.mk_tg_record(m.supergroup),
                    sa: self.mk_unit_record(m.source_address),
                };
                self.post_event(opcode, event, now);
                self.update_voice_frequency(f, m.supergroup, slot, Some(m.source_address), None, now);
                updated += f.is_some() as usize;
            }
            Tsbk::MotGrgCnGrantUpdt(m) => {
                let f1 = self.channel_id_to_frequency(m.channel1);
                let f2 = self.channel_id_to_frequency(m.channel2);
                let s1 = self.get_tdma_slot(m.channel1);
                self.update_voice_frequency(f1, m.supergroup1, s1, None, None, now);
                let mut sg2 = None;
                if f1 != f2 {
                    let s2 = self.get_tdma_slot(m.channel2);
                    self.update_voice_frequency(f2, m.supergroup2, s2, None, None, now);
                    sg2 = Some(self.mk_tg_record(m.supergroup2));
                }
                let event = CcEvent::MotGrgCnGrantUpdt {
                    frequency1: f1,
                    sg1: self.mk_tg_record(m.supergroup1),
                    frequency2: sg2.as_ref().and(f2),
                    sg2,
                };
                self.post_event(opcode, event, now);
                updated += f1.is_some() as usize + f2.is_some() as usize;
            }
            Tsbk::HarrisGrgExencCmd(m) => {
                let (target_group, target_unit) = match m.target {
                    GrgTarget::Group(tg) => (Some(tg), None),
                    GrgTarget::Unit(unit) => (None, Some(unit)),
                };
                if let (true, Some(tg)) = (m.opt_act, target_group) {
                    let patch = HarrisSupergroup {
                        supergroup: self.mk_tg_record(m.supergroup),
                        target_group: self.mk_tg_record(tg),
                        algid: m.algid,
                        keyid: m.keyid,
                        expires: now + self.timing.supergroup_lifetime,
                    };
                    self.harris_sgs.insert(format!("{}-{}", m.supergroup, tg), patch);
                }
                let event = CcEvent::GrgExencCmd {
                    supergroup: self.mk_tg_record(m.supergroup),
                    target_group: target_group.map(|tg| self.mk_tg_record(tg)),
                    target_unit: target_unit.map(|u| self.mk_unit_record(u)),
                    algid: m.algid,
                    keyid: m.keyid,
                    active: m.opt_act,
                };
                self.post_event(opcode, event, now);
            }
            Tsbk::Unsupported => {
                tracing::debug!(nac = self.nac, "unsupported tsbk mfrid {:02x} opcode {:02x}", mfrid, opcode);
            }
        }
        Ok(updated)
    }

    fn set_rfss(&mut self, syid: u16, rfid: u8, stid: u8, chan: Hz, txchan: Hz) {
        self.rfss = RfssIdentity { syid, rfid, stid, chan, txchan };
    }

    fn set_network(&mut self, wacn: u32, syid: u16, chan: Hz) {
        if self.ns_wacn != Some(wacn) || self.ns_syid != Some(syid) {
            tracing::info!(nac = self.nac, "network identity wacn {:x} sysid {:x}", wacn, syid);
        }
        self.ns_wacn = Some(wacn);
        self.ns_syid = Some(syid);
        self.ns_chan = chan;
    }

    /// Adjacent site announced with a single channel; the uplink follows from its identifier
    fn add_adjacent_via_table(&mut self, channel: ChannelId, rfid: u8, stid: u8, sysid: u16) {
        let Some(f1) = self.channel_id_to_frequency(channel) else {
            return;
        };
        let Some(uplink) = self.iden_table.uplink_frequency(channel, f1) else {
            return;
        };
        self.adjacent.insert(f1, AdjacentSite { rfid, stid, uplink, table: Some(channel.iden()), sysid });
    }

    // ----------------------- MBT -----------------------

    /// Decodes one extended format MBT (header block with CRC, then data).
    /// Other formats are rejected with `DecodeErr::UnsupportedFormat` and leave no trace.
    pub fn decode_mbt(&mut self, payload: &[u8], now: f64) -> Result<usize, DecodeErr> {
        let pdu = match MbtPdu::from_bytes(payload) {
            Ok(pdu) => pdu,
            Err(e @ DecodeErr::UnsupportedFormat { .. }) => return Err(e),
            Err(e) => {
                self.report_decode_error("mbt", &e, now);
                return Err(e);
            }
        };
        self.cc_timeouts = 0;
        self.last_tsbk = now;
        p25_core::assert_warn!(pdu.header.sap == MBT_SAP_TRUNKING, "mbt sap {:02x} on control channel", pdu.header.sap);

        let opcode = pdu.header.opcode as i32;
        let mut updated = 0;
        match pdu.body {
            Mbt::GrpVChGrant { source_address, opts, channel_t, channel_r, group_address } => {
                let f = self.channel_id_to_frequency(channel_t);
                let slot = self.get_tdma_slot(channel_t);
                let event = CcEvent::GrpVChGrantMbt {
                    options: opts,
                    frequency: f,
                    group: self.mk_tg_record(group_address),
                    srcaddr: self.mk_unit_record(source_address),
                    tdma_slot: slot,
                };
                self.post_event(opcode, event, now);
                self.update_voice_frequency(f, group_address, slot, Some(source_address), Some(Mbt::protected(opts)), now);
                updated += f.is_some() as usize;
                tracing::debug!(
                    nac = self.nac,
                    "mbt00 voice grant ch1 {} ch2 {} addr {}",
                    self.channel_id_to_string(channel_t),
                    self.channel_id_to_string(channel_r),
                    group_address
                );
            }
            Mbt::AdjStsBcst { syid, rfid, stid, channel_t, channel_r } => {
                if let (Some(f1), Some(f2)) = (self.channel_id_to_frequency(channel_t), self.channel_id_to_frequency(channel_r)) {
                    self.adjacent.insert(f1, AdjacentSite { rfid, stid, uplink: f2, table: None, sysid: syid });
                }
            }
            Mbt::NetStsBcst { syid, wacn, channel_t, channel_r } => {
                if let (Some(f1), Some(_)) = (self.channel_id_to_frequency(channel_t), self.channel_id_to_frequency(channel_r)) {
                    self.set_network(wacn, syid, f1);
                }
            }
            Mbt::RfssStsBcst { syid, rfid, stid, channel_t, channel_r } => {
                if let (Some(f1), Some(f2)) = (self.channel_id_to_frequency(channel_t), self.channel_id_to_frequency(channel_r)) {
                    self.set_rfss(syid, rfid, stid, f1, f2);
                }
            }
            Mbt::Unsupported => {
                tracing::debug!(nac = self.nac, "unsupported mbt opcode {:02x}", opcode);
            }
        }
        Ok(updated)
    }

    // ----------------------- TDMA -----------------------

    /// Decodes the first message of a TDMA control channel MAC block
    pub fn decode_tdma_cc(&mut self, blk: &[u8], now: f64) -> Result<Option<usize>, DecodeErr> {
        self.stats.tsbks += 1;
        let msg = match TdmaMsg::from_bytes(blk) {
            Ok(msg) => msg,
            Err(e) => {
                self.report_decode_error("tdma", &e, now);
                return Err(e);
            }
        };
        if msg.is_known() {
            self.cc_timeouts = 0;
            self.last_tsbk = now;
        }
        match &msg {
            TdmaMsg::AdjStsBcst { syid, rfid, stid, channel, class } => {
                tracing::debug!(nac = self.nac, "tdma adjacent: syid {:x} rfid {} stid {} ch {:x} class {:x}", syid, rfid, stid, channel.0, class);
                self.add_adjacent_via_table(*channel, *rfid, *stid, *syid);
            }
            TdmaMsg::IdenUpTdma(m) => {
                self.iden_table.insert(m.iden, m.ident.clone());
                let event = CcEvent::IdenUpTdma {
                    iden: m.iden,
                    offset: m.ident.offset_hz,
                    step: m.ident.step_hz,
                    freq: m.ident.base_hz,
                    slots: m.ident.tdma_slots.unwrap_or(1),
                };
                self.post_event(0x33, event, now);
            }
            TdmaMsg::IdenUp { iden, bw, ident } => {
                self.iden_table.insert(*iden, ident.clone());
                let event = CcEvent::IdenUp { iden: *iden, offset: ident.offset_hz, step: ident.step_hz, freq: ident.base_hz };
                self.post_event(0x3d, event, now);
                tracing::debug!(nac = self.nac, "tdma iden_up: iden {} bw {} {:?}", iden, bw, ident);
            }
            TdmaMsg::NetStsBcst { wacn, syid, channel, color_code } => {
                if let Some(f1) = self.channel_id_to_frequency(*channel) {
                    self.set_network(*wacn, *syid, f1);
                }
                tracing::debug!(nac = self.nac, "tdma net status: wacn {:x} syid {:x} color code {:x}", wacn, syid, color_code);
            }
            TdmaMsg::RfssStsBcst { syid, rfid, stid, channel } => {
                if let Some(f1) = self.channel_id_to_frequency(*channel) {
                    let tx = self.iden_table.uplink_frequency(*channel, f1).unwrap_or(f1);
                    self.set_rfss(*syid, *rfid, *stid, f1, tx);
                }
            }
            TdmaMsg::SccbExp { channel1, channel2, .. } => {
                if let (Some(f1), Some(f2)) = (self.channel_id_to_frequency(*channel1), self.channel_id_to_frequency(*channel2)) {
                    self.secondary.insert(f1);
                    self.secondary.insert(f2);
                }
            }
            TdmaMsg::Unknown { op, moc } => {
                tracing::trace!(nac = self.nac, "tdma_cc: unknown op {:x} moc {:x}", op, moc);
            }
        }
        Ok(msg.len())
    }

    // ----------------------- status -----------------------

    /// Full snapshot for status polling. Runs an unconditional call expiry sweep first.
    pub fn to_status(&mut self, now: f64) -> SystemStatus {
        self.frequency_tracking_expire(now, true);
        self.harris_sgs.retain(|_, sg| sg.expires >= now);

        let mut frequencies = BTreeMap::new();
        let mut frequency_data = BTreeMap::new();
        for (f, vf) in &self.voice_frequencies {
            let tgs = vf.tgid.map(|t| t.map(|t| t.to_string()).unwrap_or_else(|| "None".to_string()));
            frequencies.insert(
                *f,
                format!(
                    "voice frequency {:.6} tgid(s) {} {} {:4.1}s ago count {}",
                    *f as f64 / 1_000_000.0,
                    tgs[0],
                    tgs[1],
                    now - vf.time,
                    vf.counter
                ),
            );
            frequency_data.insert(
                *f,
                FrequencyData {
                    tgids: vf.tgid,
                    last_activity: format!("{:7.1}", now - vf.time),
                    counter: vf.counter,
                    srcaddr: vf.srcaddr,
                    tg_tag: vf.tg_tag.clone(),
                    tg_color: vf.tg_color,
                    srcaddr_tag: vf.srcaddr_tag.clone(),
                    srcaddr_color: vf.srcaddr_color,
                },
            );
        }

        SystemStatus {
            syid: self.rfss.syid,
            sysname: self.sysname.clone(),
            rfid: self.rfss.rfid,
            stid: self.rfss.stid,
            sysid: self.ns_syid,
            rxchan: self.rfss.chan,
            txchan: self.rfss.txchan,
            wacn: self.ns_wacn,
            secondary: self.secondary.iter().copied().collect(),
            tsbks: self.stats.tsbks,
            frequencies,
            frequency_data,
            last_tsbk: self.last_tsbk,
            srcaddr: self.crypto.srcaddr,
            grpaddr: self.crypto.grpaddr,
            algid: self.crypto.algid,
            alg: self.crypto.alg.clone(),
            keyid: self.crypto.keyid,
            adjacent_data: self.adjacent.clone(),
            talkgroup_data: self.talkgroups.clone(),
            frequency_tracking: self.tracker.iter().map(|(f, e)| (*f, e.clone())).collect(),
            harris_supergroups: self.harris_sgs.clone(),
            tgid_tags_file: self.tgid_tags_file.clone(),
            unit_id_tags_file: self.unit_id_tags_file.clone(),
        }
    }

    /// Human readable summary, one fact per line
    pub fn describe(&self, now: f64) -> String {
        let mhz = |f: Hz| f as f64 / 1_000_000.0;
        let mut s = vec![
            format!(
                "rf: syid {:x} rfid {} stid {} frequency {:.6} uplink {:.6}",
                self.rfss.syid,
                self.rfss.rfid,
                self.rfss.stid,
                mhz(self.rfss.chan),
                mhz(self.rfss.txchan)
            ),
            format!(
                "net: syid {} wacn {} frequency {:.6}",
                self.ns_syid.map(|v| format!("{:x}", v)).unwrap_or_else(|| "?".to_string()),
                self.ns_wacn.map(|v| format!("{:x}", v)).unwrap_or_else(|| "?".to_string()),
                mhz(self.ns_chan)
            ),
            format!(
                "secondary control channel(s): {}",
                self.secondary.iter().map(|f| format!("{:.6}", mhz(*f))).collect::<Vec<_>>().join(",")
            ),
            format!("stats: tsbks {} crc {} decode errors {}", self.stats.tsbks, self.stats.crc, self.stats.decode_errors),
        ];
        for (f, vf) in &self.voice_frequencies {
            s.push(format!("voice frequency {:.6} tgid(s) {:?} {:4.1}s ago count {}", mhz(*f), vf.tgid, now - vf.time, vf.counter));
        }
        for (iden, ident) in self.iden_table.iter() {
            s.push(format!(
                "tbl-id: {:x} frequency: {:.6} step {:.6} offset {:.6}",
                iden,
                mhz(ident.base_hz),
                mhz(ident.step_hz),
                ident.offset_hz as f64 / 1_000_000.0
            ));
        }
        for (f, adj) in &self.adjacent {
            s.push(format!("adjacent {:.6}: rfid {} stid {} uplink {:.6} sysid 0x{:x}", mhz(*f), adj.rfid, adj.stid, mhz(adj.uplink), adj.sysid));
        }
        s.join("\n")
    }
}
