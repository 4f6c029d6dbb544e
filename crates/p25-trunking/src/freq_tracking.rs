//! Per frequency and slot call tracking.
//!
//! Every voice grant refreshes or creates a call record at its (frequency, slot). A talkgroup
//! occupies at most one active (frequency, slot) at a time, a single-slot call owns the whole
//! carrier, and calls that are not refreshed within the call timeout are ended by a rate
//! limited sweep. Each call is ended exactly once.

use std::collections::BTreeMap;

use serde::Serialize;

use p25_core::{Hz, Tgid};

use crate::events::{EndReason, TgRecord, UnitRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    pub srcaddr: UnitRecord,
    pub protected: Option<bool>,
    pub tgid: TgRecord,
    pub count: u32,
    pub start_time: f64,
    pub last_active: f64,
    /// None while the call is active
    pub end_time: Option<f64>,
}

impl Call {
    fn new(tgid: TgRecord, srcaddr: Option<UnitRecord>, protected: Option<bool>, now: f64) -> Self {
        Call {
            srcaddr: srcaddr.unwrap_or_else(UnitRecord::unknown),
            protected,
            tgid,
            count: 0,
            start_time: now,
            last_active: now,
            end_time: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    fn is_stale(&self, timeout: f64, now: f64) -> bool {
        self.is_active() && self.last_active + timeout < now
    }

    fn end(&mut self, reason: EndReason, now: f64) -> EndedCall {
        self.end_time = Some(now);
        EndedCall {
            reason,
            srcaddr: self.srcaddr.clone(),
            tgid: self.tgid.clone(),
            duration: now - self.start_time,
            count: self.count,
        }
    }
}

/// Emitted once for every call that ends
#[derive(Debug, Clone, PartialEq)]
pub struct EndedCall {
    pub reason: EndReason,
    pub srcaddr: UnitRecord,
    pub tgid: TgRecord,
    pub duration: f64,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedFrequency {
    pub counter: u32,
    /// Slot 1 is only used on TDMA carriers
    pub calls: [Option<Call>; 2],
    pub last_active: f64,
    pub tdma: bool,
}

impl TrackedFrequency {
    pub fn tgids(&self) -> [Option<Tgid>; 2] {
        [0, 1].map(|i| self.calls[i].as_ref().map(|c| c.tgid.tg_id))
    }
}

#[derive(Debug, Clone)]
pub struct FrequencyTracker {
    table: BTreeMap<Hz, TrackedFrequency>,
    call_timeout: f64,
    check_interval: f64,
    next_expire: f64,
}

impl FrequencyTracker {
    pub fn new(call_timeout: f64, check_interval: f64) -> Self {
        FrequencyTracker { table: BTreeMap::new(), call_timeout, check_interval, next_expire: 0.0 }
    }

    pub fn get(&self, freq: Hz) -> Option<&TrackedFrequency> {
        self.table.get(&freq)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hz, &TrackedFrequency)> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Active calls for a talkgroup, as (frequency, slot)
    pub fn active_calls(&self, tgid: Tgid) -> Vec<(Hz, usize)> {
        let mut found = Vec::new();
        for (f, entry) in &self.table {
            for (slot, call) in entry.calls.iter().enumerate() {
                if let Some(call) = call {
                    if call.tgid.tg_id == tgid && call.is_active() {
                        found.push((*f, slot));
                    }
                }
            }
        }
        found
    }

    /// Records a grant of `tg` on `freq`. Returns the calls ended as a consequence.
    pub fn track(
        &mut self,
        freq: Hz,
        tg: TgRecord,
        tdma_slot: Option<u8>,
        srcaddr: Option<UnitRecord>,
        protected: Option<bool>,
        now: f64,
    ) -> Vec<EndedCall> {
        let is_tdma = tdma_slot.is_some();
        let slot = tdma_slot.map(|s| (s & 1) as usize).unwrap_or(0);
        let tgid = tg.tg_id;
        let mut ended = Vec::new();

        if !self.table.contains_key(&freq) {
            // a talkgroup has one active location, end it elsewhere as moved
            for entry in self.table.values_mut() {
                for call in entry.calls.iter_mut().flatten() {
                    if call.tgid.tg_id == tgid && call.is_active() {
                        ended.push(call.end(EndReason::Moved, now));
                    }
                }
            }
            let mut entry = TrackedFrequency { counter: 0, calls: [None, None], last_active: now, tdma: is_tdma };
            entry.calls[slot] = Some(Call::new(tg, srcaddr, protected, now));
            self.table.insert(freq, entry);
            return ended;
        }

        if let Some(entry) = self.table.get_mut(&freq) {
            entry.counter += 1;
            entry.last_active = now;
        }

        let mut found = false;
        for (f, entry) in self.table.iter_mut() {
            let entry_tdma = entry.tdma;
            for (i, call) in entry.calls.iter_mut().enumerate() {
                let Some(call) = call else { continue };
                if call.tgid.tg_id != tgid {
                    continue;
                }
                if call.is_stale(self.call_timeout, now) {
                    ended.push(call.end(EndReason::Stale, now));
                }
                if *f == freq && entry_tdma == is_tdma && i == slot {
                    found = true;
                    call.last_active = now;
                    call.end_time = None;
                    call.count += 1;
                    if let Some(ref src) = srcaddr {
                        call.srcaddr = src.clone();
                    }
                    if protected.is_some() {
                        call.protected = protected;
                    }
                } else if call.is_active() {
                    ended.push(call.end(EndReason::Moved, now));
                }
            }
        }
        if found {
            return ended;
        }

        if let Some(entry) = self.table.get_mut(&freq) {
            entry.tdma = is_tdma;
            entry.calls[slot] = Some(Call::new(tg, srcaddr, protected, now));
            if !is_tdma {
                if let Some(mut other) = entry.calls[1].take() {
                    if other.is_active() {
                        ended.push(other.end(EndReason::Vacated, now));
                    }
                }
            }
        }
        ended
    }

    /// Ends every call not refreshed within the call timeout. Runs at most once per check
    /// interval unless `always` is set.
    pub fn expire(&mut self, now: f64, always: bool) -> Vec<EndedCall> {
        if now < self.next_expire && !always {
            return Vec::new();
        }
        self.next_expire = now + self.check_interval;
        let mut ended = Vec::new();
        for entry in self.table.values_mut() {
            for call in entry.calls.iter_mut().flatten() {
                if call.is_stale(self.call_timeout, now) {
                    ended.push(call.end(EndReason::Expired, now));
                }
            }
        }
        ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tg(id: Tgid) -> TgRecord {
        TgRecord { tg_id: id, tag: format!("Talkgroup {}", id), priority: 0, color: 0 }
    }

    fn unit(id: u32) -> Option<UnitRecord> {
        Some(UnitRecord { unit_id: Some(id), tag: format!("Unit {}", id), color: 0 })
    }

    #[test]
    fn test_refresh_does_not_duplicate() {
        let mut t = FrequencyTracker::new(0.7, 0.1);
        assert!(t.track(851_512_500, tg(1001), None, unit(5), Some(false), 100.0).is_empty());
        assert!(t.track(851_512_500, tg(1001), None, None, None, 100.3).is_empty());

        let entry = t.get(851_512_500).unwrap();
        assert_eq!(entry.counter, 1);
        let call = entry.calls[0].as_ref().unwrap();
        assert_eq!(call.count, 1);
        assert_eq!(call.srcaddr.unit_id, Some(5));
        assert_eq!(call.protected, Some(false));
        assert_eq!(call.last_active, 100.3);
        assert_eq!(t.active_calls(1001), vec![(851_512_500, 0)]);
    }

    #[test]
    fn test_move_to_known_frequency() {
        let mut t = FrequencyTracker::new(0.7, 0.1);
        t.track(851_512_500, tg(1001), None, None, None, 100.0);
        t.track(851_537_500, tg(2002), None, None, None, 100.0);
        let ended = t.track(851_537_500, tg(1001), None, None, None, 100.5);
        // 2002 is replaced in place, only the move is reported
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].reason, EndReason::Moved);
        assert_eq!(ended[0].tgid.tg_id, 1001);
        assert_eq!(t.active_calls(1001), vec![(851_537_500, 0)]);
        assert!(t.active_calls(2002).is_empty());
    }

    #[test]
    fn test_move_to_new_frequency() {
        let mut t = FrequencyTracker::new(0.7, 0.1);
        t.track(851_512_500, tg(1001), None, None, None, 100.0);
        let ended = t.track(851_537_500, tg(1001), None, None, None, 100.5);
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].reason, EndReason::Moved);
        assert_eq!(ended[0].duration, 0.5);
    }

    #[test]
    fn test_single_slot_vacates_tdma_pair() {
        let mut t = FrequencyTracker::new(0.7, 0.1);
        t.track(769_000_000, tg(1), Some(0), None, None, 10.0);
        t.track(769_000_000, tg(2), Some(1), None, None, 10.0);
        assert_eq!(t.get(769_000_000).unwrap().tgids(), [Some(1), Some(2)]);

        let ended = t.track(769_000_000, tg(3), None, None, None, 10.2);
        let reasons: Vec<_> = ended.iter().map(|e| e.reason).collect();
        assert_eq!(reasons, vec![EndReason::Vacated]);
        assert_eq!(ended[0].tgid.tg_id, 2);
        let entry = t.get(769_000_000).unwrap();
        assert!(!entry.tdma);
        assert_eq!(entry.tgids(), [Some(3), None]);
    }

    #[test]
    fn test_expire_once() {
        let mut t = FrequencyTracker::new(0.7, 0.1);
        t.track(851_512_500, tg(1001), None, None, None, 100.0);
        assert!(t.expire(100.5, false).is_empty());

        let ended = t.expire(101.0, false);
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].reason, EndReason::Expired);
        assert!(t.expire(102.0, true).is_empty());
        assert!(t.active_calls(1001).is_empty());
    }

    #[test]
    fn test_expire_rate_limited() {
        let mut t = FrequencyTracker::new(0.7, 0.1);
        t.expire(100.0, false);
        t.track(851_512_500, tg(1001), None, None, None, 99.0);
        // the next sweep is not due yet
        assert!(t.expire(100.05, false).is_empty());
        assert_eq!(t.expire(100.05, true).len(), 1);
    }

    #[test]
    fn test_stale_match_is_ended_then_refreshed() {
        let mut t = FrequencyTracker::new(0.7, 0.1);
        t.track(851_512_500, tg(1001), None, None, None, 100.0);
        let ended = t.track(851_512_500, tg(1001), None, None, None, 105.0);
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].reason, EndReason::Stale);
        let call = t.get(851_512_500).unwrap().calls[0].as_ref().unwrap();
        assert!(call.is_active());
        assert_eq!(call.count, 1);
    }
}
