use std::collections::BTreeMap;

use p25_core::{DecodeErr, Hz};

use super::channel_id::ChannelId;

/// Slots per carrier for each IDEN_UP_TDMA channel type
const TDMA_SLOTS_PER_CARRIER: [u8; 6] = [1, 1, 1, 2, 4, 2];

/// One entry of a system's frequency identifier table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreqIdent {
    /// Frequency of channel number 0
    pub base_hz: Hz,
    /// Channel spacing
    pub step_hz: u64,
    /// Transmit offset of the subscriber (uplink minus downlink)
    pub offset_hz: i64,
    /// Slots per carrier when announced through IDEN_UP_TDMA
    pub tdma_slots: Option<u8>,
}

impl FreqIdent {
    /// IDEN_UP: offset sign in bit 8 of the 9-bit field, magnitude in units of 250 kHz
    pub fn from_iden_up(toff0: u64, spac: u64, freq: u64) -> Self {
        let magnitude = (toff0 & 0xff) as i64;
        let toff = if (toff0 >> 8) & 1 == 0 { -magnitude } else { magnitude };
        FreqIdent {
            base_hz: freq * 5,
            step_hz: spac * 125,
            offset_hz: toff * 250_000,
            tdma_slots: None,
        }
    }

    /// IDEN_UP_VU: 14-bit offset field, sign in bit 13, magnitude in channel spacings
    pub fn from_iden_up_vu(toff0: u64, spac: u64, freq: u64) -> Self {
        FreqIdent {
            base_hz: freq * 5,
            step_hz: spac * 125,
            offset_hz: signed_spacing_offset(toff0, spac),
            tdma_slots: None,
        }
    }

    /// IDEN_UP_TDMA: same offset coding as IDEN_UP_VU plus a channel type selecting the slot count
    pub fn from_iden_up_tdma(channel_type: u64, toff0: u64, spac: u64, freq: u64) -> Result<Self, DecodeErr> {
        let slots = TDMA_SLOTS_PER_CARRIER
            .get(channel_type as usize)
            .copied()
            .ok_or(DecodeErr::InvalidValue { field: "channel_type", value: channel_type })?;
        Ok(FreqIdent {
            base_hz: freq * 5,
            step_hz: spac * 125,
            offset_hz: signed_spacing_offset(toff0, spac),
            tdma_slots: Some(slots),
        })
    }
}

fn signed_spacing_offset(toff0: u64, spac: u64) -> i64 {
    let magnitude = (toff0 & 0x1fff) as i64;
    let toff = if (toff0 >> 13) & 1 == 0 { -magnitude } else { magnitude };
    toff * spac as i64 * 125
}

/// Frequency identifier table, indexed by the identifier nibble of a channel id.
/// Entries are learned from iden-up messages; a channel cannot be resolved before its
/// identifier has been announced.
#[derive(Debug, Clone, Default)]
pub struct IdenTable {
    entries: BTreeMap<u8, FreqIdent>,
}

impl IdenTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, iden: u8, ident: FreqIdent) {
        self.entries.insert(iden & 0xf, ident);
    }

    pub fn get(&self, iden: u8) -> Option<&FreqIdent> {
        self.entries.get(&iden)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u8, &FreqIdent)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Downlink frequency of a channel, or None while its identifier is unknown
    pub fn channel_id_to_frequency(&self, ch: ChannelId) -> Option<Hz> {
        let ident = self.entries.get(&ch.iden())?;
        let number = ch.number() as u64;
        let index = match ident.tdma_slots {
            Some(slots) if slots > 0 => number / slots as u64,
            _ => number,
        };
        Some(ident.base_hz + ident.step_hz * index)
    }

    /// TDMA slot of a channel, only for identifiers announced through IDEN_UP_TDMA
    pub fn tdma_slot(&self, ch: ChannelId) -> Option<u8> {
        let ident = self.entries.get(&ch.iden())?;
        ident.tdma_slots?;
        Some((ch.number() & 1) as u8)
    }

    /// Subscriber transmit frequency for a resolved downlink frequency on this channel's identifier
    pub fn uplink_frequency(&self, ch: ChannelId, downlink: Hz) -> Option<Hz> {
        let ident = self.entries.get(&ch.iden())?;
        Some((downlink as i64 + ident.offset_hz) as Hz)
    }

    pub fn channel_id_to_string(&self, ch: ChannelId) -> String {
        match self.channel_id_to_frequency(ch) {
            Some(f) => format!("{:.6}", f as f64 / 1_000_000.0),
            None => format!("ID-0x{:x}", ch.0),
        }
    }
}
