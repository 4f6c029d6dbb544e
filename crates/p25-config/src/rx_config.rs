use std::collections::HashSet;

use serde::Deserialize;
use p25_core::{Hz, Nac};

use crate::id_list::IdList;
use crate::id_registry::TagRegistry;

/// Demodulator type requested for a system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modulation {
    #[default]
    Cqpsk,
    C4fm,
}

impl Modulation {
    pub fn from_str_lossy(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cqpsk" | "lsm" => Some(Modulation::Cqpsk),
            "c4fm" | "fsk4" => Some(Modulation::C4fm),
            _ => None,
        }
    }
}

/// Timers used by the trunking state machine, all in seconds
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrunkTiming {
    /// A call not refreshed within this window has ended
    pub call_timeout: f64,
    /// Minimum interval between call expiry sweeps
    pub check_interval: f64,
    /// Control channel hunting is suppressed this long after control or voice traffic
    pub cc_hunt_hold: f64,
    /// Talkgroup hold after the last voice activity
    pub tgid_hold_time: f64,
    /// Blacklist duration of a skipped talkgroup
    pub tgid_skip_time: f64,
    /// Time spent on a system before moving to the next one
    pub system_hold_time: f64,
    /// Voice activity window used when a timeout arrives off the control channel
    pub voice_timeout: f64,
    /// Minimum interval between parallel control channel hunts
    pub parallel_hunt_interval: f64,
    /// Lifetime of a Harris supergroup patch
    pub supergroup_lifetime: f64,
}

impl Default for TrunkTiming {
    fn default() -> Self {
        Self {
            call_timeout: 0.7,
            check_interval: 0.1,
            cc_hunt_hold: 8.0,
            tgid_hold_time: 2.0,
            tgid_skip_time: 1.0,
            system_hold_time: 3.0,
            voice_timeout: 1.0,
            parallel_hunt_interval: 1.0,
            supergroup_lifetime: 5.0,
        }
    }
}

/// One monitored radio system
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub nac: Nac,
    pub sysname: String,
    /// Control channel candidates in Hz, hunted in order
    pub cclist: Vec<Hz>,
    pub offset: i64,
    pub modulation: Modulation,
    pub center_frequency: Option<Hz>,
    /// Only these talkgroups are followed when set
    pub whitelist: Option<IdList>,
    /// Permanently blacklisted talkgroups
    pub blacklist: IdList,
    pub tgid_tags_file: Option<String>,
    pub unit_id_tags_file: Option<String>,
    /// Talkgroup tags, loaded from `tgid_tags_file` or given inline
    pub tgid_tags: Option<TagRegistry>,
    pub unit_id_tags: Option<TagRegistry>,
}

impl SystemConfig {
    /// Minimal config with a control channel list, as created for `add_default_config`
    pub fn new(nac: Nac, sysname: &str, cclist: Vec<Hz>) -> Self {
        Self {
            nac,
            sysname: sysname.to_string(),
            cclist,
            offset: 0,
            modulation: Modulation::default(),
            center_frequency: None,
            whitelist: None,
            blacklist: IdList::default(),
            tgid_tags_file: None,
            unit_id_tags_file: None,
            tgid_tags: None,
            unit_id_tags: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RxConfig {
    pub debug_log: Option<String>,
    /// Restricts which configured systems are serviced
    pub enabled_nacs: Option<Vec<Nac>>,
    pub timing: TrunkTiming,
    /// Systems in configuration order, which is also the system hunt order
    pub systems: Vec<SystemConfig>,
}

impl RxConfig {
    pub fn system(&self, nac: Nac) -> Option<&SystemConfig> {
        self.systems.iter().find(|s| s.nac == nac)
    }

    pub fn nacs(&self) -> Vec<Nac> {
        self.systems.iter().map(|s| s.nac).collect()
    }

    /// Checks the invariants every loader must uphold
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for sys in &self.systems {
            if sys.nac == 0 {
                return Err(format!("system '{}': nac 0 is not allowed", sys.sysname));
            }
            if !seen.insert(sys.nac) {
                return Err(format!("duplicate nac 0x{:x}", sys.nac));
            }
            if sys.cclist.is_empty() {
                return Err(format!("system '{}' (nac 0x{:x}): empty control_channel_list", sys.sysname, sys.nac));
            }
        }
        if let Some(enabled) = &self.enabled_nacs {
            if enabled.is_empty() {
                return Err("enabled_nacs must not be empty".to_string());
            }
        }
        let t = &self.timing;
        for (name, v) in [
            ("call_timeout", t.call_timeout),
            ("check_interval", t.check_interval),
            ("cc_hunt_hold", t.cc_hunt_hold),
            ("tgid_hold_time", t.tgid_hold_time),
            ("tgid_skip_time", t.tgid_skip_time),
            ("system_hold_time", t.system_hold_time),
            ("voice_timeout", t.voice_timeout),
            ("parallel_hunt_interval", t.parallel_hunt_interval),
            ("supergroup_lifetime", t.supergroup_lifetime),
        ] {
            if !(v >= 0.0 && v.is_finite()) {
                return Err(format!("timing.{} must be a non-negative number, got {}", name, v));
            }
        }
        Ok(())
    }
}

/// Parses a frequency string. Values containing '.' are MHz, anything else is Hz.
pub fn parse_frequency(s: &str) -> Result<Hz, String> {
    let s = s.trim();
    if s.contains('.') {
        let mhz: f64 = s.parse().map_err(|_| format!("invalid frequency '{}'", s))?;
        mhz_to_hz(mhz).ok_or_else(|| format!("invalid frequency '{}'", s))
    } else {
        s.parse::<Hz>().map_err(|_| format!("invalid frequency '{}'", s))
    }
}

pub fn mhz_to_hz(mhz: f64) -> Option<Hz> {
    if mhz.is_finite() && mhz > 0.0 { Some((mhz * 1_000_000.0).round() as Hz) } else { None }
}

/// Parses an integer with automatic radix, like `0x293`, `0o17`, `0b101` or `659`
pub fn parse_int_auto(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let lower = s.to_ascii_lowercase();
    let r = if let Some(hex) = lower.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        u64::from_str_radix(oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u64::from_str_radix(bin, 2)
    } else {
        lower.parse::<u64>()
    };
    r.map_err(|_| format!("invalid integer '{}'", s))
}
