use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use toml::Value;

use p25_core::{Hz, Nac};

use super::id_list::IdList;
use super::id_registry::{TagRegistry, read_tags_file};
use super::rx_config::{Modulation, RxConfig, SystemConfig, TrunkTiming, mhz_to_hz, parse_frequency, parse_int_auto};

/// Build `RxConfig` from a TOML configuration string
pub fn from_toml_str(toml_str: &str) -> Result<RxConfig, Box<dyn std::error::Error>> {
    let root: TomlConfigRoot = toml::from_str(toml_str)?;

    // Various sanity checks
    let expected_config_version = "0.1";
    if !root.config_version.eq(expected_config_version) {
        return Err(format!(
            "Unrecognized config_version: {}, expect {}",
            root.config_version, expected_config_version
        )
        .into());
    }
    if !root.extra.is_empty() {
        return Err(format!("Unrecognized top-level fields: {:?}", sorted_keys(&root.extra)).into());
    }
    for (i, sys) in root.system.iter().enumerate() {
        if !sys.extra.is_empty() {
            return Err(format!("Unrecognized fields in system[{}]: {:?}", i, sorted_keys(&sys.extra)).into());
        }
    }

    let enabled_nacs = match root.enabled_nacs {
        Some(list) => Some(list.iter().map(nac_from_value).collect::<Result<Vec<_>, _>>()?),
        None => None,
    };

    let mut cfg = RxConfig {
        debug_log: root.debug_log,
        enabled_nacs,
        timing: root.timing.unwrap_or_default(),
        systems: Vec::with_capacity(root.system.len()),
    };

    for sys in root.system {
        cfg.systems.push(apply_system_patch(sys)?);
    }

    cfg.validate()?;
    Ok(cfg)
}

/// Build `RxConfig` from any reader.
pub fn from_reader<R: Read>(reader: R) -> Result<RxConfig, Box<dyn std::error::Error>> {
    let mut contents = String::new();
    let mut reader = BufReader::new(reader);
    reader.read_to_string(&mut contents)?;
    from_toml_str(&contents)
}

/// Build `RxConfig` from a file path.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<RxConfig, Box<dyn std::error::Error>> {
    let f = File::open(path)?;
    let r = BufReader::new(f);
    let cfg = from_reader(r)?;
    Ok(cfg)
}

fn apply_system_patch(src: SystemDto) -> Result<SystemConfig, Box<dyn std::error::Error>> {
    let nac = nac_from_value(&src.nac)?;
    let cclist = src.control_channel_list.iter().map(frequency_from_value).collect::<Result<Vec<_>, _>>()?;

    let mut dst = SystemConfig::new(nac, &src.sysname, cclist);
    dst.offset = src.offset.unwrap_or(0);
    if let Some(m) = src.modulation {
        dst.modulation = m;
    }
    if let Some(ref cf) = src.center_frequency {
        dst.center_frequency = Some(frequency_from_value(cf)?);
    }
    if let Some(wl) = src.whitelist {
        dst.whitelist = Some(wl.into_id_list()?);
    }
    if let Some(bl) = src.blacklist {
        dst.blacklist = bl.into_id_list()?;
    }

    if let Some(ref path) = src.tgid_tags_file {
        let mut reg = TagRegistry::new();
        read_tags_file(path, &mut reg)?;
        dst.tgid_tags = Some(reg);
    }
    if let Some(ref path) = src.unit_id_tags_file {
        let mut reg = TagRegistry::new();
        read_tags_file(path, &mut reg)?;
        dst.unit_id_tags = Some(reg);
    }
    dst.tgid_tags_file = src.tgid_tags_file;
    dst.unit_id_tags_file = src.unit_id_tags_file;
    Ok(dst)
}

/// Integers are Hz, floats are MHz, strings follow the TSV rule
fn frequency_from_value(v: &Value) -> Result<Hz, String> {
    match v {
        Value::Integer(i) if *i > 0 => Ok(*i as Hz),
        Value::Float(f) => mhz_to_hz(*f).ok_or_else(|| format!("invalid frequency {}", f)),
        Value::String(s) => parse_frequency(s),
        other => Err(format!("invalid frequency {}", other)),
    }
}

/// Integer, or string with automatic radix
fn nac_from_value(v: &Value) -> Result<Nac, String> {
    let raw = match v {
        Value::Integer(i) if *i >= 0 => *i as u64,
        Value::String(s) => parse_int_auto(s)?,
        other => return Err(format!("invalid nac {}", other)),
    };
    Nac::try_from(raw).map_err(|_| format!("nac 0x{:x} out of range", raw))
}

fn sorted_keys(map: &HashMap<String, Value>) -> Vec<&str> {
    let mut v: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
    v.sort_unstable();
    v
}

/// ----------------------- DTOs for input shape -----------------------

#[derive(Deserialize)]
struct TomlConfigRoot {
    config_version: String,
    debug_log: Option<String>,

    #[serde(default)]
    enabled_nacs: Option<Vec<Value>>,

    #[serde(default)]
    timing: Option<TrunkTiming>,

    #[serde(default)]
    system: Vec<SystemDto>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct SystemDto {
    pub nac: Value,
    pub sysname: String,
    pub control_channel_list: Vec<Value>,
    pub offset: Option<i64>,
    pub modulation: Option<Modulation>,
    pub center_frequency: Option<Value>,
    pub whitelist: Option<IdListDto>,
    pub blacklist: Option<IdListDto>,
    pub tgid_tags_file: Option<String>,
    pub unit_id_tags_file: Option<String>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdListDto {
    Inline(Vec<u32>),
    Spec(String),
}

impl IdListDto {
    fn into_id_list(self) -> Result<IdList, Box<dyn std::error::Error>> {
        match self {
            IdListDto::Inline(ids) => Ok(IdList::from_ids(ids)),
            IdListDto::Spec(spec) => IdList::parse_spec(&spec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
config_version = "0.1"
enabled_nacs = ["0x293"]

[timing]
call_timeout = 1.5

[[system]]
nac = "0x293"
sysname = "County P25"
control_channel_list = [851.0125, 851037500, "851.0625"]
modulation = "c4fm"
blacklist = [1001, 1002]
whitelist = "2001,2002"

[[system]]
nac = 0x2ae
sysname = "State"
control_channel_list = [852.5]
"#;

    #[test]
    fn test_basic_config() {
        let cfg = from_toml_str(BASIC).unwrap();
        assert_eq!(cfg.enabled_nacs, Some(vec![0x293]));
        assert_eq!(cfg.timing.call_timeout, 1.5);
        assert_eq!(cfg.timing.cc_hunt_hold, 8.0);
        assert_eq!(cfg.nacs(), vec![0x293, 0x2ae]);

        let sys = cfg.system(0x293).unwrap();
        assert_eq!(sys.sysname, "County P25");
        assert_eq!(sys.cclist, vec![851_012_500, 851_037_500, 851_062_500]);
        assert_eq!(sys.modulation, Modulation::C4fm);
        assert!(sys.blacklist.contains(1002));
        assert!(sys.whitelist.as_ref().unwrap().contains(2002));

        let sys = cfg.system(0x2ae).unwrap();
        assert_eq!(sys.modulation, Modulation::Cqpsk);
        assert!(sys.whitelist.is_none());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let s = "config_version = \"0.1\"\nfoo = 1\n";
        assert!(from_toml_str(s).unwrap_err().to_string().contains("foo"));

        let s = "config_version = \"0.1\"\n[[system]]\nnac = 1\nsysname = \"x\"\ncontrol_channel_list = [1]\nbar = 2\n";
        assert!(from_toml_str(s).unwrap_err().to_string().contains("bar"));

        let s = "config_version = \"0.1\"\n[timing]\nunknown_timer = 2.0\n";
        assert!(from_toml_str(s).is_err());
    }

    #[test]
    fn test_wrong_version() {
        assert!(from_toml_str("config_version = \"9.9\"\n").is_err());
    }

    #[test]
    fn test_duplicate_nac() {
        let s = "config_version = \"0.1\"\n\
                 [[system]]\nnac = 1\nsysname = \"a\"\ncontrol_channel_list = [851.0]\n\
                 [[system]]\nnac = \"0x1\"\nsysname = \"b\"\ncontrol_channel_list = [852.0]\n";
        assert!(from_toml_str(s).unwrap_err().to_string().contains("duplicate"));
    }
}
