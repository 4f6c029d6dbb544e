//! JSON channel definitions, as written by the web configuration page.
//! Only channels that are both active and trunked become systems.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::id_list::IdList;
use super::id_registry::TagRegistry;
use super::rx_config::{Modulation, RxConfig, SystemConfig, mhz_to_hz, parse_frequency};

pub fn from_file<P: AsRef<Path>>(path: P) -> Result<RxConfig, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)?;
    from_json_str(&contents)
}

pub fn from_json_str(contents: &str) -> Result<RxConfig, Box<dyn std::error::Error>> {
    let root: JsonConfigRoot = serde_json::from_str(contents)?;
    let mut cfg = RxConfig::default();
    for chan in root.channels.into_iter().filter(|c| c.active && c.trunked) {
        cfg.systems.push(make_system(chan)?);
    }
    cfg.validate()?;
    Ok(cfg)
}

fn make_system(chan: ChannelDto) -> Result<SystemConfig, Box<dyn std::error::Error>> {
    let cclist = chan.cclist.iter().map(frequency_from_value).collect::<Result<Vec<_>, _>>()?;
    let mut sys = SystemConfig::new(chan.nac, &chan.name, cclist);
    sys.blacklist = IdList::from_ids(chan.blacklist.iter().map(id_from_value).collect::<Result<Vec<_>, _>>()?);
    // an empty whitelist in the channel editor means no restriction
    if !chan.whitelist.is_empty() {
        sys.whitelist = Some(IdList::from_ids(chan.whitelist.iter().map(id_from_value).collect::<Result<Vec<_>, _>>()?));
    }
    if let Some(ref f) = chan.frequency {
        sys.center_frequency = Some(frequency_from_value(f)?);
    }
    if let Some(ref m) = chan.demod_type {
        sys.modulation = Modulation::from_str_lossy(m).ok_or_else(|| format!("invalid demod_type '{}'", m))?;
    }
    if !chan.tgids.is_empty() {
        let mut reg = TagRegistry::new();
        for (id, tag) in &chan.tgids {
            reg.add(id, tag, 0)?;
        }
        sys.tgid_tags = Some(reg);
    }
    Ok(sys)
}

fn frequency_from_value(v: &Value) -> Result<u64, String> {
    match v {
        Value::Number(n) if n.is_u64() => n.as_u64().ok_or_else(|| format!("invalid frequency {}", n)),
        Value::Number(n) => n.as_f64().and_then(mhz_to_hz).ok_or_else(|| format!("invalid frequency {}", n)),
        Value::String(s) => parse_frequency(s),
        other => Err(format!("invalid frequency {}", other)),
    }
}

fn id_from_value(v: &Value) -> Result<u32, String> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|id| u32::try_from(id).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| format!("invalid talkgroup id {}", v))
}

#[derive(Deserialize)]
struct JsonConfigRoot {
    channels: Vec<ChannelDto>,
}

#[derive(Deserialize)]
struct ChannelDto {
    #[serde(default)]
    active: bool,
    #[serde(default)]
    trunked: bool,
    nac: u16,
    #[serde(default)]
    cclist: Vec<Value>,
    #[serde(default)]
    blacklist: Vec<Value>,
    #[serde(default)]
    whitelist: Vec<Value>,
    name: String,
    frequency: Option<Value>,
    demod_type: Option<String>,
    #[serde(default)]
    tgids: HashMap<String, String>,
}
