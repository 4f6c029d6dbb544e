//! Legacy tab separated system definitions.
//!
//! The first row names the columns (lower-cased, spaces become `_`). Every further row is one
//! system; empty cells are absent. Values are lower-cased except for `sysname` and file paths.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::id_list::IdList;
use super::id_registry::{TagRegistry, read_tags_file};
use super::rx_config::{Modulation, RxConfig, SystemConfig, parse_frequency, parse_int_auto};

const CASE_PRESERVING: [&str; 3] = ["sysname", "tgid_tags_file", "unit_id_tags_file"];

pub fn from_file<P: AsRef<Path>>(path: P) -> Result<RxConfig, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)?;
    from_tsv_str(&contents)
}

pub fn from_tsv_str(contents: &str) -> Result<RxConfig, Box<dyn std::error::Error>> {
    let mut cfg = RxConfig::default();
    for row in parse_rows(contents) {
        cfg.systems.push(make_system(&row)?);
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Splits the file into header-keyed rows
fn parse_rows(contents: &str) -> Vec<HashMap<String, String>> {
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let hdrmap: Vec<String> = header.split('\t').map(|h| unquote(h).replace(' ', "_").to_lowercase()).collect();

    lines
        .map(|line| {
            let mut fields = HashMap::new();
            for (hdr, cell) in hdrmap.iter().zip(line.split('\t')) {
                let cell = unquote(cell);
                if cell.is_empty() {
                    continue;
                }
                let value = if CASE_PRESERVING.contains(&hdr.as_str()) { cell.to_string() } else { cell.to_lowercase() };
                fields.insert(hdr.clone(), value);
            }
            fields
        })
        .collect()
}

fn make_system(fields: &HashMap<String, String>) -> Result<SystemConfig, Box<dyn std::error::Error>> {
    let nac_str = fields.get("nac").ok_or("tsv row without nac")?;
    let nac = u16::try_from(parse_int_auto(nac_str)?).map_err(|_| format!("nac {} out of range", nac_str))?;
    let sysname = fields.get("sysname").cloned().unwrap_or_else(|| format!("NAC 0x{:x}", nac));
    let cclist_str = fields
        .get("control_channel_list")
        .ok_or_else(|| format!("nac 0x{:x}: missing control_channel_list", nac))?;
    let cclist = cclist_str.split(',').map(parse_frequency).collect::<Result<Vec<_>, _>>()?;

    let mut sys = SystemConfig::new(nac, &sysname, cclist);
    if let Some(offset) = fields.get("offset") {
        sys.offset = offset.trim().parse().map_err(|_| format!("nac 0x{:x}: invalid offset '{}'", nac, offset))?;
    }
    if let Some(m) = fields.get("modulation") {
        sys.modulation = Modulation::from_str_lossy(m).ok_or_else(|| format!("nac 0x{:x}: invalid modulation '{}'", nac, m))?;
    }
    if let Some(wl) = fields.get("whitelist") {
        sys.whitelist = Some(IdList::parse_spec(wl)?);
    }
    if let Some(bl) = fields.get("blacklist") {
        sys.blacklist = IdList::parse_spec(bl)?;
    }
    if let Some(cf) = fields.get("center_frequency") {
        sys.center_frequency = Some(parse_frequency(cf)?);
    }
    if let Some(path) = fields.get("tgid_tags_file") {
        let mut reg = TagRegistry::new();
        read_tags_file(path, &mut reg)?;
        sys.tgid_tags = Some(reg);
        sys.tgid_tags_file = Some(path.clone());
    }
    if let Some(path) = fields.get("unit_id_tags_file") {
        let mut reg = TagRegistry::new();
        read_tags_file(path, &mut reg)?;
        sys.unit_id_tags = Some(reg);
        sys.unit_id_tags_file = Some(path.clone());
    }
    Ok(sys)
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s)
}
