//! Receiver configuration management
//!
//! This crate provides configuration loading and parsing for the trunking receiver:
//! - TOML configuration file parsing (primary format)
//! - Legacy TSV and JSON channel definitions
//! - Talkgroup / unit id lists and tag registries

pub mod id_list;
pub mod id_registry;
pub mod json_config;
pub mod rx_config;
pub mod toml_config;
pub mod tsv_config;

use std::path::Path;

pub use id_list::IdList;
pub use id_registry::{TagEntry, TagRegistry, read_tags_file};
pub use rx_config::*;

/// Loads a configuration file, choosing the parser by extension: `.tsv`, `.json`, anything else is TOML.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RxConfig, Box<dyn std::error::Error>> {
    let path = path.as_ref();
    let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("tsv") => tsv_config::from_file(path),
        Some("json") => json_config::from_file(path),
        _ => toml_config::from_file(path),
    }
}
