//! Tag registry for talkgroup and unit ids.
//!
//! Entries are either exact ids, or rules tried in insertion order: inclusive ranges
//! (`1000-1999`) and decimal patterns (`12*` for any id starting with 12, `12??` for four digit
//! ids starting with 12). An exact match always wins; otherwise the first matching rule is used.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    pub tag: String,
    /// For talkgroups, `priority * 100 + color`
    pub color: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TagRule {
    Range { start: u32, end: u32 },
    Pattern { prefix: String, len: Option<usize> },
}

impl TagRule {
    fn parse(spec: &str) -> Option<Self> {
        if let Some((a, b)) = spec.split_once('-') {
            let start = a.trim().parse().ok()?;
            let end = b.trim().parse().ok()?;
            return (start <= end).then_some(TagRule::Range { start, end });
        }
        if let Some(prefix) = spec.strip_suffix('*') {
            return prefix.chars().all(|c| c.is_ascii_digit()).then(|| TagRule::Pattern { prefix: prefix.to_string(), len: None });
        }
        if spec.contains('?') {
            let prefix = spec.trim_end_matches('?');
            if !prefix.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            return Some(TagRule::Pattern { prefix: prefix.to_string(), len: Some(spec.len()) });
        }
        None
    }

    fn matches(&self, id: u32) -> bool {
        match self {
            TagRule::Range { start, end } => (*start..=*end).contains(&id),
            TagRule::Pattern { prefix, len } => {
                let s = id.to_string();
                s.starts_with(prefix.as_str()) && len.is_none_or(|l| s.len() == l)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRegistry {
    exact: HashMap<u32, TagEntry>,
    rules: Vec<(TagRule, TagEntry)>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry for an id spec: a plain id, a range or a pattern.
    /// Later exact entries replace earlier ones; rules keep their insertion order.
    pub fn add(&mut self, spec: &str, tag: &str, color: u32) -> Result<(), String> {
        let spec = spec.trim();
        let entry = TagEntry { tag: tag.to_string(), color };
        if let Ok(id) = spec.parse::<u32>() {
            self.exact.insert(id, entry);
            return Ok(());
        }
        let rule = TagRule::parse(spec).ok_or_else(|| format!("invalid id spec '{}'", spec))?;
        self.rules.push((rule, entry));
        Ok(())
    }

    pub fn lookup(&self, id: u32) -> Option<&TagEntry> {
        self.exact
            .get(&id)
            .or_else(|| self.rules.iter().find(|(rule, _)| rule.matches(id)).map(|(_, e)| e))
    }

    /// Tag for the id, empty when nothing matches
    pub fn get_tag(&self, id: u32) -> String {
        self.lookup(id).map(|e| e.tag.clone()).unwrap_or_default()
    }

    pub fn get_color(&self, id: u32) -> u32 {
        self.lookup(id).map(|e| e.color).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.rules.is_empty()
    }

    /// Parses tab separated `id<TAB>tag[<TAB>color]` rows, returning the number of entries added.
    /// Rows with a bad id spec or without a tag are skipped, a bad color reads as 0.
    pub fn parse_tags_str(&mut self, contents: &str) -> usize {
        let mut added = 0;
        for (lineno, line) in contents.lines().enumerate() {
            let cols: Vec<&str> = line.split('\t').map(unquote).collect();
            if cols.len() < 2 || cols[0].is_empty() || cols[0].starts_with('#') {
                continue;
            }
            let color = cols.get(2).and_then(|c| c.trim().parse().ok()).unwrap_or(0);
            match self.add(cols[0], cols[1], color) {
                Ok(()) => added += 1,
                Err(e) => tracing::debug!("tags line {}: {}", lineno + 1, e),
            }
        }
        added
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s)
}

/// Reads a tags file into `registry`, returning the number of entries added
pub fn read_tags_file<P: AsRef<Path>>(path: P, registry: &mut TagRegistry) -> Result<usize, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path.as_ref())?;
    let added = registry.parse_tags_str(&contents);
    tracing::info!("read {} tags from {}", added, path.as_ref().display());
    Ok(added)
}
