use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use p25_core::Tgid;

/// A set of talkgroup ids, used for whitelists and blacklists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdList(BTreeSet<Tgid>);

impl IdList {
    pub fn from_ids<I: IntoIterator<Item = Tgid>>(ids: I) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn contains(&self, id: Tgid) -> bool {
        self.0.contains(&id)
    }

    pub fn insert(&mut self, id: Tgid) -> bool {
        self.0.insert(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = Tgid> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses an id list specification. A string starting with a digit is a comma separated list
    /// of ids, anything else names a file read with [`IdList::parse_file_str`].
    pub fn parse_spec(spec: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let spec = spec.trim();
        if spec.starts_with(|c: char| c.is_ascii_digit()) {
            let mut list = IdList::default();
            for part in spec.split(',') {
                let id: Tgid = part.trim().parse().map_err(|_| format!("invalid id '{}' in list", part.trim()))?;
                list.insert(id);
            }
            return Ok(list);
        }
        Self::from_file(spec)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path.as_ref())?;
        let list = Self::parse_file_str(&contents);
        tracing::debug!("loaded {} ids from {}", list.len(), path.as_ref().display());
        Ok(list)
    }

    /// One `start[\tend]` entry per line. Lines that do not parse are skipped; an end not above
    /// the start is ignored.
    pub fn parse_file_str(contents: &str) -> Self {
        let mut list = IdList::default();
        for line in contents.lines() {
            let mut cols = line.splitn(2, '\t');
            let Some(Ok(start)) = cols.next().map(|c| c.trim().parse::<Tgid>()) else {
                continue;
            };
            let end = match cols.next().map(|c| c.trim().parse::<Tgid>()) {
                Some(Ok(end)) if end > start => end,
                Some(Err(_)) => continue,
                _ => start,
            };
            for id in start..=end {
                list.insert(id);
            }
        }
        list
    }
}
