//! Allow-list of known-benign destinations and domains.
//!
//! Entries keep their file order for display, while lookups go through a
//! hash set.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Known-benign IPs, hosts, or domain keys excluded from reported results.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    entries: Vec<String>,
    lookup: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::default();
        for entry in entries {
            let entry = entry.into();
            if list.lookup.insert(entry.clone()) {
                list.entries.push(entry);
            }
        }
        list
    }

    /// Loads an allow-list file: either a JSON array of strings, or plain
    /// text with one entry per line (blank lines and `#` comments skipped).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read allow-list: {}", path.display()))?;

        let list = Self::parse(&content)
            .with_context(|| format!("Failed to parse allow-list: {}", path.display()))?;

        debug!("Loaded {} allow-list entries from {}", list.len(), path.display());
        Ok(list)
    }

    /// Parses allow-list text in either supported format.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim_start().starts_with('[') {
            let entries: Vec<String> = serde_json::from_str(content)?;
            return Ok(Self::new(entries));
        }

        Ok(Self::new(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        ))
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, value: &str) -> bool {
        self.lookup.contains(value)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_array() {
        let list = AllowList::parse(r#"["10.0.0.1", "update.example.com", "10.0.0.1"]"#).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.entries(), &["10.0.0.1", "update.example.com"]);
        assert!(list.contains("10.0.0.1"));
        assert!(!list.contains("10.0.0.2"));
    }

    #[test]
    fn test_parse_line_format() {
        let list = AllowList::parse("# benign\n10.0.0.1\n\n  cdn.example.net \n").unwrap();
        assert_eq!(list.entries(), &["10.0.0.1", "cdn.example.net"]);
    }

    #[test]
    fn test_match_is_exact() {
        let list = AllowList::new(["Example.com"]);
        assert!(list.contains("Example.com"));
        assert!(!list.contains("example.com"));
        assert!(!list.contains("www.Example.com"));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(AllowList::parse(r#"["unterminated"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allow.json");
        std::fs::write(&path, r#"["192.168.1.10"]"#).unwrap();

        let list = AllowList::load(&path).unwrap();
        assert!(list.contains("192.168.1.10"));
        assert!(AllowList::load(&dir.path().join("missing.json")).is_err());
    }
}
