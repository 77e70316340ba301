//! Domain Hierarchy Aggregation Module
//!
//! Measures subdomain fan-out at every depth of the DNS hierarchy. DGA and
//! tunneling traffic produce many distinct names under one parent, which
//! shows up as a spike in fan-out at a shallow depth; legitimate domains tend
//! to be deep and narrow.
//!
//! # Super Domains
//! The top-level label is ignored. For `mail.test.example.com` the super
//! domain at depth 0 is `example`, at depth 1 `test.example` and at depth 2
//! `mail.test.example`. A name without any dot is its own depth-0 super
//! domain.
//!
//! # Aggregation
//! Names are inserted into a trie keyed on their labels from the right. Each
//! node is one (super domain, depth) group and counts the names passing
//! through it, which is exactly the fan-out of that group. One snapshot is
//! emitted per node.
//!
//! Allow-listed super domains are removed only after every count has been
//! computed; counts are never recomputed without them.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::allowlist::AllowList;
use crate::ingest::IngestStats;

/// A deduplicated FQDN and its labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRecord {
    pub fqdn: String,
    pub labels: Vec<String>,
}

impl DomainRecord {
    pub fn new(fqdn: &str) -> Self {
        Self {
            fqdn: fqdn.to_string(),
            labels: fqdn.split('.').map(str::to_string).collect(),
        }
    }

    /// Labels from the super domain outwards, top-level label excluded.
    pub fn hierarchy(&self) -> Vec<&str> {
        if self.labels.len() <= 1 {
            return vec![self.fqdn.as_str()];
        }
        self.labels[..self.labels.len() - 1]
            .iter()
            .rev()
            .map(String::as_str)
            .collect()
    }

    /// Super domain keys at each depth, shallowest first.
    pub fn super_domains(&self) -> Vec<String> {
        let mut keys = Vec::new();
        let mut current = String::new();
        for (depth, label) in self.hierarchy().into_iter().enumerate() {
            current = if depth == 0 {
                label.to_string()
            } else {
                format!("{}.{}", label, current)
            };
            keys.push(current.clone());
        }
        keys
    }
}

/// Fan-out of one super domain at one depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainSnapshot {
    pub domain: String,
    pub fanout: usize,
    /// First input name that reached this group
    pub representative: String,
    pub depth: usize,
}

#[derive(Debug)]
struct TrieNode {
    key: String,
    depth: usize,
    count: usize,
    representative: usize,
    children: HashMap<String, usize>,
}

/// Trie over reversed label sequences with per-node name counts.
#[derive(Debug, Default)]
pub struct DomainHierarchy {
    records: Vec<DomainRecord>,
    nodes: Vec<TrieNode>,
    roots: HashMap<String, usize>,
}

impl DomainHierarchy {
    /// Builds the hierarchy from raw names, dropping exact duplicates.
    pub fn build<I, S>(fqdns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hierarchy = Self::default();
        let mut seen = HashSet::new();

        for fqdn in fqdns {
            let fqdn = fqdn.as_ref();
            if !seen.insert(fqdn.to_string()) {
                continue;
            }
            hierarchy.insert(DomainRecord::new(fqdn));
        }

        debug!(
            "Built domain hierarchy: {} unique names, {} groups, max depth {}",
            hierarchy.records.len(),
            hierarchy.nodes.len(),
            hierarchy.max_depth()
        );

        hierarchy
    }

    fn insert(&mut self, record: DomainRecord) {
        let record_index = self.records.len();
        let mut parent: Option<usize> = None;

        for (depth, label) in record.hierarchy().into_iter().enumerate() {
            let existing = match parent {
                None => self.roots.get(label).copied(),
                Some(p) => self.nodes[p].children.get(label).copied(),
            };

            let node = match existing {
                Some(node) => node,
                None => {
                    let key = match parent {
                        None => label.to_string(),
                        Some(p) => format!("{}.{}", label, self.nodes[p].key),
                    };
                    let node = self.nodes.len();
                    self.nodes.push(TrieNode {
                        key,
                        depth,
                        count: 0,
                        representative: record_index,
                        children: HashMap::new(),
                    });
                    match parent {
                        None => self.roots.insert(label.to_string(), node),
                        Some(p) => self.nodes[p].children.insert(label.to_string(), node),
                    };
                    node
                }
            };

            self.nodes[node].count += 1;
            parent = Some(node);
        }

        self.records.push(record);
    }

    /// Number of distinct names aggregated.
    pub fn unique_count(&self) -> usize {
        self.records.len()
    }

    /// Deepest depth reached by any name (0 when empty).
    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Every group at every depth, ranked by descending fan-out, then
    /// ascending depth, then super domain.
    pub fn snapshots(&self) -> Vec<DomainSnapshot> {
        let mut snapshots: Vec<DomainSnapshot> = self
            .nodes
            .iter()
            .map(|node| DomainSnapshot {
                domain: node.key.clone(),
                fanout: node.count,
                representative: self.records[node.representative].fqdn.clone(),
                depth: node.depth,
            })
            .collect();

        snapshots.sort_by(|a, b| {
            b.fanout
                .cmp(&a.fanout)
                .then_with(|| a.depth.cmp(&b.depth))
                .then_with(|| a.domain.cmp(&b.domain))
        });
        snapshots
    }
}

/// Ranked fan-out analysis for one input.
#[derive(Debug, Clone)]
pub struct DomainReport {
    pub timestamp: DateTime<Utc>,
    pub fanout_floor: usize,
    pub unique_domains: usize,
    /// Snapshots left after allow-list removal, ranked
    pub snapshots: Vec<DomainSnapshot>,
    pub allow_listed: usize,
    pub ingest_stats: Option<IngestStats>,
}

impl DomainReport {
    /// Aggregates names and removes allow-listed super domains.
    pub fn build<I, S>(fqdns: I, allow_list: &AllowList, fanout_floor: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hierarchy = DomainHierarchy::build(fqdns);
        let all = hierarchy.snapshots();
        let total = all.len();

        let snapshots: Vec<DomainSnapshot> = all
            .into_iter()
            .filter(|s| !allow_list.contains(&s.domain))
            .collect();
        let allow_listed = total - snapshots.len();

        let report = Self {
            timestamp: Utc::now(),
            fanout_floor,
            unique_domains: hierarchy.unique_count(),
            snapshots,
            allow_listed,
            ingest_stats: None,
        };

        debug!(
            "Domain aggregation: {} snapshots, {} allow-listed, {} above floor {}",
            report.snapshots.len(),
            report.allow_listed,
            report.reported_count(),
            report.fanout_floor
        );

        report
    }

    pub fn with_ingest_stats(mut self, stats: IngestStats) -> Self {
        self.ingest_stats = Some(stats);
        self
    }

    /// Snapshots with fan-out strictly above the floor, in rank order.
    pub fn reported(&self) -> impl Iterator<Item = &DomainSnapshot> {
        let floor = self.fanout_floor;
        self.snapshots.iter().filter(move |s| s.fanout > floor)
    }

    pub fn reported_count(&self) -> usize {
        self.reported().count()
    }

    /// Looks up a retained snapshot by super domain key.
    pub fn get(&self, domain: &str) -> Option<&DomainSnapshot> {
        self.snapshots.iter().find(|s| s.domain == domain)
    }
}
