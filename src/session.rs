//! Session normalization - groups outbound flow records into sessions.
//!
//! A session is every outbound event sharing source, destination IP,
//! destination host and destination port. Sessions whose destination is
//! allow-listed, or which do not have strictly more events than the
//! configured floor, are removed before analysis.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use crate::allowlist::AllowList;
use crate::analyzer::{TemporalProfile, VolumeProfile};
use crate::config::Config;
use crate::ingest::RawFlowRecord;

/// Identity of a session. Field order defines the ranking tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionKey {
    pub src_ip: String,
    pub dst_ip: String,
    pub dst_host: String,
    pub dst_port: u16,
}

impl SessionKey {
    pub fn new(src_ip: &str, dst_ip: &str, dst_host: &str, dst_port: u16) -> Self {
        Self {
            src_ip: src_ip.to_string(),
            dst_ip: dst_ip.to_string(),
            dst_host: dst_host.to_string(),
            dst_port,
        }
    }

    fn from_record(record: &RawFlowRecord) -> Self {
        Self::new(
            &record.src_ip,
            &record.dst_ip,
            &record.dst_host,
            record.dst_port,
        )
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {} ({}):{}",
            self.src_ip, self.dst_ip, self.dst_host, self.dst_port
        )
    }
}

/// Outbound events for one destination, ordered by time.
///
/// The key and events never change once built; the analyzers only fill in
/// the derived profiles and the final score.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub timestamps: Vec<DateTime<Utc>>,
    pub sent_bytes: Vec<f64>,
    pub time: Option<TemporalProfile>,
    pub volume: Option<VolumeProfile>,
    pub score: Option<f64>,
}

impl Session {
    /// Builds a session from unordered events, sorting them by time.
    /// Equal timestamps keep their encounter order.
    pub fn from_events(key: SessionKey, mut events: Vec<(DateTime<Utc>, f64)>) -> Self {
        events.sort_by_key(|(ts, _)| *ts);
        let (timestamps, sent_bytes) = events.into_iter().unzip();

        Self {
            key,
            timestamps,
            sent_bytes,
            time: None,
            volume: None,
            score: None,
        }
    }

    pub fn event_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn first_seen(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// Seconds between the first and last event.
    pub fn total_span_secs(&self) -> i64 {
        match (self.first_seen(), self.last_seen()) {
            (Some(first), Some(last)) => last.signed_duration_since(first).num_seconds(),
            _ => 0,
        }
    }
}

/// Counters describing what the normalizer kept and removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizeStats {
    pub records_seen: usize,
    pub records_outbound: usize,
    pub sessions_grouped: usize,
    pub sessions_allow_listed: usize,
    pub sessions_too_short: usize,
    pub sessions_retained: usize,
}

/// Groups raw flow records into analyzable sessions.
pub struct SessionNormalizer<'a> {
    outbound_value: &'a str,
    allow_list: &'a AllowList,
    min_session_size: usize,
}

impl<'a> SessionNormalizer<'a> {
    pub fn new(outbound_value: &'a str, allow_list: &'a AllowList, min_session_size: usize) -> Self {
        Self {
            outbound_value,
            allow_list,
            min_session_size,
        }
    }

    pub fn from_config(config: &'a Config, allow_list: &'a AllowList) -> Self {
        Self::new(
            &config.fields.outbound_value,
            allow_list,
            config.beacon.min_session_size,
        )
    }

    /// Returns retained sessions in order of first appearance.
    pub fn normalize<I>(&self, records: I) -> (Vec<Session>, NormalizeStats)
    where
        I: IntoIterator<Item = RawFlowRecord>,
    {
        let mut stats = NormalizeStats::default();
        let mut index: HashMap<SessionKey, usize> = HashMap::new();
        let mut groups: Vec<(SessionKey, Vec<(DateTime<Utc>, f64)>)> = Vec::new();

        for record in records {
            stats.records_seen += 1;

            // Exact, case-sensitive match
            if record.direction != self.outbound_value {
                continue;
            }
            stats.records_outbound += 1;

            let key = SessionKey::from_record(&record);
            let slot = *index.entry(key.clone()).or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push((record.timestamp, record.sent_bytes));
        }

        stats.sessions_grouped = groups.len();

        let mut sessions = Vec::new();
        for (key, events) in groups {
            if self.allow_list.contains(&key.dst_ip) || self.allow_list.contains(&key.dst_host) {
                trace!("Skipping allow-listed session {}", key);
                stats.sessions_allow_listed += 1;
                continue;
            }

            if events.len() <= self.min_session_size {
                stats.sessions_too_short += 1;
                continue;
            }

            sessions.push(Session::from_events(key, events));
        }

        stats.sessions_retained = sessions.len();

        debug!(
            "Normalized {} records ({} outbound) into {} sessions: {} allow-listed, {} too short, {} retained",
            stats.records_seen,
            stats.records_outbound,
            stats.sessions_grouped,
            stats.sessions_allow_listed,
            stats.sessions_too_short,
            stats.sessions_retained
        );

        (sessions, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(secs: i64, direction: &str, dst_ip: &str, host: &str, bytes: f64) -> RawFlowRecord {
        RawFlowRecord {
            timestamp: DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
            direction: direction.to_string(),
            src_ip: "10.0.0.5".to_string(),
            dst_ip: dst_ip.to_string(),
            dst_host: host.to_string(),
            dst_port: 443,
            sent_bytes: bytes,
        }
    }

    fn burst(dst_ip: &str, count: usize) -> Vec<RawFlowRecord> {
        (0..count)
            .map(|i| record(i as i64 * 60, "Outbound", dst_ip, "c2.example", 100.0))
            .collect()
    }

    #[test]
    fn test_groups_outbound_only() {
        let mut records = burst("203.0.113.9", 3);
        records.push(record(10, "Inbound", "203.0.113.9", "c2.example", 1.0));
        records.push(record(20, "outbound", "203.0.113.9", "c2.example", 1.0));

        let allow = AllowList::default();
        let (sessions, stats) = SessionNormalizer::new("Outbound", &allow, 0).normalize(records);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].event_count(), 3);
        assert_eq!(stats.records_seen, 5);
        assert_eq!(stats.records_outbound, 3);
    }

    #[test]
    fn test_floor_is_strictly_greater() {
        let mut records = burst("198.51.100.1", 20);
        records.extend(burst("198.51.100.2", 21));

        let allow = AllowList::default();
        let (sessions, stats) = SessionNormalizer::new("Outbound", &allow, 20).normalize(records);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].key.dst_ip, "198.51.100.2");
        assert_eq!(sessions[0].event_count(), 21);
        assert_eq!(stats.sessions_too_short, 1);
    }

    #[test]
    fn test_allow_list_matches_ip_or_host() {
        let mut records = burst("198.51.100.1", 5);
        records.extend(burst("198.51.100.2", 5));
        records.extend(
            (0..5).map(|i| record(i * 60, "Outbound", "198.51.100.3", "updates.vendor", 10.0)),
        );

        let allow = AllowList::new(["198.51.100.1", "updates.vendor"]);
        let (sessions, stats) = SessionNormalizer::new("Outbound", &allow, 0).normalize(records);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].key.dst_ip, "198.51.100.2");
        assert_eq!(stats.sessions_allow_listed, 2);
    }

    #[test]
    fn test_first_seen_order_preserved() {
        let records = vec![
            record(0, "Outbound", "b", "h", 1.0),
            record(1, "Outbound", "a", "h", 1.0),
            record(2, "Outbound", "b", "h", 1.0),
            record(3, "Outbound", "c", "h", 1.0),
        ];

        let allow = AllowList::default();
        let (sessions, _) = SessionNormalizer::new("Outbound", &allow, 0).normalize(records);

        let order: Vec<&str> = sessions.iter().map(|s| s.key.dst_ip.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_events_sorted_stably() {
        let records = vec![
            record(30, "Outbound", "a", "h", 3.0),
            record(0, "Outbound", "a", "h", 1.0),
            record(30, "Outbound", "a", "h", 4.0),
            record(0, "Outbound", "a", "h", 2.0),
        ];

        let allow = AllowList::default();
        let (sessions, _) = SessionNormalizer::new("Outbound", &allow, 0).normalize(records);
        let session = &sessions[0];

        assert_eq!(session.sent_bytes, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(session.timestamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(session.event_count(), session.timestamps.len());
        assert_eq!(session.event_count(), session.sent_bytes.len());
        assert_eq!(session.total_span_secs(), 30);
    }

    #[test]
    fn test_distinct_ports_are_distinct_sessions() {
        let mut a = record(0, "Outbound", "a", "h", 1.0);
        let mut b = record(1, "Outbound", "a", "h", 1.0);
        a.dst_port = 80;
        b.dst_port = 8080;

        let allow = AllowList::default();
        let (sessions, _) = SessionNormalizer::new("Outbound", &allow, 0).normalize(vec![a, b]);
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn test_key_ordering_follows_identity_tuple() {
        let a = SessionKey::new("10.0.0.1", "9.9.9.9", "z", 443);
        let b = SessionKey::new("10.0.0.2", "1.1.1.1", "a", 80);
        let c = SessionKey::new("10.0.0.1", "9.9.9.9", "z", 8443);
        assert!(a < b);
        assert!(a < c);
        assert_eq!(a.to_string(), "10.0.0.1 -> 9.9.9.9 (z):443");
    }
}
