//! Beacon score combination and ranking.
//!
//! The final score is the mean of the temporal and volume sub-scores. All
//! scored sessions are kept in the report; only those strictly above the
//! score floor are reported.
//!
//! Ranking is by descending score, ties broken by ascending session identity
//! (source, destination IP, destination host, destination port), so the order
//! does not depend on input order.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::analyzer::{analyze_sessions, SessionAnalyzer, TemporalAnalyzer, VolumeAnalyzer};
use crate::config::BeaconConfig;
use crate::ingest::IngestStats;
use crate::session::{NormalizeStats, Session};

/// Combines the two sub-scores of an analyzed session and stores the result.
/// Returns `None` if either analyzer has not run.
pub fn combine(session: &mut Session) -> Option<f64> {
    let ts = session.time.as_ref()?.score;
    let ds = session.volume.as_ref()?.score;
    let score = (ts + ds) / 2.0;
    session.score = Some(score);
    Some(score)
}

/// Orders sessions by descending score, then by identity.
/// Unscored sessions sort last.
pub fn rank_sessions(sessions: &mut [Session]) {
    sessions.sort_by(compare_ranked);
}

fn compare_ranked(a: &Session, b: &Session) -> Ordering {
    let sa = a.score.unwrap_or(f64::NEG_INFINITY);
    let sb = b.score.unwrap_or(f64::NEG_INFINITY);
    sb.total_cmp(&sa).then_with(|| a.key.cmp(&b.key))
}

/// Runs both analyzers, combines their scores, and ranks the sessions.
pub fn score_sessions(mut sessions: Vec<Session>, config: &BeaconConfig) -> Vec<Session> {
    let temporal = TemporalAnalyzer::from_config(config);
    let volume = VolumeAnalyzer::from_config(config);
    let analyzers: [&dyn SessionAnalyzer; 2] = [&temporal, &volume];

    analyze_sessions(&mut sessions, &analyzers);

    for session in sessions.iter_mut() {
        combine(session);
    }

    rank_sessions(&mut sessions);
    sessions
}

/// One reported line of the beacon ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeaconRow {
    pub score: f64,
    pub source: String,
    pub destination: String,
    pub host: String,
    pub port: u16,
    pub connections: usize,
    pub total_time_secs: i64,
    pub ts_score: f64,
    pub ds_score: f64,
    pub ts_skew: f64,
    pub ts_madm: f64,
    pub ds_skew: f64,
    pub ds_madm: f64,
}

impl BeaconRow {
    fn from_session(session: &Session) -> Self {
        let time = session.time.as_ref();
        let volume = session.volume.as_ref();

        Self {
            score: session.score.unwrap_or(0.0),
            source: session.key.src_ip.clone(),
            destination: session.key.dst_ip.clone(),
            host: session.key.dst_host.clone(),
            port: session.key.dst_port,
            connections: session.event_count(),
            total_time_secs: time
                .map(|t| t.total_span_secs)
                .unwrap_or_else(|| session.total_span_secs()),
            ts_score: time.map(|t| t.score).unwrap_or(0.0),
            ds_score: volume.map(|v| v.score).unwrap_or(0.0),
            ts_skew: time.map(|t| t.dispersion.bowley_skew).unwrap_or(0.0),
            ts_madm: time.map(|t| t.dispersion.madm).unwrap_or(0.0),
            ds_skew: volume.map(|v| v.dispersion.bowley_skew).unwrap_or(0.0),
            ds_madm: volume.map(|v| v.dispersion.madm).unwrap_or(0.0),
        }
    }
}

/// Ranked beacon analysis for one input.
#[derive(Debug, Clone)]
pub struct BeaconReport {
    pub timestamp: DateTime<Utc>,
    pub score_floor: f64,
    /// Every scored session, ranked
    pub sessions: Vec<Session>,
    pub normalize_stats: NormalizeStats,
    pub ingest_stats: Option<IngestStats>,
}

impl BeaconReport {
    /// Scores and ranks normalized sessions.
    pub fn build(sessions: Vec<Session>, normalize_stats: NormalizeStats, config: &BeaconConfig) -> Self {
        let sessions = score_sessions(sessions, config);

        let report = Self {
            timestamp: Utc::now(),
            score_floor: config.score_floor,
            sessions,
            normalize_stats,
            ingest_stats: None,
        };

        debug!(
            "Scored {} sessions, {} above floor {:.2}",
            report.sessions.len(),
            report.reported_count(),
            report.score_floor
        );
        if report.reported_count() > 0 {
            info!("Found {} beacon-like sessions", report.reported_count());
        }

        report
    }

    pub fn with_ingest_stats(mut self, stats: IngestStats) -> Self {
        self.ingest_stats = Some(stats);
        self
    }

    /// Sessions scoring strictly above the floor, in rank order.
    pub fn reported(&self) -> impl Iterator<Item = &Session> {
        let floor = self.score_floor;
        self.sessions
            .iter()
            .filter(move |s| s.score.is_some_and(|score| score > floor))
    }

    pub fn reported_count(&self) -> usize {
        self.reported().count()
    }

    /// Display rows for the reported sessions.
    pub fn rows(&self) -> Vec<BeaconRow> {
        self.reported().map(BeaconRow::from_session).collect()
    }
}
