//! Session analysis - temporal and volume dispersion scoring.
//!
//! Each analyzer reads a [`Session`]'s events and attaches a profile with its
//! statistics and a beacon sub-score. Scores trend towards 1.0 for
//! machine-like, periodic, low-volume traffic.
//!
//! # Statistical Methodology
//!
//! ## Delta Calculation
//! For a series of timestamps [t₀, t₁, t₂, ..., tₙ], we calculate the intervals:
//! Δᵢ = tᵢ - tᵢ₋₁ for i ∈ [1, n], in whole seconds.
//!
//! ## Temporal Sub-Score
//! - skew score    = 1 - |Bowley skew of Δ|
//! - jitter score  = max(0, 1 - MADM(Δ) / jitter_seconds)
//! - density score = min(1, event count / total span)
//! - tsScore       = mean of the three
//!
//! ## Volume Sub-Score
//! - skew score      = 1 - |Bowley skew of bytes|
//! - jitter score    = max(0, 1 - MADM(bytes) / jitter_bytes)
//! - smallness score = max(0, 1 - median(bytes) / max_transfer_bytes)
//! - dsScore         = mean of the three
//!
//! Skew scores are not clamped to [0, 1].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::BeaconConfig;
use crate::dispersion::Dispersion;
use crate::session::Session;

/// Trait for per-session dispersion analysis.
/// Implementations extend the session in place and never touch its events.
pub trait SessionAnalyzer {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Analyzes one session, attaching the resulting profile.
    fn analyze(&self, session: &mut Session);
}

/// Inter-arrival statistics and timing sub-score for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalProfile {
    pub deltas: Vec<f64>,
    pub dispersion: Dispersion,
    pub total_span_secs: i64,
    pub skew_score: f64,
    pub jitter_score: f64,
    pub density_score: f64,
    pub score: f64,
}

/// Transfer-size statistics and volume sub-score for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeProfile {
    pub dispersion: Dispersion,
    pub skew_score: f64,
    pub jitter_score: f64,
    pub smallness_score: f64,
    pub score: f64,
}

/// Converts timestamps to interval deltas in whole seconds.
pub fn timestamps_to_deltas(timestamps: &[DateTime<Utc>]) -> Vec<f64> {
    if timestamps.len() < 2 {
        return Vec::new();
    }

    timestamps
        .windows(2)
        .map(|window| {
            let delta = window[1].signed_duration_since(window[0]);
            delta.num_seconds() as f64
        })
        .collect()
}

/// 1 - |skew|, unclamped.
fn skew_score(skew: f64) -> f64 {
    1.0 - skew.abs()
}

/// Falls linearly from 1.0 at zero spread to 0.0 at `threshold`.
fn jitter_score(madm: f64, threshold: f64) -> f64 {
    f64::max(0.0, 1.0 - madm / threshold)
}

/// Events per second of observed span, capped at 1.0.
/// A zero span counts as maximally dense.
fn density_score(event_count: usize, total_span_secs: i64) -> f64 {
    if total_span_secs <= 0 {
        return 1.0;
    }
    f64::min(1.0, event_count as f64 / total_span_secs as f64)
}

/// Scores the regularity of connection timing.
#[derive(Debug, Clone)]
pub struct TemporalAnalyzer {
    jitter_seconds: f64,
}

impl TemporalAnalyzer {
    pub fn new(jitter_seconds: f64) -> Self {
        Self { jitter_seconds }
    }

    pub fn from_config(config: &BeaconConfig) -> Self {
        Self::new(config.jitter_seconds)
    }

    /// Computes the temporal profile without attaching it.
    pub fn profile(&self, session: &Session) -> TemporalProfile {
        let deltas = timestamps_to_deltas(&session.timestamps);
        let dispersion = Dispersion::of(&deltas);
        let total_span_secs = session.total_span_secs();

        let skew_score = skew_score(dispersion.bowley_skew);
        let jitter_score = jitter_score(dispersion.madm, self.jitter_seconds);
        let density_score = density_score(session.event_count(), total_span_secs);
        let score = (skew_score + jitter_score + density_score) / 3.0;

        TemporalProfile {
            deltas,
            dispersion,
            total_span_secs,
            skew_score,
            jitter_score,
            density_score,
            score,
        }
    }
}

impl Default for TemporalAnalyzer {
    fn default() -> Self {
        Self::from_config(&BeaconConfig::default())
    }
}

impl SessionAnalyzer for TemporalAnalyzer {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn analyze(&self, session: &mut Session) {
        let profile = self.profile(session);
        trace!(
            "{}: skew={:.4} madm={:.2}s span={}s tsScore={:.4}",
            session.key,
            profile.dispersion.bowley_skew,
            profile.dispersion.madm,
            profile.total_span_secs,
            profile.score
        );
        session.time = Some(profile);
    }
}

/// Scores the uniformity and size of per-connection transfers.
#[derive(Debug, Clone)]
pub struct VolumeAnalyzer {
    jitter_bytes: f64,
    max_transfer_bytes: f64,
}

impl VolumeAnalyzer {
    pub fn new(jitter_bytes: f64, max_transfer_bytes: f64) -> Self {
        Self {
            jitter_bytes,
            max_transfer_bytes,
        }
    }

    pub fn from_config(config: &BeaconConfig) -> Self {
        Self::new(config.jitter_bytes, config.max_transfer_bytes)
    }

    /// Computes the volume profile without attaching it.
    pub fn profile(&self, session: &Session) -> VolumeProfile {
        let dispersion = Dispersion::of(&session.sent_bytes);

        let skew_score = skew_score(dispersion.bowley_skew);
        let jitter_score = jitter_score(dispersion.madm, self.jitter_bytes);
        let smallness_score = f64::max(0.0, 1.0 - dispersion.q2 / self.max_transfer_bytes);
        let score = (skew_score + jitter_score + smallness_score) / 3.0;

        VolumeProfile {
            dispersion,
            skew_score,
            jitter_score,
            smallness_score,
            score,
        }
    }
}

impl Default for VolumeAnalyzer {
    fn default() -> Self {
        Self::from_config(&BeaconConfig::default())
    }
}

impl SessionAnalyzer for VolumeAnalyzer {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn analyze(&self, session: &mut Session) {
        let profile = self.profile(session);
        trace!(
            "{}: skew={:.4} madm={:.2}B median={:.1}B dsScore={:.4}",
            session.key,
            profile.dispersion.bowley_skew,
            profile.dispersion.madm,
            profile.dispersion.q2,
            profile.score
        );
        session.volume = Some(profile);
    }
}

/// Runs every analyzer over every session.
pub fn analyze_sessions(sessions: &mut [Session], analyzers: &[&dyn SessionAnalyzer]) {
    for analyzer in analyzers {
        debug!("Running {} analysis on {} sessions", analyzer.name(), sessions.len());
        for session in sessions.iter_mut() {
            analyzer.analyze(session);
        }
    }
}
