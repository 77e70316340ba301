//! C2-Hunter: batch detection of C2 beaconing in collected network logs.
//!
//! Two independent pipelines run over previously collected logs:
//!
//! ```text
//! flow log ──> ingest ──> session ──> analyzer ──> scoring ──> export
//!              (csv)     (group)    (time+volume)  (rank)
//!
//! DNS log  ──> ingest ──> domain (trie fan-out) ──────────────> export
//! ```
//!
//! - **Beacon pipeline**: outbound flow records are grouped into sessions,
//!   scored on inter-arrival and transfer-size dispersion, and ranked.
//! - **Domain pipeline**: unique FQDNs are aggregated into super domains at
//!   every depth so that wide, flat subdomain fan-out stands out.
//!
//! Each run is a pure batch computation; configuration is loaded once and
//! passed explicitly into every stage.

pub mod allowlist;
pub mod analyzer;
pub mod config;
pub mod dispersion;
pub mod domain;
pub mod error;
pub mod export;
pub mod ingest;
pub mod scoring;
pub mod session;

use std::io::Read;

use crate::allowlist::AllowList;
use crate::config::Config;
use crate::domain::DomainReport;
use crate::error::Result;
use crate::scoring::BeaconReport;
use crate::session::SessionNormalizer;

/// Runs the beacon pipeline over one delimited flow log.
pub fn detect_beacons<R: Read>(input: R, config: &Config, allow_list: &AllowList) -> Result<BeaconReport> {
    let log = ingest::read_flow_records(input, &config.fields)?;
    log.stats.warn_if_dropped("flow log");

    let (sessions, normalize_stats) =
        SessionNormalizer::from_config(config, allow_list).normalize(log.records);

    Ok(BeaconReport::build(sessions, normalize_stats, &config.beacon).with_ingest_stats(log.stats))
}

/// Runs the domain fan-out pipeline over one delimited DNS log.
pub fn detect_fanout<R: Read>(input: R, config: &Config, allow_list: &AllowList) -> Result<DomainReport> {
    let delimiter = config.fields.delimiter_byte()?;
    let log = ingest::read_domains(input, &config.fields.url, delimiter)?;
    log.stats.warn_if_dropped("domain log");

    Ok(DomainReport::build(&log.domains, allow_list, config.dns.fanout_floor)
        .with_ingest_stats(log.stats))
}
