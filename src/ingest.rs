//! Log Ingestion Module
//!
//! Reads delimited flow logs and DNS logs using the configured column mapping.
//! Every mapped column must exist in the header; a missing column aborts the
//! read with [`IngestError::MissingColumn`]. Individual rows with an empty,
//! non-UTF-8 or unparsable required field are dropped and counted per field in
//! [`IngestStats`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use csv::{ByteRecord, ReaderBuilder, StringRecord};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::FieldMapping;
use crate::error::IngestError;

/// Timestamp layouts accepted besides RFC 3339 and Unix seconds.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

/// One row of a flow log after column mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFlowRecord {
    pub timestamp: DateTime<Utc>,
    pub direction: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub dst_host: String,
    pub dst_port: u16,
    pub sent_bytes: f64,
}

/// Row accounting for one input file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestStats {
    pub rows_read: usize,
    pub rows_accepted: usize,
    pub rows_dropped: usize,
    /// Rows dropped, keyed by the first offending field
    pub dropped_by_field: BTreeMap<&'static str, usize>,
}

impl IngestStats {
    fn drop_row(&mut self, field: &'static str) {
        self.rows_dropped += 1;
        *self.dropped_by_field.entry(field).or_insert(0) += 1;
    }

    /// Logs a warning if any rows were dropped.
    pub fn warn_if_dropped(&self, source: &str) {
        if self.rows_dropped > 0 {
            warn!(
                "{}: dropped {} of {} rows with missing or unparsable fields ({:?})",
                source, self.rows_dropped, self.rows_read, self.dropped_by_field
            );
        }
    }
}

/// Flow records read from one input, with row accounting.
#[derive(Debug, Clone, Default)]
pub struct FlowLog {
    pub records: Vec<RawFlowRecord>,
    pub stats: IngestStats,
}

/// Domain names read from one input, with row accounting.
#[derive(Debug, Clone, Default)]
pub struct DomainLog {
    pub domains: Vec<String>,
    pub stats: IngestStats,
}

/// Opens an input file, mapping failures to [`IngestError::Open`].
pub fn open_input(path: &Path) -> Result<File, IngestError> {
    File::open(path).map_err(|source| IngestError::Open {
        path: path.display().to_string(),
        source,
    })
}

/// Resolved column indices for the flow-log fields.
struct FlowColumns {
    timestamp: usize,
    direction: usize,
    src_ip: usize,
    dst_ip: usize,
    dst_host: usize,
    dst_port: usize,
    sent_bytes: usize,
}

impl FlowColumns {
    fn resolve(headers: &StringRecord, fields: &FieldMapping) -> Result<Self, IngestError> {
        Ok(Self {
            timestamp: column_index(headers, "timestamp", &fields.timestamp)?,
            direction: column_index(headers, "direction", &fields.direction)?,
            src_ip: column_index(headers, "src_ip", &fields.src_ip)?,
            dst_ip: column_index(headers, "dst_ip", &fields.dst_ip)?,
            dst_host: column_index(headers, "dst_host", &fields.dst_host)?,
            dst_port: column_index(headers, "dst_port", &fields.dst_port)?,
            sent_bytes: column_index(headers, "sent_bytes", &fields.sent_bytes)?,
        })
    }
}

fn column_index(
    headers: &StringRecord,
    field: &'static str,
    column: &str,
) -> Result<usize, IngestError> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == column)
        .ok_or_else(|| IngestError::MissingColumn {
            field,
            column: column.to_string(),
        })
}

/// Returns the trimmed value of a column, or `None` if absent, empty or not
/// valid UTF-8.
fn field(record: &ByteRecord, index: usize) -> Option<&str> {
    record
        .get(index)
        .and_then(|raw| std::str::from_utf8(raw).ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Reads every flow record from a delimited log.
pub fn read_flow_records<R: Read>(reader: R, fields: &FieldMapping) -> Result<FlowLog, IngestError> {
    let delimiter = fields
        .delimiter_byte()
        .map_err(|_| IngestError::InvalidDelimiter(fields.delimiter.clone()))?;

    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let columns = FlowColumns::resolve(&headers, fields)?;

    let mut log = FlowLog::default();

    // Byte records only fail on I/O; field encoding is checked per row.
    for result in rdr.byte_records() {
        let record = result?;
        log.stats.rows_read += 1;

        match parse_flow_record(&record, &columns) {
            Ok(flow) => {
                log.stats.rows_accepted += 1;
                log.records.push(flow);
            }
            Err(bad_field) => {
                trace!("Dropping row {}: bad field '{}'", log.stats.rows_read, bad_field);
                log.stats.drop_row(bad_field);
            }
        }
    }

    debug!(
        "Read {} flow rows: {} accepted, {} dropped",
        log.stats.rows_read, log.stats.rows_accepted, log.stats.rows_dropped
    );

    Ok(log)
}

/// Parses one row, returning the name of the first unusable field on failure.
fn parse_flow_record(
    record: &ByteRecord,
    columns: &FlowColumns,
) -> Result<RawFlowRecord, &'static str> {
    let timestamp = field(record, columns.timestamp)
        .and_then(parse_timestamp)
        .ok_or("timestamp")?;
    let direction = field(record, columns.direction).ok_or("direction")?;
    let src_ip = field(record, columns.src_ip).ok_or("src_ip")?;
    let dst_ip = field(record, columns.dst_ip).ok_or("dst_ip")?;
    let dst_host = field(record, columns.dst_host).ok_or("dst_host")?;
    let dst_port = field(record, columns.dst_port)
        .and_then(|v| v.parse::<u16>().ok())
        .ok_or("dst_port")?;
    let sent_bytes = field(record, columns.sent_bytes)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or("sent_bytes")?;

    Ok(RawFlowRecord {
        timestamp,
        direction: direction.to_string(),
        src_ip: src_ip.to_string(),
        dst_ip: dst_ip.to_string(),
        dst_host: dst_host.to_string(),
        dst_port,
        sent_bytes,
    })
}

/// Parses a log timestamp, truncated to whole seconds.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(secs) = value.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc).trunc_subsecs(0));
    }

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc().trunc_subsecs(0))
}

/// Reads the domain column from a delimited DNS log.
pub fn read_domains<R: Read>(reader: R, column: &str, delimiter: u8) -> Result<DomainLog, IngestError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let index = column_index(&headers, "url", column)?;

    let mut log = DomainLog::default();

    for result in rdr.byte_records() {
        let record = result?;
        log.stats.rows_read += 1;

        match field(&record, index) {
            Some(domain) => {
                log.stats.rows_accepted += 1;
                log.domains.push(domain.to_string());
            }
            None => log.stats.drop_row("url"),
        }
    }

    debug!(
        "Read {} domain rows: {} accepted, {} dropped",
        log.stats.rows_read, log.stats.rows_accepted, log.stats.rows_dropped
    );

    Ok(log)
}
