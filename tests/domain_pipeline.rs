use std::io::Write;

use c2_hunter::allowlist::AllowList;
use c2_hunter::config::Config;
use c2_hunter::detect_fanout;
use c2_hunter::export::{export_domain_report, OutputFormat};
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
[fields]
timestamp = "Log Date"
direction = "Direction"
src_ip = "IP Address (Origin)"
dst_ip = "IP Address (Impacted)"
dst_host = "Host (Impacted)"
dst_port = "TCP/UDP Port (Impacted)"
sent_bytes = "Host (Impacted) KBytes Rcvd"
url = "query"
delimiter = ","
outbound_value = "Outbound"

[beacon]
min_session_size = 20
jitter_seconds = 30.0
jitter_bytes = 32.0
max_transfer_bytes = 65535.0
score_floor = 0.8

[dns]
fanout_floor = 2
"#;

const DNS_LOG: &str = "\
time,query,type
1,a.evil.com,A
2,b.evil.com,A
3,c.evil.com,TXT
4,d.evil.com,TXT
5,a.evil.com,A
6,www.google.com,A
7,mail.google.com,MX
8,x.y.z.example.org,A
9,,A
";

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn load_config() -> Config {
    let file = write_temp(CONFIG);
    let loaded = Config::load(file.path(), true).unwrap();
    assert!(loaded.defaulted.is_empty());
    loaded.config
}

#[test]
fn wide_parent_is_reported() {
    let config = load_config();
    let report = detect_fanout(DNS_LOG.as_bytes(), &config, &AllowList::default()).unwrap();

    assert_eq!(report.unique_domains, 7);

    let reported: Vec<_> = report.reported().collect();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].domain, "evil");
    assert_eq!(reported[0].fanout, 4);
    assert_eq!(reported[0].depth, 0);
    assert_eq!(reported[0].representative, "a.evil.com");

    // Retained below the floor.
    assert_eq!(report.get("google").unwrap().fanout, 2);
    assert_eq!(report.get("z.example").unwrap().fanout, 1);
    assert_eq!(report.get("x.y.z.example").unwrap().depth, 3);

    let ingest = report.ingest_stats.as_ref().unwrap();
    assert_eq!(ingest.rows_read, 9);
    assert_eq!(ingest.rows_dropped, 1);
}

#[test]
fn allow_list_file_removes_groups_without_recounting() {
    let config = load_config();
    let allow = write_temp("# trusted\nevil\n");
    let allow_list = AllowList::load(allow.path()).unwrap();

    let report = detect_fanout(DNS_LOG.as_bytes(), &config, &allow_list).unwrap();

    assert!(report.get("evil").is_none());
    assert_eq!(report.allow_listed, 1);
    assert_eq!(report.reported_count(), 0);
    // Children of an allow-listed parent keep their counts.
    assert_eq!(report.get("a.evil").unwrap().fanout, 1);
}

#[test]
fn json_allow_list_is_accepted() {
    let config = load_config();
    let allow = write_temp(r#"["google", "example"]"#);
    let allow_list = AllowList::load(allow.path()).unwrap();

    let report = detect_fanout(DNS_LOG.as_bytes(), &config, &allow_list).unwrap();
    assert_eq!(report.allow_listed, 2);
    assert!(report.get("google").is_none());
    assert!(report.get("www.google").is_some());
}

#[test]
fn strict_mode_rejects_incomplete_config() {
    let file = write_temp("[dns]\nfanout_floor = 5\n");

    let err = Config::load(file.path(), true).unwrap_err();
    assert!(format!("{:#}", err).contains("fields.timestamp"), "{:#}", err);

    let loaded = Config::load(file.path(), false).unwrap();
    assert_eq!(loaded.config.dns.fanout_floor, 5);
    assert_eq!(loaded.config.fields.url, "Domain (Impacted)");
    assert!(loaded.defaulted.contains(&"beacon.score_floor".to_string()));
}

#[test]
fn missing_domain_column_is_fatal() {
    let err = detect_fanout(DNS_LOG.as_bytes(), &Config::default(), &AllowList::default())
        .unwrap_err();
    assert!(err.to_string().contains("Domain (Impacted)"), "{}", err);
}

#[test]
fn jsonl_export_has_summary_then_domains() {
    let config = load_config();
    let report = detect_fanout(DNS_LOG.as_bytes(), &config, &AllowList::default()).unwrap();

    let jsonl = export_domain_report(&report, OutputFormat::JsonLines);
    let lines: Vec<serde_json::Value> = jsonl
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "summary");
    assert_eq!(lines[0]["fanout_floor"], 2);
    assert_eq!(lines[1]["domain"], "evil");
}
