//! Append-only CSV logs of per-cycle node metrics

use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const THRESHOLD_LOG_FILE: &str = "node_threshold_metrics.csv";
pub const EWMA_LOG_FILE: &str = "ewma_values.csv";
pub const UTILIZATION_LOG_FILE: &str = "kworker_utilization.csv";

const THRESHOLD_HEADER: &[&str] = &["Timestamp", "Node", "CPU_Util", "EWMA_CPU", "Upper_Threshold"];
const EWMA_HEADER: &[&str] = &["Timestamp", "Node", "EWMA_CPU"];
const UTILIZATION_HEADER: &[&str] = &["Timestamp", "Node", "CPU_Util"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One node's row for a cycle
#[derive(Debug, Clone)]
pub struct NodeMetricsRow<'a> {
    pub timestamp: DateTime<Local>,
    pub node_id: &'a str,
    pub cpu_util: f64,
    pub ewma_cpu: f64,
    pub upper_threshold: f64,
}

/// Writer for the three per-cycle CSV logs
#[derive(Debug, Clone)]
pub struct MetricsLog {
    threshold_path: PathBuf,
    ewma_path: PathBuf,
    utilization_path: PathBuf,
}

impl MetricsLog {
    /// Logs using the default file names inside a data directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            threshold_path: dir.join(THRESHOLD_LOG_FILE),
            ewma_path: dir.join(EWMA_LOG_FILE),
            utilization_path: dir.join(UTILIZATION_LOG_FILE),
        }
    }

    /// Append one row to each log, writing headers for new files
    pub fn record(&self, row: &NodeMetricsRow<'_>) -> std::io::Result<()> {
        let ts = row.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let cpu = format!("{:.2}", row.cpu_util);
        let ewma = format!("{:.2}", row.ewma_cpu);
        let upper = format!("{:.2}", row.upper_threshold);

        append_row(
            &self.threshold_path,
            THRESHOLD_HEADER,
            &[&ts, row.node_id, &cpu, &ewma, &upper],
        )?;
        append_row(&self.ewma_path, EWMA_HEADER, &[&ts, row.node_id, &ewma])?;
        append_row(&self.utilization_path, UTILIZATION_HEADER, &[&ts, row.node_id, &cpu])?;
        Ok(())
    }
}

fn append_row(path: &Path, header: &[&str], fields: &[&str]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut out = String::new();
    if file.metadata()?.len() == 0 {
        push_record(&mut out, header);
    }
    push_record(&mut out, fields);
    file.write_all(out.as_bytes())
}

fn push_record(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn row(node: &str) -> NodeMetricsRow<'_> {
        NodeMetricsRow {
            timestamp: Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            node_id: node,
            cpu_util: 75.0,
            ewma_cpu: 80.456,
            upper_threshold: 45.0,
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let log = MetricsLog::in_dir(dir.path());

        log.record(&row("worker-1")).unwrap();
        log.record(&row("worker-2")).unwrap();

        let content = std::fs::read_to_string(dir.path().join(THRESHOLD_LOG_FILE)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Timestamp,Node,CPU_Util,EWMA_CPU,Upper_Threshold");
        assert_eq!(lines[1], "2024-05-01 12:30:00,worker-1,75.00,80.46,45.00");
    }

    #[test]
    fn test_all_logs_written() {
        let dir = TempDir::new().unwrap();
        let log = MetricsLog::in_dir(dir.path());

        log.record(&row("worker-1")).unwrap();

        let ewma = std::fs::read_to_string(dir.path().join(EWMA_LOG_FILE)).unwrap();
        assert_eq!(
            ewma.lines().collect::<Vec<_>>(),
            vec!["Timestamp,Node,EWMA_CPU", "2024-05-01 12:30:00,worker-1,80.46"]
        );

        let util = std::fs::read_to_string(dir.path().join(UTILIZATION_LOG_FILE)).unwrap();
        assert_eq!(
            util.lines().collect::<Vec<_>>(),
            vec!["Timestamp,Node,CPU_Util", "2024-05-01 12:30:00,worker-1,75.00"]
        );
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let mut out = String::new();
        push_record(&mut out, &["a,b", "say \"hi\"", "plain"]);
        assert_eq!(out, "\"a,b\",\"say \"\"hi\"\"\",plain\r\n");
    }
}
