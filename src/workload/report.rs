//! Stress report extraction.
//!
//! Summary lines look like `op rate : 9,421 [WRITE:9,421]`; the number right
//! after the `:` is the value. Newer tools capitalize the labels and append
//! units (`Op rate : 9,421 op/s`), both are read.

use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::ParseError;
use crate::Result;

pub const OP_RATE: &str = "op rate";
pub const LATENCY_MEAN: &str = "latency mean";
pub const LATENCY_95: &str = "latency 95th percentile";
pub const LATENCY_99: &str = "latency 99th percentile";
pub const LATENCY_999: &str = "latency 99.9th percentile";

/// Metrics of one load-generation run; latencies in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadResult {
    pub op_rate: f64,
    pub latency_mean: f64,
    pub latency_95th: f64,
    pub latency_99th: f64,
    pub latency_999th: f64,
}

impl fmt::Display for WorkloadResult {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{:.0} op/s, mean {:.2} ms, p95 {:.2} ms, p99 {:.2} ms, p99.9 {:.2} ms",
            self.op_rate, self.latency_mean, self.latency_95th, self.latency_99th, self.latency_999th
        )
    }
}

/// Judges results of the same workload under different settings.
///
/// Results are only collected and logged today; implement this to turn a
/// comparison into a verdict.
pub trait ResultComparator {
    fn compare(
        &self,
        workload: &str,
        results: &[(String, WorkloadResult)],
    ) -> Result<()>;
}

/// Reads the report file written through `-log file=<path>`.
pub async fn parse_report(path: &Path) -> Result<WorkloadResult> {
    let text = tokio::fs::read_to_string(path).await?;
    let result = parse_report_text(&text).map_err(|e| match e {
        ParseError::MissingLabel { label, .. } => ParseError::MissingLabel {
            label,
            path: Some(path.to_path_buf()),
        },
        other => other,
    })?;
    debug!(?path, %result, "stress report");
    Ok(result)
}

pub fn parse_report_text(text: &str) -> std::result::Result<WorkloadResult, ParseError> {
    Ok(WorkloadResult {
        op_rate: labelled_value(text, OP_RATE)?,
        latency_mean: labelled_value(text, LATENCY_MEAN)?,
        latency_95th: labelled_value(text, LATENCY_95)?,
        latency_99th: labelled_value(text, LATENCY_99)?,
        latency_999th: labelled_value(text, LATENCY_999)?,
    })
}

/// Number after the `:` on the first line carrying `label`.
fn labelled_value(
    text: &str,
    label: &'static str,
) -> std::result::Result<f64, ParseError> {
    let rest = text
        .lines()
        .find_map(|line| {
            line.to_ascii_lowercase()
                .find(label)
                .map(|at| line[at + label.len()..].to_string())
        })
        .ok_or(ParseError::MissingLabel { label, path: None })?;

    let invalid = |value: &str| ParseError::InvalidNumber {
        label: label.to_string(),
        value: value.to_string(),
    };
    let value = rest.trim().strip_prefix(':').ok_or_else(|| invalid(rest.trim()))?;
    let token = value.split_whitespace().next().ok_or_else(|| invalid(value))?;
    token.replace(',', "").parse::<f64>().map_err(|_| invalid(token))
}
