//! Metrics describing how a count run was executed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::counter::{RunState, Strategy};
use crate::scan::RangeStats;

/// Aggregate metrics produced by a count run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetrics {
    /// Strategy chosen while planning.
    pub strategy: Strategy,
    /// Source size in bytes.
    pub file_size: u64,
    /// Name of the encoding used to decode the source.
    pub encoding: String,
    /// Per-range coverage; empty for direct reads.
    pub ranges: Vec<RangeStats>,
    /// States the run passed through, in order.
    pub states: Vec<RunState>,
    /// Number of distinct tokens counted.
    pub distinct_tokens: usize,
    /// Total number of tokens counted.
    pub total_tokens: u64,
    /// Time spent in the scanning stage.
    pub scan_duration: Duration,
    /// Total duration of the run, including planning and output.
    pub total_duration: Duration,
    /// Resident set size sample captured from `/proc/self/status` on Linux after scanning.
    pub rss_kb: Option<usize>,
}

impl RunMetrics {
    /// Creates metrics for a planned run with no scan results yet.
    #[must_use]
    pub fn new(strategy: Strategy, file_size: u64, encoding: impl Into<String>) -> Self {
        Self {
            strategy,
            file_size,
            encoding: encoding.into(),
            ranges: Vec::new(),
            states: Vec::new(),
            distinct_tokens: 0,
            total_tokens: 0,
            scan_duration: Duration::ZERO,
            total_duration: Duration::ZERO,
            rss_kb: None,
        }
    }

    /// Scan throughput in MiB/s, `0.0` when the scan took no measurable time.
    #[must_use]
    pub fn throughput_mib_s(&self) -> f64 {
        let secs = self.scan_duration.as_secs_f64();
        if secs > 0.0 {
            self.file_size as f64 / (1024.0 * 1024.0) / secs
        } else {
            0.0
        }
    }
}

#[cfg(target_os = "linux")]
fn current_rss_kb() -> Option<usize> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open("/proc/self/status").ok()?;
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let value = rest
                .split_whitespace()
                .find_map(|part| part.parse::<usize>().ok());
            return value;
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn current_rss_kb() -> Option<usize> {
    None
}

/// Samples the current resident set size (RSS) on supported platforms.
pub fn sample_rss_kb() -> Option<usize> {
    current_rss_kb()
}
