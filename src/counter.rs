//! Orchestration of a count run: planning, scanning, merging, formatting, and output.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use std::{fmt, path::Path};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::CountConfig;
use crate::encoding::{EncodingDetector, SampleDetector, TextEncoding};
use crate::error::{Result, WcError};
use crate::metrics::{sample_rss_kb, RunMetrics};
use crate::plan::{plan_ranges, ByteRange};
use crate::progress::{NoProgress, ProgressSink};
use crate::report::Report;
use crate::scan::{scan_direct, scan_source_range, RangeOutcome, ScanContext};
use crate::source::SourceFile;
use crate::tally::aggregate;

/// Bytes per range the size heuristic aims for when no worker count is configured.
pub const TARGET_RANGE_SIZE: u64 = 4 * 1024 * 1024;

/// How the source is scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Whole file read and decoded in one operation.
    Direct,
    /// One line-by-line scan over the whole file on the calling thread.
    Sequential,
    /// `workers` byte ranges scanned concurrently.
    Parallel {
        /// Number of byte ranges.
        workers: usize,
    },
}

impl Strategy {
    /// Worker count in the `workers` option's terms (`0` direct, `1` sequential).
    #[must_use]
    pub fn workers(&self) -> usize {
        match self {
            Strategy::Direct => 0,
            Strategy::Sequential => 1,
            Strategy::Parallel { workers } => *workers,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Direct => f.write_str("direct"),
            Strategy::Sequential => f.write_str("sequential"),
            Strategy::Parallel { workers } => write!(f, "parallel ({workers} ranges)"),
        }
    }
}

/// Stage of a count run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not started.
    Idle,
    /// Validating the source, resolving the encoding, choosing a strategy.
    Planning,
    /// Scanners are producing partial tallies.
    Scanning,
    /// Partial tallies are being combined.
    Merging,
    /// The merged tally is being ordered into a report.
    Formatting,
    /// The report is complete (and written, when a destination is configured).
    Done,
    /// A stage failed; nothing was written.
    Failed,
}

/// Outcome of the planning stage.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Validated source file.
    pub source: SourceFile,
    /// Encoding used for decoding and for the written report.
    pub encoding: TextEncoding,
    /// Selected scanning strategy.
    pub strategy: Strategy,
    /// Ranges to scan; empty for direct reads.
    pub ranges: Vec<ByteRange>,
}

/// Artifacts returned after a count run completes.
#[must_use]
#[derive(Debug, Clone)]
pub struct CountArtifacts {
    /// Ordered token frequencies.
    pub report: Report,
    /// Details about how the run was executed.
    pub metrics: RunMetrics,
}

/// Picks the scanning strategy for a source of `size` bytes.
///
/// Sources smaller than `max_direct_read_size` are always read directly.  Otherwise an explicit
/// worker count maps `0` to direct, `1` to sequential and anything larger to that many parallel
/// ranges; without one, [`default_workers`] decides.
#[must_use]
pub fn choose_strategy(size: u64, workers: Option<usize>, max_direct_read_size: u64) -> Strategy {
    if size < max_direct_read_size {
        return Strategy::Direct;
    }
    match workers {
        Some(0) => Strategy::Direct,
        Some(1) => Strategy::Sequential,
        Some(workers) => Strategy::Parallel { workers },
        None => Strategy::Parallel {
            workers: default_workers(size),
        },
    }
}

/// Range count used when none is configured: one range per [`TARGET_RANGE_SIZE`] bytes, at
/// least two and at most four per rayon thread.
#[must_use]
pub fn default_workers(size: u64) -> usize {
    let ceiling = rayon::current_num_threads().saturating_mul(4).max(2);
    let by_size = usize::try_from(size.div_ceil(TARGET_RANGE_SIZE)).unwrap_or(usize::MAX);
    by_size.clamp(2, ceiling)
}

/// High-level façade configuring and executing count runs.
#[derive(Clone)]
pub struct WordCounter {
    cfg: CountConfig,
    detector: Arc<dyn EncodingDetector>,
    progress: Arc<dyn ProgressSink>,
}

impl fmt::Debug for WordCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordCounter")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl WordCounter {
    /// Creates a counter with sample-based encoding detection and no progress reporting.
    #[must_use]
    pub fn new(cfg: CountConfig) -> Self {
        Self {
            cfg,
            detector: Arc::new(SampleDetector),
            progress: Arc::new(NoProgress),
        }
    }

    /// Replaces the encoding detector consulted when no encoding is configured.
    #[must_use]
    pub fn with_detector<D: EncodingDetector + 'static>(mut self, detector: D) -> Self {
        self.detector = Arc::new(detector);
        self
    }

    /// Installs a progress sink shared by every scanner of a run.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Returns an immutable reference to the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &CountConfig {
        &self.cfg
    }

    /// Runs the planning stage only: validates the source, resolves the encoding and chooses a
    /// strategy and its ranges.
    pub fn plan(&self) -> Result<RunPlan> {
        self.cfg.validate()?;
        let source = SourceFile::open(&self.cfg.source)?;
        let encoding = self.resolve_encoding(&source)?;
        let strategy = choose_strategy(
            source.size(),
            self.cfg.workers,
            self.cfg.max_direct_read_size,
        );
        let ranges = match strategy {
            Strategy::Direct => Vec::new(),
            Strategy::Sequential => vec![ByteRange::whole(source.size())],
            Strategy::Parallel { workers } => plan_ranges(source.size(), workers)?,
        };
        debug!(
            "planned {} ({} bytes, {}) as {}",
            source.path().display(),
            source.size(),
            encoding,
            strategy
        );
        Ok(RunPlan {
            source,
            encoding,
            strategy,
            ranges,
        })
    }

    /// Counts the configured source.
    ///
    /// When a destination is configured the report is written there only after every stage has
    /// succeeded; on failure nothing is written and the first error is returned.
    pub fn run(&self) -> Result<CountArtifacts> {
        let mut trace = StateTrace::new();
        match self.execute(&mut trace) {
            Ok(artifacts) => Ok(artifacts),
            Err(err) => {
                let failed_during = trace.fail();
                warn!(
                    "count of {} failed during {:?} (states {:?}): {err}",
                    self.cfg.source.display(),
                    failed_during,
                    trace.states
                );
                Err(err)
            }
        }
    }

    fn execute(&self, trace: &mut StateTrace) -> Result<CountArtifacts> {
        let run_start = Instant::now();

        trace.enter(RunState::Planning);
        let plan = self.plan()?;
        let mut metrics = RunMetrics::new(plan.strategy, plan.source.size(), plan.encoding.name());

        trace.enter(RunState::Scanning);
        let scan_start = Instant::now();
        let ctx = ScanContext {
            encoding: plan.encoding,
            progress: self.progress.as_ref(),
        };
        let partials = match plan.strategy {
            Strategy::Direct => vec![guard_worker("direct read", || {
                scan_direct(&plan.source, &ctx)
            })?],
            Strategy::Sequential | Strategy::Parallel { .. } => {
                let outcomes = self.scan_ranges(&plan, &ctx)?;
                let mut partials = Vec::with_capacity(outcomes.len());
                for outcome in outcomes {
                    debug!(
                        "range {} scanned [{}, {}): {} lines, {} distinct tokens",
                        outcome.stats.range,
                        outcome.stats.scan_start,
                        outcome.stats.scan_end,
                        outcome.stats.lines,
                        outcome.tally.len()
                    );
                    metrics.ranges.push(outcome.stats);
                    partials.push(outcome.tally);
                }
                partials
            }
        };
        metrics.scan_duration = scan_start.elapsed();
        metrics.rss_kb = sample_rss_kb();

        trace.enter(RunState::Merging);
        let tally = aggregate(partials);
        metrics.distinct_tokens = tally.len();
        metrics.total_tokens = tally.total();

        trace.enter(RunState::Formatting);
        let report = Report::from_tally(tally);
        if let Some(destination) = &self.cfg.destination {
            self.write_report(&report, destination, plan.encoding)?;
        }

        trace.enter(RunState::Done);
        metrics.states = trace.states.clone();
        metrics.total_duration = run_start.elapsed();

        if self.cfg.show_progress {
            info!(
                "counted {} tokens ({} distinct) in {} bytes using {} in {:.2?}",
                metrics.total_tokens,
                metrics.distinct_tokens,
                metrics.file_size,
                metrics.strategy,
                metrics.total_duration
            );
        }

        Ok(CountArtifacts { report, metrics })
    }

    fn resolve_encoding(&self, source: &SourceFile) -> Result<TextEncoding> {
        if let Some(label) = &self.cfg.encoding {
            return TextEncoding::for_label(label);
        }
        let (sample, complete) = source.read_sample(self.cfg.sample_size)?;
        let encoding = self.detector.detect(&sample, complete);
        debug!(
            "detected {} from {} byte sample of {}",
            encoding,
            sample.len(),
            source.path().display()
        );
        Ok(encoding)
    }

    fn scan_ranges(&self, plan: &RunPlan, ctx: &ScanContext<'_>) -> Result<Vec<RangeOutcome>> {
        if let [range] = plan.ranges.as_slice() {
            return scan_worker(&plan.source, *range, ctx).map(|outcome| vec![outcome]);
        }
        plan.ranges
            .par_iter()
            .map(|&range| scan_worker(&plan.source, range, ctx))
            .collect()
    }

    fn write_report(&self, report: &Report, path: &Path, encoding: TextEncoding) -> Result<()> {
        report.write_encoded(path, encoding)?;
        debug!(
            "wrote {} entries to {} as {}",
            report.len(),
            path.display(),
            encoding
        );
        Ok(())
    }
}

/// Runs one range scan, turning a panic into a [`WcError::WorkerFailure`].
fn scan_worker(
    source: &SourceFile,
    range: ByteRange,
    ctx: &ScanContext<'_>,
) -> Result<RangeOutcome> {
    guard_worker(format!("range {range}"), || {
        scan_source_range(source, range, ctx)
    })
}

fn guard_worker<T>(
    label: impl fmt::Display,
    work: impl FnOnce() -> Result<T>,
) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(WcError::WorkerFailure(format!("{label} panicked: {message}")))
    })
}

struct StateTrace {
    states: Vec<RunState>,
}

impl StateTrace {
    fn new() -> Self {
        Self {
            states: vec![RunState::Idle],
        }
    }

    fn current(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Idle)
    }

    fn enter(&mut self, next: RunState) {
        debug!("{:?} -> {:?}", self.current(), next);
        self.states.push(next);
    }

    /// Moves to [`RunState::Failed`], returning the state that failed.
    fn fail(&mut self) -> RunState {
        let failed_during = self.current();
        self.enter(RunState::Failed);
        failed_during
    }
}

impl fmt::Display for CountArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Strategy: {}", self.metrics.strategy)?;
        writeln!(f, "Encoding: {}", self.metrics.encoding)?;
        writeln!(f, "Distinct tokens: {}", self.metrics.distinct_tokens)?;
        writeln!(f, "Total duration: {:?}", self.metrics.total_duration)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::FixedDetector;
    use crate::progress::ByteCounter;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn write_source(contents: &[u8]) -> (TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.txt");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn counter(path: &Path, workers: Option<usize>) -> WordCounter {
        let cfg = CountConfig::builder()
            .source(path)
            .workers(workers)
            .max_direct_read_size(0)
            .show_progress(false)
            .build()
            .unwrap();
        WordCounter::new(cfg)
    }

    #[test]
    fn strategy_follows_worker_count() {
        assert_eq!(choose_strategy(100, Some(0), 0), Strategy::Direct);
        assert_eq!(choose_strategy(100, Some(1), 0), Strategy::Sequential);
        assert_eq!(
            choose_strategy(100, Some(6), 0),
            Strategy::Parallel { workers: 6 }
        );
    }

    #[test]
    fn small_sources_are_read_directly() {
        assert_eq!(choose_strategy(99, Some(8), 100), Strategy::Direct);
        assert_eq!(choose_strategy(99, None, 100), Strategy::Direct);
        assert_eq!(
            choose_strategy(100, Some(8), 100),
            Strategy::Parallel { workers: 8 }
        );
    }

    #[test]
    fn default_workers_scale_with_size() {
        let ceiling = (rayon::current_num_threads() * 4).max(2);
        assert_eq!(default_workers(0), 2);
        assert_eq!(default_workers(1), 2);
        assert_eq!(default_workers(TARGET_RANGE_SIZE * 3), 3.min(ceiling).max(2));
        assert_eq!(default_workers(u64::MAX), ceiling);
    }

    #[test]
    fn every_strategy_produces_the_same_report() {
        let text = "她他你\n我 它\n\n他她\t她\n你".repeat(50);
        let (_dir, path) = write_source(text.as_bytes());
        let expected = counter(&path, Some(0)).run().unwrap().report;
        assert_eq!(expected.total(), 450);
        for workers in [1, 2, 3, 7, 64, 1000] {
            let artifacts = counter(&path, Some(workers)).run().unwrap();
            assert_eq!(artifacts.report, expected, "workers = {workers}");
            assert_eq!(artifacts.metrics.strategy.workers(), workers);
        }
    }

    #[test]
    fn successful_run_records_state_trace_and_ranges() {
        let (_dir, path) = write_source(b"a\nb\nc\nd\n");
        let artifacts = counter(&path, Some(3)).run().unwrap();
        assert_eq!(
            artifacts.metrics.states,
            vec![
                RunState::Idle,
                RunState::Planning,
                RunState::Scanning,
                RunState::Merging,
                RunState::Formatting,
                RunState::Done,
            ]
        );
        assert_eq!(artifacts.metrics.ranges.len(), 3);
        let scanned: u64 = artifacts
            .metrics
            .ranges
            .iter()
            .map(|stats| stats.bytes_scanned())
            .sum();
        assert_eq!(scanned, 8);
        assert_eq!(artifacts.metrics.total_tokens, 4);
    }

    #[test]
    fn missing_source_fails_before_scanning() {
        let dir = tempdir().unwrap();
        let err = counter(&dir.path().join("absent.txt"), Some(2))
            .run()
            .expect_err("source is missing");
        assert!(matches!(err, WcError::SourceNotFound { .. }));
    }

    #[test]
    fn decode_failure_writes_nothing() {
        let (dir, path) = write_source(b"fine\nbroken \xfe\xff\nfine\n");
        let destination = dir.path().join("report.txt");
        for workers in [0, 1, 2, 4] {
            let cfg = CountConfig::builder()
                .source(&path)
                .destination(Some(destination.clone()))
                .workers(Some(workers))
                .encoding(Some("utf-8"))
                .max_direct_read_size(0)
                .show_progress(false)
                .build()
                .unwrap();
            let err = WordCounter::new(cfg).run().expect_err("decode must fail");
            assert!(matches!(err, WcError::Decode { .. }), "workers = {workers}");
            assert!(!destination.exists());
        }
    }

    #[test]
    fn destination_receives_encoded_report() {
        let gbk = TextEncoding::for_label("gbk").unwrap();
        let (dir, path) = write_source(&gbk.encode("你我\n你\n").unwrap());
        let destination = dir.path().join("report.txt");
        let cfg = CountConfig::builder()
            .source(&path)
            .destination(Some(destination.clone()))
            .workers(Some(2))
            .max_direct_read_size(0)
            .show_progress(false)
            .build()
            .unwrap();
        let artifacts = WordCounter::new(cfg)
            .with_detector(FixedDetector(gbk))
            .run()
            .unwrap();
        assert_eq!(artifacts.metrics.encoding, "GBK");
        let written = fs::read(&destination).unwrap();
        assert_eq!(gbk.decode(&written, 0).unwrap(), "你: 2\n我: 1");
    }

    #[test]
    fn progress_sink_sees_every_byte() {
        let text = "line one\nline two\nline three\n".repeat(100);
        let (_dir, path) = write_source(text.as_bytes());
        let sink = Arc::new(ByteCounter::default());
        counter(&path, Some(5))
            .with_progress(sink.clone())
            .run()
            .unwrap();
        assert_eq!(sink.scanned(), text.len() as u64);
    }

    struct ExplodingSink;

    impl ProgressSink for ExplodingSink {
        fn advance(&self, _bytes: u64) {
            panic!("sink exploded");
        }
    }

    #[derive(Default)]
    struct ExplodeOnce {
        fired: AtomicBool,
    }

    impl ProgressSink for ExplodeOnce {
        fn advance(&self, _bytes: u64) {
            if !self.fired.swap(true, Ordering::SeqCst) {
                panic!("sink exploded once");
            }
        }
    }

    #[test]
    fn panicking_worker_becomes_worker_failure() {
        let (dir, path) = write_source(b"ab\ncd\nef\ngh\n");
        let destination = dir.path().join("report.txt");
        let sinks: [fn() -> Arc<dyn ProgressSink>; 2] = [
            || -> Arc<dyn ProgressSink> { Arc::new(ExplodingSink) },
            || -> Arc<dyn ProgressSink> { Arc::new(ExplodeOnce::default()) },
        ];
        for make_sink in sinks {
            for workers in [0, 1, 2, 3] {
                let cfg = CountConfig::builder()
                    .source(&path)
                    .destination(Some(destination.clone()))
                    .workers(Some(workers))
                    .max_direct_read_size(0)
                    .show_progress(false)
                    .build()
                    .unwrap();
                let err = WordCounter::new(cfg)
                    .with_progress(make_sink())
                    .run()
                    .expect_err("worker panicked");
                assert!(
                    matches!(&err, WcError::WorkerFailure(message) if message.contains("panicked")),
                    "workers = {workers}: {err}"
                );
                assert!(!destination.exists(), "workers = {workers}");
            }
        }
    }

    #[test]
    fn failure_is_recorded_after_the_failing_state() {
        let mut trace = StateTrace::new();
        trace.enter(RunState::Planning);
        trace.enter(RunState::Scanning);
        assert_eq!(trace.fail(), RunState::Scanning);
        assert_eq!(
            trace.states,
            vec![
                RunState::Idle,
                RunState::Planning,
                RunState::Scanning,
                RunState::Failed
            ]
        );
    }

    #[test]
    fn plan_exposes_ranges_without_scanning() {
        let (_dir, path) = write_source(b"0123456789");
        let plan = counter(&path, Some(3)).plan().unwrap();
        assert_eq!(plan.strategy, Strategy::Parallel { workers: 3 });
        assert_eq!(plan.ranges.len(), 3);
        assert_eq!(plan.ranges[2].end, 10);
        assert_eq!(plan.encoding, TextEncoding::utf8());
    }
}
