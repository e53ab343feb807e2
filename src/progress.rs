//! Side-channel progress reporting for scanners.
//!
//! Scanners report how many source bytes they have consumed; nothing reported here feeds back
//! into the tallies.

use std::sync::atomic::{AtomicU64, Ordering};

/// Receives byte-level progress from scanners, possibly from several worker threads at once.
pub trait ProgressSink: Send + Sync {
    /// Records that `bytes` more source bytes have been scanned.
    fn advance(&self, bytes: u64);
}

/// Sink that discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&self, _bytes: u64) {}
}

/// Sink that sums reported bytes, mostly useful for tests and summaries.
#[derive(Debug, Default)]
pub struct ByteCounter {
    scanned: AtomicU64,
}

impl ByteCounter {
    /// Total bytes reported so far.
    #[must_use]
    pub fn scanned(&self) -> u64 {
        self.scanned.load(Ordering::Relaxed)
    }
}

impl ProgressSink for ByteCounter {
    fn advance(&self, bytes: u64) {
        self.scanned.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Batches many small advances into fewer calls on the underlying sink.
pub(crate) struct BatchedProgress<'a> {
    sink: &'a dyn ProgressSink,
    pending: u64,
    threshold: u64,
}

impl<'a> BatchedProgress<'a> {
    pub(crate) const DEFAULT_THRESHOLD: u64 = 256 * 1024;

    pub(crate) fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            pending: 0,
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }

    pub(crate) fn add(&mut self, bytes: u64) {
        self.pending += bytes;
        if self.pending >= self.threshold {
            self.flush();
        }
    }

    pub(crate) fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if pending > 0 {
            self.sink.advance(pending);
        }
    }
}

impl Drop for BatchedProgress<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}
