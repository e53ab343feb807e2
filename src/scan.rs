//! Scanners that turn source bytes into token tallies.
//!
//! [`scan_range`] handles one byte range of a partitioned file and realigns its start on a line
//! boundary; [`scan_direct`] reads a whole file at once.  Both decode strictly and never skip
//! malformed input.

use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use serde::{Deserialize, Serialize};

use crate::encoding::TextEncoding;
use crate::error::{Result, WcError};
use crate::plan::ByteRange;
use crate::progress::{BatchedProgress, NoProgress, ProgressSink};
use crate::source::SourceFile;
use crate::tally::Tally;

const READ_BUFFER_SIZE: usize = 128 * 1024;

/// Read-only settings shared by every scanner of a run.
#[derive(Clone, Copy)]
pub struct ScanContext<'a> {
    /// Encoding used to decode each line.
    pub encoding: TextEncoding,
    /// Receives the number of bytes scanned.
    pub progress: &'a dyn ProgressSink,
}

impl ScanContext<'static> {
    /// Context without progress reporting.
    #[must_use]
    pub fn new(encoding: TextEncoding) -> Self {
        ScanContext {
            encoding,
            progress: &NoProgress,
        }
    }
}

impl<'a> ScanContext<'a> {
    /// Replaces the progress sink.
    #[must_use]
    pub fn with_progress(self, progress: &'a dyn ProgressSink) -> ScanContext<'a> {
        ScanContext {
            encoding: self.encoding,
            progress,
        }
    }
}

/// What a single range scan covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeStats {
    /// Range assigned by the planner.
    pub range: ByteRange,
    /// Offset of the first line actually scanned after boundary correction.
    pub scan_start: u64,
    /// Offset just past the last line scanned.
    pub scan_end: u64,
    /// Number of lines decoded and tallied.
    pub lines: u64,
}

impl RangeStats {
    /// Bytes decoded by this scan.
    #[must_use]
    pub fn bytes_scanned(&self) -> u64 {
        self.scan_end - self.scan_start
    }
}

/// Tally and statistics produced by [`scan_range`].
#[derive(Debug, Clone)]
pub struct RangeOutcome {
    /// Token counts for every line owned by the range.
    pub tally: Tally,
    /// Coverage statistics.
    pub stats: RangeStats,
}

/// Scans the lines owned by `range`.
///
/// A line belongs to the range in which its first byte lies.  When `range.start > 0` the scanner
/// seeks to `range.start - 1` and discards everything up to and including the next line feed, so
/// it never begins inside a line, and therefore never inside a multi-byte character.  It then
/// tallies whole lines until the offset reaches `range.end`; the line straddling `range.end` is
/// finished here and skipped by the next range's boundary correction.
pub fn scan_range<R: Read + Seek>(
    source: R,
    range: ByteRange,
    ctx: &ScanContext<'_>,
) -> Result<RangeOutcome> {
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, source);
    let mut line = Vec::new();
    let mut offset = 0u64;

    if range.start > 0 {
        offset = reader
            .seek(SeekFrom::Start(range.start - 1))
            .map_err(|err| WcError::io(err, None))?;
        offset += reader
            .read_until(b'\n', &mut line)
            .map_err(|err| WcError::io(err, None))? as u64;
    }

    let scan_start = offset;
    let mut tally = Tally::new();
    let mut text = String::new();
    let mut lines = 0u64;
    let mut progress = BatchedProgress::new(ctx.progress);
    while offset < range.end {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|err| WcError::io(err, None))?;
        if read == 0 {
            break;
        }
        ctx.encoding.decode_into(&line, offset, &mut text)?;
        tally.add_text(&text);
        offset += read as u64;
        lines += 1;
        progress.add(read as u64);
    }
    progress.flush();

    Ok(RangeOutcome {
        tally,
        stats: RangeStats {
            range,
            scan_start,
            scan_end: offset,
            lines,
        },
    })
}

/// Opens an independent handle on `source` and scans `range` with it.
///
/// IO failures are reported as [`WcError::WorkerFailure`] naming the range; decoding failures
/// keep their [`WcError::Decode`] identity.
pub fn scan_source_range(
    source: &SourceFile,
    range: ByteRange,
    ctx: &ScanContext<'_>,
) -> Result<RangeOutcome> {
    let outcome = source
        .handle()
        .and_then(|handle| scan_range(handle, range, ctx));
    outcome.map_err(|err| match err {
        WcError::Io { source: io, .. } => WcError::WorkerFailure(format!(
            "range {range} of {}: {io}",
            source.path().display()
        )),
        other => other,
    })
}

/// Reads the whole file into memory and tallies it in one pass.
pub fn scan_direct(source: &SourceFile, ctx: &ScanContext<'_>) -> Result<Tally> {
    let bytes = source.read_all()?;
    scan_bytes(&bytes, ctx)
}

/// Decodes `bytes` at once and tallies the result.
pub fn scan_bytes(bytes: &[u8], ctx: &ScanContext<'_>) -> Result<Tally> {
    let text = ctx.encoding.decode(bytes, 0)?;
    let mut tally = Tally::new();
    tally.add_text(&text);
    ctx.progress.advance(bytes.len() as u64);
    Ok(tally)
}
