//! Deterministic, ordered rendering of a tally.

use std::fmt;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::encoding::TextEncoding;
use crate::error::{Result, WcError};
use crate::tally::Tally;

/// One `(token, count)` line of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Counted token.
    pub token: String,
    /// Number of occurrences.
    pub count: u64,
}

/// Tally entries sorted by count, highest first.
///
/// Equal counts are ordered by the token's UTF-8 bytes, ascending.  The order depends only on
/// the tally contents, so every scanning strategy and every worker count yields the same report.
#[must_use]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    entries: Vec<ReportEntry>,
}

impl Report {
    /// Builds the ordered report for `tally`.
    pub fn from_tally(tally: Tally) -> Self {
        let mut entries: Vec<ReportEntry> = tally
            .into_iter()
            .map(|(token, count)| ReportEntry { token, count })
            .collect();
        entries.sort_unstable_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.token.cmp(&b.token))
        });
        Self { entries }
    }

    /// Entries in report order.
    #[must_use]
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Number of distinct tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the report has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|entry| entry.count).sum()
    }

    /// The `n` most frequent entries.
    #[must_use]
    pub fn top(&self, n: usize) -> &[ReportEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    /// Renders `token: count` lines joined by `\n`, without a trailing newline.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Writes the rendered report as UTF-8.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write!(writer, "{self}")
    }

    /// Encodes the rendered report with `encoding` and writes it to `path`.
    ///
    /// The text is fully encoded first, then written to a temporary file next to `path` that is
    /// renamed over `path` only once every byte is on disk.  Any failure leaves `path` untouched.
    pub fn write_encoded(&self, path: &Path, encoding: TextEncoding) -> Result<()> {
        let bytes = encoding.encode(&self.render())?;
        let io_err = |err| WcError::io(err, Some(path.to_path_buf()));
        let parent = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(parent).map_err(io_err)?;
        staged.write_all(&bytes).map_err(io_err)?;
        staged.flush().map_err(io_err)?;
        staged.persist(path).map_err(|err| io_err(err.error))?;
        Ok(())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, entry) in self.entries.iter().enumerate() {
            if idx > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}: {}", entry.token, entry.count)?;
        }
        Ok(())
    }
}
