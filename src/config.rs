//! Configuration builder controlling how a count run is planned and executed.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::encoding::{TextEncoding, DEFAULT_SAMPLE_SIZE};
use crate::error::{Result, WcError};

/// Files smaller than this are always read in one piece.
pub const DEFAULT_MAX_DIRECT_READ_SIZE: u64 = 8 * 1024 * 1024;

/// Configuration for a single count run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountConfig {
    /// Text file to count.
    pub source: PathBuf,
    /// Optional report destination; `None` leaves output to the caller.
    pub destination: Option<PathBuf>,
    /// `0` reads the whole file at once, `1` scans sequentially line by line, `n >= 2` splits the
    /// file into `n` byte ranges scanned in parallel; `None` picks a count from the file size.
    pub workers: Option<usize>,
    /// Encoding label (e.g. `utf-8`, `gbk`); `None` detects it from a leading sample.
    pub encoding: Option<String>,
    /// Files strictly smaller than this many bytes are read directly regardless of `workers`.
    pub max_direct_read_size: u64,
    /// Number of leading bytes handed to the encoding detector.
    pub sample_size: usize,
    /// Enables run summaries through the `log` facade.
    pub show_progress: bool,
}

impl CountConfig {
    /// Returns a builder initialised with [`CountConfig::default`].
    #[must_use]
    pub fn builder() -> CountBuilder {
        CountBuilder::default()
    }

    /// Validates the invariants required before planning.
    pub fn validate(&self) -> Result<()> {
        if self.source.as_os_str().is_empty() {
            return Err(WcError::InvalidConfig("source path must not be empty".into()));
        }
        if self.sample_size == 0 {
            return Err(WcError::InvalidConfig(
                "sample_size must be greater than zero".into(),
            ));
        }
        if let Some(label) = &self.encoding {
            TextEncoding::for_label(label)?;
        }
        if self.destination.as_ref() == Some(&self.source) {
            return Err(WcError::InvalidConfig(
                "destination must differ from the source".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CountConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: None,
            workers: None,
            encoding: None,
            max_direct_read_size: DEFAULT_MAX_DIRECT_READ_SIZE,
            sample_size: DEFAULT_SAMPLE_SIZE,
            show_progress: true,
        }
    }
}

/// Builder for [`CountConfig`].
#[derive(Debug, Default, Clone)]
pub struct CountBuilder {
    cfg: CountConfig,
}

impl CountBuilder {
    /// Creates a builder with [`CountConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the file to count.
    #[must_use]
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.cfg.source = path.into();
        self
    }

    /// Sets the report destination.
    #[must_use]
    pub fn destination(mut self, path: Option<PathBuf>) -> Self {
        self.cfg.destination = path;
        self
    }

    /// Sets the worker count (`None` = size heuristic).
    #[must_use]
    pub fn workers(mut self, value: Option<usize>) -> Self {
        self.cfg.workers = value;
        self
    }

    /// Sets the encoding label (`None` = detect).
    #[must_use]
    pub fn encoding<S: Into<String>>(mut self, label: Option<S>) -> Self {
        self.cfg.encoding = label.map(Into::into);
        self
    }

    /// Sets the direct-read threshold in bytes.
    #[must_use]
    pub fn max_direct_read_size(mut self, bytes: u64) -> Self {
        self.cfg.max_direct_read_size = bytes;
        self
    }

    /// Sets the encoding detection sample size in bytes.
    #[must_use]
    pub fn sample_size(mut self, bytes: usize) -> Self {
        self.cfg.sample_size = bytes;
        self
    }

    /// Enables or disables run summary logging.
    #[must_use]
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.cfg.show_progress = enabled;
        self
    }

    /// Finalises the builder, returning a validated [`CountConfig`].
    pub fn build(self) -> Result<CountConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}
