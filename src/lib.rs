//! Character and token frequency counting for large text files.
//!
//! The crate exposes both a library API and a `wordcounter` command line interface.  A file is
//! split into contiguous byte ranges that are realigned on line boundaries, each range is scanned
//! into its own tally (in parallel on the rayon pool), and the partial tallies are merged into a
//! single report ordered by descending frequency.
//!
//! ```no_run
//! use wordcounter::{CountConfig, WordCounter};
//!
//! # fn main() -> wordcounter::Result<()> {
//! let cfg = CountConfig::builder()
//!     .source("/path/to/corpus.txt")
//!     .destination(Some("counts.txt".into()))
//!     .workers(Some(8))
//!     .encoding(Some("gbk"))
//!     .build()?;
//! let artifacts = WordCounter::new(cfg).run()?;
//! for entry in artifacts.report.top(5) {
//!     println!("{}: {}", entry.token, entry.count);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The CLI is enabled by default through the `cli` feature.  Users targeting the
//! library portion only can disable default features to avoid the CLI
//! dependencies: `wordcounter = { version = "...", default-features = false }`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown
)]

pub mod config;
pub mod counter;
pub mod encoding;
pub mod error;
pub mod metrics;
pub mod plan;
pub mod progress;
pub mod report;
pub mod scan;
pub mod source;
pub mod tally;

pub use config::{CountBuilder, CountConfig};
pub use counter::{CountArtifacts, RunPlan, RunState, Strategy, WordCounter};
pub use encoding::{EncodingDetector, FixedDetector, SampleDetector, TextEncoding};
pub use error::{Result, WcError};
pub use metrics::RunMetrics;
pub use plan::{plan_ranges, ByteRange};
pub use progress::{ByteCounter, NoProgress, ProgressSink};
pub use report::{Report, ReportEntry};
pub use tally::Tally;
