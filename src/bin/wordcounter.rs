use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use rayon::ThreadPoolBuilder;
use serde_json::json;
use wordcounter::config::DEFAULT_MAX_DIRECT_READ_SIZE;
use wordcounter::source::SourceFile;
use wordcounter::{CountConfig, ProgressSink, WordCounter};

const DEFAULT_PREVIEW: usize = 10;

#[derive(Parser, Debug)]
#[command(author, version, about = "Parallel character frequency counter", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Count token frequencies in a text file
    Count(CountArgs),
    /// Show the size, encoding, strategy and ranges a count would use
    Info(InfoArgs),
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// Text file to count
    source: PathBuf,

    /// 0 = read whole file, 1 = sequential, N >= 2 = parallel byte ranges
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Source encoding label (default: detect from a leading sample)
    #[arg(short, long, value_name = "LABEL")]
    encoding: Option<String>,

    /// Files smaller than this are always read in one piece
    #[arg(long, value_name = "BYTES")]
    max_direct_read_size: Option<u64>,
}

#[derive(Args, Debug)]
struct CountArgs {
    #[command(flatten)]
    plan: PlanArgs,

    /// Report destination (defaults to stdout)
    destination: Option<PathBuf>,

    /// Limit Rayon worker threads
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Emit the report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Disable the progress bar and run summary
    #[arg(long)]
    no_progress: bool,

    /// Entries to preview after writing a destination file
    #[arg(long, value_name = "N", default_value_t = DEFAULT_PREVIEW)]
    preview: usize,
}

#[derive(Args, Debug)]
struct InfoArgs {
    #[command(flatten)]
    plan: PlanArgs,

    /// Emit machine-readable JSON summary
    #[arg(long)]
    json: bool,
}

struct BarProgress(ProgressBar);

impl ProgressSink for BarProgress {
    fn advance(&self, bytes: u64) {
        self.0.inc(bytes);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Count(args) => run_count(args),
        Commands::Info(args) => run_info(args),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            0 => LevelFilter::Info,
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn build_config(plan: &PlanArgs) -> wordcounter::CountBuilder {
    CountConfig::builder()
        .source(&plan.source)
        .workers(plan.workers)
        .encoding(plan.encoding.clone())
        .max_direct_read_size(
            plan.max_direct_read_size
                .unwrap_or(DEFAULT_MAX_DIRECT_READ_SIZE),
        )
}

fn run_count(args: CountArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("unable to configure Rayon thread pool")?;
    }

    let show_progress = !args.no_progress && !args.json;
    let cfg = build_config(&args.plan)
        .destination(args.destination.clone())
        .show_progress(show_progress)
        .build()?;

    let source = SourceFile::open(&cfg.source)
        .with_context(|| format!("failed to open {}", cfg.source.display()))?;
    let bar = if show_progress {
        let pb = ProgressBar::new(source.size());
        let style = ProgressStyle::with_template(
            "{spinner} counting {msg} [{bar:30}] {bytes}/{total_bytes} ({eta})",
        )
        .context("invalid progress template")?
        .progress_chars("=- ");
        pb.set_style(style);
        pb.set_message(
            source
                .path()
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default(),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    } else {
        ProgressBar::with_draw_target(Some(source.size()), ProgressDrawTarget::hidden())
    };

    let counter =
        WordCounter::new(cfg.clone()).with_progress(Arc::new(BarProgress(bar.clone())));
    let result = counter.run();
    bar.finish_and_clear();
    let artifacts =
        result.with_context(|| format!("failed to count {}", cfg.source.display()))?;
    let metrics = &artifacts.metrics;

    if args.json {
        let record = json!({
            "source": cfg.source.display().to_string(),
            "destination": cfg.destination.as_ref().map(|path| path.display().to_string()),
            "encoding": metrics.encoding,
            "strategy": metrics.strategy,
            "file_size": metrics.file_size,
            "total_tokens": metrics.total_tokens,
            "entries": artifacts.report.entries(),
        });
        println!("{}", serde_json::to_string(&record)?);
        return Ok(());
    }

    match &cfg.destination {
        Some(destination) => {
            info!(
                "count complete: tokens={} distinct={} duration={:.2?} throughput={:.2} MiB/s",
                metrics.total_tokens,
                metrics.distinct_tokens,
                metrics.total_duration,
                metrics.throughput_mib_s()
            );
            println!(
                "wrote {} distinct tokens ({} total) to {}",
                metrics.distinct_tokens,
                metrics.total_tokens,
                destination.display()
            );
            for entry in artifacts.report.top(args.preview) {
                println!("   {}: {}", entry.token, entry.count);
            }
            if artifacts.report.len() > args.preview {
                println!("   ...");
            }
            println!(
                "File size: {}. Workers: {}. Cost time: {:.1} seconds",
                human_size(metrics.file_size),
                metrics.strategy.workers(),
                metrics.total_duration.as_secs_f64()
            );
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            artifacts.report.write_to(&mut handle)?;
            if !artifacts.report.is_empty() {
                handle.write_all(b"\n")?;
            }
            handle.flush()?;
        }
    }

    Ok(())
}

fn run_info(args: InfoArgs) -> Result<()> {
    let cfg = build_config(&args.plan).show_progress(false).build()?;
    let plan = WordCounter::new(cfg)
        .plan()
        .with_context(|| format!("failed to plan {}", args.plan.source.display()))?;

    if args.json {
        let summary = json!({
            "path": plan.source.path().display().to_string(),
            "file_size": plan.source.size(),
            "encoding": plan.encoding.name(),
            "strategy": plan.strategy,
            "ranges": plan.ranges,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Source   : {}", plan.source.path().display());
    println!(
        "File size: {} ({} bytes)",
        human_size(plan.source.size()),
        plan.source.size()
    );
    println!("Encoding : {}", plan.encoding);
    println!("Strategy : {}", plan.strategy);
    for (idx, range) in plan.ranges.iter().enumerate() {
        println!("  range {idx:>4}: {range} ({} bytes)", range.len());
    }
    Ok(())
}

#[must_use]
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if size < 1024 {
            break;
        }
        size /= 1024;
        unit = next;
    }
    format!("{size} {unit}")
}
