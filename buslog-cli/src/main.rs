//! Bus Log Pipeline CLI Application
//!
//! This is the command-line interface for the bus log pipeline.
//! It drives the buslog-pipeline library over an upload directory:
//! - Parse a file or merge group (served from the cache when possible)
//! - Summarize uploaded files
//! - Register and list merge groups
//! - Invalidate cached results and delete files

use anyhow::{bail, Context, Result};
use buslog_pipeline::{Diagnostics, LogSink, Pipeline, Protocol};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

mod config;

/// Bus Log Pipeline - Parse, merge and cache vehicle-bus CSV logs
#[derive(Parser, Debug)]
#[command(name = "buslog")]
#[command(about = "Parse, merge and cache vehicle-bus CSV logs (CAN, CANopen)", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (buslog.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Upload directory (overrides [storage] upload_dir)
    #[arg(short, long, value_name = "DIR", global = true)]
    upload_dir: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a file or merge group and print the dataset as JSON
    Parse {
        /// File identity within the upload directory
        file: String,

        /// Protocol: CAN, CANOPEN or COMMON (unknown values mean COMMON)
        #[arg(short, long, default_value = "CAN")]
        protocol: String,

        /// Always re-parse and do not touch the cache
        #[arg(long)]
        no_cache: bool,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print row and column counts of uploaded files
    Summary {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Register a merge group over uploaded files
    Group {
        /// Stored file identities, in merge order
        #[arg(required = true, num_args = 2..)]
        files: Vec<String>,

        /// Protocol the group was uploaded as
        #[arg(short, long, default_value = "CAN")]
        protocol: String,

        /// User-facing names, parallel to FILES (default: the identities)
        #[arg(long = "name", value_name = "NAME")]
        names: Vec<String>,
    },

    /// List registered merge groups
    Groups,

    /// Drop every cached protocol variant of a file
    Invalidate { file: String },

    /// Delete a file or merge group and its cached results
    Delete { file: String },
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Bus Log Pipeline CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using pipeline library v{}", buslog_pipeline::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => config::AppConfig::default(),
    };
    let pipeline_config = app_config.pipeline_config(args.upload_dir.as_deref());
    log::debug!("Upload directory: {:?}", pipeline_config.upload_dir);
    let pipeline = Pipeline::new(pipeline_config);

    match args.command {
        Command::Parse {
            file,
            protocol,
            no_cache,
            output,
            pretty,
        } => parse_command(&pipeline, &file, &protocol, no_cache, output.as_deref(), pretty),
        Command::Summary { files } => summary_command(&pipeline, &files),
        Command::Group {
            files,
            protocol,
            names,
        } => group_command(&pipeline, files, &protocol, names),
        Command::Groups => {
            let groups: BTreeMap<_, _> = pipeline.merge_groups().list()?.into_iter().collect();
            write_json(&groups, None, true)
        }
        Command::Invalidate { file } => {
            pipeline.invalidate_cache(&file);
            log::info!("Invalidated cache for {}", file);
            Ok(())
        }
        Command::Delete { file } => {
            pipeline
                .delete_file(&file)
                .with_context(|| format!("Failed to delete {}", file))?;
            log::info!("Deleted {}", file);
            Ok(())
        }
    }
}

/// Parse mode - load (or re-parse) one identity and emit JSON
fn parse_command(
    pipeline: &Pipeline,
    file: &str,
    protocol: &str,
    no_cache: bool,
    output: Option<&Path>,
    pretty: bool,
) -> Result<()> {
    let protocol = Protocol::from_selector(protocol);
    let sink = LogSink::new(file);
    let diag = Diagnostics::new(&sink);

    if no_cache {
        let dataset = pipeline
            .parse(file, protocol, &diag)
            .with_context(|| format!("Failed to parse {} as {}", file, protocol))?;
        log::info!("Parsed {} rows", dataset.total);
        return write_json(&dataset, output, pretty);
    }

    let outcome = pipeline
        .load(file, protocol, &diag)
        .with_context(|| format!("Failed to load {} as {}", file, protocol))?;
    log::info!(
        "{} rows ({})",
        outcome.dataset.total,
        if outcome.cached { "cached" } else { "parsed" }
    );
    write_json(&outcome, output, pretty)
}

fn summary_command(pipeline: &Pipeline, files: &[String]) -> Result<()> {
    let mut summaries = BTreeMap::new();
    for file in files {
        let summary = pipeline
            .summarize(file)
            .with_context(|| format!("Failed to summarize {}", file))?;
        summaries.insert(file.as_str(), summary);
    }
    write_json(&summaries, None, true)
}

fn group_command(pipeline: &Pipeline, files: Vec<String>, protocol: &str, names: Vec<String>) -> Result<()> {
    if !names.is_empty() && names.len() != files.len() {
        bail!("Expected {} names, got {}", files.len(), names.len());
    }

    // Every source must exist and have content before it joins a group
    for file in &files {
        let summary = pipeline
            .summarize(file)
            .with_context(|| format!("Cannot add {} to a merge group", file))?;
        if summary.row_count == 0 {
            bail!("Cannot add {} to a merge group: file is empty", file);
        }
        log::debug!("{}: {} rows, {} columns", file, summary.row_count, summary.column_count);
    }

    let names = if names.is_empty() { files.clone() } else { names };
    let (identity, _) = pipeline
        .merge_groups()
        .create(files, names, Protocol::from_selector(protocol))
        .context("Failed to create merge group")?;

    println!("{}", identity);
    Ok(())
}

/// Serialize `value` to `output` or stdout
fn write_json<T: Serialize>(value: &T, output: Option<&Path>, pretty: bool) -> Result<()> {
    let mut writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    if pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    } else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writeln!(writer)?;
    writer.flush()?;

    if let Some(path) = output {
        log::info!("Wrote output to {:?}", path);
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
