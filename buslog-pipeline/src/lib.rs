//! Bus Log Pipeline Library
//!
//! Parses tabular vehicle-bus logs (CSV) recorded from CAN, CANopen or
//! generic sources, validates and annotates rows per protocol, merges
//! multi-file uploads, and caches the transformed result on disk.
//!
//! # Architecture
//!
//! - [`reader`]: tolerant line-by-line CSV decoding (header + ragged rows)
//! - [`filter`]: configuration-driven row admissibility
//! - [`definitions`]: CAN message ID → description lookup
//! - [`protocols`]: one transformer per protocol
//! - [`parallel`]: bounded, order-preserving worker pool for per-row work
//! - [`merge`]: merge group records and the fan-out/concatenate/time-sort merge
//! - [`cache`]: per `(file, protocol)` dataset cache
//! - [`pipeline`]: the [`Pipeline`] facade tying the above together
//!
//! The library does NOT:
//! - Accept uploads or serve HTTP requests
//! - Decode CAN payload signals
//! - Decide where uploaded files are stored
//!
//! # Example Usage
//!
//! ```no_run
//! use buslog_pipeline::{Diagnostics, LogSink, Pipeline, PipelineConfig, Protocol};
//!
//! let config = PipelineConfig::new("uploads").with_config_dir("config");
//! let pipeline = Pipeline::new(config);
//!
//! let sink = LogSink::new("trace.csv");
//! let outcome = pipeline
//!     .load("trace.csv", Protocol::from_selector("CAN"), &Diagnostics::new(&sink))
//!     .unwrap();
//!
//! println!("{} rows (cached: {})", outcome.dataset.total, outcome.cached);
//! ```

// Public modules
pub mod cache;
pub mod config;
pub mod definitions;
pub mod diagnostics;
pub mod filter;
pub mod merge;
pub mod parallel;
pub mod pipeline;
pub mod protocols;
pub mod reader;
pub mod types;

// Re-export main types for convenience
pub use cache::ResultCache;
pub use config::{ColumnPattern, ColumnRule, ConfigError, MatchType, PipelineConfig, RowFilterConfig};
pub use definitions::CanDefinitionTable;
pub use diagnostics::{DiagnosticSink, Diagnostics, LogSink, MemorySink};
pub use filter::RowFilter;
pub use merge::{is_merged_identity, MergeEngine, MergeGroup, MergeGroupStore};
pub use parallel::ParallelRowProcessor;
pub use pipeline::{ParseOutcome, Pipeline};
pub use protocols::{transformer_for, ProtocolTransformer, RuleSet};
pub use reader::{FileSummary, LineError};
pub use types::{validate_identity, Dataset, PipelineError, Protocol, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
