//! Core types for the bus log pipeline
//!
//! This module defines the dataset value object produced by every parse,
//! the protocol selector, and the error taxonomy shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// A parsed and transformed table of log rows
///
/// Rows are allowed to be ragged: their field count may differ from the
/// header count and is never coerced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Column names, in file order (plus any synthetic protocol columns)
    pub headers: Vec<String>,
    /// Data rows, in output order
    pub rows: Vec<Vec<String>>,
    /// Number of rows; always equal to `rows.len()`
    pub total: usize,
}

impl Dataset {
    /// Build a dataset, deriving `total` from the row count
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let total = rows.len();
        Self {
            headers,
            rows,
            total,
        }
    }

    /// The empty dataset returned for files without a single valid line
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if the dataset has no headers and no rows
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }

    /// Check the `total == rows.len()` invariant (used when reading cache records)
    pub fn is_consistent(&self) -> bool {
        self.total == self.rows.len()
    }

    /// Index of the first header equal to `name`, ignoring ASCII case
    pub fn column_index(&self, name: &str) -> Option<usize> {
        find_column(&self.headers, name)
    }
}

/// Check that a file identity is a single plain file name
///
/// Identities are joined onto the upload, cache and merge directories, so
/// anything with a separator, `.`/`..`, a root or a prefix is rejected as
/// [`PipelineError::SourceNotFound`].
pub fn validate_identity(identity: &str) -> Result<()> {
    let mut components = Path::new(identity).components();
    let is_plain_name = !identity.contains(['/', '\\'])
        && matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );

    if is_plain_name {
        Ok(())
    } else {
        Err(PipelineError::SourceNotFound(identity.to_string()))
    }
}

/// Find the first header equal to `name`, ignoring ASCII case
pub(crate) fn find_column(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h.eq_ignore_ascii_case(name))
}

/// Wire protocol a log file was produced by
///
/// Selects the transformer variant applied to the parsed rows.
///
/// Serialized as its tag; any string deserializes, unknown values as `Common`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// CAN logs: rows are filtered and annotated with message meanings
    Can,
    /// CANopen logs: rows are annotated with node/object columns, never filtered
    CanOpen,
    /// Anything else: rows pass through unchanged
    #[default]
    Common,
}

impl Protocol {
    /// Every protocol, in cache invalidation order
    pub const ALL: [Protocol; 3] = [Protocol::Can, Protocol::CanOpen, Protocol::Common];

    /// Parse a protocol selector. Unrecognized values select `Common`.
    pub fn from_selector(selector: &str) -> Self {
        match selector.trim().to_ascii_uppercase().as_str() {
            "CAN" => Protocol::Can,
            "CANOPEN" => Protocol::CanOpen,
            _ => Protocol::Common,
        }
    }

    /// Tag used in cache keys, merge-group names and the `ProtocolType` column
    pub fn tag(&self) -> &'static str {
        match self {
            Protocol::Can => "CAN",
            Protocol::CanOpen => "CANOPEN",
            Protocol::Common => "COMMON",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for Protocol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let selector = String::deserialize(deserializer)?;
        Ok(Protocol::from_selector(&selector))
    }
}

impl std::str::FromStr for Protocol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Protocol::from_selector(s))
    }
}

/// Errors surfaced to callers of the pipeline
///
/// Only these reach the caller; line-level problems, config fallbacks,
/// partial merge failures and cache misses are absorbed internally.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("All {0} source files of merge group failed to parse")]
    AllSourcesFailed(usize),

    #[error("Invalid merge group record {identity}: {reason}")]
    InvalidMergeGroup { identity: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
