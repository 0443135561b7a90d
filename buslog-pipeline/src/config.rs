//! Pipeline configuration types
//!
//! Two kinds of configuration live here:
//! - [`PipelineConfig`]: where files live and how much parallelism to use
//! - [`RowFilterConfig`]: the column rules that decide whether a CAN row is kept
//!
//! Both deserialize with serde. The row filter document is camelCase JSON and
//! falls back to a built-in rule set when absent or unreadable.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Errors from loading an external configuration document
///
/// Never surfaced to pipeline callers: they log a warning and fall back.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration for a [`crate::Pipeline`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding uploaded files; cache and merge records live below it
    pub upload_dir: PathBuf,

    /// Optional row filter document (JSON)
    #[serde(default)]
    pub row_filter_path: Option<PathBuf>,

    /// Optional CAN definitions document (JSON)
    #[serde(default)]
    pub definitions_path: Option<PathBuf>,

    /// Below this many rows, row processing runs on a single worker
    #[serde(default = "default_min_parallel_rows")]
    pub min_parallel_rows: usize,

    /// Upper bound on row processing workers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_min_parallel_rows() -> usize {
    500
}

fn default_max_workers() -> usize {
    32
}

impl PipelineConfig {
    /// Create a configuration rooted at `upload_dir` with default settings
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            row_filter_path: None,
            definitions_path: None,
            min_parallel_rows: default_min_parallel_rows(),
            max_workers: default_max_workers(),
        }
    }

    /// Builder method: resolve both rule documents under `dir/can/`
    pub fn with_config_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let can_dir = dir.as_ref().join("can");
        self.row_filter_path = Some(can_dir.join("row_filter.json"));
        self.definitions_path = Some(can_dir.join("definitions.json"));
        self
    }

    /// Builder method: set the row filter document
    pub fn with_row_filter(mut self, path: impl Into<PathBuf>) -> Self {
        self.row_filter_path = Some(path.into());
        self
    }

    /// Builder method: set the CAN definitions document
    pub fn with_definitions(mut self, path: impl Into<PathBuf>) -> Self {
        self.definitions_path = Some(path.into());
        self
    }

    /// Builder method: set the single-worker threshold
    pub fn with_min_parallel_rows(mut self, rows: usize) -> Self {
        self.min_parallel_rows = rows;
        self
    }

    /// Builder method: cap the number of workers
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// Directory holding cached datasets
    pub fn cache_dir(&self) -> PathBuf {
        self.upload_dir.join("cache")
    }

    /// Directory holding merge group records
    pub fn merged_dir(&self) -> PathBuf {
        self.upload_dir.join("merged")
    }
}

/// How a column value is checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Trimmed value equals one of `validValues`, ignoring case
    Exact,
    /// Value matches `pattern`, or any of the alternate patterns
    Regex,
    /// Lower-cased value contains one of `validValues`
    Contains,
    /// Always accepted (also used for unknown match types)
    #[default]
    #[serde(other)]
    Any,
}

/// A named alternative pattern for a regex column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPattern {
    #[serde(default)]
    pub name: String,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ColumnPattern {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            description: String::new(),
        }
    }
}

/// Validation rule for one column position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRule {
    pub name: String,
    pub index: usize,
    /// Only required rules are evaluated
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, alias = "alternatePatterns", skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<ColumnPattern>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ColumnRule {
    /// An informational rule that is never evaluated
    pub fn optional(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            required: false,
            match_type: MatchType::Any,
            valid_values: Vec::new(),
            pattern: None,
            patterns: Vec::new(),
            description: String::new(),
        }
    }

    /// A required rule with the given match type and nothing else set
    pub fn required(name: impl Into<String>, index: usize, match_type: MatchType) -> Self {
        Self {
            required: true,
            match_type,
            ..Self::optional(name, index)
        }
    }

    /// Builder method: set accepted values (for exact/contains)
    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method: set the single regex pattern
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Builder method: add an alternate regex pattern
    pub fn add_pattern(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.patterns.push(ColumnPattern::new(name, pattern));
        self
    }
}

/// Column rules applied to CAN rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFilterConfig {
    #[serde(default)]
    pub columns: Vec<ColumnRule>,
    #[serde(default)]
    pub min_column_count: usize,
}

/// CAN frame buffer: `string=ID:LEN:[HH HH ...]`
pub const CAN_MESSAGE_PATTERN: &str = r"^string=[0-9a-fA-F]{1,4}:\d{1,2}:\[[0-9a-fA-F ]*\]";
/// Unsigned short buffer: `string=ushort=N`
pub const USHORT_VALUE_PATTERN: &str = r"^string=ushort=\d+";
/// Struct buffer: `{...}`
pub const STRUCT_VALUE_PATTERN: &str = r"^\{.*\}$";
/// Leading `YYYY-MM-DD HH:MM:SS` timestamp
pub const TIME_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}";

impl Default for RowFilterConfig {
    /// Built-in rules for CAN logs with `Type,Source,Target,Name,Time,Buffer` columns
    fn default() -> Self {
        Self {
            min_column_count: 6,
            columns: vec![
                ColumnRule::required("Type", 0, MatchType::Exact)
                    .with_values(["publish", "receive", "receive_request"]),
                ColumnRule::optional("Source", 1),
                ColumnRule::optional("Target", 2),
                ColumnRule::optional("Name", 3),
                ColumnRule::required("Time", 4, MatchType::Regex).with_pattern(TIME_PATTERN),
                ColumnRule::required("Buffer", 5, MatchType::Regex)
                    .add_pattern("CAN_MESSAGE", CAN_MESSAGE_PATTERN)
                    .add_pattern("USHORT_VALUE", USHORT_VALUE_PATTERN)
                    .add_pattern("STRUCT_VALUE", STRUCT_VALUE_PATTERN),
            ],
        }
    }
}

impl RowFilterConfig {
    /// Load a row filter document from JSON
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Number of rules that are actually evaluated
    pub fn required_rules(&self) -> usize {
        self.columns.iter().filter(|c| c.required).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_row_filter() {
        let config = RowFilterConfig::default();
        assert_eq!(config.min_column_count, 6);
        assert_eq!(config.columns.len(), 6);
        assert_eq!(config.required_rules(), 3);
        assert_eq!(config.columns[5].patterns.len(), 3);
    }

    #[test]
    fn test_row_filter_deserialization() {
        let json = r#"{
            "minColumnCount": 2,
            "columns": [
                {"name": "Type", "index": 0, "required": true, "matchType": "exact",
                 "validValues": ["publish"]},
                {"name": "Buffer", "index": 1, "required": true, "matchType": "regex",
                 "alternatePatterns": [{"name": "A", "pattern": "^a"}]},
                {"name": "Note", "index": 2, "matchType": "fuzzy"}
            ]
        }"#;

        let config: RowFilterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.min_column_count, 2);
        assert_eq!(config.columns[0].match_type, MatchType::Exact);
        assert_eq!(config.columns[1].patterns[0].pattern, "^a");
        // Unknown match types behave like "any"
        assert_eq!(config.columns[2].match_type, MatchType::Any);
        assert!(!config.columns[2].required);
    }

    #[test]
    fn test_pipeline_config_builder() {
        let config = PipelineConfig::new("/data/uploads")
            .with_config_dir("/etc/buslog")
            .with_min_parallel_rows(10)
            .with_max_workers(8);

        assert_eq!(
            config.row_filter_path,
            Some(PathBuf::from("/etc/buslog/can/row_filter.json"))
        );
        assert_eq!(
            config.definitions_path,
            Some(PathBuf::from("/etc/buslog/can/definitions.json"))
        );
        assert_eq!(config.cache_dir(), PathBuf::from("/data/uploads/cache"));
        assert_eq!(config.merged_dir(), PathBuf::from("/data/uploads/merged"));
        assert_eq!(config.min_parallel_rows, 10);
        assert_eq!(config.max_workers, 8);
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = RowFilterConfig::load(Path::new("/nonexistent/row_filter.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
