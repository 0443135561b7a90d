//! Multi-file merge groups
//!
//! A merge group is a set of separately uploaded files presented as one
//! dataset. The upload side records each group as a JSON document under the
//! `merged/` directory; the pipeline reads it, parses every source file on
//! its own thread, concatenates the results in declaration order and finally
//! sorts by the `time` column when there is one.

use crate::cache::strip_extension;
use crate::types::{validate_identity, Dataset, PipelineError, Protocol, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Name of the column merged rows are ordered by (matched ignoring case)
pub const TIME_HEADER: &str = "time";

/// Identity prefixes that denote a merge group rather than a plain file
pub const MERGED_PREFIXES: [&str; 2] = ["m_", "merged_"];

/// Persisted description of a merge group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeGroup {
    /// Set when the group is registered; older records omit it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_id: Option<Uuid>,
    /// Stored filenames of the sources, in declaration order
    pub source_files: Vec<String>,
    /// User-supplied filenames, parallel to `source_files`
    #[serde(default)]
    pub original_names: Vec<String>,
    pub protocol_type: Protocol,
    /// RFC 3339 creation time
    pub merged_at: String,
    pub source_count: usize,
}

impl MergeGroup {
    /// Describe a new group created now
    pub fn new(source_files: Vec<String>, original_names: Vec<String>, protocol: Protocol) -> Self {
        let source_count = source_files.len();
        Self {
            merged_id: None,
            source_files,
            original_names,
            protocol_type: protocol,
            merged_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            source_count,
        }
    }
}

/// True if `identity` names a merge group
pub fn is_merged_identity(identity: &str) -> bool {
    MERGED_PREFIXES.iter().any(|p| identity.starts_with(p))
}

/// Reads and writes merge group records
#[derive(Debug, Clone)]
pub struct MergeGroupStore {
    dir: PathBuf,
}

impl MergeGroupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the record for a merged identity
    pub fn record_path(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("{}.json", strip_extension(identity)))
    }

    /// Register a new group and return its identity and record
    ///
    /// The identity has the form `merged_<uuid>_<PROTOCOL>_<count>.csv`.
    pub fn create(
        &self,
        source_files: Vec<String>,
        original_names: Vec<String>,
        protocol: Protocol,
    ) -> Result<(String, MergeGroup)> {
        let merged_id = Uuid::new_v4();
        let group = MergeGroup {
            merged_id: Some(merged_id),
            ..MergeGroup::new(source_files, original_names, protocol)
        };
        let identity = format!(
            "merged_{}_{}_{}.csv",
            merged_id,
            protocol.tag(),
            group.source_count
        );
        self.save(&identity, &group)?;
        log::info!("Created merge group {} with {} sources", identity, group.source_count);
        Ok((identity, group))
    }

    /// Write the record for `identity`
    pub fn save(&self, identity: &str, group: &MergeGroup) -> Result<()> {
        validate_identity(identity)?;
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec(group)?;
        fs::write(self.record_path(identity), json)?;
        Ok(())
    }

    /// Read the record for `identity`
    pub fn load(&self, identity: &str) -> Result<MergeGroup> {
        validate_identity(identity)?;
        let path = self.record_path(identity);
        let data = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PipelineError::SourceNotFound(identity.to_string()),
            _ => PipelineError::Io(e),
        })?;

        serde_json::from_slice(&data).map_err(|e| PipelineError::InvalidMergeGroup {
            identity: identity.to_string(),
            reason: e.to_string(),
        })
    }

    /// Remove the record for `identity`; returns whether one existed
    pub fn delete(&self, identity: &str) -> Result<bool> {
        validate_identity(identity)?;
        match fs::remove_file(self.record_path(identity)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All readable groups as `(identity, group)`, sorted by identity
    pub fn list(&self) -> Result<Vec<(String, MergeGroup)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut groups = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let identity = format!("{}.csv", stem);
            match self.load(&identity) {
                Ok(group) => groups.push((identity, group)),
                Err(e) => log::warn!("Skipping merge record {:?}: {}", path, e),
            }
        }

        groups.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(groups)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Outcome of a merge, before it becomes a [`Dataset`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub dataset: Dataset,
    /// Sources whose parse failed, with the reason
    pub failed: Vec<(String, String)>,
    /// True if rows were ordered by a time column
    pub time_sorted: bool,
}

/// Fan-out parser and combiner for merge groups
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine;

impl MergeEngine {
    /// Parse every source with `parse`, one thread per source, and combine
    ///
    /// Fails only when the group has sources and every one of them failed.
    pub fn merge<F>(group: &MergeGroup, parse: F) -> Result<MergeReport>
    where
        F: Fn(&str) -> Result<Dataset> + Sync,
    {
        let parse = &parse;
        let results: Vec<Result<Dataset>> = std::thread::scope(|scope| {
            let handles: Vec<_> = group
                .source_files
                .iter()
                .map(|source| scope.spawn(move || parse(source.as_str())))
                .collect();

            // Join in declaration order so results line up with sources
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(PipelineError::Io(std::io::Error::other("source parser panicked")))
                    })
                })
                .collect()
        });

        let sources = group.source_files.iter().map(String::as_str);
        let report = Self::combine(sources.zip(results));

        if !group.source_files.is_empty() && report.failed.len() == group.source_files.len() {
            return Err(PipelineError::AllSourcesFailed(group.source_files.len()));
        }
        Ok(report)
    }

    /// Concatenate per-source results in the given order and time-sort
    ///
    /// Headers come from the first successful source with a non-empty header
    /// row. Failed sources are skipped and recorded.
    pub fn combine<'s, I>(results: I) -> MergeReport
    where
        I: IntoIterator<Item = (&'s str, Result<Dataset>)>,
    {
        let mut headers: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut failed = Vec::new();

        for (source, result) in results {
            match result {
                Ok(dataset) => {
                    log::debug!("Merge source {} contributed {} rows", source, dataset.rows.len());
                    if headers.is_empty() {
                        headers = dataset.headers;
                    }
                    rows.extend(dataset.rows);
                }
                Err(e) => {
                    log::warn!("Merge source {} failed: {}", source, e);
                    failed.push((source.to_string(), e.to_string()));
                }
            }
        }

        let time_idx = crate::types::find_column(&headers, TIME_HEADER);
        if let Some(idx) = time_idx {
            sort_by_time(&mut rows, idx);
        }

        MergeReport {
            dataset: Dataset::new(headers, rows),
            failed,
            time_sorted: time_idx.is_some(),
        }
    }
}

/// Stable ascending sort on the string value at `idx`
///
/// Rows too short to have the column order after every row that has it.
pub fn sort_by_time(rows: &mut [Vec<String>], idx: usize) {
    rows.sort_by(|a, b| match (a.get(idx), b.get(idx)) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
