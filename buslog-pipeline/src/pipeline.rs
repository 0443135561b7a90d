//! Main pipeline API
//!
//! [`Pipeline`] is the entry point used by upload/parse front ends. It ties
//! together the reader, the protocol transformers, the merge engine and the
//! result cache for one upload directory.

use crate::cache::ResultCache;
use crate::config::PipelineConfig;
use crate::diagnostics::Diagnostics;
use crate::merge::{is_merged_identity, MergeEngine, MergeGroup, MergeGroupStore};
use crate::parallel::ParallelRowProcessor;
use crate::protocols::{transformer_for, RuleSet};
use crate::reader::{self, FileSummary};
use crate::types::{validate_identity, Dataset, PipelineError, Protocol, Result};
use serde::Serialize;
use std::borrow::Cow;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A dataset plus whether it was served from the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseOutcome {
    #[serde(flatten)]
    pub dataset: Dataset,
    pub cached: bool,
}

/// Parse → transform → merge → cache pipeline over one upload directory
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    cache: ResultCache,
    groups: MergeGroupStore,
    processor: ParallelRowProcessor,
    /// Fixed rules; when unset, rule documents are loaded per call
    rules: Option<RuleSet>,
}

impl Pipeline {
    /// Create a pipeline for `config`
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            cache: ResultCache::new(config.cache_dir()),
            groups: MergeGroupStore::new(config.merged_dir()),
            processor: ParallelRowProcessor::from_config(&config),
            rules: None,
            config,
        }
    }

    /// Builder method: use fixed rules instead of loading rule documents
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Builder method: replace the row processor
    pub fn with_processor(mut self, processor: ParallelRowProcessor) -> Self {
        self.processor = processor;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn merge_groups(&self) -> &MergeGroupStore {
        &self.groups
    }

    /// Resolve a file identity to its path in the upload directory
    ///
    /// Identities must be a single plain file name that exists.
    pub fn source_path(&self, identity: &str) -> Result<PathBuf> {
        validate_identity(identity)?;

        let path = self.config.upload_dir.join(identity);
        if !path.is_file() {
            return Err(PipelineError::SourceNotFound(identity.to_string()));
        }
        Ok(path)
    }

    /// Parse one uploaded file
    ///
    /// Returns an empty dataset for a file without a single valid line.
    pub fn parse_single(&self, identity: &str, protocol: Protocol, diag: &Diagnostics<'_>) -> Result<Dataset> {
        let path = match self.source_path(identity) {
            Ok(path) => path,
            Err(e) => {
                diag.error(format_args!("File not found: {}", identity));
                return Err(e);
            }
        };

        diag.info(format_args!("Parsing {:?} as {}", path, protocol));
        let rules = self.rules_for(protocol, diag);
        self.parse_path(&path, protocol, &rules, diag)
    }

    /// Parse every source of a merge group and combine them
    ///
    /// Sources that fail are skipped; only a group where every source fails
    /// is an error.
    pub fn parse_merged(&self, group: &MergeGroup, protocol: Protocol, diag: &Diagnostics<'_>) -> Result<Dataset> {
        diag.info(format_args!(
            "Parsing merge group of {} sources as {}",
            group.source_files.len(),
            protocol
        ));

        let rules = self.rules_for(protocol, diag);
        let report = MergeEngine::merge(group, |source| {
            // Sub-parses stay silent; only the merge summary is reported
            let path = self.source_path(source)?;
            self.parse_path(&path, protocol, &rules, &Diagnostics::silent())
        });

        let report = match report {
            Ok(report) => report,
            Err(e) => {
                diag.error(format_args!("Merge failed: {}", e));
                return Err(e);
            }
        };

        for (source, reason) in &report.failed {
            diag.warn(format_args!("Source {} skipped: {}", source, reason));
        }
        diag.info(format_args!(
            "Merged {} rows from {} of {} sources{}",
            report.dataset.total,
            group.source_files.len() - report.failed.len(),
            group.source_files.len(),
            if report.time_sorted { ", sorted by time" } else { "" }
        ));

        Ok(report.dataset)
    }

    /// Parse a file or merge group, routing on the identity prefix
    pub fn parse(&self, identity: &str, protocol: Protocol, diag: &Diagnostics<'_>) -> Result<Dataset> {
        if let Err(e) = validate_identity(identity) {
            diag.error(format_args!("File not found: {}", identity));
            return Err(e);
        }

        if is_merged_identity(identity) {
            log::info!("Detected merge group, using merge parsing: {}", identity);
            let group = self.groups.load(identity)?;
            self.parse_merged(&group, protocol, diag)
        } else {
            self.parse_single(identity, protocol, diag)
        }
    }

    /// Serve from the cache, or parse and write the result through
    ///
    /// A failed cache write is reported but does not fail the call.
    pub fn load(&self, identity: &str, protocol: Protocol, diag: &Diagnostics<'_>) -> Result<ParseOutcome> {
        validate_identity(identity)?;

        if let Some(dataset) = self.get_cached(identity, protocol) {
            diag.info(format_args!("Loaded {} rows from cache", dataset.total));
            return Ok(ParseOutcome {
                dataset,
                cached: true,
            });
        }

        let dataset = self.parse(identity, protocol, diag)?;

        if let Err(e) = self.put_cached(identity, protocol, &dataset) {
            log::warn!("Failed to cache {} ({}): {}", identity, protocol, e);
            diag.warn(format_args!("Failed to cache result: {}", e));
        }

        Ok(ParseOutcome {
            dataset,
            cached: false,
        })
    }

    /// Cached dataset for `(identity, protocol)`, if any
    pub fn get_cached(&self, identity: &str, protocol: Protocol) -> Option<Dataset> {
        self.cache.get(identity, protocol)
    }

    /// Store a dataset for `(identity, protocol)`
    pub fn put_cached(&self, identity: &str, protocol: Protocol, dataset: &Dataset) -> Result<()> {
        self.cache.put(identity, protocol, dataset)
    }

    /// Drop every cached protocol variant of `identity`; never fails
    pub fn invalidate_cache(&self, identity: &str) {
        self.cache.invalidate(identity);
    }

    /// Row and column counts of an uploaded file
    pub fn summarize(&self, identity: &str) -> Result<FileSummary> {
        let path = self.source_path(identity)?;
        Ok(reader::summarize_file(&path)?)
    }

    /// Delete a file or merge group together with its cached results
    ///
    /// For a merge group every source file is removed (failures are logged)
    /// and then the group record.
    pub fn delete_file(&self, identity: &str) -> Result<()> {
        validate_identity(identity)?;
        self.invalidate_cache(identity);

        if is_merged_identity(identity) {
            match self.groups.load(identity) {
                Ok(group) => {
                    for source in &group.source_files {
                        match self.source_path(source).and_then(|p| Ok(fs::remove_file(p)?)) {
                            Ok(()) => log::info!("Deleted source file: {}", source),
                            Err(e) => log::warn!("Failed to delete source file {}: {}", source, e),
                        }
                    }
                }
                Err(e) => log::warn!("Merge group record unavailable for {}: {}", identity, e),
            }

            if let Err(e) = self.groups.delete(identity) {
                log::warn!("Failed to delete merge group record {}: {}", identity, e);
            }
            return Ok(());
        }

        let path = self.source_path(identity)?;
        fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PipelineError::SourceNotFound(identity.to_string()),
            _ => PipelineError::Io(e),
        })?;
        log::info!("Deleted file: {:?}", path);
        Ok(())
    }

    /// Rules for one call: the fixed set, the loaded CAN documents, or none
    fn rules_for(&self, protocol: Protocol, diag: &Diagnostics<'_>) -> Cow<'_, RuleSet> {
        match (&self.rules, protocol) {
            (Some(rules), _) => Cow::Borrowed(rules),
            (None, Protocol::Can) => Cow::Owned(RuleSet::load(&self.config, diag)),
            (None, _) => Cow::Owned(RuleSet::unfiltered()),
        }
    }

    fn parse_path(
        &self,
        path: &Path,
        protocol: Protocol,
        rules: &RuleSet,
        diag: &Diagnostics<'_>,
    ) -> Result<Dataset> {
        let table = reader::read_file(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PipelineError::SourceNotFound(path.display().to_string()),
            _ => PipelineError::Io(e),
        })?;

        diag.info(format_args!(
            "Read {} lines: {} data rows, {} empty, {} malformed",
            table.stats.lines,
            table.rows.len(),
            table.stats.empty_lines,
            table.stats.malformed_lines
        ));
        for (line, reason) in &table.malformed_samples {
            diag.debug(format_args!("Line {} skipped: {}", line, reason));
        }

        if table.headers.is_empty() {
            diag.warn(format_args!("File is empty or has no valid data"));
            return Ok(Dataset::empty());
        }
        diag.info(format_args!("Headers ({}): {:?}", table.headers.len(), table.headers));

        let transformed = transformer_for(protocol, rules).transform(table.headers, table.rows, &self.processor, diag);
        diag.info(format_args!(
            "Output: {} columns, {} rows",
            transformed.headers.len(),
            transformed.rows.len()
        ));

        Ok(Dataset::new(transformed.headers, transformed.rows))
    }
}
