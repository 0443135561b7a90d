//! On-disk cache of transformed datasets
//!
//! One JSON record per `(file identity, protocol)` pair, stored as
//! `<cache dir>/<identity without extension>_<PROTOCOL>.cache.json`.
//! Records are written to a temporary file and renamed into place. A record
//! that cannot be read or parsed is treated as a miss. Identities that are
//! not a plain file name never touch the disk.

use crate::types::{validate_identity, Dataset, Protocol, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const CACHE_SUFFIX: &str = ".cache.json";

/// Dataset cache rooted at a directory
#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key for a file identity and protocol
    pub fn key(identity: &str, protocol: Protocol) -> String {
        format!("{}_{}", strip_extension(identity), protocol.tag())
    }

    /// Path of the record for a file identity and protocol
    pub fn path_for(&self, identity: &str, protocol: Protocol) -> PathBuf {
        self.dir
            .join(format!("{}{}", Self::key(identity, protocol), CACHE_SUFFIX))
    }

    /// Read a cached dataset; any failure is a miss
    pub fn get(&self, identity: &str, protocol: Protocol) -> Option<Dataset> {
        if validate_identity(identity).is_err() {
            log::debug!("Cache lookup for invalid identity {:?}", identity);
            return None;
        }
        let path = self.path_for(identity, protocol);

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Failed to read cache record {:?}: {}", path, e);
                return None;
            }
        };

        match serde_json::from_slice::<Dataset>(&data) {
            Ok(dataset) if dataset.is_consistent() => {
                log::info!("Cache hit: {:?}", path);
                Some(dataset)
            }
            Ok(dataset) => {
                log::warn!(
                    "Ignoring inconsistent cache record {:?} (total={}, rows={})",
                    path,
                    dataset.total,
                    dataset.rows.len()
                );
                None
            }
            Err(e) => {
                log::warn!("Ignoring unparsable cache record {:?}: {}", path, e);
                None
            }
        }
    }

    /// Write a dataset, replacing any previous record for the key
    pub fn put(&self, identity: &str, protocol: Protocol, dataset: &Dataset) -> Result<()> {
        validate_identity(identity)?;
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(identity, protocol);
        // Unique per write so concurrent writers of one key never share it
        let tmp_path = path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        let json = serde_json::to_vec(dataset)?;

        if let Err(e) = fs::write(&tmp_path, &json).and_then(|_| fs::rename(&tmp_path, &path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        log::info!("Cached {} rows: {:?}", dataset.total, path);
        Ok(())
    }

    /// Remove the records of every protocol for a file identity
    ///
    /// Best-effort: missing records and removal failures are not errors.
    pub fn invalidate(&self, identity: &str) {
        if validate_identity(identity).is_err() {
            return;
        }
        for protocol in Protocol::ALL {
            let path = self.path_for(identity, protocol);
            match fs::remove_file(&path) {
                Ok(()) => log::info!("Removed cache record: {:?}", path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove cache record {:?}: {}", path, e),
            }
        }
    }
}

/// Drop the final extension of a file identity (`a.b.csv` → `a.b`)
pub(crate) fn strip_extension(identity: &str) -> &str {
    match Path::new(identity).extension() {
        Some(ext) => &identity[..identity.len() - ext.len() - 1],
        None => identity,
    }
}
