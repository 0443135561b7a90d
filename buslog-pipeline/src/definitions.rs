//! CAN message definitions
//!
//! Maps hexadecimal message IDs (as they appear in the `Buffer` column, e.g.
//! `2cf`) to human-readable descriptions. Loaded from a JSON document keyed by
//! hex ID:
//!
//! ```json
//! {
//!   "2cf": { "hex": "2cf", "dec": "719", "description": "EngineStatus" },
//!   "3a0": "BrakeStatus"
//! }
//! ```

use crate::config::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Immutable ID → description table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanDefinitionTable {
    /// Keys are lower-cased hex IDs
    definitions: HashMap<String, String>,
}

/// One entry of the definitions document
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DefinitionEntry {
    Detailed {
        #[serde(default)]
        description: String,
    },
    Plain(String),
}

impl DefinitionEntry {
    fn into_description(self) -> String {
        match self {
            DefinitionEntry::Detailed { description } => description,
            DefinitionEntry::Plain(description) => description,
        }
    }
}

impl CanDefinitionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the definitions document
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a definitions document from a JSON string
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, DefinitionEntry> = serde_json::from_str(content)?;
        Ok(raw
            .into_iter()
            .map(|(id, entry)| (id, entry.into_description()))
            .collect())
    }

    /// Add or replace a definition
    pub fn insert(&mut self, id: &str, description: impl Into<String>) {
        self.definitions
            .insert(normalize_id(id), description.into());
    }

    /// Look up the description for a hex ID (case-insensitive)
    pub fn lookup(&self, id: &str) -> Option<&str> {
        self.definitions.get(&normalize_id(id)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for CanDefinitionTable {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut table = Self::new();
        for (id, description) in iter {
            table.insert(id.as_ref(), description);
        }
        table
    }
}

fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Extract the message ID from a CAN buffer value
///
/// `string=2cf:8:[10 40 ...]` yields `2cf`. Values without the `string=`
/// marker yield `None`. The ID is trimmed and lower-cased.
pub fn buffer_message_id(buffer: &str) -> Option<String> {
    if !buffer.contains("string=") {
        return None;
    }

    let first = buffer.split(':').next().unwrap_or(buffer);
    let id = first.strip_prefix("string=").unwrap_or(first);
    Some(normalize_id(id))
}
