//! Configuration-driven row filter
//!
//! A [`RowFilter`] is compiled once from a [`RowFilterConfig`] and then shared
//! read-only by every worker. Regex patterns are compiled up front; a pattern
//! that fails to compile simply never matches.

use crate::config::{ColumnRule, MatchType, RowFilterConfig};
use regex::Regex;

/// Why a row was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Fewer fields than `minColumnCount`
    TooFewColumns { expected: usize, actual: usize },
    /// A required rule points past the end of the row
    MissingColumn { column: String, index: usize },
    /// A required rule did not accept the value
    InvalidValue { column: String, value: String },
}

/// Compiled row filter
#[derive(Debug, Clone)]
pub struct RowFilter {
    min_column_count: usize,
    rules: Vec<CompiledRule>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    index: usize,
    check: Check,
}

#[derive(Debug, Clone)]
enum Check {
    /// Lower-cased accepted values
    Exact(Vec<String>),
    /// Lower-cased substrings
    Contains(Vec<String>),
    /// Any pattern may match; `None` entries failed to compile
    Regex(Vec<Option<Regex>>),
    Any,
}

impl RowFilter {
    /// Compile the required rules of `config`
    pub fn new(config: &RowFilterConfig) -> Self {
        let rules = config
            .columns
            .iter()
            .filter(|rule| rule.required)
            .map(CompiledRule::compile)
            .collect();

        Self {
            min_column_count: config.min_column_count,
            rules,
        }
    }

    /// True if the row passes every required rule
    pub fn is_admissible(&self, row: &[String]) -> bool {
        self.check(row).is_ok()
    }

    /// Evaluate the row, reporting the first failed rule
    pub fn check(&self, row: &[String]) -> Result<(), Rejection> {
        if row.len() < self.min_column_count {
            return Err(Rejection::TooFewColumns {
                expected: self.min_column_count,
                actual: row.len(),
            });
        }

        for rule in &self.rules {
            let value = row.get(rule.index).ok_or_else(|| Rejection::MissingColumn {
                column: rule.name.clone(),
                index: rule.index,
            })?;

            if !rule.check.accepts(value) {
                return Err(Rejection::InvalidValue {
                    column: rule.name.clone(),
                    value: value.clone(),
                });
            }
        }

        Ok(())
    }
}

impl Default for RowFilter {
    fn default() -> Self {
        Self::new(&RowFilterConfig::default())
    }
}

impl CompiledRule {
    fn compile(rule: &ColumnRule) -> Self {
        let check = match rule.match_type {
            MatchType::Exact => Check::Exact(lowercase_all(&rule.valid_values)),
            MatchType::Contains => Check::Contains(lowercase_all(&rule.valid_values)),
            MatchType::Regex => {
                let sources: Vec<&str> = if !rule.patterns.is_empty() {
                    rule.patterns.iter().map(|p| p.pattern.as_str()).collect()
                } else {
                    rule.pattern
                        .as_deref()
                        .filter(|p| !p.is_empty())
                        .into_iter()
                        .collect()
                };

                if sources.is_empty() {
                    // No pattern configured: vacuously satisfied
                    Check::Any
                } else {
                    Check::Regex(sources.into_iter().map(|p| compile_pattern(&rule.name, p)).collect())
                }
            }
            MatchType::Any => Check::Any,
        };

        Self {
            name: rule.name.clone(),
            index: rule.index,
            check,
        }
    }
}

impl Check {
    fn accepts(&self, value: &str) -> bool {
        match self {
            Check::Exact(valid) => {
                let value = value.trim().to_lowercase();
                valid.iter().any(|v| *v == value)
            }
            Check::Contains(valid) => {
                let value = value.to_lowercase();
                valid.iter().any(|v| value.contains(v.as_str()))
            }
            Check::Regex(patterns) => patterns
                .iter()
                .flatten()
                .any(|re| re.is_match(value)),
            Check::Any => true,
        }
    }
}

fn compile_pattern(column: &str, pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            log::warn!("Ignoring invalid pattern for column {}: {}", column, e);
            None
        }
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}
