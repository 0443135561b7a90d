//! Protocol-specific row transforms
//!
//! Each protocol has its own [`ProtocolTransformer`]; one is selected per
//! transform call from the requested [`Protocol`]:
//! - [`CanTransformer`]: filters rows and annotates CAN message meanings
//! - [`CanOpenTransformer`]: annotates node/object columns, never filters
//! - [`PassthroughTransformer`]: returns headers and rows unchanged
//!
//! CAN and CANopen deliberately differ in whether filtering applies.

use crate::config::{PipelineConfig, RowFilterConfig};
use crate::definitions::CanDefinitionTable;
use crate::diagnostics::Diagnostics;
use crate::filter::RowFilter;
use crate::parallel::ParallelRowProcessor;
use crate::types::Protocol;

pub mod can;
pub mod canopen;
pub mod passthrough;

pub use can::CanTransformer;
pub use canopen::CanOpenTransformer;
pub use passthrough::PassthroughTransformer;

/// Headers and rows after a protocol transform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transformed {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Rows removed by filtering
    pub dropped: usize,
}

/// Maps parsed headers and rows to their annotated form
pub trait ProtocolTransformer: Send + Sync {
    /// Protocol this transformer implements
    fn protocol(&self) -> Protocol;

    /// Transform a parsed table
    ///
    /// Row order is preserved; rejected rows are dropped and counted.
    fn transform(
        &self,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        processor: &ParallelRowProcessor,
        diag: &Diagnostics<'_>,
    ) -> Transformed;
}

/// Row filter and definitions snapshot shared by every worker of a run
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub filter: RowFilter,
    pub definitions: CanDefinitionTable,
}

impl RuleSet {
    pub fn new(filter: RowFilter, definitions: CanDefinitionTable) -> Self {
        Self {
            filter,
            definitions,
        }
    }

    /// Rules that admit every row and resolve no meanings
    pub fn unfiltered() -> Self {
        let config = RowFilterConfig {
            columns: Vec::new(),
            min_column_count: 0,
        };
        Self::new(RowFilter::new(&config), CanDefinitionTable::new())
    }

    /// Load the rule documents named by `config`
    ///
    /// A missing or unreadable row filter falls back to the built-in rules; a
    /// missing or unreadable definitions table yields an empty table. Both
    /// fallbacks are reported as warnings.
    pub fn load(config: &PipelineConfig, diag: &Diagnostics<'_>) -> Self {
        let filter_config = match &config.row_filter_path {
            Some(path) if path.exists() => match RowFilterConfig::load(path) {
                Ok(loaded) => {
                    diag.info(format_args!(
                        "Loaded row filter: {} column rules, minColumnCount={}",
                        loaded.columns.len(),
                        loaded.min_column_count
                    ));
                    loaded
                }
                Err(e) => {
                    log::warn!("{}, using built-in row filter", e);
                    diag.warn(format_args!("{}, using built-in row filter", e));
                    RowFilterConfig::default()
                }
            },
            _ => {
                log::debug!("No row filter document, using built-in rules");
                RowFilterConfig::default()
            }
        };

        let definitions = match &config.definitions_path {
            Some(path) if path.exists() => match CanDefinitionTable::load(path) {
                Ok(table) => {
                    diag.info(format_args!("Loaded {} CAN definitions", table.len()));
                    table
                }
                Err(e) => {
                    log::warn!("{}, message meanings unavailable", e);
                    diag.warn(format_args!("{}, message meanings unavailable", e));
                    CanDefinitionTable::new()
                }
            },
            _ => CanDefinitionTable::new(),
        };

        Self::new(RowFilter::new(&filter_config), definitions)
    }
}

/// Select the transformer for `protocol`
pub fn transformer_for<'a>(protocol: Protocol, rules: &'a RuleSet) -> Box<dyn ProtocolTransformer + 'a> {
    match protocol {
        Protocol::Can => Box::new(CanTransformer::new(&rules.filter, &rules.definitions)),
        Protocol::CanOpen => Box::new(CanOpenTransformer),
        Protocol::Common => Box::new(PassthroughTransformer),
    }
}
