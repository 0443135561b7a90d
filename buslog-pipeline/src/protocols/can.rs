//! CAN log transform
//!
//! Output headers are `[ProtocolType, MessageId, DataLength, <input headers>,
//! Meaning]`. Every row is screened by the row filter; rejected rows are
//! dropped.
//!
//! For kept rows:
//! - `MessageId` is the row's field count as `0x%03X`. This mirrors the
//!   historical output format and is not the bus identifier.
//! - `DataLength` is the row's field count.
//! - `Meaning` is the description of the ID found in the `Buffer` column
//!   (`string=<id>:<len>:[...]`), or empty when unresolved.

use super::{ProtocolTransformer, Transformed};
use crate::definitions::{buffer_message_id, CanDefinitionTable};
use crate::diagnostics::Diagnostics;
use crate::filter::RowFilter;
use crate::parallel::ParallelRowProcessor;
use crate::types::{find_column, Protocol};
use std::collections::BTreeMap;

/// Synthetic columns prepended to CAN output
pub const CAN_PREFIX_HEADERS: [&str; 3] = ["ProtocolType", "MessageId", "DataLength"];
/// Synthetic column appended to CAN output
pub const MEANING_HEADER: &str = "Meaning";
/// Column carrying the raw CAN frame
pub const BUFFER_HEADER: &str = "Buffer";

/// CAN transformer borrowing the run's rule snapshot
#[derive(Debug, Clone, Copy)]
pub struct CanTransformer<'a> {
    filter: &'a RowFilter,
    definitions: &'a CanDefinitionTable,
}

impl<'a> CanTransformer<'a> {
    pub fn new(filter: &'a RowFilter, definitions: &'a CanDefinitionTable) -> Self {
        Self {
            filter,
            definitions,
        }
    }

    /// Build the output row for an admissible input row
    ///
    /// Returns `None` when the row filter rejects it.
    pub fn annotate_row(&self, row: &[String], buffer_idx: Option<usize>) -> Option<Vec<String>> {
        if !self.filter.is_admissible(row) {
            return None;
        }

        let field_count = row.len();
        let mut out = Vec::with_capacity(field_count + CAN_PREFIX_HEADERS.len() + 1);
        out.push(Protocol::Can.tag().to_string());
        out.push(format!("0x{:03X}", field_count));
        out.push(field_count.to_string());
        out.extend(row.iter().cloned());
        out.push(self.meaning(row, buffer_idx).unwrap_or_default());
        Some(out)
    }

    /// Description of the message in the row's buffer column, if known
    fn meaning(&self, row: &[String], buffer_idx: Option<usize>) -> Option<String> {
        let buffer = row.get(buffer_idx?)?;
        let id = buffer_message_id(buffer)?;
        self.definitions.lookup(&id).map(str::to_string)
    }
}

impl ProtocolTransformer for CanTransformer<'_> {
    fn protocol(&self) -> Protocol {
        Protocol::Can
    }

    fn transform(
        &self,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        processor: &ParallelRowProcessor,
        diag: &Diagnostics<'_>,
    ) -> Transformed {
        let buffer_idx = find_column(&headers, BUFFER_HEADER);
        match buffer_idx {
            Some(idx) => diag.info(format_args!("Buffer column at index {}", idx)),
            None => diag.warn(format_args!("No Buffer column, message meanings unavailable")),
        }

        let processed = processor.process(&rows, |_, row| self.annotate_row(row, buffer_idx));

        diag.info(format_args!(
            "CAN transform: {} input rows, {} kept, {} filtered, {} workers",
            rows.len(),
            processed.rows.len(),
            processed.dropped,
            processed.workers
        ));
        if diag.is_enabled() {
            // Rows may be ragged; Meaning is always the last field
            let mut matched: BTreeMap<&str, usize> = BTreeMap::new();
            for row in &processed.rows {
                match row.last() {
                    Some(m) if !m.is_empty() => *matched.entry(m.as_str()).or_insert(0) += 1,
                    _ => {}
                }
            }
            for (meaning, count) in matched {
                diag.info(format_args!("  {}: {} rows", meaning, count));
            }
        }

        let mut out_headers: Vec<String> = CAN_PREFIX_HEADERS.iter().map(|h| h.to_string()).collect();
        out_headers.extend(headers);
        out_headers.push(MEANING_HEADER.to_string());

        Transformed {
            headers: out_headers,
            rows: processed.rows,
            dropped: processed.dropped,
        }
    }
}
