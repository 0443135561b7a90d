//! CANopen log transform
//!
//! Output headers are `[ProtocolType, NodeId, ObjectIndex, SubIndex, <input
//! headers>]`. No row is ever rejected: CANopen logs are expected to be
//! validated before they reach the pipeline.

use super::{ProtocolTransformer, Transformed};
use crate::diagnostics::Diagnostics;
use crate::parallel::ParallelRowProcessor;
use crate::types::Protocol;

/// Synthetic columns prepended to CANopen output
pub const CANOPEN_PREFIX_HEADERS: [&str; 4] = ["ProtocolType", "NodeId", "ObjectIndex", "SubIndex"];

/// CANopen transformer
#[derive(Debug, Clone, Copy, Default)]
pub struct CanOpenTransformer;

impl CanOpenTransformer {
    /// Annotate the row at 0-based `index`
    pub fn annotate_row(index: usize, row: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(row.len() + CANOPEN_PREFIX_HEADERS.len());
        out.push(Protocol::CanOpen.tag().to_string());
        out.push(format!("Node_{}", index + 1));
        out.push(format!("0x{:04X}", index * 100));
        out.push("0x00".to_string());
        out.extend(row.iter().cloned());
        out
    }
}

impl ProtocolTransformer for CanOpenTransformer {
    fn protocol(&self) -> Protocol {
        Protocol::CanOpen
    }

    fn transform(
        &self,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        processor: &ParallelRowProcessor,
        diag: &Diagnostics<'_>,
    ) -> Transformed {
        let processed = processor.process(&rows, |index, row| Some(Self::annotate_row(index, row)));

        diag.info(format_args!(
            "CANOPEN transform: {} input rows, {} output rows",
            rows.len(),
            processed.rows.len()
        ));

        let mut out_headers: Vec<String> = CANOPEN_PREFIX_HEADERS.iter().map(|h| h.to_string()).collect();
        out_headers.extend(headers);

        Transformed {
            headers: out_headers,
            rows: processed.rows,
            dropped: 0,
        }
    }
}
