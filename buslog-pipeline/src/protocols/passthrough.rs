//! Identity transform for the common/default protocol

use super::{ProtocolTransformer, Transformed};
use crate::diagnostics::Diagnostics;
use crate::parallel::ParallelRowProcessor;
use crate::types::Protocol;

/// Returns headers and rows unchanged, without filtering
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTransformer;

impl ProtocolTransformer for PassthroughTransformer {
    fn protocol(&self) -> Protocol {
        Protocol::Common
    }

    fn transform(
        &self,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        _processor: &ParallelRowProcessor,
        diag: &Diagnostics<'_>,
    ) -> Transformed {
        diag.info(format_args!("Default processing, returning {} rows unchanged", rows.len()));
        Transformed {
            headers,
            rows,
            dropped: 0,
        }
    }
}
