//! Order-preserving parallel row processing
//!
//! Rows are split into contiguous chunks, one per worker. Each worker tags
//! its results with the original row index; the collector sorts by that index
//! before assembling the output, so the output order always equals the input
//! order no matter which worker finishes first.
//!
//! Workers must not write diagnostics. Per-row outcomes are reduced to counts
//! that the caller can report after collection.

use crate::config::PipelineConfig;
use std::sync::mpsc;

/// Lower bound on workers once a run is large enough to go parallel
pub const MIN_WORKERS: usize = 4;
/// Upper bound on workers
pub const MAX_WORKERS: usize = 32;
/// Row count below which a single worker is used
pub const DEFAULT_MIN_PARALLEL_ROWS: usize = 500;
/// Row count below which workers scale with cores instead of twice the cores
const MEDIUM_RUN_ROWS: usize = 5000;

/// Result of processing one row
#[derive(Debug)]
struct TaggedRow {
    index: usize,
    output: Option<Vec<String>>,
}

/// Output of a processing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Processed {
    /// Kept rows, in input order
    pub rows: Vec<Vec<String>>,
    /// Rows the per-row function rejected
    pub dropped: usize,
    /// Workers actually used
    pub workers: usize,
}

/// Bounded worker pool policy for per-row transforms
#[derive(Debug, Clone)]
pub struct ParallelRowProcessor {
    available: usize,
    min_parallel_rows: usize,
    max_workers: usize,
    fixed_workers: Option<usize>,
}

impl ParallelRowProcessor {
    /// Processor sized from the machine's available parallelism
    pub fn new() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            available,
            min_parallel_rows: DEFAULT_MIN_PARALLEL_ROWS,
            max_workers: MAX_WORKERS,
            fixed_workers: None,
        }
    }

    /// Processor using the thresholds from `config`
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new()
            .with_min_parallel_rows(config.min_parallel_rows)
            .with_max_workers(config.max_workers)
    }

    /// Builder method: set the single-worker threshold
    pub fn with_min_parallel_rows(mut self, rows: usize) -> Self {
        self.min_parallel_rows = rows;
        self
    }

    /// Builder method: cap workers (never below 1, never above [`MAX_WORKERS`])
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.clamp(1, MAX_WORKERS);
        self
    }

    /// Builder method: always use exactly `workers` workers
    pub fn with_fixed_workers(mut self, workers: usize) -> Self {
        self.fixed_workers = Some(workers.max(1));
        self
    }

    /// Number of workers for a run over `row_count` rows
    pub fn worker_count(&self, row_count: usize) -> usize {
        if let Some(fixed) = self.fixed_workers {
            return fixed.min(row_count.max(1));
        }

        if row_count < self.min_parallel_rows {
            return 1;
        }

        let target = if row_count < MEDIUM_RUN_ROWS {
            self.available
        } else {
            self.available * 2
        };

        let floor = MIN_WORKERS.min(self.max_workers);
        target.clamp(floor, self.max_workers).min(row_count)
    }

    /// Apply `f` to every row, keeping rows for which it returns `Some`
    ///
    /// `f` receives the original row index and the row.
    pub fn process<F>(&self, rows: &[Vec<String>], f: F) -> Processed
    where
        F: Fn(usize, &[String]) -> Option<Vec<String>> + Sync,
    {
        let workers = self.worker_count(rows.len());
        if workers <= 1 || rows.is_empty() {
            return Self::process_sequential(rows, &f);
        }

        let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool,
            Err(e) => {
                log::warn!("Failed to start {} row workers, processing sequentially: {}", workers, e);
                return Self::process_sequential(rows, &f);
            }
        };

        let chunk_size = rows.len().div_ceil(workers);
        let (tx, rx) = mpsc::channel::<Vec<TaggedRow>>();

        pool.scope(|scope| {
            for (chunk_idx, chunk) in rows.chunks(chunk_size).enumerate() {
                let tx = tx.clone();
                let f = &f;
                scope.spawn(move |_| {
                    let start = chunk_idx * chunk_size;
                    let tagged: Vec<TaggedRow> = chunk
                        .iter()
                        .enumerate()
                        .map(|(offset, row)| TaggedRow {
                            index: start + offset,
                            output: f(start + offset, row),
                        })
                        .collect();
                    // The receiver outlives the scope
                    let _ = tx.send(tagged);
                });
            }
        });
        drop(tx);

        let mut tagged: Vec<TaggedRow> = rx.into_iter().flatten().collect();
        tagged.sort_unstable_by_key(|t| t.index);

        let mut processed = Self::assemble(tagged);
        processed.workers = workers;
        processed
    }

    fn process_sequential<F>(rows: &[Vec<String>], f: &F) -> Processed
    where
        F: Fn(usize, &[String]) -> Option<Vec<String>>,
    {
        let tagged = rows
            .iter()
            .enumerate()
            .map(|(index, row)| TaggedRow {
                index,
                output: f(index, row),
            })
            .collect();

        let mut processed = Self::assemble(tagged);
        processed.workers = 1;
        processed
    }

    fn assemble(tagged: Vec<TaggedRow>) -> Processed {
        let mut processed = Processed {
            rows: Vec::with_capacity(tagged.len()),
            ..Processed::default()
        };

        for t in tagged {
            match t.output {
                Some(row) => processed.rows.push(row),
                None => processed.dropped += 1,
            }
        }

        processed
    }
}

impl Default for ParallelRowProcessor {
    fn default() -> Self {
        Self::new()
    }
}
