// ABOUTME: Batched, replace-on-conflict row transfer from source tables to the destination
// ABOUTME: Commits every batch, isolates failures per table, and stops cleanly at batch boundaries

use crate::client::{MigrationBatch, RowSink, RowSource};
use crate::progress::{Phase, ProgressSink};
use crate::utils::sanitize_identifier;
use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Shared stop request, honoured between batches
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub batch_size: usize,
    pub cancel: CancelFlag,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: CancelFlag::new(),
        }
    }
}

#[derive(Debug)]
pub enum TransferStatus {
    Completed,
    /// Stopped at a batch boundary on request; committed batches stay
    Cancelled,
    Failed(anyhow::Error),
}

/// Per-table result of the data transfer
#[derive(Debug)]
pub struct TransferOutcome {
    pub table: String,
    pub rows_copied: u64,
    /// Batches written and committed
    pub batches: u64,
    pub status: TransferStatus,
}

impl TransferOutcome {
    fn cancelled_before_start(table: &str) -> Self {
        Self {
            table: table.to_string(),
            rows_copied: 0,
            batches: 0,
            status: TransferStatus::Cancelled,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, TransferStatus::Completed)
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        match &self.status {
            TransferStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Copy every row of one table
///
/// The source streams batches through a bounded channel while the destination
/// writes and commits them, so at most one batch is read ahead. Any failure is
/// captured in the returned outcome; uncommitted destination work is rolled
/// back first.
pub async fn transfer_table<S, D>(
    source: &mut S,
    dest: &mut D,
    table: &str,
    options: &TransferOptions,
    progress: &dyn ProgressSink,
) -> TransferOutcome
where
    S: RowSource + ?Sized,
    D: RowSink + ?Sized,
{
    let table_label = sanitize_identifier(table);
    tracing::info!("Working on table '{}'", table_label);
    progress.table_started(table);

    let (tx, rx) = mpsc::channel::<MigrationBatch>(1);
    let read = source.stream_rows(table, options.batch_size, tx);

    let dest_ref = &mut *dest;
    let shown = table_label.as_str();
    let write = async move {
        let mut rx = rx;
        let mut rows_copied: u64 = 0;
        let mut batches: u64 = 0;

        while let Some(batch) = rx.recv().await {
            if options.cancel.is_cancelled() {
                return (rows_copied, batches, Ok(false));
            }
            if batch.is_empty() {
                continue;
            }

            if let Err(e) = write_batch(&mut *dest_ref, table, &batch).await {
                return (rows_copied, batches, Err(e));
            }

            rows_copied += batch.len() as u64;
            batches += 1;
            tracing::debug!(
                "Committed batch {} of '{}' ({} rows, {} total)",
                batches,
                shown,
                batch.len(),
                rows_copied
            );
            progress.batch_committed(table, batch.len(), rows_copied);
        }

        (rows_copied, batches, Ok(true))
    };

    let (read_result, (rows_copied, batches, write_result)) = tokio::join!(read, write);

    let status = match (write_result, read_result) {
        (Err(e), _) => TransferStatus::Failed(e),
        (Ok(false), _) => TransferStatus::Cancelled,
        (Ok(true), Err(e)) => TransferStatus::Failed(e),
        (Ok(true), Ok(_)) => TransferStatus::Completed,
    };

    let status = match status {
        TransferStatus::Failed(e) => {
            let e = e.context(format!("Failed to copy table '{}'", table_label));
            tracing::warn!("{:#}", e);
            if let Err(rollback) = dest.rollback_rows().await {
                tracing::warn!(
                    "Rollback after failure on '{}' failed: {:#}",
                    table_label,
                    rollback
                );
            }
            TransferStatus::Failed(e)
        }
        TransferStatus::Cancelled => {
            tracing::warn!(
                "Stopped '{}' on request after {} committed rows",
                table_label,
                rows_copied
            );
            TransferStatus::Cancelled
        }
        TransferStatus::Completed => {
            tracing::info!("Total rows copied for '{}': {}", table_label, rows_copied);
            TransferStatus::Completed
        }
    };

    TransferOutcome {
        table: table.to_string(),
        rows_copied,
        batches,
        status,
    }
}

async fn write_batch<D>(dest: &mut D, table: &str, batch: &MigrationBatch) -> Result<()>
where
    D: RowSink + ?Sized,
{
    dest.replace_rows(table, batch).await?;
    dest.commit_rows()
        .await
        .with_context(|| format!("Failed to commit batch of {} rows", batch.len()))
}

/// Copy tables one after another over a single connection pair
///
/// `on_outcome` sees every outcome as soon as its table finishes.
pub async fn transfer_tables<S, D, F>(
    source: &mut S,
    dest: &mut D,
    tables: &[String],
    options: &TransferOptions,
    progress: &dyn ProgressSink,
    mut on_outcome: F,
) -> Vec<TransferOutcome>
where
    S: RowSource + ?Sized,
    D: RowSink + ?Sized,
    F: FnMut(&TransferOutcome),
{
    progress.phase_started(Phase::TransferData, tables.len());
    let mut outcomes = Vec::with_capacity(tables.len());

    for table in tables {
        let outcome = if options.cancel.is_cancelled() {
            TransferOutcome::cancelled_before_start(table)
        } else {
            transfer_table(&mut *source, &mut *dest, table, options, progress).await
        };
        progress.table_finished(&outcome);
        on_outcome(&outcome);
        outcomes.push(outcome);
    }

    progress.phase_finished(Phase::TransferData);
    outcomes
}

/// Copy up to `workers` tables at the same time
///
/// Every table opens its own source/destination pair through `connect` and
/// drops it when the table is done, so no connection is shared between
/// workers. Outcomes are returned in the order of `tables`.
pub async fn transfer_tables_concurrently<C, Fut, S, D, F>(
    tables: &[String],
    workers: usize,
    connect: C,
    options: &TransferOptions,
    progress: &dyn ProgressSink,
    mut on_outcome: F,
) -> Vec<TransferOutcome>
where
    C: Fn() -> Fut,
    Fut: Future<Output = Result<(S, D)>>,
    S: RowSource,
    D: RowSink,
    F: FnMut(&TransferOutcome),
{
    progress.phase_started(Phase::TransferData, tables.len());
    let connect = &connect;

    let mut finished: Vec<(usize, TransferOutcome)> = stream::iter(tables.iter().enumerate())
        .map(|(idx, table)| async move {
            if options.cancel.is_cancelled() {
                return (idx, TransferOutcome::cancelled_before_start(table));
            }

            let outcome = match connect().await {
                Ok((mut source, mut dest)) => {
                    transfer_table(&mut source, &mut dest, table, options, progress).await
                }
                Err(e) => {
                    let e = e.context(format!(
                        "Failed to open connections for table '{}'",
                        sanitize_identifier(table)
                    ));
                    tracing::warn!("{:#}", e);
                    TransferOutcome {
                        table: table.clone(),
                        rows_copied: 0,
                        batches: 0,
                        status: TransferStatus::Failed(e),
                    }
                }
            };
            (idx, outcome)
        })
        .buffer_unordered(workers.max(1))
        .inspect(|(_, outcome)| {
            progress.table_finished(outcome);
            on_outcome(outcome);
        })
        .collect()
        .await;

    progress.phase_finished(Phase::TransferData);

    finished.sort_by_key(|(idx, _)| *idx);
    finished.into_iter().map(|(_, outcome)| outcome).collect()
}
