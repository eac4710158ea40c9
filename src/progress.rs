// ABOUTME: Progress reporting for migration phases, statements, and table transfers
// ABOUTME: Renders indicatif bars on a terminal; observability only, never control flow

use crate::catalog::RelationKind;
use crate::schema::StatementOutcome;
use crate::transfer::TransferOutcome;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fmt;
use std::sync::Mutex;

/// Stages of one migration run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ReadSchema,
    CreateTables,
    CreateViews,
    TransferData,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::ReadSchema => "Reading source schema",
            Phase::CreateTables => "Creating tables",
            Phase::CreateViews => "Creating views",
            Phase::TransferData => "Copying table data",
        };
        f.write_str(label)
    }
}

/// Receiver of human-readable progress events
///
/// Every method has an empty default so sinks only implement what they show.
pub trait ProgressSink: Send + Sync {
    fn phase_started(&self, _phase: Phase, _total: usize) {}

    fn relation_read(&self, _name: &str, _kind: RelationKind) {}

    fn statement_applied(&self, _outcome: &StatementOutcome) {}

    fn table_started(&self, _table: &str) {}

    fn batch_committed(&self, _table: &str, _batch_rows: usize, _table_rows: u64) {}

    fn table_finished(&self, _outcome: &TransferOutcome) {}

    fn phase_finished(&self, _phase: Phase) {}
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// One progress bar per phase, drawn with `indicatif`
pub struct TerminalProgress {
    multi: MultiProgress,
    current: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.current.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn phase_started(&self, phase: Phase, total: usize) {
        let style = ProgressStyle::with_template(
            "{prefix:<22} [{bar:40.cyan/blue}] {pos}/{len} {elapsed_precise} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

        let bar = self.multi.add(ProgressBar::new(total as u64));
        bar.set_style(style);
        bar.set_prefix(phase.to_string());

        if let Ok(mut guard) = self.current.lock() {
            *guard = Some(bar);
        }
    }

    fn relation_read(&self, name: &str, kind: RelationKind) {
        self.with_bar(|bar| {
            bar.set_message(format!("{} {}", kind, name));
            bar.inc(1);
        });
    }

    fn statement_applied(&self, outcome: &StatementOutcome) {
        self.with_bar(|bar| {
            bar.set_message(format!("{} {}: {}", outcome.kind, outcome.name, outcome.status));
            bar.inc(1);
        });
    }

    fn table_started(&self, table: &str) {
        self.with_bar(|bar| bar.set_message(table.to_string()));
    }

    fn batch_committed(&self, table: &str, _batch_rows: usize, table_rows: u64) {
        self.with_bar(|bar| bar.set_message(format!("{}: {} rows", table, table_rows)));
    }

    fn table_finished(&self, outcome: &TransferOutcome) {
        self.with_bar(|bar| {
            bar.set_message(format!("{}: {} rows", outcome.table, outcome.rows_copied));
            bar.inc(1);
        });
    }

    fn phase_finished(&self, _phase: Phase) {
        if let Ok(mut guard) = self.current.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_with_message("done");
            }
        }
    }
}
