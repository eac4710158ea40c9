// ABOUTME: Aggregate result of one migration run across schema and data phases
// ABOUTME: Drives the final summary and the process exit status

use crate::catalog::RelationKind;
use crate::schema::{SchemaApplyReport, SchemaSnapshot, SkippedRelation, StatementOutcome};
use crate::transfer::{TransferOutcome, TransferStatus};
use crate::utils::sanitize_identifier;

#[derive(Debug, Default)]
pub struct MigrationReport {
    pub tables_found: usize,
    pub views_found: usize,
    /// Relations left out because their definition could not be read
    pub skipped: Vec<SkippedRelation>,
    /// `None` when the schema phases did not run (`--data-only`)
    pub schema: Option<SchemaApplyReport>,
    pub transfers: Vec<TransferOutcome>,
    /// Tables a resumed run found already completed
    pub resumed_tables: Vec<String>,
}

impl MigrationReport {
    /// Start the report of a run from what the schema read produced
    ///
    /// Relations skipped during the read move into the report, so they show
    /// up in the summary and in [`MigrationReport::has_failures`].
    pub fn for_snapshot(snapshot: &mut SchemaSnapshot) -> Self {
        Self {
            tables_found: snapshot.tables.len(),
            views_found: snapshot.views.len(),
            skipped: std::mem::take(&mut snapshot.skipped),
            ..Default::default()
        }
    }

    pub fn failed_statements(&self) -> Vec<&StatementOutcome> {
        match &self.schema {
            Some(schema) => schema.tables.failed().chain(schema.views.failed()).collect(),
            None => Vec::new(),
        }
    }

    pub fn failed_tables(&self) -> Vec<&TransferOutcome> {
        self.transfers.iter().filter(|t| t.error().is_some()).collect()
    }

    pub fn cancelled_tables(&self) -> Vec<&TransferOutcome> {
        self.transfers
            .iter()
            .filter(|t| matches!(t.status, TransferStatus::Cancelled))
            .collect()
    }

    pub fn total_rows(&self) -> u64 {
        self.transfers.iter().map(|t| t.rows_copied).sum()
    }

    /// True when the run must exit non-zero
    ///
    /// Skipped relations and cancelled tables count: the destination is not a
    /// complete copy.
    pub fn has_failures(&self) -> bool {
        !self.skipped.is_empty()
            || !self.failed_statements().is_empty()
            || !self.failed_tables().is_empty()
            || !self.cancelled_tables().is_empty()
    }

    pub fn log_summary(&self) {
        tracing::info!("========================================");
        tracing::info!("Migration summary");
        tracing::info!("========================================");
        tracing::info!(
            "Source schema: {} table(s), {} view(s)",
            self.tables_found,
            self.views_found
        );

        for skipped in &self.skipped {
            tracing::warn!(
                "  ✗ {} '{}' skipped: {:#}",
                skipped.kind,
                sanitize_identifier(&skipped.name),
                skipped.error
            );
        }

        if let Some(schema) = &self.schema {
            for (kind, report) in [
                (RelationKind::Table, &schema.tables),
                (RelationKind::View, &schema.views),
            ] {
                tracing::info!(
                    "{} statements: {} created, {} already existed, {} failed",
                    kind.keyword(),
                    report.created(),
                    report.already_existing(),
                    report.failed().count()
                );
            }
            for outcome in self.failed_statements() {
                tracing::warn!(
                    "  ✗ {} '{}': {}",
                    outcome.kind,
                    sanitize_identifier(&outcome.name),
                    outcome.status
                );
            }
        }

        if !self.resumed_tables.is_empty() {
            tracing::info!(
                "{} table(s) already copied by a previous run",
                self.resumed_tables.len()
            );
        }

        for outcome in &self.transfers {
            let name = sanitize_identifier(&outcome.table);
            match &outcome.status {
                TransferStatus::Completed => tracing::info!(
                    "  ✓ {}: {} rows in {} batch(es)",
                    name,
                    outcome.rows_copied,
                    outcome.batches
                ),
                TransferStatus::Cancelled => tracing::warn!(
                    "  ⚠ {}: cancelled after {} rows",
                    name,
                    outcome.rows_copied
                ),
                TransferStatus::Failed(e) => tracing::warn!(
                    "  ✗ {}: failed after {} rows: {:#}",
                    name,
                    outcome.rows_copied,
                    e
                ),
            }
        }

        tracing::info!(
            "Copied {} rows across {} table(s); {} table(s) failed",
            self.total_rows(),
            self.transfers.len(),
            self.failed_tables().len()
        );
    }
}
