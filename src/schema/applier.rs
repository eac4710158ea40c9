// ABOUTME: Replays creation statements against the destination idempotently
// ABOUTME: Treats "already exists" as success and isolates every other failure to its statement

use crate::catalog::{CreationStatement, RelationKind};
use crate::client::{DdlOutcome, DdlTarget};
use crate::progress::{Phase, ProgressSink};
use crate::schema::SchemaSnapshot;
use anyhow::{Context, Result};
use std::fmt;

#[derive(Debug)]
pub enum StatementStatus {
    Created,
    AlreadyExists,
    Failed(anyhow::Error),
}

impl fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementStatus::Created => write!(f, "created"),
            StatementStatus::AlreadyExists => write!(f, "already exists"),
            StatementStatus::Failed(e) => write!(f, "failed: {:#}", e),
        }
    }
}

/// Result of replaying one creation statement
#[derive(Debug)]
pub struct StatementOutcome {
    pub name: String,
    pub kind: RelationKind,
    pub status: StatementStatus,
}

impl StatementOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self.status, StatementStatus::Failed(_))
    }
}

/// Outcomes of one statement list, in execution order
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub outcomes: Vec<StatementOutcome>,
}

impl ApplyReport {
    pub fn created(&self) -> usize {
        self.count(|s| matches!(s, StatementStatus::Created))
    }

    pub fn already_existing(&self) -> usize {
        self.count(|s| matches!(s, StatementStatus::AlreadyExists))
    }

    pub fn failed(&self) -> impl Iterator<Item = &StatementOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    fn count(&self, pred: impl Fn(&StatementStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Reports for the two replay passes of a run
#[derive(Debug, Default)]
pub struct SchemaApplyReport {
    pub tables: ApplyReport,
    pub views: ApplyReport,
}

impl SchemaApplyReport {
    pub fn has_failures(&self) -> bool {
        self.tables.has_failures() || self.views.has_failures()
    }
}

/// Execute each statement so its object exists at the destination
///
/// Statements are independent: a failure is recorded in the report and the
/// next statement still runs. One commit follows the whole list.
///
/// # Errors
///
/// Only the final commit can fail the call; statement failures are reported
/// through [`ApplyReport`].
pub async fn apply_statements<D>(
    dest: &mut D,
    statements: &[CreationStatement],
    phase: Phase,
    progress: &dyn ProgressSink,
) -> Result<ApplyReport>
where
    D: DdlTarget + ?Sized,
{
    progress.phase_started(phase, statements.len());
    let mut report = ApplyReport::default();

    for statement in statements {
        let status = match dest.execute_ddl(&statement.sql).await {
            Ok(DdlOutcome::Created) => {
                tracing::info!("Created {}", statement);
                StatementStatus::Created
            }
            Ok(DdlOutcome::AlreadyExists) => {
                tracing::info!("{} already exists, leaving it as is", statement);
                StatementStatus::AlreadyExists
            }
            Err(e) => {
                let e = e.context(format!("Failed to create {}", statement));
                tracing::warn!("{:#}", e);
                StatementStatus::Failed(e)
            }
        };

        let outcome = StatementOutcome {
            name: statement.name.clone(),
            kind: statement.kind,
            status,
        };
        progress.statement_applied(&outcome);
        report.outcomes.push(outcome);
    }

    dest.commit_ddl()
        .await
        .context("Failed to commit creation statements")?;
    progress.phase_finished(phase);

    Ok(report)
}

/// Replay table statements, then view statements
///
/// Views run second because they may select from any table in the snapshot.
pub async fn apply_schema<D>(
    dest: &mut D,
    snapshot: &SchemaSnapshot,
    progress: &dyn ProgressSink,
) -> Result<SchemaApplyReport>
where
    D: DdlTarget + ?Sized,
{
    let tables = apply_statements(
        dest,
        &snapshot.table_statements,
        Phase::CreateTables,
        progress,
    )
    .await?;

    if tables.has_failures() {
        tracing::warn!(
            "{} table statement(s) failed; views depending on them will fail too",
            tables.failed().count()
        );
    }

    let views = apply_statements(dest, &snapshot.view_statements, Phase::CreateViews, progress)
        .await?;

    Ok(SchemaApplyReport { tables, views })
}
