// ABOUTME: Migrate command: clones schema and data from the source schema to the destination
// ABOUTME: Runs schema read, table and view replay, then batched data transfer with optional resume

use crate::checkpoint::{self, TransferCheckpoint};
use crate::config::MigrationConfig;
use crate::mysql::{redact_password, MySqlClient};
use crate::progress::TerminalProgress;
use crate::report::MigrationReport;
use crate::schema::{apply_schema, read_schema};
use crate::transfer::{
    transfer_tables, transfer_tables_concurrently, CancelFlag, TransferOptions, TransferOutcome,
};
use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::future::Future;

/// Which phases to run and how the run behaves
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Skip the confirmation prompt
    pub yes: bool,
    pub schema_only: bool,
    pub data_only: bool,
    pub resume: bool,
    pub cancel: CancelFlag,
}

/// Clone the source schema into the destination
///
/// Statement and table failures do not stop the run; they are collected in
/// the returned report, whose [`MigrationReport::has_failures`] decides the
/// exit status.
///
/// # Errors
///
/// Fails before any work for invalid options, a declined confirmation, or a
/// failed connection, and stops early if the source catalog cannot be read.
pub async fn migrate(config: &MigrationConfig, options: MigrateOptions) -> Result<MigrationReport> {
    if options.schema_only && options.data_only {
        bail!("--schema-only and --data-only cannot be combined");
    }
    if options.resume && options.schema_only {
        bail!("--resume only applies to the data transfer and cannot be used with --schema-only");
    }

    let schema = config.source_schema()?;

    if !options.yes {
        confirm_plan(config, &schema, &options)?;
    }

    let progress = TerminalProgress::new();

    tracing::info!("Step 1/3: Reading schema '{}' from source...", schema);
    let mut source_conn = MySqlClient::connect(&config.source_url)
        .await
        .context("Failed to connect to source")?;
    let mut snapshot =
        read_schema(&mut source_conn, &schema, &config.read_options, &progress).await?;
    tracing::info!(
        "✓ Captured {} table and {} view definition(s)",
        snapshot.tables.len(),
        snapshot.views.len()
    );
    let mut source = Some(source_conn);

    let mut report = MigrationReport::for_snapshot(&mut snapshot);

    let needs_destination = !options.data_only || config.parallel_tables == 1;
    let mut dest = if needs_destination {
        Some(
            MySqlClient::connect_destination(&config.target_url, config.foreign_key_checks)
                .await
                .context("Failed to connect to target")?,
        )
    } else {
        None
    };

    if options.data_only {
        tracing::info!("Step 2/3: Skipping schema replay (--data-only)");
    } else if let Some(dest) = dest.as_mut() {
        tracing::info!("Step 2/3: Creating tables and views on target...");
        let applied = apply_schema(dest, &snapshot, &progress).await?;
        tracing::info!(
            "✓ Schema replayed ({} created, {} already existed)",
            applied.tables.created() + applied.views.created(),
            applied.tables.already_existing() + applied.views.already_existing()
        );
        report.schema = Some(applied);
    }

    if options.schema_only {
        tracing::info!("Step 3/3: Skipping data transfer (--schema-only)");
    } else {
        tracing::info!("Step 3/3: Copying table data...");

        let mut resume = if options.resume {
            let state = TransferCheckpoint::open(
                checkpoint::default_location(&config.source_url, &config.target_url),
                &config.source_url,
                &config.target_url,
                &snapshot.tables,
            )?;
            tracing::info!(
                "Using checkpoint {} ({} of {} table(s) already copied)",
                state.path().display(),
                state.done_tables().len(),
                snapshot.tables.len()
            );
            Some(state)
        } else {
            None
        };

        let pending = match &resume {
            Some(state) => {
                report.resumed_tables = state.done_tables();
                state.pending_tables()
            }
            None => snapshot.tables.clone(),
        };

        let transfer_options = TransferOptions {
            batch_size: config.batch_size,
            cancel: options.cancel.clone(),
        };
        let record = |outcome: &TransferOutcome| {
            if let Some(state) = resume.as_mut() {
                if let Err(e) = state.record(outcome) {
                    tracing::warn!("Failed to update checkpoint: {:#}", e);
                }
            }
        };

        report.transfers = match (config.parallel_tables, source.as_mut(), dest.as_mut()) {
            (1, Some(source), Some(dest)) => {
                transfer_tables(
                    source,
                    dest,
                    &pending,
                    &transfer_options,
                    &progress,
                    record,
                )
                .await
            }
            _ => {
                // each table opens its own pair below
                close_connection("source", source.take().map(MySqlClient::disconnect)).await;
                close_connection("target", dest.take().map(MySqlClient::disconnect)).await;

                tracing::info!(
                    "Copying up to {} tables at a time",
                    config.parallel_tables
                );
                let connect = move || async move {
                    let source = MySqlClient::connect(&config.source_url).await?;
                    let dest = MySqlClient::connect_destination(
                        &config.target_url,
                        config.foreign_key_checks,
                    )
                    .await?;
                    Ok::<_, anyhow::Error>((source, dest))
                };
                transfer_tables_concurrently(
                    &pending,
                    config.parallel_tables,
                    connect,
                    &transfer_options,
                    &progress,
                    record,
                )
                .await
            }
        };

        if let Some(state) = resume {
            let path = state.path().to_path_buf();
            if state.finish()? {
                tracing::debug!("Removed checkpoint {}", path.display());
            } else {
                tracing::info!(
                    "Checkpoint kept at {}; re-run with --resume to continue",
                    path.display()
                );
            }
        }
    }

    report.log_summary();

    close_connection("target", dest.map(MySqlClient::disconnect)).await;
    close_connection("source", source.map(MySqlClient::disconnect)).await;

    Ok(report)
}

/// Await a connection shutdown, if there is one, and only warn when it fails
///
/// Returns whether the connection closed cleanly.
async fn close_connection<F>(side: &str, closing: Option<F>) -> bool
where
    F: Future<Output = Result<()>>,
{
    let Some(closing) = closing else {
        return true;
    };
    match closing.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("⚠ Failed to close {} connection cleanly: {:#}", side, e);
            false
        }
    }
}

fn confirm_plan(config: &MigrationConfig, schema: &str, options: &MigrateOptions) -> Result<()> {
    let phases = if options.schema_only {
        "schema only"
    } else if options.data_only {
        "data only"
    } else {
        "schema and data"
    };

    println!();
    println!("========================================");
    println!("Migration Plan");
    println!("========================================");
    println!("Source: {}", redact_password(&config.source_url));
    println!("Target: {}", redact_password(&config.target_url));
    println!("Schema: {}", schema);
    println!("Phases: {}", phases);
    println!("Batch size: {} rows", config.batch_size);
    println!("Parallel tables: {}", config.parallel_tables);
    if !config.read_options.filter.is_empty() {
        println!("Relation filter: active");
    }
    println!();
    println!("Existing target rows with matching keys will be replaced.");
    println!("========================================");
    println!();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Proceed with the migration?")
        .default(false)
        .interact()
        .context("Failed to get confirmation")?;

    if !confirmed {
        tracing::warn!("⚠ User cancelled operation");
        bail!("Migration cancelled by user");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigOverrides, FileConfig};

    fn config() -> MigrationConfig {
        MigrationConfig::resolve(
            FileConfig::default(),
            ConfigOverrides {
                source: Some("mysql://src/app".to_string()),
                target: Some("mysql://dst/app".to_string()),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn rejects_conflicting_phase_flags() {
        let options = MigrateOptions {
            yes: true,
            schema_only: true,
            data_only: true,
            ..Default::default()
        };
        let err = migrate(&config(), options).await.unwrap_err();
        assert!(err.to_string().contains("cannot be combined"));
    }

    #[tokio::test]
    async fn rejects_resume_with_schema_only() {
        let options = MigrateOptions {
            yes: true,
            schema_only: true,
            resume: true,
            ..Default::default()
        };
        assert!(migrate(&config(), options).await.is_err());
    }

    #[tokio::test]
    async fn failed_disconnect_only_warns() {
        let lost = async { Err::<(), _>(anyhow::anyhow!("Lost connection to MySQL server")) };
        assert!(!close_connection("source", Some(lost)).await);
        assert!(close_connection("target", Some(async { Ok::<(), anyhow::Error>(()) })).await);
        assert!(close_connection("target", None::<std::future::Ready<Result<()>>>).await);
    }
}
