// ABOUTME: Validate command: checks both servers are reachable before a migration
// ABOUTME: Reports server versions and the size of the source catalog after filtering

use crate::catalog::RelationKind;
use crate::client::SchemaSource;
use crate::config::MigrationConfig;
use crate::mysql::{redact_password, MySqlClient};
use anyhow::{Context, Result};

/// Connect to both ends and report what a migration would work with
///
/// Source/target distinctness is already enforced when the configuration is
/// resolved.
pub async fn validate(config: &MigrationConfig) -> Result<()> {
    let schema = config.source_schema()?;

    tracing::info!("Checking source {}...", redact_password(&config.source_url));
    let mut source = MySqlClient::connect(&config.source_url)
        .await
        .context("Failed to connect to source")?;
    let source_version = source.server_version().await?;
    tracing::info!("✓ Source server version {}", source_version);

    let listed = source.list_relations(&schema).await?;
    let (mut tables, mut views) = (0usize, 0usize);
    for (name, table_type) in &listed {
        if !config.read_options.filter.includes(name) {
            continue;
        }
        match RelationKind::from_table_type(table_type) {
            Some(RelationKind::Table) => tables += 1,
            Some(RelationKind::View) => views += 1,
            None => {}
        }
    }
    tracing::info!(
        "✓ Schema '{}' has {} table(s) and {} view(s) to migrate",
        schema,
        tables,
        views
    );
    source.disconnect().await?;

    tracing::info!("Checking target {}...", redact_password(&config.target_url));
    let mut target = MySqlClient::connect(&config.target_url)
        .await
        .context("Failed to connect to target")?;
    let target_version = target.server_version().await?;
    tracing::info!("✓ Target server version {}", target_version);
    if let Some(db) = target.current_database().await? {
        tracing::info!("✓ Target schema '{}' is selected", db);
    }
    target.disconnect().await?;

    if major_minor(&source_version) != major_minor(&target_version) {
        tracing::warn!(
            "⚠ Source ({}) and target ({}) run different server versions; some DDL may not replay",
            source_version,
            target_version
        );
    }

    tracing::info!("✓ Validation passed");
    Ok(())
}

/// Leading `major.minor` of a version string such as `8.0.36-log`
fn major_minor(version: &str) -> &str {
    let end = version
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(version.len());
    let numeric = &version[..end];
    match numeric.match_indices('.').nth(1) {
        Some((second_dot, _)) => &numeric[..second_dot],
        None => numeric,
    }
}
