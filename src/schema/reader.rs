// ABOUTME: Reads the source schema into a relation catalog and normalized creation statements
// ABOUTME: Enumerates tables and views, fetches SHOW CREATE output, and orders views by dependency

use crate::catalog::{CreationStatement, RelationCatalog, RelationKind};
use crate::client::SchemaSource;
use crate::filters::RelationFilter;
use crate::progress::{Phase, ProgressSink};
use crate::schema::normalize::normalize_create_statement;
use crate::schema::ordering::order_views_by_dependency;
use crate::utils::sanitize_identifier;
use anyhow::{Context, Result};
use serde::Deserialize;

/// What to do when one relation's creation statement cannot be fetched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementErrorPolicy {
    /// Abort the read so the catalog always matches the statement lists
    #[default]
    Fail,
    /// Drop the relation from the snapshot, record it, and continue
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub on_statement_error: StatementErrorPolicy,
    pub filter: RelationFilter,
}

/// A relation left out of the snapshot under [`StatementErrorPolicy::Skip`]
#[derive(Debug)]
pub struct SkippedRelation {
    pub name: String,
    pub kind: RelationKind,
    pub error: anyhow::Error,
}

/// Everything the later phases need from the source schema
///
/// `table_statements` is in the same order as `tables`, and `view_statements`
/// in the same order as `views`.
#[derive(Debug, Default)]
pub struct SchemaSnapshot {
    pub catalog: RelationCatalog,
    pub tables: Vec<String>,
    pub views: Vec<String>,
    pub table_statements: Vec<CreationStatement>,
    pub view_statements: Vec<CreationStatement>,
    pub skipped: Vec<SkippedRelation>,
}

/// Read the catalog of `schema` and a normalized creation statement for every member
///
/// # Errors
///
/// Fails without a partial result if the catalog cannot be listed. A failing
/// `SHOW CREATE` for one relation fails the read under
/// [`StatementErrorPolicy::Fail`] and is recorded in
/// [`SchemaSnapshot::skipped`] under [`StatementErrorPolicy::Skip`].
pub async fn read_schema<S>(
    source: &mut S,
    schema: &str,
    options: &ReadOptions,
    progress: &dyn ProgressSink,
) -> Result<SchemaSnapshot>
where
    S: SchemaSource + ?Sized,
{
    let listed = source
        .list_relations(schema)
        .await
        .with_context(|| format!("Failed to read the catalog of schema '{}'", schema))?;

    let mut catalog = RelationCatalog::new();
    for (name, table_type) in listed {
        let Some(kind) = RelationKind::from_table_type(&table_type) else {
            tracing::warn!(
                "Ignoring '{}' of unsupported type '{}'",
                sanitize_identifier(&name),
                table_type
            );
            continue;
        };
        if !options.filter.includes(&name) {
            tracing::debug!("Excluding {} '{}' by filter", kind, sanitize_identifier(&name));
            continue;
        }
        catalog.insert(name, kind)?;
    }

    tracing::info!(
        "Found {} table(s) and {} view(s) in schema '{}'",
        catalog.names_of(RelationKind::Table).len(),
        catalog.names_of(RelationKind::View).len(),
        schema
    );

    progress.phase_started(Phase::ReadSchema, catalog.len());

    let members: Vec<(String, RelationKind)> = catalog
        .iter()
        .map(|(name, kind)| (name.to_string(), kind))
        .collect();

    let mut table_statements = Vec::new();
    let mut view_statements = Vec::new();
    let mut skipped = Vec::new();

    for (name, kind) in members {
        let fetched = source.show_create(schema, &name, kind).await.with_context(|| {
            format!(
                "Failed to retrieve creation statement for {} '{}'",
                kind,
                sanitize_identifier(&name)
            )
        });

        let raw = match fetched {
            Ok(raw) => raw,
            Err(e) => match options.on_statement_error {
                StatementErrorPolicy::Fail => return Err(e),
                StatementErrorPolicy::Skip => {
                    tracing::warn!("Skipping {} '{}': {:#}", kind, sanitize_identifier(&name), e);
                    catalog.remove(&name);
                    skipped.push(SkippedRelation {
                        name,
                        kind,
                        error: e,
                    });
                    continue;
                }
            },
        };

        let statement = CreationStatement::new(
            name.as_str(),
            kind,
            normalize_create_statement(&raw, kind),
        );
        tracing::debug!("Captured DDL for {}", statement);
        progress.relation_read(&name, kind);

        match kind {
            RelationKind::Table => table_statements.push(statement),
            RelationKind::View => view_statements.push(statement),
        }
    }

    let view_statements = order_views_by_dependency(view_statements);

    progress.phase_finished(Phase::ReadSchema);

    Ok(SchemaSnapshot {
        tables: table_statements.iter().map(|s| s.name.clone()).collect(),
        views: view_statements.iter().map(|s| s.name.clone()).collect(),
        catalog,
        table_statements,
        view_statements,
        skipped,
    })
}
