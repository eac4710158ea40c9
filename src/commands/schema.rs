// ABOUTME: Schema command: prints the normalized creation statements of the source schema
// ABOUTME: Tables first, then views in dependency order, exactly as a migration would replay them

use crate::mysql::{extract_database_name, MySqlClient};
use crate::progress::NoProgress;
use crate::schema::{read_schema, ReadOptions, SchemaSnapshot};
use anyhow::{anyhow, Context, Result};
use std::io::Write;

pub async fn schema(source_url: &str, read_options: &ReadOptions) -> Result<()> {
    let schema = extract_database_name(source_url)
        .ok_or_else(|| anyhow!("Source URL must name the schema to print"))?;

    let mut source = MySqlClient::connect(source_url)
        .await
        .context("Failed to connect to source")?;
    let snapshot = read_schema(&mut source, &schema, read_options, &NoProgress).await?;
    source.disconnect().await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_snapshot(&mut out, &snapshot).context("Failed to write schema to stdout")?;

    for skipped in &snapshot.skipped {
        tracing::warn!("Not printed: {} '{}': {:#}", skipped.kind, skipped.name, skipped.error);
    }

    Ok(())
}

fn write_snapshot(out: &mut impl Write, snapshot: &SchemaSnapshot) -> std::io::Result<()> {
    for statement in snapshot
        .table_statements
        .iter()
        .chain(snapshot.view_statements.iter())
    {
        writeln!(out, "-- {}", statement)?;
        writeln!(out, "{};", statement.sql.trim_end().trim_end_matches(';'))?;
        writeln!(out)?;
    }
    Ok(())
}
