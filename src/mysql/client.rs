// ABOUTME: mysql_async-backed implementation of the migration client traits
// ABOUTME: Reads catalog metadata and rows from the source, replays DDL and REPLACE writes on the destination

use crate::catalog::RelationKind;
use crate::client::{
    BatchSender, DdlOutcome, DdlTarget, MigrationBatch, RowSink, RowSource, SchemaSource,
};
use crate::utils::{quote_identifier, sanitize_identifier};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use mysql_async::{prelude::*, Conn, Row, Value};

/// `ER_TABLE_EXISTS_ERROR`, raised for both tables and views
const ER_TABLE_EXISTS_ERROR: u16 = 1050;

/// Upper bound on placeholders in one prepared statement
const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// Rows reserved up front for a batch buffer; larger batches grow as rows arrive
const MAX_PREALLOCATED_ROWS: usize = 8192;

const RELATIONS_QUERY: &str = r#"
    SELECT TABLE_NAME, TABLE_TYPE
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = ?
    ORDER BY TABLE_NAME
"#;

/// One owned connection to a MySQL server
///
/// The connection is released by [`MySqlClient::disconnect`] on the success
/// path and by dropping the client on every other path.
pub struct MySqlClient {
    conn: Conn,
}

impl MySqlClient {
    /// Connect for reading (source side)
    pub async fn connect(url: &str) -> Result<Self> {
        let conn = super::connect_mysql(url).await?;
        Ok(Self { conn })
    }

    /// Connect for writing (destination side)
    ///
    /// The session runs with `autocommit = 0` so every commit is explicit.
    /// With `foreign_key_checks` off, rows can arrive in any table order and
    /// `REPLACE` does not fire `ON DELETE` actions on referencing rows.
    pub async fn connect_destination(url: &str, foreign_key_checks: bool) -> Result<Self> {
        let mut conn = super::connect_mysql(url).await?;

        conn.query_drop("SET SESSION autocommit = 0")
            .await
            .context("Failed to disable autocommit on destination session")?;

        if !foreign_key_checks {
            conn.query_drop("SET SESSION foreign_key_checks = 0")
                .await
                .context("Failed to disable foreign key checks on destination session")?;
            tracing::debug!("Foreign key checks disabled for destination session");
        }

        Ok(Self { conn })
    }

    pub async fn server_version(&mut self) -> Result<String> {
        let version: Option<String> = self
            .conn
            .query_first("SELECT VERSION()")
            .await
            .context("Failed to query server version")?;
        version.ok_or_else(|| anyhow!("SELECT VERSION() returned no rows"))
    }

    /// Schema selected by the connection URL, if any
    pub async fn current_database(&mut self) -> Result<Option<String>> {
        let db: Option<Option<String>> = self
            .conn
            .query_first("SELECT DATABASE()")
            .await
            .context("Failed to query current database")?;
        Ok(db.flatten())
    }

    pub async fn disconnect(self) -> Result<()> {
        self.conn
            .disconnect()
            .await
            .context("Failed to close MySQL connection")
    }
}

#[async_trait]
impl SchemaSource for MySqlClient {
    async fn list_relations(&mut self, schema: &str) -> Result<Vec<(String, String)>> {
        tracing::info!("Listing tables and views in schema '{}'", schema);

        let relations: Vec<(String, String)> = self
            .conn
            .exec(RELATIONS_QUERY, (schema,))
            .await
            .with_context(|| format!("Failed to list relations in schema '{}'", schema))?;

        Ok(relations)
    }

    async fn show_create(
        &mut self,
        schema: &str,
        name: &str,
        kind: RelationKind,
    ) -> Result<String> {
        let query = format!(
            "SHOW CREATE {} {}.{}",
            kind.keyword(),
            quote_identifier(schema),
            quote_identifier(name)
        );

        let row: Option<Row> = self
            .conn
            .query_first(query.as_str())
            .await
            .with_context(|| format!("Failed to run SHOW CREATE for {}", describe(kind, name)))?;

        let row = row
            .ok_or_else(|| anyhow!("SHOW CREATE returned no rows for {}", describe(kind, name)))?;

        // Column 0 is the name, column 1 the statement for both tables and views
        match row.get_opt::<String, usize>(1) {
            Some(Ok(ddl)) => Ok(ddl),
            Some(Err(e)) => bail!(
                "SHOW CREATE for {} returned a non-text statement: {:?}",
                describe(kind, name),
                e
            ),
            None => bail!(
                "SHOW CREATE for {} returned no statement column",
                describe(kind, name)
            ),
        }
    }
}

/// `kind 'name'` with the name made safe for logs and error messages
fn describe(kind: RelationKind, name: &str) -> String {
    format!("{} '{}'", kind, sanitize_identifier(name))
}

/// Empty row buffer for one batch
fn batch_buffer(batch_size: usize) -> Vec<Vec<Value>> {
    Vec::with_capacity(batch_size.min(MAX_PREALLOCATED_ROWS))
}

#[async_trait]
impl DdlTarget for MySqlClient {
    async fn execute_ddl(&mut self, sql: &str) -> Result<DdlOutcome> {
        match self.conn.query_drop(sql).await {
            Ok(()) => Ok(DdlOutcome::Created),
            Err(mysql_async::Error::Server(ref err)) if err.code == ER_TABLE_EXISTS_ERROR => {
                Ok(DdlOutcome::AlreadyExists)
            }
            Err(e) => Err(anyhow::Error::new(e)),
        }
    }

    async fn commit_ddl(&mut self) -> Result<()> {
        self.conn
            .query_drop("COMMIT")
            .await
            .context("Failed to commit schema changes")
    }
}

#[async_trait]
impl RowSource for MySqlClient {
    async fn stream_rows(
        &mut self,
        table: &str,
        batch_size: usize,
        batches: BatchSender,
    ) -> Result<u64> {
        if batch_size == 0 {
            bail!("Batch size must be at least 1");
        }

        let query = format!("SELECT * FROM {}", quote_identifier(table));
        let mut result = self
            .conn
            .exec_iter(query.as_str(), ())
            .await
            .with_context(|| format!("Failed to read rows from table '{}'", table))?;

        let mut rows_read: u64 = 0;
        let mut pending = batch_buffer(batch_size);

        while let Some(row) = result
            .next()
            .await
            .with_context(|| format!("Failed to fetch row from table '{}'", table))?
        {
            pending.push(row.unwrap());
            rows_read += 1;

            if pending.len() == batch_size {
                let full = std::mem::replace(&mut pending, batch_buffer(batch_size));
                if batches.send(MigrationBatch::new(full)).await.is_err() {
                    tracing::debug!(
                        "Writer for '{}' stopped; discarding rest of the result set",
                        table
                    );
                    result
                        .drop_result()
                        .await
                        .with_context(|| format!("Failed to discard rows of table '{}'", table))?;
                    return Ok(rows_read);
                }
            }
        }

        if !pending.is_empty() {
            // A closed receiver here only means the writer already stopped
            let _ = batches.send(MigrationBatch::new(pending)).await;
        }

        Ok(rows_read)
    }
}

#[async_trait]
impl RowSink for MySqlClient {
    async fn replace_rows(&mut self, table: &str, batch: &MigrationBatch) -> Result<u64> {
        let Some(arity) = batch.arity() else {
            return Ok(0);
        };
        if arity == 0 {
            bail!("Rows for table '{}' have no columns", table);
        }

        let table_ref = quote_identifier(table);
        let row_placeholders = format!("({})", vec!["?"; arity].join(", "));
        let rows_per_statement = (MYSQL_MAX_PLACEHOLDERS / arity).max(1);

        for chunk in batch.rows().chunks(rows_per_statement) {
            if let Some(row) = chunk.iter().find(|row| row.len() != arity) {
                bail!(
                    "Row for table '{}' has {} values, expected {}",
                    table,
                    row.len(),
                    arity
                );
            }

            let sql = format!(
                "REPLACE INTO {} VALUES {}",
                table_ref,
                vec![row_placeholders.as_str(); chunk.len()].join(", ")
            );
            let params: Vec<Value> = chunk.iter().flat_map(|row| row.iter().cloned()).collect();

            self.conn
                .exec_drop(sql.as_str(), params)
                .await
                .with_context(|| {
                    format!("Failed to write {} rows into '{}'", chunk.len(), table)
                })?;
        }

        Ok(batch.len() as u64)
    }

    async fn commit_rows(&mut self) -> Result<()> {
        self.conn
            .query_drop("COMMIT")
            .await
            .context("Failed to commit batch")
    }

    async fn rollback_rows(&mut self) -> Result<()> {
        self.conn
            .query_drop("ROLLBACK")
            .await
            .context("Failed to roll back batch")
    }
}
