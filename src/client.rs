// ABOUTME: Client traits the migration engine drives the source and destination through
// ABOUTME: Defines batches, DDL outcomes, and the read/write seams implemented per driver

use crate::catalog::RelationKind;
use anyhow::Result;
use async_trait::async_trait;
use mysql_async::Value;
use tokio::sync::mpsc;

/// One row as ordered column values
pub type RowValues = Vec<Value>;

/// Channel the row reader pushes batches into
pub type BatchSender = mpsc::Sender<MigrationBatch>;

/// Rows read from one table, bounded by the configured batch size
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationBatch {
    rows: Vec<RowValues>,
}

impl MigrationBatch {
    pub fn new(rows: Vec<RowValues>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[RowValues] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns per row, taken from the first row
    pub fn arity(&self) -> Option<usize> {
        self.rows.first().map(Vec::len)
    }
}

/// Successful outcomes of executing a `CREATE` statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlOutcome {
    Created,
    /// The destination reported the object as already existing
    AlreadyExists,
}

/// Catalog access on the source database
#[async_trait]
pub trait SchemaSource: Send {
    /// List `(name, TABLE_TYPE)` for every relation in `schema`, ordered by name
    async fn list_relations(&mut self, schema: &str) -> Result<Vec<(String, String)>>;

    /// Fetch the server's `SHOW CREATE TABLE|VIEW` text for one relation
    async fn show_create(&mut self, schema: &str, name: &str, kind: RelationKind)
        -> Result<String>;
}

/// DDL execution on the destination database
#[async_trait]
pub trait DdlTarget: Send {
    /// Execute one statement, mapping "already exists" to [`DdlOutcome::AlreadyExists`]
    async fn execute_ddl(&mut self, sql: &str) -> Result<DdlOutcome>;

    async fn commit_ddl(&mut self) -> Result<()>;
}

/// Streaming row reads on the source database
#[async_trait]
pub trait RowSource: Send {
    /// Read every row of `table` in natural column order and send it on in
    /// batches of at most `batch_size` rows.
    ///
    /// Returns the number of rows read. Stops early, without error, when the
    /// receiving side has been dropped.
    async fn stream_rows(
        &mut self,
        table: &str,
        batch_size: usize,
        batches: BatchSender,
    ) -> Result<u64>;
}

/// Replace-on-conflict writes on the destination database
#[async_trait]
pub trait RowSink: Send {
    /// Write a batch, overwriting rows whose primary or unique key already exists
    async fn replace_rows(&mut self, table: &str, batch: &MigrationBatch) -> Result<u64>;

    async fn commit_rows(&mut self) -> Result<()>;

    /// Discard writes since the last commit
    async fn rollback_rows(&mut self) -> Result<()>;
}
