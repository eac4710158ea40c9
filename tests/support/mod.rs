// ABOUTME: In-memory stand-in for a MySQL server implementing the migration client traits
// ABOUTME: Generates realistic SHOW CREATE output and enforces destination-side DDL and row rules

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use mysql_async::Value;
use mysql_clone_migrator::catalog::RelationKind;
use mysql_clone_migrator::client::{
    BatchSender, DdlOutcome, DdlTarget, MigrationBatch, RowSink, RowSource, SchemaSource,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
}

pub fn col(name: &str, sql_type: &str) -> ColumnSpec {
    ColumnSpec {
        name: name.to_string(),
        sql_type: sql_type.to_string(),
        not_null: false,
    }
}

pub fn not_null(name: &str, sql_type: &str) -> ColumnSpec {
    ColumnSpec {
        not_null: true,
        ..col(name, sql_type)
    }
}

#[derive(Debug, Clone)]
struct Relation {
    table_type: String,
    ddl: String,
    columns: Vec<ColumnSpec>,
    rows: BTreeMap<i64, Vec<Value>>,
}

#[derive(Debug, Default)]
struct ServerState {
    relations: BTreeMap<String, Relation>,
    creation_order: Vec<String>,
    committed_batches: BTreeMap<String, Vec<usize>>,
    ddl_commits: usize,
    fail_catalog: bool,
    broken_show_create: BTreeSet<String>,
    fail_read_after: BTreeMap<String, usize>,
    connections: usize,
}

/// A shared fake server; every [`FakeServer::connect`] hands out a new session
#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ServerState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Add a base table whose first column is an integer primary key
    pub fn add_table(&self, name: &str, columns: Vec<ColumnSpec>, rows: Vec<Vec<Value>>) {
        let ddl = table_ddl(name, &columns);
        let rows = rows
            .into_iter()
            .map(|row| (row_key(&row).unwrap(), row))
            .collect();
        self.with_state(|s| {
            s.relations.insert(
                name.to_string(),
                Relation {
                    table_type: "BASE TABLE".to_string(),
                    ddl,
                    columns,
                    rows,
                },
            );
        });
    }

    /// Add a view the way a server with a definer account reports it
    pub fn add_view(&self, name: &str, select: &str) {
        let ddl = format!(
            "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`localhost` SQL SECURITY DEFINER VIEW `{}` AS {}",
            name, select
        );
        self.with_state(|s| {
            s.relations.insert(
                name.to_string(),
                Relation {
                    table_type: "VIEW".to_string(),
                    ddl,
                    columns: Vec::new(),
                    rows: BTreeMap::new(),
                },
            );
        });
    }

    /// Add a catalog entry with an arbitrary `TABLE_TYPE`
    pub fn add_relation_of_type(&self, name: &str, table_type: &str) {
        self.with_state(|s| {
            s.relations.insert(
                name.to_string(),
                Relation {
                    table_type: table_type.to_string(),
                    ddl: String::new(),
                    columns: Vec::new(),
                    rows: BTreeMap::new(),
                },
            );
        });
    }

    pub fn fail_catalog(&self) {
        self.with_state(|s| s.fail_catalog = true);
    }

    pub fn break_show_create(&self, name: &str) {
        self.with_state(|s| {
            s.broken_show_create.insert(name.to_string());
        });
    }

    /// Make reads of `table` fail after `batches` batches were sent
    pub fn fail_read_after(&self, table: &str, batches: usize) {
        self.with_state(|s| {
            s.fail_read_after.insert(table.to_string(), batches);
        });
    }

    pub fn connect(&self) -> FakeClient {
        self.with_state(|s| s.connections += 1);
        FakeClient {
            server: self.clone(),
            staged: Vec::new(),
        }
    }

    pub fn connections(&self) -> usize {
        self.with_state(|s| s.connections)
    }

    pub fn relation_names(&self) -> Vec<String> {
        self.with_state(|s| s.relations.keys().cloned().collect())
    }

    /// Names in the order their creation statements succeeded
    pub fn creation_order(&self) -> Vec<String> {
        self.with_state(|s| s.creation_order.clone())
    }

    pub fn ddl_of(&self, name: &str) -> Option<String> {
        self.with_state(|s| s.relations.get(name).map(|r| r.ddl.clone()))
    }

    pub fn rows_of(&self, table: &str) -> Vec<Vec<Value>> {
        self.with_state(|s| {
            s.relations
                .get(table)
                .map(|r| r.rows.values().cloned().collect())
                .unwrap_or_default()
        })
    }

    pub fn committed_batches(&self, table: &str) -> Vec<usize> {
        self.with_state(|s| s.committed_batches.get(table).cloned().unwrap_or_default())
    }

    pub fn ddl_commits(&self) -> usize {
        self.with_state(|s| s.ddl_commits)
    }
}

/// One session against a [`FakeServer`]; row writes are staged until commit
pub struct FakeClient {
    server: FakeServer,
    staged: Vec<(String, Vec<Vec<Value>>)>,
}

#[async_trait]
impl SchemaSource for FakeClient {
    async fn list_relations(&mut self, _schema: &str) -> Result<Vec<(String, String)>> {
        self.server.with_state(|s| {
            if s.fail_catalog {
                bail!("Lost connection to MySQL server during query");
            }
            Ok(s.relations
                .iter()
                .map(|(name, r)| (name.clone(), r.table_type.clone()))
                .collect())
        })
    }

    async fn show_create(
        &mut self,
        schema: &str,
        name: &str,
        _kind: RelationKind,
    ) -> Result<String> {
        self.server.with_state(|s| {
            if s.broken_show_create.contains(name) {
                bail!(
                    "View '{}.{}' references invalid table(s) or column(s) or function(s)",
                    schema,
                    name
                );
            }
            s.relations
                .get(name)
                .map(|r| r.ddl.clone())
                .ok_or_else(|| anyhow!("Table '{}.{}' doesn't exist", schema, name))
        })
    }
}

#[async_trait]
impl DdlTarget for FakeClient {
    async fn execute_ddl(&mut self, sql: &str) -> Result<DdlOutcome> {
        for clause in ["ENGINE=", "CHARSET=", "COLLATE=", "DEFINER=", "ALGORITHM=", "SQL SECURITY"] {
            if header_and_trailer(sql).contains(clause) {
                bail!("Unexpected source-specific clause '{}' in: {}", clause, sql);
            }
        }

        let (kind, name) = created_relation(sql)?;

        self.server.with_state(|s| {
            if s.relations.contains_key(&name) {
                return Ok(DdlOutcome::AlreadyExists);
            }

            let relation = match kind {
                RelationKind::Table => Relation {
                    table_type: "BASE TABLE".to_string(),
                    ddl: sql.to_string(),
                    columns: parse_columns(sql),
                    rows: BTreeMap::new(),
                },
                RelationKind::View => {
                    for referenced in referenced_relations(sql) {
                        if !s.relations.contains_key(&referenced) {
                            bail!("Table 'shop.{}' doesn't exist", referenced);
                        }
                    }
                    Relation {
                        table_type: "VIEW".to_string(),
                        ddl: sql.to_string(),
                        columns: Vec::new(),
                        rows: BTreeMap::new(),
                    }
                }
            };

            s.relations.insert(name.clone(), relation);
            s.creation_order.push(name);
            Ok(DdlOutcome::Created)
        })
    }

    async fn commit_ddl(&mut self) -> Result<()> {
        self.server.with_state(|s| s.ddl_commits += 1);
        Ok(())
    }
}

#[async_trait]
impl RowSource for FakeClient {
    async fn stream_rows(
        &mut self,
        table: &str,
        batch_size: usize,
        batches: BatchSender,
    ) -> Result<u64> {
        let (rows, fail_after) = self.server.with_state(|s| {
            let rows: Vec<Vec<Value>> = s
                .relations
                .get(table)
                .map(|r| r.rows.values().cloned().collect())
                .ok_or_else(|| anyhow!("Table 'shop.{}' doesn't exist", table))?;
            Ok::<_, anyhow::Error>((rows, s.fail_read_after.get(table).copied()))
        })?;

        let mut sent = 0u64;
        for (index, chunk) in rows.chunks(batch_size).enumerate() {
            if fail_after == Some(index) {
                bail!("Lost connection to MySQL server during query");
            }
            if batches
                .send(MigrationBatch::new(chunk.to_vec()))
                .await
                .is_err()
            {
                return Ok(sent);
            }
            sent += chunk.len() as u64;
        }
        if fail_after.is_some_and(|n| n >= rows.chunks(batch_size).count()) {
            bail!("Lost connection to MySQL server during query");
        }
        Ok(sent)
    }
}

#[async_trait]
impl RowSink for FakeClient {
    async fn replace_rows(&mut self, table: &str, batch: &MigrationBatch) -> Result<u64> {
        let columns = self.server.with_state(|s| {
            s.relations
                .get(table)
                .filter(|r| r.table_type == "BASE TABLE")
                .map(|r| r.columns.clone())
                .ok_or_else(|| anyhow!("Table 'shop.{}' doesn't exist", table))
        })?;

        for row in batch.rows() {
            if row.len() != columns.len() {
                bail!("Column count doesn't match value count at row 1");
            }
            for (value, column) in row.iter().zip(&columns) {
                if column.not_null && *value == Value::NULL {
                    bail!("Column '{}' cannot be null", column.name);
                }
            }
            row_key(row)?;
        }

        self.staged.push((table.to_string(), batch.rows().to_vec()));
        Ok(batch.len() as u64)
    }

    async fn commit_rows(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        self.server.with_state(|s| {
            for (table, rows) in staged {
                let count = rows.len();
                if let Some(relation) = s.relations.get_mut(&table) {
                    for row in rows {
                        let key = row_key(&row)?;
                        relation.rows.insert(key, row);
                    }
                }
                s.committed_batches.entry(table).or_default().push(count);
            }
            Ok(())
        })
    }

    async fn rollback_rows(&mut self) -> Result<()> {
        self.staged.clear();
        Ok(())
    }
}

/// `orders` rows `(id, customer_id, total)` with ids `1..=count`
pub fn order_rows(count: i64) -> Vec<Vec<Value>> {
    (1..=count)
        .map(|id| vec![Value::Int(id), Value::Int(id % 7 + 1), Value::Int(id * 10)])
        .collect()
}

pub fn order_columns() -> Vec<ColumnSpec> {
    vec![
        not_null("id", "int"),
        not_null("customer_id", "int"),
        col("total", "int"),
    ]
}

/// A small shop schema: two tables, a view over `orders`, and a view over that view
pub fn shop_source(order_count: i64) -> FakeServer {
    let source = FakeServer::new();
    source.add_table(
        "customers",
        vec![not_null("id", "int"), col("name", "varchar(64)")],
        (1..=7)
            .map(|id| vec![Value::Int(id), Value::from(format!("customer {}", id))])
            .collect(),
    );
    source.add_table("orders", order_columns(), order_rows(order_count));
    source.add_view(
        "big_orders",
        "select `orders`.`id` AS `id`,`orders`.`total` AS `total` from `orders` where (`orders`.`total` > 100)",
    );
    source.add_view(
        "a_top_orders",
        "select `big_orders`.`id` AS `id` from `big_orders` order by `big_orders`.`total` desc limit 10",
    );
    source
}

fn table_ddl(name: &str, columns: &[ColumnSpec]) -> String {
    let mut lines: Vec<String> = columns
        .iter()
        .map(|c| {
            let nullability = if c.not_null { "NOT NULL" } else { "DEFAULT NULL" };
            format!("  `{}` {} {}", c.name, c.sql_type, nullability)
        })
        .collect();
    if let Some(first) = columns.first() {
        lines.push(format!("  PRIMARY KEY (`{}`)", first.name));
    }
    format!(
        "CREATE TABLE `{}` (\n{}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_0900_ai_ci",
        name,
        lines.join(",\n")
    )
}

fn row_key(row: &[Value]) -> Result<i64> {
    match row.first() {
        Some(Value::Int(id)) => Ok(*id),
        Some(Value::UInt(id)) => Ok(*id as i64),
        other => bail!("Unsupported primary key value {:?}", other),
    }
}

/// Text outside the column list of a table, or before `AS` of a view
fn header_and_trailer(sql: &str) -> String {
    if let Some(as_at) = sql.find(" AS ") {
        if sql.starts_with("CREATE") && !sql.starts_with("CREATE TABLE") {
            return sql[..as_at].to_string();
        }
    }
    match (sql.find('('), sql.rfind(')')) {
        (Some(open), Some(close)) => format!("{}{}", &sql[..open], &sql[close + 1..]),
        _ => sql.to_string(),
    }
}

fn created_relation(sql: &str) -> Result<(RelationKind, String)> {
    let (kind, rest) = if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
        (RelationKind::Table, rest)
    } else if let Some(rest) = sql.strip_prefix("CREATE VIEW ") {
        (RelationKind::View, rest)
    } else {
        bail!("You have an error in your SQL syntax near '{}'", sql);
    };
    let name = rest
        .strip_prefix('`')
        .and_then(|r| r.split_once('`'))
        .map(|(name, _)| name.to_string())
        .ok_or_else(|| anyhow!("Expected a quoted name in '{}'", sql))?;
    Ok((kind, name))
}

fn parse_columns(sql: &str) -> Vec<ColumnSpec> {
    sql.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('`'))
        .filter_map(|line| {
            let (name, rest) = line[1..].split_once('`')?;
            let sql_type = rest.split_whitespace().next().unwrap_or_default();
            Some(ColumnSpec {
                name: name.to_string(),
                sql_type: sql_type.to_string(),
                not_null: rest.contains("NOT NULL"),
            })
        })
        .collect()
}

fn referenced_relations(sql: &str) -> Vec<String> {
    let lower = sql.to_lowercase();
    let mut found = Vec::new();
    for keyword in ["from `", "join `"] {
        let mut search = 0;
        while let Some(at) = lower[search..].find(keyword) {
            let start = search + at + keyword.len();
            if let Some(len) = sql[start..].find('`') {
                found.push(sql[start..start + len].to_string());
            }
            search = start;
        }
    }
    found
}
