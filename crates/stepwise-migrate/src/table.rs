//! Table-backed version adapter.
//!
//! [`TableAdapter`] keeps an append-only `schema_versions` table. Each row
//! gets a monotonic `id`, and the current version is read from the row with
//! the highest `id`. Ordering by `id` instead of by `version` or `created_at`
//! keeps downgrade-then-upgrade cycles and same-timestamp inserts correct.
//!
//! Dialects differ only in their placeholder tokens and an optional suffix
//! for the `CREATE TABLE` statement, so they are plain data.

use crate::adapter::{Direction, LogFn, VersionAdapter};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use stepwise_db::{Context, Database, DbError, DbResult, Value};

/// Default name of the version table.
pub const DEFAULT_TABLE: &str = "schema_versions";

const MYSQL_TABLE_OPTIONS: &str = " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

/// Bind-parameter tokens for the three values of a version insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholders {
    pub version: String,
    pub direction: String,
    pub comment: String,
}

impl Placeholders {
    /// `$1, $2, $3`
    pub fn numbered() -> Self {
        Self {
            version: "$1".to_string(),
            direction: "$2".to_string(),
            comment: "$3".to_string(),
        }
    }

    /// `?, ?, ?`
    pub fn question_marks() -> Self {
        Self {
            version: "?".to_string(),
            direction: "?".to_string(),
            comment: "?".to_string(),
        }
    }
}

/// SQL engines with a preset adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[serde(alias = "postgresql")]
    Postgres,
    Mysql,
    Sqlite,
}

impl Dialect {
    pub fn placeholders(self) -> Placeholders {
        match self {
            Dialect::Postgres => Placeholders::numbered(),
            Dialect::Mysql | Dialect::Sqlite => Placeholders::question_marks(),
        }
    }

    /// Text appended after the closing parenthesis of `CREATE TABLE`.
    pub fn create_table_options(self) -> &'static str {
        match self {
            Dialect::Mysql => MYSQL_TABLE_OPTIONS,
            Dialect::Postgres | Dialect::Sqlite => "",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Mysql => write!(f, "mysql"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// One row of the version table.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaVersionRecord {
    /// Monotonic insert order
    pub id: i64,

    /// Version the schema was at after this transition
    pub version: u32,

    /// Database time the row was inserted
    pub recorded_at: Option<NaiveDateTime>,

    pub direction: Direction,

    /// Comment of the migration that was applied or reverted
    pub comment: String,
}

/// [`VersionAdapter`] that tracks versions in a single table.
#[derive(Clone)]
pub struct TableAdapter {
    /// Version table name
    pub table: String,

    /// Arbitrary SQL placed after the `CREATE TABLE` column list
    pub create_table_options: String,

    pub placeholders: Placeholders,

    log_fn: Option<LogFn>,
}

impl TableAdapter {
    /// Create the preset adapter for `dialect`.
    pub fn new(dialect: Dialect, log_fn: Option<LogFn>) -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            create_table_options: dialect.create_table_options().to_string(),
            placeholders: dialect.placeholders(),
            log_fn,
        }
    }

    /// `$1,$2,$3` placeholders, no table options.
    pub fn postgres(log_fn: Option<LogFn>) -> Self {
        Self::new(Dialect::Postgres, log_fn)
    }

    /// `?,?,?` placeholders, InnoDB engine and utf8mb4 charset.
    pub fn mysql(log_fn: Option<LogFn>) -> Self {
        Self::new(Dialect::Mysql, log_fn)
    }

    /// `?,?,?` placeholders, no table options.
    pub fn sqlite(log_fn: Option<LogFn>) -> Self {
        Self::new(Dialect::Sqlite, log_fn)
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_log(mut self, log_fn: LogFn) -> Self {
        self.log_fn = Some(log_fn);
        self
    }

    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
    id BIGINT NOT NULL PRIMARY KEY,
    version INT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    upgrade SMALLINT NOT NULL,
    comment TEXT NOT NULL
){}",
            self.table, self.create_table_options
        )
    }

    /// Insert statement for the row with the given `id`.
    ///
    /// `id` is computed by the adapter, never caller input, so it is written
    /// as a literal and the three dialect placeholders stay positional.
    pub fn insert_sql(&self, id: i64) -> String {
        format!(
            "INSERT INTO {} (id, version, upgrade, comment) VALUES ({}, {}, {}, {})",
            self.table,
            id,
            self.placeholders.version,
            self.placeholders.direction,
            self.placeholders.comment
        )
    }

    fn next_id_sql(&self) -> String {
        format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {}", self.table)
    }

    fn current_version_sql(&self) -> String {
        format!("SELECT version FROM {} ORDER BY id DESC LIMIT 1", self.table)
    }

    fn history_sql(&self) -> String {
        format!(
            "SELECT id, version, created_at, upgrade, comment FROM {} ORDER BY id",
            self.table
        )
    }

    /// Every recorded transition, oldest first.
    pub async fn history(
        &self,
        ctx: &Context,
        db: &dyn Database,
    ) -> DbResult<Vec<SchemaVersionRecord>> {
        let rows = db.query_rows(ctx, &self.history_sql(), &[]).await?;
        rows.into_iter().map(|row| parse_record(&row)).collect()
    }
}

impl fmt::Debug for TableAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableAdapter")
            .field("table", &self.table)
            .field("create_table_options", &self.create_table_options)
            .field("placeholders", &self.placeholders)
            .field("log_fn", &self.log_fn.is_some())
            .finish()
    }
}

#[async_trait]
impl VersionAdapter for TableAdapter {
    fn log(&self, args: fmt::Arguments<'_>) {
        if let Some(log_fn) = &self.log_fn {
            log_fn(args);
        }
    }

    async fn ensure_store(&self, ctx: &Context, db: &dyn Database) -> DbResult<()> {
        log::debug!("Ensuring version table {} on {}", self.table, db.db_type());
        db.execute(ctx, &self.create_table_sql(), &[]).await?;
        Ok(())
    }

    async fn current_version(&self, ctx: &Context, db: &dyn Database) -> DbResult<u32> {
        match db.query_row(ctx, &self.current_version_sql(), &[]).await? {
            Some(row) => version_column(row.first()),
            None => Ok(0),
        }
    }

    async fn record_version(
        &self,
        ctx: &Context,
        db: &dyn Database,
        version: u32,
        direction: Direction,
        comment: &str,
    ) -> DbResult<()> {
        let next_id = db
            .query_row(ctx, &self.next_id_sql(), &[])
            .await?
            .and_then(|row| row.first().and_then(Value::as_i64))
            .unwrap_or(1);

        db.execute(
            ctx,
            &self.insert_sql(next_id),
            &[
                Value::from(version),
                Value::Int(direction.as_flag()),
                Value::from(comment),
            ],
        )
        .await?;
        Ok(())
    }
}

fn version_column(value: Option<&Value>) -> DbResult<u32> {
    let raw = value
        .and_then(Value::as_i64)
        .ok_or_else(|| DbError::Internal(format!("version column is not an integer: {value:?}")))?;
    u32::try_from(raw).map_err(|_| DbError::Internal(format!("version {raw} is out of range")))
}

fn parse_record(row: &[Value]) -> DbResult<SchemaVersionRecord> {
    let [id, version, recorded_at, upgrade, comment] = row else {
        return Err(DbError::Internal(format!(
            "expected 5 version columns, got {}",
            row.len()
        )));
    };
    Ok(SchemaVersionRecord {
        id: id
            .as_i64()
            .ok_or_else(|| DbError::Internal(format!("id column is not an integer: {id:?}")))?,
        version: version_column(Some(version))?,
        recorded_at: recorded_at.as_timestamp(),
        direction: Direction::from_flag(upgrade.as_i64().unwrap_or(0)),
        comment: comment.as_str().unwrap_or_default().to_string(),
    })
}

#[cfg(test)]
#[path = "table_test.rs"]
mod tests;
