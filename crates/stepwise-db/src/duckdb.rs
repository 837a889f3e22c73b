//! DuckDB database backend implementation

use crate::context::Context;
use crate::error::{DbError, DbResult};
use crate::traits::Database;
use crate::value::Value;
use async_trait::async_trait;
use chrono::DateTime;
use duckdb::types::{TimeUnit, Value as DuckValue};
use duckdb::{params_from_iter, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// DuckDB database backend
///
/// DuckDB accepts both `?` and `$n` placeholders, so any of the stepwise
/// dialect presets that do not add a table suffix can run against it.
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{e}: {}", path.display())))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    /// Execute SQL synchronously
    fn execute_sync(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        let conn = self.lock()?;
        log::trace!("duckdb execute: {sql}");
        conn.execute(sql, params_from_iter(to_duckdb_params(params)))
            .map_err(|e| DbError::ExecutionError(format!("{e}: {sql}")))
    }

    /// Execute batch SQL synchronously
    fn execute_batch_sync(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        log::trace!("duckdb execute_batch: {sql}");
        conn.execute_batch(sql).map_err(DbError::from)
    }

    /// Query rows synchronously
    fn query_rows_sync(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Vec<Value>>> {
        let conn = self.lock()?;
        log::trace!("duckdb query: {sql}");
        let mut stmt = conn.prepare(sql)?;

        // Column metadata is only available once the statement has run, so
        // the width is read from each row.
        let rows = stmt
            .query_map(params_from_iter(to_duckdb_params(params)), |row| {
                let width = row.as_ref().column_count();
                (0..width)
                    .map(|idx| row.get::<_, DuckValue>(idx).map(from_duckdb))
                    .collect::<duckdb::Result<Vec<_>>>()
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> DbResult<usize> {
        ctx.check()?;
        self.execute_sync(sql, params)
    }

    async fn execute_batch(&self, ctx: &Context, sql: &str) -> DbResult<()> {
        ctx.check()?;
        self.execute_batch_sync(sql)
    }

    async fn query_rows(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[Value],
    ) -> DbResult<Vec<Vec<Value>>> {
        ctx.check()?;
        self.query_rows_sync(sql, params)
    }

    async fn relation_exists(&self, ctx: &Context, name: &str) -> DbResult<bool> {
        ctx.check()?;

        // Handle schema-qualified names
        let (schema, table) = match name.rfind('.') {
            Some(pos) => (&name[..pos], &name[pos + 1..]),
            None => ("main", name),
        };

        let rows = self.query_rows_sync(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
            &[Value::from(schema), Value::from(table)],
        )?;
        let count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(count > 0)
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

fn to_duckdb_params(params: &[Value]) -> Vec<DuckValue> {
    params
        .iter()
        .map(|value| match value {
            Value::Null => DuckValue::Null,
            Value::Bool(b) => DuckValue::Boolean(*b),
            Value::Int(i) => DuckValue::BigInt(*i),
            Value::Double(d) => DuckValue::Double(*d),
            Value::Text(s) => DuckValue::Text(s.clone()),
            Value::Timestamp(ts) => {
                DuckValue::Timestamp(TimeUnit::Microsecond, ts.and_utc().timestamp_micros())
            }
        })
        .collect()
}

fn from_duckdb(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::Int(i64::from(i)),
        DuckValue::SmallInt(i) => Value::Int(i64::from(i)),
        DuckValue::Int(i) => Value::Int(i64::from(i)),
        DuckValue::BigInt(i) => Value::Int(i),
        DuckValue::UTinyInt(i) => Value::Int(i64::from(i)),
        DuckValue::USmallInt(i) => Value::Int(i64::from(i)),
        DuckValue::UInt(i) => Value::Int(i64::from(i)),
        DuckValue::HugeInt(i) => i64::try_from(i).map_or_else(|_| Value::Text(i.to_string()), Value::Int),
        DuckValue::UBigInt(i) => i64::try_from(i).map_or_else(|_| Value::Text(i.to_string()), Value::Int),
        DuckValue::Float(f) => Value::Double(f64::from(f)),
        DuckValue::Double(d) => Value::Double(d),
        DuckValue::Text(s) => Value::Text(s),
        DuckValue::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map_or(Value::Null, |dt| Value::Timestamp(dt.naive_utc()))
        }
        other => Value::Text(format!("{other:?}")),
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
