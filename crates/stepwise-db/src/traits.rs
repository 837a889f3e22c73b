//! Database trait definition

use crate::context::Context;
use crate::error::DbResult;
use crate::value::Value;
use async_trait::async_trait;

/// Database handle the migration engine issues every statement through
///
/// Implementations must be Send + Sync for async operation. The caller owns
/// the handle; nothing in stepwise opens or closes it.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute one statement with positional binds, returns affected rows
    async fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> DbResult<usize>;

    /// Execute multiple SQL statements without binds
    async fn execute_batch(&self, ctx: &Context, sql: &str) -> DbResult<()>;

    /// Run a query and collect every row
    async fn query_rows(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[Value],
    ) -> DbResult<Vec<Vec<Value>>>;

    /// Run a query and return its first row, if any
    async fn query_row(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[Value],
    ) -> DbResult<Option<Vec<Value>>> {
        Ok(self.query_rows(ctx, sql, params).await?.into_iter().next())
    }

    /// Check if a table or view exists
    async fn relation_exists(&self, ctx: &Context, name: &str) -> DbResult<bool>;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;
}
