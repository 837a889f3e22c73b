//! Migration steps and the batch-statement helper.

use crate::error::{BoxError, MigrateError};
use async_trait::async_trait;
use std::fmt;
use stepwise_db::{Context, Database};

/// Body of one direction of a migration.
///
/// The engine treats it as opaque: it may run raw SQL or arbitrary logic
/// against `db`. A body that needs atomicity wraps itself in a transaction.
#[async_trait]
pub trait MigrationOp: Send + Sync {
    async fn run(&self, ctx: &Context, db: &dyn Database) -> Result<(), BoxError>;
}

/// One migration step. Its version is its 1-based position in the list
/// passed to the sequencer; reordering or removing entries changes the
/// meaning of every later version.
pub struct Migration {
    /// Describes the step, stored with each version record
    pub comment: String,

    /// Moves the schema from the previous version to this one
    pub up: Box<dyn MigrationOp>,

    /// Moves the schema back to the previous version
    pub down: Box<dyn MigrationOp>,
}

impl Migration {
    pub fn new(
        comment: impl Into<String>,
        up: impl MigrationOp + 'static,
        down: impl MigrationOp + 'static,
    ) -> Self {
        Self {
            comment: comment.into(),
            up: Box::new(up),
            down: Box::new(down),
        }
    }

    /// Migration whose bodies are plain statement lists.
    pub fn sql(comment: impl Into<String>, up: &[&str], down: &[&str]) -> Self {
        Self::new(comment, exec_statements(up), exec_statements(down))
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("comment", &self.comment)
            .finish_non_exhaustive()
    }
}

/// Runs statements in order, stopping at the first failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecStatements {
    statements: Vec<String>,
}

impl ExecStatements {
    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

/// Build a [`MigrationOp`] from a list of SQL statements.
///
/// A failing statement aborts the body with [`MigrateError::Statement`]
/// carrying its zero-based index. Statements that already ran are not undone.
pub fn exec_statements<I, S>(statements: I) -> ExecStatements
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ExecStatements {
        statements: statements
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect(),
    }
}

#[async_trait]
impl MigrationOp for ExecStatements {
    async fn run(&self, ctx: &Context, db: &dyn Database) -> Result<(), BoxError> {
        for (index, statement) in self.statements.iter().enumerate() {
            db.execute_batch(ctx, statement)
                .await
                .map_err(|source| MigrateError::Statement { index, source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "migration_test.rs"]
mod tests;
