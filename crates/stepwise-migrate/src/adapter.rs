//! Version adapter contract.
//!
//! A [`VersionAdapter`] owns everything persisted about schema versions: it
//! creates the store, reads the current version and appends one record per
//! transition. The sequencer never touches the version store directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use stepwise_db::{Context, Database, DbResult};

/// Direction of a recorded version transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Small-integer form stored in the `upgrade` column.
    pub fn as_flag(self) -> i64 {
        match self {
            Direction::Up => 1,
            Direction::Down => 0,
        }
    }

    pub fn from_flag(flag: i64) -> Self {
        if flag != 0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Injectable formatting sink for migration progress messages.
pub type LogFn = Arc<dyn Fn(fmt::Arguments<'_>) + Send + Sync>;

/// A [`LogFn`] that forwards every message to `log::info!`.
pub fn log_facade() -> LogFn {
    Arc::new(|args: fmt::Arguments<'_>| log::info!(target: "stepwise", "{args}"))
}

/// Methods required to track schema versions in a database.
#[async_trait]
pub trait VersionAdapter: Send + Sync {
    /// Best-effort progress output. Never fails; does nothing without a sink.
    fn log(&self, args: fmt::Arguments<'_>);

    /// Ensure the version store exists. Must be safe to call on every run.
    async fn ensure_store(&self, ctx: &Context, db: &dyn Database) -> DbResult<()>;

    /// Version of the most recently recorded transition, or 0 if none.
    async fn current_version(&self, ctx: &Context, db: &dyn Database) -> DbResult<u32>;

    /// Append one transition record.
    async fn record_version(
        &self,
        ctx: &Context,
        db: &dyn Database,
        version: u32,
        direction: Direction,
        comment: &str,
    ) -> DbResult<()>;
}
