use super::*;
use crate::adapter::LogFn;
use crate::error::BoxError;
use crate::migration::MigrationOp;
use crate::table::TableAdapter;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stepwise_db::{DbError, DbResult, DuckDbBackend};

// ── Helpers ────────────────────────────────────────────────────────────

/// Shared, ordered record of which step bodies ran.
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: &str) {
        self.0.lock().unwrap().push(entry.to_string());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Step body that journals its label, optionally failing the first N runs.
struct Step {
    label: &'static str,
    journal: Journal,
    failures_left: AtomicUsize,
}

#[async_trait]
impl MigrationOp for Step {
    async fn run(&self, _ctx: &Context, _db: &dyn Database) -> Result<(), BoxError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err("mock error".into());
        }
        self.journal.push(self.label);
        Ok(())
    }
}

fn step(label: &'static str, journal: &Journal, failures: usize) -> Step {
    Step {
        label,
        journal: journal.clone(),
        failures_left: AtomicUsize::new(failures),
    }
}

/// Three migrations; `up_failures` / `down_failures` apply to migration 2.
fn three_migrations(journal: &Journal, up_failures: usize, down_failures: usize) -> Vec<Migration> {
    vec![
        Migration::new(
            "example comment 1",
            step("up1", journal, 0),
            step("down1", journal, 0),
        ),
        Migration::new(
            "example comment 2",
            step("up2", journal, up_failures),
            step("down2", journal, down_failures),
        ),
        Migration::new(
            "example comment 3",
            step("up3", journal, 0),
            step("down3", journal, 0),
        ),
    ]
}

fn capture_log() -> (LogFn, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let log_fn: LogFn = Arc::new(move |args: fmt::Arguments<'_>| {
        sink.lock().unwrap().push(args.to_string());
    });
    (log_fn, lines)
}

async fn version(adapter: &TableAdapter, db: &DuckDbBackend) -> u32 {
    adapter.current_version(&Context::new(), db).await.unwrap()
}

async fn history_len(adapter: &TableAdapter, db: &DuckDbBackend) -> usize {
    adapter.history(&Context::new(), db).await.unwrap().len()
}

/// Adapter whose store operations fail on demand.
struct BrokenAdapter {
    fail_ensure: bool,
}

#[async_trait]
impl VersionAdapter for BrokenAdapter {
    fn log(&self, _args: fmt::Arguments<'_>) {}

    async fn ensure_store(&self, _ctx: &Context, _db: &dyn Database) -> DbResult<()> {
        if self.fail_ensure {
            Err(DbError::ExecutionError("create failed".to_string()))
        } else {
            Ok(())
        }
    }

    async fn current_version(&self, _ctx: &Context, _db: &dyn Database) -> DbResult<u32> {
        Err(DbError::ExecutionError("query failed".to_string()))
    }

    async fn record_version(
        &self,
        _ctx: &Context,
        _db: &dyn Database,
        _version: u32,
        _direction: Direction,
        _comment: &str,
    ) -> DbResult<()> {
        Err(DbError::ExecutionError("insert failed".to_string()))
    }
}

// ── Upgrade ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_upgrade_applies_all_in_order() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let (log_fn, lines) = capture_log();
    let adapter = TableAdapter::postgres(Some(log_fn));
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 0, 0);

    upgrade(&ctx, &db, &adapter, &migrations).await.unwrap();

    assert_eq!(journal.take(), vec!["up1", "up2", "up3"]);
    assert_eq!(version(&adapter, &db).await, 3);
    assert_eq!(
        *lines.lock().unwrap(),
        vec![
            "Current database version is 0",
            "Upgrading database to version 1",
            "Upgrading database to version 2",
            "Upgrading database to version 3",
        ]
    );
}

#[tokio::test]
async fn test_upgrade_to_stops_at_target() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let adapter = TableAdapter::sqlite(None);
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 0, 0);

    upgrade_to(&ctx, &db, &adapter, 2, &migrations).await.unwrap();
    assert_eq!(journal.take(), vec!["up1", "up2"]);
    assert_eq!(version(&adapter, &db).await, 2);

    upgrade_to(&ctx, &db, &adapter, 3, &migrations).await.unwrap();
    assert_eq!(journal.take(), vec!["up3"]);
    assert_eq!(version(&adapter, &db).await, 3);
}

#[tokio::test]
async fn test_upgrade_to_clamps_high_target() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let adapter = TableAdapter::sqlite(None);
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 0, 0);

    upgrade_to(&ctx, &db, &adapter, 42, &migrations)
        .await
        .unwrap();
    assert_eq!(journal.take(), vec!["up1", "up2", "up3"]);
    assert_eq!(version(&adapter, &db).await, 3);
}

#[tokio::test]
async fn test_upgrade_is_idempotent() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let adapter = TableAdapter::postgres(None);
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 0, 0);

    upgrade(&ctx, &db, &adapter, &migrations).await.unwrap();
    journal.take();
    let records = history_len(&adapter, &db).await;

    upgrade(&ctx, &db, &adapter, &migrations).await.unwrap();
    assert!(journal.take().is_empty());
    assert_eq!(version(&adapter, &db).await, 3);
    assert_eq!(history_len(&adapter, &db).await, records);
}

#[tokio::test]
async fn test_upgrade_failure_then_retry() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let adapter = TableAdapter::postgres(None);
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 1, 0);

    // The first run fails on the second migration.
    let err = upgrade(&ctx, &db, &adapter, &migrations)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Upgrade { version: 2, .. }));
    assert!(err.is_migration());
    assert_eq!(err.version(), Some(2));
    assert_eq!(
        err.to_string(),
        "[MG004] Error upgrading database to version 2: mock error"
    );
    assert_eq!(journal.take(), vec!["up1"]);
    assert_eq!(version(&adapter, &db).await, 1);
    assert_eq!(history_len(&adapter, &db).await, 1);

    // The retry resumes at the failed migration.
    upgrade(&ctx, &db, &adapter, &migrations).await.unwrap();
    assert_eq!(journal.take(), vec!["up2", "up3"]);
    assert_eq!(version(&adapter, &db).await, 3);
}

#[tokio::test]
async fn test_upgrade_to_current_is_noop() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let adapter = TableAdapter::sqlite(None);
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 0, 0);

    upgrade_to(&ctx, &db, &adapter, 2, &migrations).await.unwrap();
    journal.take();

    upgrade_to(&ctx, &db, &adapter, 2, &migrations).await.unwrap();
    downgrade_to(&ctx, &db, &adapter, 2, &migrations)
        .await
        .unwrap();
    assert!(journal.take().is_empty());
    assert_eq!(history_len(&adapter, &db).await, 2);
}

// ── Downgrade ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_downgrade_to_runs_descending() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let (log_fn, lines) = capture_log();
    let adapter = TableAdapter::postgres(Some(log_fn));
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 0, 0);

    upgrade(&ctx, &db, &adapter, &migrations).await.unwrap();
    journal.take();
    lines.lock().unwrap().clear();

    downgrade_to(&ctx, &db, &adapter, 1, &migrations)
        .await
        .unwrap();

    assert_eq!(journal.take(), vec!["down3", "down2"]);
    assert_eq!(version(&adapter, &db).await, 1);
    assert_eq!(
        *lines.lock().unwrap(),
        vec![
            "Current database version is 3",
            "Downgrading database from version 3",
            "Downgrading database from version 2",
        ]
    );
}

#[tokio::test]
async fn test_downgrade_skips_unapplied() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let adapter = TableAdapter::sqlite(None);
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 0, 0);

    upgrade_to(&ctx, &db, &adapter, 2, &migrations).await.unwrap();
    journal.take();

    downgrade_to(&ctx, &db, &adapter, 0, &migrations)
        .await
        .unwrap();
    assert_eq!(journal.take(), vec!["down2", "down1"]);
    assert_eq!(version(&adapter, &db).await, 0);
}

#[tokio::test]
async fn test_downgrade_failure_keeps_last_recorded() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let adapter = TableAdapter::postgres(None);
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 0, 1);

    upgrade(&ctx, &db, &adapter, &migrations).await.unwrap();
    journal.take();

    let err = downgrade_to(&ctx, &db, &adapter, 0, &migrations)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Downgrade { version: 2, .. }));
    assert_eq!(
        err.to_string(),
        "[MG005] Error downgrading database from version 2: mock error"
    );
    assert_eq!(journal.take(), vec!["down3"]);
    assert_eq!(version(&adapter, &db).await, 2);
}

#[tokio::test]
async fn test_current_version_follows_recency() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let adapter = TableAdapter::postgres(None);
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 0, 0);

    upgrade(&ctx, &db, &adapter, &migrations).await.unwrap();
    downgrade_to(&ctx, &db, &adapter, 1, &migrations)
        .await
        .unwrap();
    upgrade_to(&ctx, &db, &adapter, 2, &migrations).await.unwrap();

    assert_eq!(
        journal.take(),
        vec!["up1", "up2", "up3", "down3", "down2", "up2"]
    );
    assert_eq!(version(&adapter, &db).await, 2);

    let history = adapter.history(&ctx, &db).await.unwrap();
    let versions: Vec<u32> = history.iter().map(|r| r.version).collect();
    let directions: Vec<Direction> = history.iter().map(|r| r.direction).collect();
    assert_eq!(versions, vec![1, 2, 3, 2, 1, 2]);
    assert_eq!(
        directions,
        vec![
            Direction::Up,
            Direction::Up,
            Direction::Up,
            Direction::Down,
            Direction::Down,
            Direction::Up,
        ]
    );
    assert_eq!(history[3].comment, "example comment 3");
    assert_eq!(history[4].comment, "example comment 2");
}

// ── Boundaries and storage failures ────────────────────────────────────

#[tokio::test]
async fn test_empty_migration_list() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let adapter = TableAdapter::postgres(None);

    upgrade(&ctx, &db, &adapter, &[]).await.unwrap();
    downgrade_to(&ctx, &db, &adapter, 0, &[]).await.unwrap();

    assert!(db.relation_exists(&ctx, "schema_versions").await.unwrap());
    assert_eq!(version(&adapter, &db).await, 0);
    assert_eq!(history_len(&adapter, &db).await, 0);
}

#[tokio::test]
async fn test_record_failure_after_body_ran() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let adapter = TableAdapter::postgres(None);
    let migrations = vec![Migration::sql(
        "drops the version table",
        &["CREATE TABLE widgets (id INT)", "DROP TABLE schema_versions"],
        &[],
    )];

    let err = upgrade(&ctx, &db, &adapter, &migrations)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::RecordVersion { version: 1, .. }));
    assert!(err.is_storage());
    assert!(err.to_string().starts_with("[MG003]"));

    // The body's effects stay applied even though nothing was recorded.
    assert!(db.relation_exists(&ctx, "widgets").await.unwrap());
}

#[tokio::test]
async fn test_prepare_store_failure() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 0, 0);

    let err = upgrade(&ctx, &db, &BrokenAdapter { fail_ensure: true }, &migrations)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::PrepareStore(_)));
    assert!(err.is_storage());
    assert!(journal.take().is_empty());
}

#[tokio::test]
async fn test_query_version_failure() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 0, 0);

    let err = downgrade_to(&ctx, &db, &BrokenAdapter { fail_ensure: false }, 0, &migrations)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::QueryVersion(_)));
    assert_eq!(err.version(), None);
    assert!(journal.take().is_empty());
}

#[tokio::test]
async fn test_cancelled_context_fails_before_any_step() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ctx = Context::new();
    ctx.cancel();
    let adapter = TableAdapter::postgres(None);
    let journal = Journal::default();
    let migrations = three_migrations(&journal, 0, 0);

    let err = upgrade(&ctx, &db, &adapter, &migrations)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MigrateError::PrepareStore(DbError::Cancelled)
    ));
    assert!(journal.take().is_empty());
}
