//! Upgrade and downgrade sequencing.
//!
//! Every function here is a pure function of its arguments: the database
//! handle and adapter are borrowed from the caller and no state is kept
//! between runs.
//!
//! Steps run strictly one after another. A failing step stops the walk and
//! leaves the database at the last recorded version. There is no locking:
//! callers must make sure only one process migrates a database at a time.
//!
//! If recording a version fails after its body succeeded, the body's effects
//! stay applied but unrecorded and the next run executes the step again.
//! Migrations should tolerate being replayed.

use crate::adapter::{Direction, VersionAdapter};
use crate::error::{MigrateError, MigrateResult};
use crate::migration::Migration;
use stepwise_db::{Context, Database};

/// Upgrade the database to the last migration in `migrations`.
pub async fn upgrade(
    ctx: &Context,
    db: &dyn Database,
    adapter: &dyn VersionAdapter,
    migrations: &[Migration],
) -> MigrateResult<()> {
    let latest = u32::try_from(migrations.len()).unwrap_or(u32::MAX);
    upgrade_to(ctx, db, adapter, latest, migrations).await
}

/// Upgrade the database to `target`.
///
/// Versions at or below the current one are skipped. A target above the
/// number of migrations runs everything available.
pub async fn upgrade_to(
    ctx: &Context,
    db: &dyn Database,
    adapter: &dyn VersionAdapter,
    target: u32,
    migrations: &[Migration],
) -> MigrateResult<()> {
    let current = prepare(ctx, db, adapter).await?;

    for (idx, migration) in migrations.iter().enumerate() {
        let version = position(idx);
        if version <= current {
            continue;
        }
        if version > target {
            break;
        }

        adapter.log(format_args!("Upgrading database to version {version}"));
        migration
            .up
            .run(ctx, db)
            .await
            .map_err(|source| MigrateError::Upgrade { version, source })?;

        adapter
            .record_version(ctx, db, version, Direction::Up, &migration.comment)
            .await
            .map_err(|source| MigrateError::RecordVersion { version, source })?;
    }
    Ok(())
}

/// Downgrade the database to `target`.
///
/// Kept separate from [`upgrade_to`] and without a "downgrade everything"
/// shorthand because downgrades are usually destructive.
///
/// Undoing migration `v` records version `v - 1` with [`Direction::Down`]
/// and the undone migration's comment.
pub async fn downgrade_to(
    ctx: &Context,
    db: &dyn Database,
    adapter: &dyn VersionAdapter,
    target: u32,
    migrations: &[Migration],
) -> MigrateResult<()> {
    let current = prepare(ctx, db, adapter).await?;

    for (idx, migration) in migrations.iter().enumerate().rev() {
        let version = position(idx);
        if version > current {
            continue;
        }
        if version <= target {
            break;
        }

        adapter.log(format_args!("Downgrading database from version {version}"));
        migration
            .down
            .run(ctx, db)
            .await
            .map_err(|source| MigrateError::Downgrade { version, source })?;

        adapter
            .record_version(ctx, db, version - 1, Direction::Down, &migration.comment)
            .await
            .map_err(|source| MigrateError::RecordVersion { version, source })?;
    }
    Ok(())
}

/// Version of the migration at list index `idx`.
fn position(idx: usize) -> u32 {
    u32::try_from(idx + 1).unwrap_or(u32::MAX)
}

async fn prepare(
    ctx: &Context,
    db: &dyn Database,
    adapter: &dyn VersionAdapter,
) -> MigrateResult<u32> {
    adapter
        .ensure_store(ctx, db)
        .await
        .map_err(MigrateError::PrepareStore)?;
    let current = adapter
        .current_version(ctx, db)
        .await
        .map_err(MigrateError::QueryVersion)?;
    adapter.log(format_args!("Current database version is {current}"));
    Ok(current)
}

#[cfg(test)]
#[path = "sequencer_test.rs"]
mod tests;
