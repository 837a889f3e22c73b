//! Error types for stepwise-migrate

use stepwise_db::DbError;
use thiserror::Error;

/// Opaque failure cause returned by a migration body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Migration errors.
///
/// MG001-MG003 are storage errors: the version store could not be prepared,
/// read or written. MG004-MG006 are migration errors: a step body failed.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Creating the version store failed (MG001).
    #[error("[MG001] Error preparing schema versions: {0}")]
    PrepareStore(#[source] DbError),

    /// Reading the current version failed (MG002).
    #[error("[MG002] Error querying current schema version: {0}")]
    QueryVersion(#[source] DbError),

    /// Appending a version record failed after the step body ran (MG003).
    #[error("[MG003] Error recording schema version for version {version}: {source}")]
    RecordVersion {
        version: u32,
        #[source]
        source: DbError,
    },

    /// An upgrade body failed (MG004).
    #[error("[MG004] Error upgrading database to version {version}: {source}")]
    Upgrade {
        version: u32,
        #[source]
        source: BoxError,
    },

    /// A downgrade body failed (MG005).
    #[error("[MG005] Error downgrading database from version {version}: {source}")]
    Downgrade {
        version: u32,
        #[source]
        source: BoxError,
    },

    /// A statement inside a batch body failed (MG006).
    #[error("[MG006] Error with statement {index}: {source}")]
    Statement {
        index: usize,
        #[source]
        source: DbError,
    },

    /// Adapter configuration could not be read or parsed (MG007).
    #[error("[MG007] Invalid adapter config: {message}")]
    Config { message: String },
}

/// Result type alias for [`MigrateError`].
pub type MigrateResult<T> = Result<T, MigrateError>;

impl MigrateError {
    /// True when the version store itself failed.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            MigrateError::PrepareStore(_)
                | MigrateError::QueryVersion(_)
                | MigrateError::RecordVersion { .. }
        )
    }

    /// True when a migration body failed.
    pub fn is_migration(&self) -> bool {
        matches!(
            self,
            MigrateError::Upgrade { .. }
                | MigrateError::Downgrade { .. }
                | MigrateError::Statement { .. }
        )
    }

    /// Version the failing step was moving to or from, when there is one.
    pub fn version(&self) -> Option<u32> {
        match self {
            MigrateError::RecordVersion { version, .. }
            | MigrateError::Upgrade { version, .. }
            | MigrateError::Downgrade { version, .. } => Some(*version),
            _ => None,
        }
    }
}
