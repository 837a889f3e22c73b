//! stepwise-migrate - Schema migrations applied at application startup
//!
//! Migrations are defined in code as an ordered list and applied with
//! [`upgrade`], [`upgrade_to`] or [`downgrade_to`]. A [`VersionAdapter`]
//! records each transition so repeated runs only apply what is missing.
//!
//! ```no_run
//! use stepwise_db::{Context, DuckDbBackend};
//! use stepwise_migrate::{log_facade, upgrade, Migration, TableAdapter};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DuckDbBackend::new("app.duckdb")?;
//! let adapter = TableAdapter::postgres(Some(log_facade()));
//! let migrations = vec![
//!     Migration::sql(
//!         "Add user and app tables",
//!         &[
//!             "CREATE TABLE users (id INT PRIMARY KEY, username VARCHAR NOT NULL)",
//!             "CREATE TABLE apps (id INT PRIMARY KEY, title VARCHAR NOT NULL)",
//!         ],
//!         &["DROP TABLE apps", "DROP TABLE users"],
//!     ),
//!     Migration::sql(
//!         "Add user app join table",
//!         &["CREATE TABLE user_apps (user_id INT NOT NULL, app_id INT NOT NULL)"],
//!         &["DROP TABLE user_apps"],
//!     ),
//! ];
//! upgrade(&Context::new(), &db, &adapter, &migrations).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod migration;
pub mod sequencer;
pub mod table;

pub use adapter::{log_facade, Direction, LogFn, VersionAdapter};
pub use config::AdapterConfig;
pub use error::{BoxError, MigrateError, MigrateResult};
pub use migration::{exec_statements, ExecStatements, Migration, MigrationOp};
pub use sequencer::{downgrade_to, upgrade, upgrade_to};
pub use table::{Dialect, Placeholders, SchemaVersionRecord, TableAdapter, DEFAULT_TABLE};
