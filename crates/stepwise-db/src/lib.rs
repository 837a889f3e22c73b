//! stepwise-db - Database handle abstraction for stepwise
//!
//! This crate provides the `Database` trait that the migration engine issues
//! every statement through, the `Context` threaded into each call, and a
//! DuckDB implementation.

pub mod context;
pub mod duckdb;
pub mod error;
pub mod traits;
pub mod value;

pub use context::Context;
pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use traits::Database;
pub use value::Value;
