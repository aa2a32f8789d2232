//! SQLite persistence for per-request stats.
//!
//! One append-only table; aggregation queries are served from here, never
//! from the in-memory ring.

pub mod entities;
pub mod sink;
pub mod storage;

pub use sink::DbStatsSink;
pub use storage::{StatsStorage, StorageError, StorageResult};
