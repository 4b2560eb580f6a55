//! Database layer for procsim
//!
//! Durable local storage is a single SQLite table of keyed JSON records:
//! - Schema migrations via `PRAGMA user_version`
//! - Repository methods for reading, writing and erasing a record

pub mod repo;
pub mod schema;

pub use repo::{Database, StoredRecord};
