//! SQLite persistence adapter.
//!
//! Implements every store port over one SQLite file (or an in-memory
//! database for tests). Schema changes are embedded, forward-only
//! migrations that bump `schema_version` atomically with their DDL.

mod migrations;
mod sqlite;

pub use sqlite::SqliteStore;
