//! Storage Layer - SQLite-backed consolidated store
//!
//! System of record is SQLite with tables:
//! - users(id, name, hash)
//! - urls(user_id, id, url, title, visit_count, typed_count, last_visit_time, hidden, favicon_id)
//! - visits(user_id, id, url, visit_time, from_visit, transition, segment_id, visit_duration)
//! - visit_source(user_id, id, source)

pub mod schema;
pub mod sqlite;

pub use sqlite::{SqliteStore, DbStats, DanglingReference};
