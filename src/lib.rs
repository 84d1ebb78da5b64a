//! # Historian - Multi-user browser history merger
//!
//! Merges per-user Chromium history databases into one consolidated store.
//!
//! Historian provides:
//! - Change detection over source files (SHA-256 digests)
//! - Per-user full-replace import with referential integrity checks
//! - Filtered, paginated URL queries across users
//! - Visit lineage traversal (predecessor / successors / bounded walks)

pub mod hasher;
pub mod registry;
pub mod model;
pub mod transition;
pub mod storage;
pub mod importer;
pub mod query;
pub mod config;
pub mod ui;
pub mod server;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-exports for convenient access
pub use model::{LocalKey, Url, User, Visit, VisitSource, WebkitTime};
pub use transition::{Transition, TransitionCore, TransitionQualifier, VisitSourceKind};
pub use storage::SqliteStore;
pub use registry::SourceRegistry;
pub use importer::{Importer, ImportDecision, ImportOutcome, ImportReport};
pub use query::{QueryEngine, UrlFilter, VisitGraph, VisitCache};

/// Result type alias for Historian operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Historian operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} with index {key} does not exist")]
    NotFound { kind: &'static str, key: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Integrity violation in history of {user}: {detail}")]
    IntegrityViolation { user: String, detail: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Error::NotFound { kind, key: key.to_string() }
    }

    /// True for lookups that failed because the entity is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
