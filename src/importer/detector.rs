//! Change detection - does a user's source need (re-)importing?

use std::path::Path;

use crate::hasher;
use crate::storage::SqliteStore;
use crate::Result;

/// What the importer has to do for one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDecision {
    /// The user has never been imported
    New { digest: String },
    /// The source changed since the last import
    Changed { user_id: i64, digest: String },
    /// The store already holds this exact source
    Unchanged { user_id: i64 },
}

impl ImportDecision {
    pub fn is_required(&self) -> bool {
        !matches!(self, ImportDecision::Unchanged { .. })
    }

    /// Digest of the source, when an import is required
    pub fn digest(&self) -> Option<&str> {
        match self {
            ImportDecision::New { digest } | ImportDecision::Changed { digest, .. } => Some(digest),
            ImportDecision::Unchanged { .. } => None,
        }
    }
}

/// Compare the source's digest with the one recorded for `username`
pub fn check(store: &SqliteStore, username: &str, path: &Path) -> Result<ImportDecision> {
    let digest = hasher::digest(path)?;

    let decision = match store.get_user_by_name(username)? {
        None => ImportDecision::New { digest },
        Some(user) if user.content_digest == digest => ImportDecision::Unchanged { user_id: user.id },
        Some(user) => ImportDecision::Changed { user_id: user.id, digest },
    };
    Ok(decision)
}

/// True when `username` is unknown or its source changed
pub fn needs_import(store: &SqliteStore, username: &str, path: &Path) -> Result<bool> {
    Ok(check(store, username, path)?.is_required())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::upsert_user;

    #[test]
    fn test_detects_new_changed_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice");
        std::fs::write(&path, "test").unwrap();
        let store = SqliteStore::open_in_memory().unwrap();

        let decision = check(&store, "alice", &path).unwrap();
        assert!(matches!(decision, ImportDecision::New { .. }));
        assert!(needs_import(&store, "alice", &path).unwrap());

        let digest = decision.digest().unwrap().to_string();
        let id = upsert_user(store.conn(), "alice", &digest).unwrap();
        assert_eq!(check(&store, "alice", &path).unwrap(), ImportDecision::Unchanged { user_id: id });
        assert!(!needs_import(&store, "alice", &path).unwrap());

        std::fs::write(&path, "test, changed").unwrap();
        let decision = check(&store, "alice", &path).unwrap();
        assert!(matches!(decision, ImportDecision::Changed { user_id, .. } if user_id == id));
        assert!(needs_import(&store, "alice", &path).unwrap());
    }

    #[test]
    fn test_unreadable_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let err = check(&store, "ghost", &dir.path().join("ghost")).unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }
}
