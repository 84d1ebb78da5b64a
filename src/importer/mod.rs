//! Merge Importer - the write path into the consolidated store
//!
//! Each user is imported as a full replace inside a single transaction:
//! 1. compare the source digest with the recorded one (skip when equal)
//! 2. upsert the user row with the new digest
//! 3. delete every url, visit and visit_source row of that user
//! 4. copy the source rows, keeping source ids as local ids
//! 5. verify every reference resolves inside the user's namespace
//!
//! A failure anywhere rolls the transaction back, leaving the user's last
//! successfully merged rows in place.

pub mod detector;
pub mod source;

use std::fmt;
use std::path::Path;

use rusqlite::TransactionBehavior;

pub use detector::{check, needs_import, ImportDecision};
pub use source::SourceDb;

use crate::registry::SourceRegistry;
use crate::storage::{sqlite, SqliteStore};
use crate::Result;

/// Result of importing one user
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ImportOutcome {
    /// Digest matched; nothing was touched
    Unchanged { user_id: i64 },
    Imported {
        user_id: i64,
        /// The user did not exist before this import
        created: bool,
        /// Rows of the previous import that were replaced
        removed: usize,
        urls: usize,
        visits: usize,
        visit_sources: usize,
    },
}

impl ImportOutcome {
    pub fn user_id(&self) -> i64 {
        match self {
            ImportOutcome::Unchanged { user_id } | ImportOutcome::Imported { user_id, .. } => *user_id,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, ImportOutcome::Unchanged { .. })
    }
}

/// One user's entry in an [`ImportReport`]
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserImport {
    pub username: String,
    pub outcome: std::result::Result<ImportOutcome, String>,
}

/// Summary of a multi-user import run
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ImportReport {
    pub users: Vec<UserImport>,
}

impl ImportReport {
    pub fn imported(&self) -> usize {
        self.users
            .iter()
            .filter(|u| matches!(u.outcome, Ok(ImportOutcome::Imported { .. })))
            .count()
    }

    pub fn unchanged(&self) -> usize {
        self.users
            .iter()
            .filter(|u| matches!(u.outcome, Ok(ImportOutcome::Unchanged { .. })))
            .count()
    }

    /// `(username, error)` for every user whose import failed
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.users
            .iter()
            .filter_map(|u| u.outcome.as_ref().err().map(|e| (u.username.as_str(), e.as_str())))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.users.iter().all(|u| u.outcome.is_ok())
    }

    /// One-line account of the failed users, `None` when every import succeeded
    pub fn failure_summary(&self) -> Option<String> {
        let failures = self.failures();
        if failures.is_empty() {
            return None;
        }
        let names: Vec<&str> = failures.iter().map(|(user, _)| *user).collect();
        Some(format!(
            "{} of {} users failed to import: {}",
            failures.len(),
            self.users.len(),
            names.join(", ")
        ))
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Import Summary:")?;
        writeln!(f, "  Imported: {}", self.imported())?;
        writeln!(f, "  Unchanged: {}", self.unchanged())?;
        write!(f, "  Failed: {}", self.failures().len())?;
        for (user, error) in self.failures() {
            write!(f, "\n    {}: {}", user, error)?;
        }
        Ok(())
    }
}

/// Single writer over the consolidated store
pub struct Importer<'a> {
    store: &'a mut SqliteStore,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a mut SqliteStore) -> Self {
        Self { store }
    }

    /// Bring `username`'s rows in line with the source at `path`
    pub fn import_user(&mut self, username: &str, path: &Path) -> Result<ImportOutcome> {
        let (digest, created) = match detector::check(self.store, username, path)? {
            ImportDecision::Unchanged { user_id } => {
                tracing::debug!("{}: already loaded and latest version", username);
                return Ok(ImportOutcome::Unchanged { user_id });
            }
            ImportDecision::New { digest } => (digest, true),
            ImportDecision::Changed { digest, .. } => (digest, false),
        };

        tracing::info!("{}: loading history from {}", username, path.display());
        let source = SourceDb::open(username, path)?;

        let tx = self
            .store
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let user_id = sqlite::upsert_user(&tx, username, &digest)?;
        let removed = sqlite::delete_user_rows(&tx, user_id)?;
        tracing::debug!("{}: removed {} rows of the previous import", username, removed);

        let urls = source.for_each_url(user_id, |url| sqlite::insert_url(&tx, &url))?;
        let visits = source.for_each_visit(user_id, |visit| sqlite::insert_visit(&tx, &visit))?;
        let visit_sources =
            source.for_each_visit_source(user_id, |vs| sqlite::insert_visit_source(&tx, &vs))?;

        let dangling = sqlite::dangling_references(&tx, user_id)?;
        if let Some(first) = dangling.first() {
            // dropping `tx` rolls back
            return Err(source.violation(format!(
                "{} ({} unresolved references)",
                first,
                dangling.len()
            )));
        }

        tx.commit()?;
        tracing::info!(
            "{}: imported {} urls, {} visits, {} visit sources",
            username,
            urls,
            visits,
            visit_sources
        );

        Ok(ImportOutcome::Imported {
            user_id,
            created,
            removed,
            urls,
            visits,
            visit_sources,
        })
    }

    /// Import every registered source, one user at a time, in username order.
    ///
    /// A failing user is recorded in the report and does not stop the run.
    pub fn import_all(&mut self, registry: &SourceRegistry) -> ImportReport {
        self.import_all_with(registry, |_, _| {})
    }

    /// [`import_all`](Self::import_all), calling `on_user` after each user
    pub fn import_all_with(
        &mut self,
        registry: &SourceRegistry,
        mut on_user: impl FnMut(&str, &Result<ImportOutcome>),
    ) -> ImportReport {
        let mut report = ImportReport::default();

        for (username, path) in registry.sorted() {
            let result = self.import_user(username, path);
            on_user(username, &result);

            if let Err(e) = &result {
                tracing::warn!("{}: import failed: {}", username, e);
            }
            report.users.push(UserImport {
                username: username.to_string(),
                outcome: result.map_err(|e| e.to_string()),
            });
        }

        report
    }

    /// Discover the sources in `directory` and import them all
    pub fn import_directory(&mut self, directory: &Path) -> Result<ImportReport> {
        let registry = SourceRegistry::discover(directory)?;
        Ok(self.import_all(&registry))
    }
}
