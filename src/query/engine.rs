//! Query engine implementation
//!
//! Read-only operations over the consolidated store:
//! - Url counting and filtered, paginated listing
//! - Entity lookup by compound key
//! - User listing and store statistics

use crate::model::{LocalKey, Url, User, Visit, VisitSource, WebkitTime};
use crate::storage::{DbStats, SqliteStore};
use crate::{Error, Result};

/// Conjunctive url filter. A `None` field places no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UrlFilter {
    /// Restrict to one user, by name
    pub user: Option<String>,
    /// Last visited strictly before this time
    pub visited_before: Option<WebkitTime>,
    /// Last visited strictly after this time
    pub visited_after: Option<WebkitTime>,
    /// Substring of the address
    pub url_pattern: Option<String>,
    /// Substring of the title
    pub title_pattern: Option<String>,
    pub limit: Option<usize>,
    /// Rows to skip; has no effect unless `limit` is set
    pub offset: Option<usize>,
}

impl UrlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn before(mut self, time: WebkitTime) -> Self {
        self.visited_before = Some(time);
        self
    }

    pub fn after(mut self, time: WebkitTime) -> Self {
        self.visited_after = Some(time);
        self
    }

    pub fn url_contains(mut self, pattern: impl Into<String>) -> Self {
        self.url_pattern = Some(pattern.into());
        self
    }

    pub fn title_contains(mut self, pattern: impl Into<String>) -> Self {
        self.title_pattern = Some(pattern.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Query engine over the consolidated store
pub struct QueryEngine<'a> {
    store: &'a SqliteStore,
}

impl<'a> QueryEngine<'a> {
    /// Create a new query engine
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Count urls, across all users or for the named one
    pub fn url_count(&self, user: Option<&str>) -> Result<usize> {
        let user_id = self.resolve_user(user)?;
        self.store.count_urls(user_id)
    }

    /// List urls matching `filter`, most recently visited first.
    ///
    /// Ties on `last_visit_time` are broken by `(user_id, local_id)` so that
    /// consecutive pages never overlap.
    pub fn list_urls(&self, filter: &UrlFilter) -> Result<Vec<Url>> {
        let user_id = self.resolve_user(filter.user.as_deref())?;
        if filter.limit.is_none() && filter.offset.is_some() {
            tracing::debug!("Ignoring offset without limit");
        }
        self.store.find_urls(user_id, filter)
    }

    pub fn get_url(&self, key: LocalKey) -> Result<Url> {
        self.store
            .get_url(key)?
            .ok_or_else(|| Error::not_found("Url", key))
    }

    pub fn get_visit(&self, key: LocalKey) -> Result<Visit> {
        self.store
            .get_visit(key)?
            .ok_or_else(|| Error::not_found("Visit", key))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.store.list_users()
    }

    pub fn get_user(&self, name: &str) -> Result<User> {
        self.store
            .get_user_by_name(name)?
            .ok_or_else(|| Error::not_found("User", name))
    }

    pub fn visit_count(&self) -> Result<usize> {
        self.store.count_visits()
    }

    /// Every visit of a url, oldest first
    pub fn visits_for_url(&self, key: LocalKey) -> Result<Vec<Visit>> {
        // distinguish "no visits" from "no such url"
        self.get_url(key)?;
        self.store.visits_for_url(key)
    }

    /// The visit that set the url's `last_visit_time`, if it is still recorded
    pub fn latest_visit(&self, url: &Url) -> Result<Option<Visit>> {
        self.store.visit_at(url.key(), url.last_visit_time)
    }

    /// Provenance of a visit, when the source recorded one
    pub fn visit_source(&self, key: LocalKey) -> Result<Option<VisitSource>> {
        self.store.get_visit_source(key)
    }

    pub fn stats(&self) -> Result<DbStats> {
        self.store.stats()
    }

    fn resolve_user(&self, user: Option<&str>) -> Result<Option<i64>> {
        match user {
            Some(name) => Ok(Some(self.get_user(name)?.id)),
            None => Ok(None),
        }
    }
}
