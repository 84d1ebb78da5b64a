//! SQLite storage implementation
//!
//! Row-level helpers are free functions over `&Connection` so the importer can
//! run them inside its per-user transaction; `SqliteStore` wraps them for
//! read-only callers.

use std::path::Path;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};

use super::schema;
use crate::model::{LocalKey, Url, User, Visit, VisitSource, WebkitTime};
use crate::query::UrlFilter;
use crate::transition::{Transition, VisitSourceKind};
use crate::Result;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const URL_COLUMNS: &str =
    "user_id, id, url, title, visit_count, typed_count, last_visit_time, hidden, favicon_id";
const VISIT_COLUMNS: &str =
    "user_id, id, url, visit_time, from_visit, transition, segment_id, visit_duration";

/// SQLite-backed consolidated history store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL lets readers keep a consistent snapshot while a user import commits
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an existing store for reading only
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    // ========== User Operations ==========

    pub fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        user_by_name(&self.conn, name)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn
            .query_row("SELECT id, name, hash FROM users WHERE id = ?1", [id], row_to_user)
            .optional()
            .map_err(Into::into)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare("SELECT id, name, hash FROM users ORDER BY id")?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn count_users(&self) -> Result<usize> {
        count(&self.conn, "SELECT COUNT(*) FROM users", params![])
    }

    // ========== Url Operations ==========

    pub fn get_url(&self, key: LocalKey) -> Result<Option<Url>> {
        self.conn
            .query_row(
                &format!("SELECT {URL_COLUMNS} FROM urls WHERE user_id = ?1 AND id = ?2"),
                params![key.user_id, key.local_id],
                row_to_url,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Count urls, optionally for a single user
    pub fn count_urls(&self, user_id: Option<i64>) -> Result<usize> {
        match user_id {
            Some(id) => count(&self.conn, "SELECT COUNT(*) FROM urls WHERE user_id = ?1", [id]),
            None => count(&self.conn, "SELECT COUNT(*) FROM urls", params![]),
        }
    }

    /// Find urls matching every constraint in `filter`, newest visit first.
    ///
    /// `user_id` is the already-resolved user constraint; `filter.user` is ignored here.
    pub fn find_urls(&self, user_id: Option<i64>, filter: &UrlFilter) -> Result<Vec<Url>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(id) = user_id {
            clauses.push("user_id = ?");
            values.push(Value::Integer(id));
        }
        if let Some(before) = filter.visited_before {
            clauses.push("last_visit_time < ?");
            values.push(Value::Integer(before.raw()));
        }
        if let Some(after) = filter.visited_after {
            clauses.push("last_visit_time > ?");
            values.push(Value::Integer(after.raw()));
        }
        if let Some(pattern) = &filter.url_pattern {
            clauses.push("url LIKE ? ESCAPE '\\'");
            values.push(Value::Text(like_pattern(pattern)));
        }
        if let Some(pattern) = &filter.title_pattern {
            clauses.push("title LIKE ? ESCAPE '\\'");
            values.push(Value::Text(like_pattern(pattern)));
        }

        let mut sql = format!("SELECT {URL_COLUMNS} FROM urls");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY last_visit_time DESC, user_id, id");

        // offset only applies together with limit
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(Value::Integer(to_sql_int(limit)));
            values.push(Value::Integer(to_sql_int(filter.offset.unwrap_or(0))));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let urls = stmt
            .query_map(params_from_iter(values.iter()), row_to_url)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(urls)
    }

    // ========== Visit Operations ==========

    pub fn get_visit(&self, key: LocalKey) -> Result<Option<Visit>> {
        self.conn
            .query_row(
                &format!("SELECT {VISIT_COLUMNS} FROM visits WHERE user_id = ?1 AND id = ?2"),
                params![key.user_id, key.local_id],
                row_to_visit,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn count_visits(&self) -> Result<usize> {
        count(&self.conn, "SELECT COUNT(*) FROM visits", params![])
    }

    /// Visits whose predecessor is `key`.
    ///
    /// `from_visit = 0` marks a chain start and never links to a visit with id 0.
    pub fn visits_from(&self, key: LocalKey) -> Result<Vec<Visit>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE user_id = ?1 AND from_visit = ?2 AND from_visit != 0 ORDER BY id"
        ))?;
        let visits = stmt
            .query_map(params![key.user_id, key.local_id], row_to_visit)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(visits)
    }

    /// All visits of a url, oldest first
    pub fn visits_for_url(&self, url: LocalKey) -> Result<Vec<Visit>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE user_id = ?1 AND url = ?2 ORDER BY visit_time, id"
        ))?;
        let visits = stmt
            .query_map(params![url.user_id, url.local_id], row_to_visit)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(visits)
    }

    /// The visit of `url` that happened exactly at `time`
    pub fn visit_at(&self, url: LocalKey, time: WebkitTime) -> Result<Option<Visit>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {VISIT_COLUMNS} FROM visits WHERE user_id = ?1 AND url = ?2 AND visit_time = ?3 ORDER BY id LIMIT 1"
                ),
                params![url.user_id, url.local_id, time.raw()],
                row_to_visit,
            )
            .optional()
            .map_err(Into::into)
    }

    // ========== Visit Source Operations ==========

    pub fn get_visit_source(&self, key: LocalKey) -> Result<Option<VisitSource>> {
        self.conn
            .query_row(
                "SELECT user_id, id, source FROM visit_source WHERE user_id = ?1 AND id = ?2",
                params![key.user_id, key.local_id],
                row_to_visit_source,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn count_visit_sources(&self) -> Result<usize> {
        count(&self.conn, "SELECT COUNT(*) FROM visit_source", params![])
    }

    // ========== Integrity ==========

    /// Broken references inside one user's namespace
    pub fn dangling_references(&self, user_id: i64) -> Result<Vec<DanglingReference>> {
        dangling_references(&self.conn, user_id)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            users: self.count_users()?,
            urls: self.count_urls(None)?,
            visits: self.count_visits()?,
            visit_sources: self.count_visit_sources()?,
        })
    }
}

// ========== Row helpers shared with the importer ==========

pub(crate) fn user_by_name(conn: &Connection, name: &str) -> Result<Option<User>> {
    conn.query_row("SELECT id, name, hash FROM users WHERE name = ?1", [name], row_to_user)
        .optional()
        .map_err(Into::into)
}

/// Insert the user or update its digest, returning its id
pub(crate) fn upsert_user(conn: &Connection, name: &str, digest: &str) -> Result<i64> {
    let id = conn.query_row(
        r#"
        INSERT INTO users (name, hash) VALUES (?1, ?2)
        ON CONFLICT(name) DO UPDATE SET hash = excluded.hash
        RETURNING id
        "#,
        params![name, digest],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Remove every data row owned by `user_id`
pub(crate) fn delete_user_rows(conn: &Connection, user_id: i64) -> Result<usize> {
    let mut removed = 0;
    removed += conn.execute("DELETE FROM visit_source WHERE user_id = ?1", [user_id])?;
    removed += conn.execute("DELETE FROM visits WHERE user_id = ?1", [user_id])?;
    removed += conn.execute("DELETE FROM urls WHERE user_id = ?1", [user_id])?;
    Ok(removed)
}

pub(crate) fn insert_url(conn: &Connection, url: &Url) -> Result<()> {
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT INTO urls ({URL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
    ))?;
    stmt.execute(params![
        url.user_id,
        url.local_id,
        url.address,
        url.title,
        url.visit_count,
        url.typed_count,
        url.last_visit_time.raw(),
        url.hidden,
        url.favicon_id,
    ])?;
    Ok(())
}

pub(crate) fn insert_visit(conn: &Connection, visit: &Visit) -> Result<()> {
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT INTO visits ({VISIT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    ))?;
    stmt.execute(params![
        visit.user_id,
        visit.local_id,
        visit.url_local_id,
        visit.visit_time.raw(),
        visit.from_visit_local_id,
        visit.transition.to_raw(),
        visit.segment_id,
        visit.visit_duration,
    ])?;
    Ok(())
}

pub(crate) fn insert_visit_source(conn: &Connection, source: &VisitSource) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO visit_source (user_id, id, source) VALUES (?1, ?2, ?3)",
    )?;
    stmt.execute(params![source.user_id, source.local_id, source.source.code()])?;
    Ok(())
}

pub(crate) fn dangling_references(conn: &Connection, user_id: i64) -> Result<Vec<DanglingReference>> {
    let mut found = Vec::new();

    let mut stmt = conn.prepare(
        r#"
        SELECT v.id, v.url FROM visits AS v
        WHERE v.user_id = ?1
          AND NOT EXISTS (SELECT 1 FROM urls AS u WHERE u.user_id = v.user_id AND u.id = v.url)
        ORDER BY v.id
        "#,
    )?;
    let rows = stmt.query_map([user_id], |row| {
        Ok(DanglingReference::Url {
            visit: LocalKey::new(user_id, row.get(0)?),
            url_local_id: row.get(1)?,
        })
    })?;
    for row in rows {
        found.push(row?);
    }

    let mut stmt = conn.prepare(
        r#"
        SELECT v.id, v.from_visit FROM visits AS v
        WHERE v.user_id = ?1 AND v.from_visit != 0
          AND NOT EXISTS (SELECT 1 FROM visits AS p WHERE p.user_id = v.user_id AND p.id = v.from_visit)
        ORDER BY v.id
        "#,
    )?;
    let rows = stmt.query_map([user_id], |row| {
        Ok(DanglingReference::FromVisit {
            visit: LocalKey::new(user_id, row.get(0)?),
            from_visit_local_id: row.get(1)?,
        })
    })?;
    for row in rows {
        found.push(row?);
    }

    Ok(found)
}

fn count<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<usize> {
    let count: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(count as usize)
}

fn to_sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// `%pattern%` with LIKE wildcards in `pattern` escaped by `\`
fn like_pattern(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len() + 2);
    escaped.push('%');
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        content_digest: row.get(2)?,
    })
}

fn row_to_url(row: &Row) -> rusqlite::Result<Url> {
    Ok(Url {
        user_id: row.get(0)?,
        local_id: row.get(1)?,
        address: row.get(2)?,
        title: row.get(3)?,
        visit_count: row.get(4)?,
        typed_count: row.get(5)?,
        last_visit_time: WebkitTime(row.get(6)?),
        hidden: row.get(7)?,
        favicon_id: row.get(8)?,
    })
}

fn row_to_visit(row: &Row) -> rusqlite::Result<Visit> {
    Ok(Visit {
        user_id: row.get(0)?,
        local_id: row.get(1)?,
        url_local_id: row.get(2)?,
        visit_time: WebkitTime(row.get(3)?),
        from_visit_local_id: row.get(4)?,
        transition: Transition::from_raw(row.get(5)?),
        segment_id: row.get(6)?,
        visit_duration: row.get(7)?,
    })
}

fn row_to_visit_source(row: &Row) -> rusqlite::Result<VisitSource> {
    Ok(VisitSource {
        user_id: row.get(0)?,
        local_id: row.get(1)?,
        source: VisitSourceKind::from_code(row.get(2)?),
    })
}

/// A reference that does not resolve within its user namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DanglingReference {
    /// `visit` points at a url that does not exist
    Url { visit: LocalKey, url_local_id: i64 },
    /// `visit` names a predecessor that does not exist
    FromVisit { visit: LocalKey, from_visit_local_id: i64 },
}

impl std::fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DanglingReference::Url { visit, url_local_id } => {
                write!(f, "visit {} references missing url {}", visit.local_id, url_local_id)
            }
            DanglingReference::FromVisit { visit, from_visit_local_id } => write!(
                f,
                "visit {} references missing from_visit {}",
                visit.local_id, from_visit_local_id
            ),
        }
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub users: usize,
    pub urls: usize,
    pub visits: usize,
    pub visit_sources: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Users: {}", self.users)?;
        writeln!(f, "  Urls: {}", self.urls)?;
        writeln!(f, "  Visits: {}", self.visits)?;
        writeln!(f, "  Visit sources: {}", self.visit_sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{url, visit};

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        let alice = upsert_user(store.conn(), "alice", "aaa").unwrap();
        insert_url(store.conn(), &url(alice, 1, "https://a.test", "A", 300)).unwrap();
        insert_url(store.conn(), &url(alice, 2, "https://b.test/100%", "Percent", 200)).unwrap();
        insert_visit(store.conn(), &visit(alice, 10, 1, 0)).unwrap();
        insert_visit(store.conn(), &visit(alice, 11, 2, 10)).unwrap();
        store
    }

    #[test]
    fn test_upsert_user_keeps_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = upsert_user(store.conn(), "alice", "one").unwrap();
        let second = upsert_user(store.conn(), "alice", "two").unwrap();
        assert_eq!(first, second);

        let user = store.get_user_by_name("alice").unwrap().unwrap();
        assert_eq!(user.content_digest, "two");
        assert_eq!(store.get_user(first).unwrap(), Some(user));
    }

    #[test]
    fn test_url_and_visit_crud() {
        let store = seeded();
        let got = store.get_url(LocalKey::new(1, 1)).unwrap().unwrap();
        assert_eq!(got.address, "https://a.test");
        assert!(store.get_url(LocalKey::new(2, 1)).unwrap().is_none());

        let v = store.get_visit(LocalKey::new(1, 11)).unwrap().unwrap();
        assert_eq!(v.from_visit_local_id, 10);
        assert_eq!(store.visits_from(LocalKey::new(1, 10)).unwrap(), vec![v]);
    }

    #[test]
    fn test_like_pattern_is_literal() {
        let store = seeded();
        let filter = UrlFilter::new().url_contains("100%");
        let urls = store.find_urls(None, &filter).unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].local_id, 2);

        // `_` is not a wildcard
        let filter = UrlFilter::new().url_contains("a_test");
        assert!(store.find_urls(None, &filter).unwrap().is_empty());
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }

    #[test]
    fn test_delete_user_rows() {
        let store = seeded();
        insert_visit_source(
            store.conn(),
            &VisitSource { user_id: 1, local_id: 10, source: VisitSourceKind::Synced },
        )
        .unwrap();
        assert_eq!(delete_user_rows(store.conn(), 1).unwrap(), 5);
        assert_eq!(store.count_urls(None).unwrap(), 0);
        // the user row itself survives
        assert_eq!(store.count_users().unwrap(), 1);
    }

    #[test]
    fn test_dangling_references() {
        let store = seeded();
        assert!(store.dangling_references(1).unwrap().is_empty());

        insert_visit(store.conn(), &visit(1, 12, 99, 0)).unwrap();
        insert_visit(store.conn(), &visit(1, 13, 1, 77)).unwrap();
        let dangling = store.dangling_references(1).unwrap();
        assert_eq!(
            dangling,
            vec![
                DanglingReference::Url { visit: LocalKey::new(1, 12), url_local_id: 99 },
                DanglingReference::FromVisit { visit: LocalKey::new(1, 13), from_visit_local_id: 77 },
            ]
        );
    }

    #[test]
    fn test_negative_transition_roundtrip() {
        let store = seeded();
        let mut v = visit(1, 20, 1, 0);
        v.transition = Transition::from_raw((0x8000_0000u32 as i32) as i64);
        insert_visit(store.conn(), &v).unwrap();
        assert_eq!(store.get_visit(v.key()).unwrap().unwrap().transition, v.transition);
    }

    #[test]
    fn test_stats() {
        let stats = seeded().stats().unwrap();
        assert_eq!(stats.users, 1);
        assert_eq!(stats.urls, 2);
        assert_eq!(stats.visits, 2);
        assert_eq!(stats.visit_sources, 0);
    }
}
