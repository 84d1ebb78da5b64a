//! Test fixtures: consolidated-store rows and Chromium-shaped source files

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use crate::model::{Url, Visit, WebkitTime};
use crate::storage::sqlite::{insert_url, insert_visit, upsert_user};
use crate::storage::SqliteStore;
use crate::transition::Transition;

pub fn url(user_id: i64, local_id: i64, address: &str, title: &str, last_visit_time: i64) -> Url {
    Url {
        user_id,
        local_id,
        address: address.to_string(),
        title: title.to_string(),
        visit_count: 1,
        typed_count: 0,
        last_visit_time: WebkitTime(last_visit_time),
        hidden: false,
        favicon_id: 0,
    }
}

/// A link visit happening at `1000 + local_id`
pub fn visit(user_id: i64, local_id: i64, url_local_id: i64, from_visit_local_id: i64) -> Visit {
    Visit {
        user_id,
        local_id,
        url_local_id,
        visit_time: WebkitTime(1000 + local_id),
        from_visit_local_id,
        transition: Transition::from_raw(0),
        segment_id: 0,
        visit_duration: 0,
    }
}

/// Insert a user and its rows directly, rewriting `user_id` on every row
pub fn seed_user(store: &SqliteStore, name: &str, urls: &[Url], visits: &[Visit]) -> i64 {
    let user_id = upsert_user(store.conn(), name, "seeded").unwrap();
    for u in urls {
        insert_url(store.conn(), &Url { user_id, ..u.clone() }).unwrap();
    }
    for v in visits {
        insert_visit(store.conn(), &Visit { user_id, ..v.clone() }).unwrap();
    }
    user_id
}

/// Chromium `History` file under construction
pub struct SourceFile {
    pub path: PathBuf,
    conn: Connection,
}

impl SourceFile {
    /// Create a source with the current Chromium layout (no `urls.favicon_id`)
    pub fn create(dir: &Path, name: &str) -> Self {
        Self::with_schema(
            dir,
            name,
            r#"
            CREATE TABLE meta(key LONGVARCHAR NOT NULL UNIQUE PRIMARY KEY, value LONGVARCHAR);
            CREATE TABLE urls(id INTEGER PRIMARY KEY AUTOINCREMENT, url LONGVARCHAR, title LONGVARCHAR,
                visit_count INTEGER DEFAULT 0 NOT NULL, typed_count INTEGER DEFAULT 0 NOT NULL,
                last_visit_time INTEGER NOT NULL, hidden INTEGER DEFAULT 0 NOT NULL);
            CREATE TABLE visits(id INTEGER PRIMARY KEY, url INTEGER NOT NULL, visit_time INTEGER NOT NULL,
                from_visit INTEGER, transition INTEGER DEFAULT 0 NOT NULL, segment_id INTEGER,
                visit_duration INTEGER DEFAULT 0 NOT NULL, incremented_omnibox_typed_score BOOLEAN DEFAULT FALSE NOT NULL);
            CREATE TABLE visit_source(id INTEGER PRIMARY KEY, source INTEGER NOT NULL);
            "#,
        )
    }

    /// Create a source with the legacy layout that still carries `favicon_id`
    pub fn create_legacy(dir: &Path, name: &str) -> Self {
        Self::with_schema(
            dir,
            name,
            r#"
            CREATE TABLE urls(id INTEGER PRIMARY KEY, url LONGVARCHAR, title LONGVARCHAR,
                visit_count INTEGER DEFAULT 0 NOT NULL, typed_count INTEGER DEFAULT 0 NOT NULL,
                last_visit_time INTEGER NOT NULL, hidden INTEGER DEFAULT 0 NOT NULL,
                favicon_id INTEGER DEFAULT 0 NOT NULL);
            CREATE TABLE visits(id INTEGER PRIMARY KEY, url INTEGER NOT NULL, visit_time INTEGER NOT NULL,
                from_visit INTEGER, transition INTEGER DEFAULT 0 NOT NULL, segment_id INTEGER,
                visit_duration INTEGER DEFAULT 0 NOT NULL);
            CREATE TABLE visit_source(id INTEGER PRIMARY KEY, source INTEGER NOT NULL);
            "#,
        )
    }

    pub fn with_schema(dir: &Path, name: &str, schema: &str) -> Self {
        let path = dir.join(name);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(schema).unwrap();
        Self { path, conn }
    }

    pub fn add_url(&self, id: i64, url: &str, title: Option<&str>, last_visit_time: i64) -> &Self {
        self.conn
            .execute(
                "INSERT INTO urls (id, url, title, visit_count, typed_count, last_visit_time, hidden)
                 VALUES (?1, ?2, ?3, 1, 0, ?4, 0)",
                params![id, url, title, last_visit_time],
            )
            .unwrap();
        self
    }

    pub fn add_visit(&self, id: i64, url: i64, from_visit: i64, transition: i64) -> &Self {
        self.conn
            .execute(
                "INSERT INTO visits (id, url, visit_time, from_visit, transition, segment_id, visit_duration)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, 0)",
                params![id, url, 1000 + id, from_visit, transition],
            )
            .unwrap();
        self
    }

    pub fn add_visit_source(&self, id: i64, source: i64) -> &Self {
        self.conn
            .execute(
                "INSERT INTO visit_source (id, source) VALUES (?1, ?2)",
                params![id, source],
            )
            .unwrap();
        self
    }

    pub fn delete_url(&self, id: i64) -> &Self {
        self.conn.execute("DELETE FROM visits WHERE url = ?1", [id]).unwrap();
        self.conn.execute("DELETE FROM urls WHERE id = ?1", [id]).unwrap();
        self
    }
}
