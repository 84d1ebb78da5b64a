//! Read-only access to a user's source history database

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::model::{Url, Visit, VisitSource, WebkitTime};
use crate::storage::schema::SOURCE_TABLES;
use crate::transition::{Transition, VisitSourceKind};
use crate::{Error, Result};

/// Columns that older or newer history layouts may lack; read as 0 when absent
const OPTIONAL_COLUMNS: &[(&str, &str)] = &[
    ("urls", "favicon_id"),
    ("visits", "segment_id"),
    ("visits", "visit_duration"),
];

/// An opened source database
pub struct SourceDb {
    conn: Connection,
    username: String,
    missing_optional: HashSet<(&'static str, &'static str)>,
}

impl SourceDb {
    /// Open `path` read-only and check that it looks like a history database
    pub fn open(username: &str, path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mut source = Self {
            conn,
            username: username.to_string(),
            missing_optional: HashSet::new(),
        };
        source.verify_schema()?;
        Ok(source)
    }

    fn verify_schema(&mut self) -> Result<()> {
        for table in SOURCE_TABLES {
            let exists: bool = self.conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                [table],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(self.violation(format!("not a history database: missing '{}' table", table)));
            }
        }

        for &(table, column) in OPTIONAL_COLUMNS {
            if !self.has_column(table, column)? {
                tracing::debug!("{}: source {} has no {} column", self.username, table, column);
                self.missing_optional.insert((table, column));
            }
        }
        Ok(())
    }

    fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names.iter().any(|name| name == column))
    }

    fn column(&self, table: &'static str, column: &'static str) -> String {
        if self.missing_optional.contains(&(table, column)) {
            "0".to_string()
        } else {
            column.to_string()
        }
    }

    pub(crate) fn violation(&self, detail: impl Into<String>) -> Error {
        Error::IntegrityViolation {
            user: self.username.clone(),
            detail: detail.into(),
        }
    }

    /// Stream every url row, tagged with `user_id`
    pub fn for_each_url(&self, user_id: i64, mut f: impl FnMut(Url) -> Result<()>) -> Result<usize> {
        let sql = format!(
            "SELECT id, url, title, visit_count, typed_count, last_visit_time, hidden, {} FROM urls",
            self.column("urls", "favicon_id")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut count = 0;

        while let Some(row) = rows.next()? {
            let url = Url {
                user_id,
                local_id: row.get(0)?,
                address: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                visit_count: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                typed_count: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                last_visit_time: WebkitTime(row.get::<_, Option<i64>>(5)?.unwrap_or(0)),
                hidden: row.get::<_, Option<i64>>(6)?.unwrap_or(0) != 0,
                favicon_id: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
            };
            f(url)?;
            count += 1;
        }
        Ok(count)
    }

    /// Stream every visit row, tagged with `user_id`
    pub fn for_each_visit(&self, user_id: i64, mut f: impl FnMut(Visit) -> Result<()>) -> Result<usize> {
        let sql = format!(
            "SELECT id, url, visit_time, from_visit, transition, {}, {} FROM visits",
            self.column("visits", "segment_id"),
            self.column("visits", "visit_duration")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut count = 0;

        while let Some(row) = rows.next()? {
            let visit = Visit {
                user_id,
                local_id: row.get(0)?,
                url_local_id: row.get(1)?,
                visit_time: WebkitTime(row.get::<_, Option<i64>>(2)?.unwrap_or(0)),
                from_visit_local_id: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                transition: Transition::from_raw(row.get::<_, Option<i64>>(4)?.unwrap_or(0)),
                segment_id: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
                visit_duration: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
            };
            f(visit)?;
            count += 1;
        }
        Ok(count)
    }

    /// Stream every visit_source row, tagged with `user_id`
    pub fn for_each_visit_source(
        &self,
        user_id: i64,
        mut f: impl FnMut(VisitSource) -> Result<()>,
    ) -> Result<usize> {
        let mut stmt = self.conn.prepare("SELECT id, source FROM visit_source")?;
        let mut rows = stmt.query([])?;
        let mut count = 0;

        while let Some(row) = rows.next()? {
            let source = VisitSource {
                user_id,
                local_id: row.get(0)?,
                source: VisitSourceKind::from_code(row.get(1)?),
            };
            f(source)?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::SourceFile;

    #[test]
    fn test_reads_current_layout_with_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let file = SourceFile::create(dir.path(), "alice");
        file.add_url(1, "https://a.test", None, 13109575048813599);
        file.add_visit(10, 1, 0, 0x3000_0001);

        let source = SourceDb::open("alice", &file.path).unwrap();
        let mut urls = Vec::new();
        assert_eq!(source.for_each_url(7, |u| Ok(urls.push(u))).unwrap(), 1);
        assert_eq!(urls[0].user_id, 7);
        assert_eq!(urls[0].title, "");
        assert_eq!(urls[0].favicon_id, 0);
        assert_eq!(urls[0].last_visit_time, WebkitTime(13109575048813599));

        let mut visits = Vec::new();
        source.for_each_visit(7, |v| Ok(visits.push(v))).unwrap();
        assert_eq!(visits[0].segment_id, 0);
        assert_eq!(visits[0].transition.code(), 0x3000_0001);
    }

    #[test]
    fn test_reads_legacy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let file = SourceFile::create_legacy(dir.path(), "bob");
        file.add_url(3, "https://b.test", Some("B"), 5);

        let source = SourceDb::open("bob", &file.path).unwrap();
        let mut urls = Vec::new();
        source.for_each_url(1, |u| Ok(urls.push(u))).unwrap();
        assert_eq!(urls[0].local_id, 3);
        assert_eq!(urls[0].title, "B");
    }

    #[test]
    fn test_rejects_foreign_database() {
        let dir = tempfile::tempdir().unwrap();
        let file = SourceFile::with_schema(dir.path(), "carol", "CREATE TABLE notes(id INTEGER);");

        let err = SourceDb::open("carol", &file.path).err().unwrap();
        assert!(matches!(err, Error::IntegrityViolation { ref user, .. } if user == "carol"));
    }
}
