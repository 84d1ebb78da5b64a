//! Consolidated store schema
//!
//! Data tables mirror the source history tables with an extra `user_id`
//! column; each is keyed by `(user_id, id)` where `id` is the source row id.

/// SQL to create the users table
pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    hash TEXT NOT NULL
)
"#;

/// SQL to create the urls table
pub const CREATE_URLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS urls (
    user_id INTEGER NOT NULL REFERENCES users(id),
    id INTEGER NOT NULL,
    url TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    visit_count INTEGER NOT NULL DEFAULT 0,
    typed_count INTEGER NOT NULL DEFAULT 0,
    last_visit_time INTEGER NOT NULL DEFAULT 0,
    hidden INTEGER NOT NULL DEFAULT 0,
    favicon_id INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, id)
)
"#;

/// SQL to create the visits table
pub const CREATE_VISITS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS visits (
    user_id INTEGER NOT NULL REFERENCES users(id),
    id INTEGER NOT NULL,
    url INTEGER NOT NULL,
    visit_time INTEGER NOT NULL,
    from_visit INTEGER NOT NULL DEFAULT 0,
    transition INTEGER NOT NULL DEFAULT 0,
    segment_id INTEGER NOT NULL DEFAULT 0,
    visit_duration INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, id)
)
"#;

/// SQL to create the visit_source table
pub const CREATE_VISIT_SOURCE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS visit_source (
    user_id INTEGER NOT NULL REFERENCES users(id),
    id INTEGER NOT NULL,
    source INTEGER NOT NULL,
    PRIMARY KEY (user_id, id)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_urls_last_visit ON urls(last_visit_time)",
    "CREATE INDEX IF NOT EXISTS idx_urls_user_last_visit ON urls(user_id, last_visit_time)",
    "CREATE INDEX IF NOT EXISTS idx_visits_url ON visits(user_id, url)",
    "CREATE INDEX IF NOT EXISTS idx_visits_from ON visits(user_id, from_visit)",
];

/// Tables every source history database must contain
pub const SOURCE_TABLES: &[&str] = &["urls", "visits", "visit_source"];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_USERS_TABLE,
        CREATE_URLS_TABLE,
        CREATE_VISITS_TABLE,
        CREATE_VISIT_SOURCE_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
