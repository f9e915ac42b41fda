//! Database schema definitions
//!
//! The item table name is configurable, so its DDL is rendered at runtime.
//! Names reaching this module have already passed identifier validation.

/// SQL schema for the run ledger
pub const RUNS_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    mode TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    items_written INTEGER NOT NULL DEFAULT 0,
    items_failed INTEGER NOT NULL DEFAULT 0,
    detail TEXT
);
"#;

/// Renders the DDL for the item table
pub fn item_table_sql(table: &str) -> String {
    format!(
        r#"
-- One JSON document per media id
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY,
    json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#
    )
}

/// Initializes the database schema
///
/// Safe to call on every start; all statements are `IF NOT EXISTS`.
pub fn initialize_schema(conn: &rusqlite::Connection, table: &str) -> Result<(), rusqlite::Error> {
    conn.execute_batch(&item_table_sql(table))?;
    conn.execute_batch(RUNS_SQL)?;
    Ok(())
}
