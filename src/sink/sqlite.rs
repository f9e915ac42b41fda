//! SQLite relational sink
//!
//! Stores each media record as `(id, json)` with native upsert, optionally reads
//! back a merged view for the search index, and keeps the run ledger.

use crate::config::SqliteSinkConfig;
use crate::sink::schema::initialize_schema;
use crate::sink::traits::{SinkError, SinkResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// A row of the run ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub mode: String,
    pub config_hash: String,
    pub status: String,
    pub items_written: u64,
    pub items_failed: u64,
    pub detail: Option<String>,
}

/// SQLite-backed relational sink
pub struct SqliteSink {
    conn: Mutex<Connection>,
    table: String,
    merge_view: Option<String>,
}

impl SqliteSink {
    /// Opens (or creates) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `table` - Item table name, already validated as an identifier
    /// * `merge_view` - Optional view read back after each upsert
    pub fn open(path: &Path, table: &str, merge_view: Option<&str>) -> SinkResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Self::with_connection(conn, table, merge_view)
    }

    /// Creates an in-memory database
    pub fn open_in_memory(table: &str, merge_view: Option<&str>) -> SinkResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, table, merge_view)
    }

    pub fn from_config(config: &SqliteSinkConfig) -> SinkResult<Self> {
        Self::open(
            Path::new(&config.database_path),
            &config.table,
            config.merge_view.as_deref(),
        )
    }

    fn with_connection(conn: Connection, table: &str, merge_view: Option<&str>) -> SinkResult<Self> {
        initialize_schema(&conn, table)?;
        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            merge_view: merge_view.map(str::to_string),
        })
    }

    fn conn(&self) -> SinkResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SinkError::Poisoned)
    }

    pub fn has_merge_view(&self) -> bool {
        self.merge_view.is_some()
    }

    /// Inserts or replaces the document for `id`
    ///
    /// Rewriting an identical document leaves the row untouched, `updated_at` included.
    pub fn upsert(&self, id: i64, document: &Value) -> SinkResult<()> {
        let json = serde_json::to_string(document)?;
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT INTO {table} (id, json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET json = excluded.json, updated_at = excluded.updated_at
             WHERE {table}.json IS NOT excluded.json",
            table = self.table
        );

        self.conn()?.execute(&sql, params![id, json, now])?;
        Ok(())
    }

    /// Reads the stored document for `id`
    pub fn get(&self, id: i64) -> SinkResult<Option<Value>> {
        let sql = format!("SELECT json FROM {} WHERE id = ?1", self.table);
        self.read_json(&sql, id)
    }

    /// Reads the merged document for `id` from the configured view
    ///
    /// Returns `Ok(None)` when no view is configured or it has no row for `id`.
    pub fn read_merged(&self, id: i64) -> SinkResult<Option<Value>> {
        match &self.merge_view {
            Some(view) => {
                let sql = format!("SELECT json FROM {} WHERE id = ?1", view);
                self.read_json(&sql, id)
            }
            None => Ok(None),
        }
    }

    fn read_json(&self, sql: &str, id: i64) -> SinkResult<Option<Value>> {
        let text: Option<String> = self
            .conn()?
            .query_row(sql, params![id], |row| row.get(0))
            .optional()?;

        match text {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Returns the `updated_at` stamp for `id`, if stored
    pub fn updated_at(&self, id: i64) -> SinkResult<Option<String>> {
        let sql = format!("SELECT updated_at FROM {} WHERE id = ?1", self.table);
        Ok(self
            .conn()?
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()?)
    }

    /// Counts stored documents
    pub fn count(&self) -> SinkResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = self.conn()?.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Runs raw SQL against the database, e.g. to create the merge view
    pub fn execute_batch(&self, sql: &str) -> SinkResult<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    // ===== Run Ledger =====

    /// Records the start of a run and returns its id
    pub fn begin_run(&self, mode: &str, config_hash: &str) -> SinkResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO runs (started_at, mode, config_hash, status) VALUES (?1, ?2, ?3, 'running')",
            params![now, mode, config_hash],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Closes a run with its final status and counters
    pub fn finish_run(
        &self,
        run_id: i64,
        status: &str,
        items_written: u64,
        items_failed: u64,
        detail: Option<&str>,
    ) -> SinkResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, items_written = ?3, items_failed = ?4, detail = ?5
             WHERE id = ?6",
            params![
                status,
                now,
                items_written as i64,
                items_failed as i64,
                detail,
                run_id
            ],
        )?;
        Ok(())
    }

    /// Gets a run by id
    pub fn get_run(&self, run_id: i64) -> SinkResult<Option<RunRecord>> {
        let run = self
            .conn()?
            .query_row(
                "SELECT id, started_at, finished_at, mode, config_hash, status, items_written, items_failed, detail
                 FROM runs WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        mode: row.get(3)?,
                        config_hash: row.get(4)?,
                        status: row.get(5)?,
                        items_written: row.get::<_, i64>(6)? as u64,
                        items_failed: row.get::<_, i64>(7)? as u64,
                        detail: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }

    /// Gets the most recent run
    pub fn latest_run_id(&self) -> SinkResult<Option<i64>> {
        Ok(self
            .conn()?
            .query_row("SELECT id FROM runs ORDER BY id DESC LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?)
    }
}
