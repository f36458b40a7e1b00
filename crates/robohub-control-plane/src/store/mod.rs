//! SQLite-backed persistence for tasks, templates, assignments and users.
//!
//! One [`Store`] owns one connection. The server keeps it behind a mutex,
//! so every operation here runs to completion before the next one starts.

mod catalog;
mod tasks;
mod users;

pub use catalog::{AssignmentPatch, NewAssignment, NewTemplate, TemplatePatch};
pub use tasks::NewTask;
pub use users::NewUser;

use crate::config::IN_MEMORY_DB;
use rusqlite::Connection;
use std::{fs, path::Path};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        if db_path.as_os_str() == IN_MEMORY_DB {
            return Self::open_in_memory();
        }
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS ui_templates (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL,
              description TEXT,
              layout TEXT NOT NULL,
              is_active INTEGER NOT NULL DEFAULT 1,
              created_at_ms INTEGER NOT NULL,
              updated_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS robot_template_assignments (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              serial_number TEXT NOT NULL,
              template_id INTEGER NOT NULL,
              name TEXT,
              is_active INTEGER NOT NULL DEFAULT 1,
              created_at_ms INTEGER NOT NULL,
              updated_at_ms INTEGER NOT NULL,
              FOREIGN KEY(template_id) REFERENCES ui_templates(id)
            );

            CREATE TABLE IF NOT EXISTS users (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              username TEXT NOT NULL UNIQUE,
              display_name TEXT,
              role TEXT NOT NULL,
              created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS robot_tasks (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              serial_number TEXT NOT NULL,
              task_type TEXT NOT NULL,
              status TEXT NOT NULL,
              priority INTEGER NOT NULL DEFAULT 0,
              template_id INTEGER,
              parameters TEXT NOT NULL DEFAULT '{}',
              created_at_ms INTEGER NOT NULL,
              started_at_ms INTEGER,
              completed_at_ms INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_robot_tasks_serial_status
              ON robot_tasks(serial_number, status);
            ",
        )?;
        Ok(Self { conn })
    }
}

/// Parses a JSON column, falling back to `{}` when the stored text is corrupt.
pub(crate) fn json_column(raw: &str, column: &str, id: i64) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|err| {
        warn!(column, id, error = %err, "stored json is malformed, using empty object");
        serde_json::json!({})
    })
}

pub(crate) fn opt_ms(value: Option<i64>) -> Option<u64> {
    value.map(|v| v as u64)
}
