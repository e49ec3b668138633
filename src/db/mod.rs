//! SQLite-backed store for contacts, transactions, ingested communications and
//! the `communications` junction table.
//!
//! The database lives at `~/.txaudit/txaudit.db` unless the config overrides it.
//! Ingestion writes emails and messages; the auto-linker reads them and writes
//! junction rows. Nothing in this crate deletes a link.

use std::path::PathBuf;

use chrono::Utc;
use rusqlite::{params, Connection};

mod communications;
mod contacts;
pub mod types;
pub use types::*;

pub struct AuditDb {
    conn: Connection,
}

impl AuditDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Open (or create) the database at `~/.txaudit/txaudit.db` and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.txaudit/txaudit.db`.
    pub fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".txaudit").join("txaudit.db"))
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert or update an account owner.
    pub fn upsert_user(&self, user: &DbUser) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (id, email, display_name, created_at, updated_at)
             VALUES (?1, LOWER(?2), ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                display_name = COALESCE(excluded.display_name, users.display_name),
                updated_at = excluded.updated_at",
            params![user.id, user.email, user.display_name, now],
        )?;
        Ok(())
    }

    /// The account owner's own mailbox address, lower-cased.
    pub fn get_user_email(&self, user_id: &str) -> Result<Option<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT email FROM users WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![user_id], |row| row.get::<_, Option<String>>(0))?;
        match rows.next() {
            Some(row) => Ok(row?
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())),
            None => Ok(None),
        }
    }
}


// =============================================================================
// Tests
// =============================================================================
