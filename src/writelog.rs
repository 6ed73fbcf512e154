//! Write Log
//!
//! Durable record of mutating statements, stored in the `write_log` table of
//! the served database. Independent of replication.
//!
//! The server only ever appends, but the table is an ordinary table: any
//! `/query` client can read it and can also rewrite or delete its rows. A
//! statement that does so is itself logged afterwards.

use std::sync::Arc;

use rusqlite::params;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::executor::Database;

/// One logged statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub statement: String,
    pub created_at: String,
}

/// Append-only statement log backed by SQLite
pub struct WriteLog {
    db: Arc<Database>,
}

impl WriteLog {
    /// Open the log, creating its table if needed
    pub async fn open(db: Arc<Database>) -> Result<Self> {
        db.run(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS write_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    statement TEXT NOT NULL,
                    created_at TEXT DEFAULT CURRENT_TIMESTAMP
                );
                "#,
            )
        })
        .await?;

        Ok(Self { db })
    }

    /// Append a statement, returning its id
    pub async fn append(&self, statement: &str) -> Result<i64> {
        let statement = statement.to_string();
        self.db
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO write_log (statement) VALUES (?1)",
                    params![statement],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(|e| Error::WriteLog(e.to_string()))
    }

    /// All entries in id order
    pub async fn entries(&self) -> Result<Vec<LogEntry>> {
        self.db
            .run(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, statement, COALESCE(created_at, '') FROM write_log ORDER BY id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(LogEntry {
                        id: row.get(0)?,
                        statement: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })?;

                let mut entries = Vec::new();
                for entry in rows {
                    entries.push(entry?);
                }
                Ok(entries)
            })
            .await
    }

    /// Number of logged statements
    pub async fn len(&self) -> Result<u64> {
        let count: i64 = self
            .db
            .run(|conn| conn.query_row("SELECT COUNT(*) FROM write_log", [], |row| row.get(0)))
            .await?;
        Ok(count as u64)
    }
}
