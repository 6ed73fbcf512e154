//! SQLite Executor
//!
//! Runs arbitrary statements against the embedded database and marshals the
//! rows into [`Record`]s without knowing the schema.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{params_from_iter, Batch, Connection};

use super::types::{json_to_sql, ColumnValue, ExecutionResult, Record, Statement};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

const MEMORY_PATH: &str = ":memory:";

/// Embedded database with a small round-robin connection pool
pub struct Database {
    /// Database file path
    path: PathBuf,
    /// Pooled connections, each usable by one caller at a time
    conn_pool: Vec<Mutex<Connection>>,
    /// Next pool slot to hand out
    conn_idx: AtomicUsize,
}

impl Database {
    /// Open (or create) the database described by `config`
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if config.path.as_os_str() == MEMORY_PATH {
            return Self::open_in_memory();
        }

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let mut conn_pool = Vec::with_capacity(config.pool_size);
        for _ in 0..config.pool_size.max(1) {
            let conn = Connection::open(&config.path)?;
            conn.busy_timeout(busy_timeout)?;
            // Readers keep working while a writer holds the lock
            conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
            conn_pool.push(Mutex::new(conn));
        }

        tracing::info!(
            "Opened database {:?} with {} connections",
            config.path,
            conn_pool.len()
        );

        Ok(Self {
            path: config.path.clone(),
            conn_pool,
            conn_idx: AtomicUsize::new(0),
        })
    }

    /// Open a private in-memory database. Every in-memory connection is its
    /// own database, so the pool holds exactly one.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            path: PathBuf::from(MEMORY_PATH),
            conn_pool: vec![Mutex::new(conn)],
            conn_idx: AtomicUsize::new(0),
        })
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pooled connections
    pub fn pool_size(&self) -> usize {
        self.conn_pool.len()
    }

    /// Take a connection, preferring an idle one
    fn connection(&self) -> MutexGuard<'_, Connection> {
        let start = self.conn_idx.fetch_add(1, Ordering::Relaxed);
        let len = self.conn_pool.len();
        for offset in 0..len {
            if let Ok(conn) = self.conn_pool[(start + offset) % len].try_lock() {
                return conn;
            }
        }
        // A panic mid-statement leaves the connection itself usable
        self.conn_pool[start % len]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on a pooled connection
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.connection();
        f(&conn).map_err(Error::from)
    }

    /// Execute a statement on the calling thread
    pub fn execute_blocking(&self, statement: &Statement) -> ExecutionResult {
        if statement.text.trim().is_empty() {
            return ExecutionResult::failed("empty statement");
        }

        match self.with_connection(|conn| query_records(conn, statement)) {
            Ok(rows) => ExecutionResult::ok(rows),
            Err(e) => {
                tracing::debug!("Statement failed: {}", e);
                ExecutionResult::failed(e.to_string())
            }
        }
    }

    /// Execute a statement on the blocking thread pool
    pub async fn execute(self: &Arc<Self>, statement: Statement) -> ExecutionResult {
        let db = Arc::clone(self);
        match tokio::task::spawn_blocking(move || db.execute_blocking(&statement)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Executor task failed: {}", e);
                ExecutionResult::failed(Error::Internal(e.to_string()).to_string())
            }
        }
    }

    /// Run a closure on the blocking thread pool with a pooled connection
    pub async fn run<T, F>(self: &Arc<Self>, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || db.with_connection(f))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?
    }
}

/// Run every command in `statement` in order and marshal the rows of the
/// last one. Parameters are consumed left to right, each command taking as
/// many as it declares.
fn query_records(conn: &Connection, statement: &Statement) -> rusqlite::Result<Vec<Record>> {
    let mut batch = Batch::new(conn, &statement.text);
    let mut records = Vec::new();
    let mut consumed = 0;

    while let Some(mut stmt) = batch.next()? {
        let wanted = stmt.parameter_count();
        let available = statement.params.len() - consumed;
        if wanted > available {
            return Err(rusqlite::Error::InvalidParameterCount(available, wanted));
        }
        let params = &statement.params[consumed..consumed + wanted];
        consumed += wanted;
        records = step_records(&mut stmt, params)?;
    }

    if consumed != statement.params.len() {
        return Err(rusqlite::Error::InvalidParameterCount(
            statement.params.len(),
            consumed,
        ));
    }

    Ok(records)
}

/// Bind, step and marshal every row of one prepared command
fn step_records(
    stmt: &mut rusqlite::Statement<'_>,
    params: &[serde_json::Value],
) -> rusqlite::Result<Vec<Record>> {
    let columns: Arc<[String]> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut rows = stmt.query(params_from_iter(params.iter().map(json_to_sql)))?;

    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(ColumnValue::from(row.get_ref(i)?));
        }
        records.push(Record::new(Arc::clone(&columns), values));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn memory_db() -> Arc<Database> {
        Arc::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_select_literal() {
        let db = memory_db();
        let result = db.execute(Statement::new("SELECT 1 AS x")).await;
        assert!(result.is_ok());
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("x"), Some(&ColumnValue::Integer(1)));
        assert_eq!(serde_json::to_string(&result.rows).unwrap(), r#"[{"x":1}]"#);
    }

    #[tokio::test]
    async fn test_all_value_kinds() {
        let db = memory_db();
        let result = db
            .execute(Statement::new(
                "SELECT NULL AS n, 7 AS i, 2.5 AS f, 'txt' AS s, x'0102' AS b",
            ))
            .await;
        assert!(result.is_ok());
        let row = &result.rows[0];
        assert_eq!(row.columns(), &["n", "i", "f", "s", "b"]);
        assert_eq!(
            row.values(),
            &[
                ColumnValue::Null,
                ColumnValue::Integer(7),
                ColumnValue::Float(2.5),
                ColumnValue::Text("txt".into()),
                ColumnValue::Bytes(vec![1, 2]),
            ]
        );
    }

    #[tokio::test]
    async fn test_mixed_types_in_one_column() {
        // SQLite columns are dynamically typed; each cell converts on its own
        let db = memory_db();
        db.execute(Statement::new("CREATE TABLE t (v)")).await;
        db.execute(Statement::with_params(
            "INSERT INTO t VALUES (?1), (?2), (?3), (?4)",
            vec![json!(1), json!("two"), json!(3.0), json!(null)],
        ))
        .await;

        let result = db.execute(Statement::new("SELECT v FROM t ORDER BY rowid")).await;
        let values: Vec<&ColumnValue> = result.rows.iter().map(|r| &r.values()[0]).collect();
        assert_eq!(
            values,
            vec![
                &ColumnValue::Integer(1),
                &ColumnValue::Text("two".into()),
                &ColumnValue::Float(3.0),
                &ColumnValue::Null,
            ]
        );
    }

    #[tokio::test]
    async fn test_key_order_identical_across_rows() {
        let db = memory_db();
        db.execute(Statement::new("CREATE TABLE people (name TEXT, age INTEGER, id INTEGER)")).await;
        for (name, age) in [("ann", 31), ("bob", 42), ("cy", 7)] {
            let r = db
                .execute(Statement::with_params(
                    "INSERT INTO people (name, age, id) VALUES (?, ?, ?)",
                    vec![json!(name), json!(age), json!(age * 10)],
                ))
                .await;
            assert!(r.is_ok(), "{:?}", r.error);
        }

        let result = db.execute(Statement::new("SELECT id, name, age FROM people")).await;
        assert_eq!(result.rows.len(), 3);
        for row in &result.rows {
            assert_eq!(row.len(), 3);
            assert_eq!(row.columns(), &["id", "name", "age"]);
        }
    }

    #[tokio::test]
    async fn test_zero_rows_is_empty_not_error() {
        let db = memory_db();
        db.execute(Statement::new("CREATE TABLE t (a INTEGER)")).await;
        let result = db.execute(Statement::new("SELECT a FROM t")).await;
        assert!(result.is_ok());
        assert!(result.rows.is_empty());

        let result = db.execute(Statement::new("INSERT INTO t VALUES (1)")).await;
        assert!(result.is_ok());
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_captured() {
        let db = memory_db();

        let result = db.execute(Statement::new("SELEC nonsense")).await;
        assert!(result.error.as_deref().unwrap().contains("syntax error"));
        assert!(result.rows.is_empty());

        let result = db.execute(Statement::new("SELECT * FROM missing")).await;
        assert!(result.error.as_deref().unwrap().contains("no such table"));

        db.execute(Statement::new("CREATE TABLE u (id INTEGER PRIMARY KEY)")).await;
        db.execute(Statement::new("INSERT INTO u VALUES (1)")).await;
        let result = db.execute(Statement::new("INSERT INTO u VALUES (1)")).await;
        assert!(result.error.as_deref().unwrap().contains("UNIQUE"));

        let result = db.execute(Statement::new("   ")).await;
        assert_eq!(result.error.as_deref(), Some("empty statement"));

        // A failing later command fails the whole text
        let result = db.execute(Statement::new("SELECT 1; SELECT * FROM missing")).await;
        assert!(result.error.as_deref().unwrap().contains("no such table"));
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn test_every_command_in_text_runs() {
        let db = memory_db();
        let result = db
            .execute(Statement::new(
                "CREATE TABLE t (a INTEGER); INSERT INTO t VALUES (1); INSERT INTO t VALUES (2);",
            ))
            .await;
        assert!(result.is_ok(), "{:?}", result.error);
        assert!(result.rows.is_empty());

        let result = db.execute(Statement::new("SELECT COUNT(*) AS c FROM t")).await;
        assert_eq!(result.rows[0].get("c"), Some(&ColumnValue::Integer(2)));

        // Rows come from the last command
        let result = db.execute(Statement::new("SELECT 1 AS x; SELECT a FROM t ORDER BY a")).await;
        assert_eq!(serde_json::to_string(&result.rows).unwrap(), r#"[{"a":1},{"a":2}]"#);
    }

    #[tokio::test]
    async fn test_params_are_split_across_commands() {
        let db = memory_db();
        db.execute(Statement::new("CREATE TABLE kv (k TEXT, v INTEGER)")).await;

        let result = db
            .execute(Statement::with_params(
                "INSERT INTO kv VALUES (?, ?); INSERT INTO kv VALUES (?, 0)",
                vec![json!("a"), json!(1), json!("b")],
            ))
            .await;
        assert!(result.is_ok(), "{:?}", result.error);

        let result = db.execute(Statement::new("SELECT k, v FROM kv ORDER BY k")).await;
        assert_eq!(
            serde_json::to_string(&result.rows).unwrap(),
            r#"[{"k":"a","v":1},{"k":"b","v":0}]"#
        );

        // Leftover parameters are an error
        let result = db
            .execute(Statement::with_params("SELECT 1; SELECT ?", vec![json!(1), json!(2)]))
            .await;
        assert!(!result.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_parameter_count_is_captured() {
        let db = memory_db();
        let result = db
            .execute(Statement::with_params("SELECT ?1", vec![json!(1), json!(2)]))
            .await;
        assert!(!result.is_ok());
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn test_file_pool_shares_data() {
        let dir = tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("data.db"),
            pool_size: 3,
            busy_timeout_ms: 1000,
        };
        let db = Arc::new(Database::open(&config).unwrap());
        assert_eq!(db.pool_size(), 3);

        db.execute(Statement::new("CREATE TABLE t (a INTEGER)")).await;

        let mut handles = Vec::new();
        for i in 0..12 {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                db.execute(Statement::with_params("INSERT INTO t VALUES (?1)", vec![json!(i)]))
                    .await
            }));
        }
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.is_ok(), "{:?}", result.error);
        }

        // Every connection observes every insert
        for _ in 0..db.pool_size() {
            let result = db.execute(Statement::new("SELECT COUNT(*) AS c FROM t")).await;
            assert_eq!(result.rows[0].get("c"), Some(&ColumnValue::Integer(12)));
        }
    }
}
