mod metrics;
mod queries;
pub mod types;

use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::error::{HarnessError, HarnessResult};

pub const DB_FILE: &str = "eval.db";

/// Query and metrics repository over a single SQLite connection.
#[derive(Clone)]
pub struct EvalStore {
    db: Arc<Mutex<Connection>>,
}

impl EvalStore {
    pub async fn open(data_dir: &Path) -> HarnessResult<Self> {
        if !data_dir.exists() {
            fs::create_dir_all(data_dir).await.map_err(|e| {
                HarnessError::Store(format!("cannot create {}: {}", data_dir.display(), e))
            })?;
        }
        let conn = Connection::open(data_dir.join(DB_FILE))?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> HarnessResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> HarnessResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub async fn execute_raw(&self, sql: &str) -> HarnessResult<()> {
        self.db.lock().await.execute_batch(sql)?;
        Ok(())
    }
}

fn init_schema(db: &Connection) -> rusqlite::Result<()> {
    db.execute_batch("PRAGMA foreign_keys = ON;")?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS queries (
            id TEXT PRIMARY KEY,
            prompt TEXT NOT NULL,
            expected_tools TEXT NOT NULL DEFAULT '[]',
            category TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS ai_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id TEXT NOT NULL UNIQUE,
            model_id TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            prompt_tokens INTEGER NOT NULL DEFAULT 0,
            completion_tokens INTEGER NOT NULL DEFAULT 0,
            total_tokens INTEGER NOT NULL DEFAULT 0,
            total_steps INTEGER NOT NULL DEFAULT 0,
            total_tool_calls INTEGER NOT NULL DEFAULT 0,
            error_message TEXT
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS tool_calls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL REFERENCES ai_requests(external_id),
            tool_name TEXT NOT NULL,
            tool_call_id TEXT NOT NULL,
            args TEXT,
            result TEXT,
            error_message TEXT
        )",
        [],
    )?;

    // Columns that older databases were created without.
    ensure_column(db, "ai_requests", "query_id", "TEXT")?;
    ensure_column(db, "ai_requests", "tools_used", "TEXT")?;
    ensure_column(db, "ai_requests", "missing_tools", "TEXT")?;
    ensure_column(db, "ai_requests", "unexpected_tools", "TEXT")?;

    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_ai_requests_query_id ON ai_requests(query_id)",
        [],
    )?;
    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_tool_calls_request_id ON tool_calls(request_id)",
        [],
    )?;
    Ok(())
}

fn ensure_column(db: &Connection, table: &str, column: &str, decl: &str) -> rusqlite::Result<()> {
    let present: bool = db
        .prepare(&format!(
            "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = ?1",
            table
        ))?
        .query_row([column], |row| row.get::<_, i64>(0))
        .map(|c| c > 0)?;

    if !present {
        db.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {};", table, column, decl))?;
        info!("Added {} column to {}", column, table);
    }
    Ok(())
}

/// Create an in-memory EvalStore for testing.
#[cfg(test)]
pub fn test_eval_store() -> EvalStore {
    EvalStore::open_in_memory().expect("open in-memory store")
}
