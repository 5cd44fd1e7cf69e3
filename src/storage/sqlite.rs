//! Local SQLite backend

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use crate::Result;
use super::backend::{Backend, SqlRow, SqlValue, StoreLocation};

/// SQLite file or in-memory database
pub struct SqliteBackend {
    conn: Connection,
    location: StoreLocation,
}

impl SqliteBackend {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        tracing::debug!("Opened SQLite database at {}", resolved.display());

        Ok(Self {
            conn,
            location: StoreLocation::new("sqlite", format!("file:{}", resolved.display())),
        })
    }

    /// Open an in-memory database (for testing)
    ///
    /// Every in-memory database is a distinct store, so each gets its own
    /// location token.
    pub fn open_in_memory() -> Result<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(1);

        let conn = Connection::open_in_memory()?;
        let n = NEXT.fetch_add(1, Ordering::Relaxed);

        Ok(Self {
            conn,
            location: StoreLocation::new("sqlite", format!("memory:{}", n)),
        })
    }
}

impl Backend for SqliteBackend {
    fn location(&self) -> &StoreLocation {
        &self.location
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        let changed = self.conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(changed)
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let width = stmt.column_count();

        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            (0..width)
                .map(|i| row.get::<_, Value>(i).map(SqlValue::from))
                .collect::<rusqlite::Result<SqlRow>>()
        })?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    fn execute_script(&mut self, script: &str) -> Result<()> {
        self.conn.execute_batch(script)?;
        Ok(())
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Integer(i) => SqlValue::Integer(i),
            Value::Real(f) => SqlValue::Real(f),
            Value::Text(s) => SqlValue::Text(s),
            Value::Blob(b) => SqlValue::Blob(b),
        }
    }
}
