//! Backend abstraction
//!
//! The graph store and the co-located vector index only speak to the database
//! through [`Backend`]: parameterized execute/query plus script execution.
//! Local SQLite and networked libSQL implement it independently and are
//! selected by configuration.
//!
//! A backend handle is never shared unguarded. [`SharedBackend`] owns it
//! behind a mutex, and [`SharedBackend::unit_of_work`] runs a closure inside
//! `BEGIN`/`COMMIT` while holding the lock.

use crate::node::NodeId;
use crate::Result;
use serde_json::Value;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// A single SQL parameter or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// One result row, cells in column order
pub type SqlRow = Vec<SqlValue>;

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Real(f) => Some(*f as i64),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Bind a JSON value the way SQLite's JSON functions report it:
    /// booleans as 0/1, containers as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(value)
    }
}

impl From<&NodeId> for SqlValue {
    fn from(id: &NodeId) -> Self {
        SqlValue::Text(id.key())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Stable identity token of a physical store.
///
/// Two components are co-located exactly when their tokens are equal, e.g.
/// `sqlite:file:/data/graph.db` or `libsql:https://db.example.io`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreLocation(String);

impl StoreLocation {
    pub fn new(scheme: &str, place: impl fmt::Display) -> Self {
        Self(format!("{}:{}", scheme, place))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A relational backend able to run parameterized SQL.
pub trait Backend: Send {
    /// Identity token of the underlying database
    fn location(&self) -> &StoreLocation;

    /// Run a statement, returning the number of changed rows
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize>;

    /// Run a query, returning every row
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>>;

    /// Run a multi-statement script (schema initialization)
    fn execute_script(&mut self, script: &str) -> Result<()>;

    /// First row of a query, if any
    fn query_one(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlRow>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}

/// Helper to acquire the backend lock with poison recovery.
fn acquire_lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Backend mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// A backend handle shared between the graph store and a co-located index.
pub struct SharedBackend {
    location: StoreLocation,
    inner: Mutex<Box<dyn Backend>>,
}

impl SharedBackend {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            location: backend.location().clone(),
            inner: Mutex::new(Box::new(backend)),
        }
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Run `f` with exclusive access to the backend (autocommit mode)
    pub fn with<T>(&self, f: impl FnOnce(&mut dyn Backend) -> Result<T>) -> Result<T> {
        let mut guard = acquire_lock(&self.inner);
        f(&mut **guard)
    }

    /// Run `f` as one atomic unit of work: committed on `Ok`, rolled back on `Err`
    pub fn unit_of_work<T>(&self, f: impl FnOnce(&mut dyn Backend) -> Result<T>) -> Result<T> {
        let mut guard = acquire_lock(&self.inner);
        let backend: &mut dyn Backend = &mut **guard;

        backend.execute("BEGIN", &[])?;
        match f(&mut *backend) {
            Ok(value) => {
                backend.execute("COMMIT", &[])?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = backend.execute("ROLLBACK", &[]) {
                    tracing::warn!("Rollback failed after '{}': {}", e, rollback);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_binding() {
        assert_eq!(SqlValue::from_json(&json!(true)), SqlValue::Integer(1));
        assert_eq!(SqlValue::from_json(&json!(3)), SqlValue::Integer(3));
        assert_eq!(SqlValue::from_json(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(SqlValue::from_json(&json!("x")), SqlValue::Text("x".into()));
        assert_eq!(SqlValue::from_json(&json!([1, 2])), SqlValue::Text("[1,2]".into()));
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
    }

    #[test]
    fn test_node_id_binds_as_text_key() {
        assert_eq!(SqlValue::from(&NodeId::Int(5)), SqlValue::Text("5".into()));
    }

    #[test]
    fn test_location_tokens() {
        let a = StoreLocation::new("sqlite", "file:/tmp/a.db");
        let b = StoreLocation::new("sqlite", "file:/tmp/a.db");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "sqlite:file:/tmp/a.db");
    }
}
