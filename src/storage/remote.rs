//! Networked libSQL backend (feature `remote`)
//!
//! libSQL's client is async; the graph API is synchronous, so the backend owns
//! a current-thread tokio runtime and blocks on each call.

use libsql::params::Params;
use libsql::{Builder, Connection, Value};
use tokio::runtime::Runtime;
use crate::{Error, Result};
use super::backend::{Backend, SqlRow, SqlValue, StoreLocation};

/// A remote libSQL / Turso database reached over HTTP
pub struct RemoteBackend {
    runtime: Runtime,
    conn: Connection,
    location: StoreLocation,
}

impl RemoteBackend {
    /// Connect to `url` authenticating with `auth_token`
    pub fn connect(url: &str, auth_token: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let conn = runtime.block_on(async {
            let db = Builder::new_remote(url.to_string(), auth_token.to_string())
                .build()
                .await
                .map_err(remote_error)?;
            db.connect().map_err(remote_error)
        })?;

        tracing::info!("Connected to remote database at {}", url);

        Ok(Self {
            runtime,
            conn,
            location: StoreLocation::new("libsql", url),
        })
    }
}

impl Backend for RemoteBackend {
    fn location(&self) -> &StoreLocation {
        &self.location
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        let conn = &self.conn;
        let changed = self
            .runtime
            .block_on(conn.execute(sql, to_params(params)))
            .map_err(remote_error)?;
        Ok(changed as usize)
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let conn = &self.conn;
        self.runtime.block_on(async {
            let mut rows = conn.query(sql, to_params(params)).await.map_err(remote_error)?;
            let width = rows.column_count();

            let mut out = Vec::new();
            while let Some(row) = rows.next().await.map_err(remote_error)? {
                let mut cells = Vec::with_capacity(width.max(0) as usize);
                for i in 0..width {
                    cells.push(from_value(row.get_value(i).map_err(remote_error)?));
                }
                out.push(cells);
            }
            Ok(out)
        })
    }

    fn execute_script(&mut self, script: &str) -> Result<()> {
        let conn = &self.conn;
        self.runtime
            .block_on(conn.execute_batch(script))
            .map(|_| ())
            .map_err(remote_error)
    }
}

fn remote_error(e: libsql::Error) -> Error {
    Error::Remote(e.to_string())
}

fn to_params(params: &[SqlValue]) -> Params {
    Params::Positional(params.iter().map(to_value).collect())
}

fn to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Real(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Blob(b) => Value::Blob(b.clone()),
    }
}

fn from_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(i),
        Value::Real(f) => SqlValue::Real(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Blob(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversion() {
        let values = vec![
            SqlValue::Null,
            SqlValue::Integer(3),
            SqlValue::Real(0.25),
            SqlValue::Text("a".into()),
            SqlValue::Blob(vec![9]),
        ];
        for v in values {
            assert_eq!(from_value(to_value(&v)), v);
        }
    }
}
