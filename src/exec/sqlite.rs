//! SQLite data source over `rusqlite`.
//!
//! Statements run on the blocking pool. While a statement runs, SQLite's
//! progress handler polls the caller's cancellation token and interrupts
//! the statement once it fires, so a timed-out query stops consuming the
//! connection.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use tokio_util::sync::CancellationToken;

use super::source::{DataSource, RawRow, SourceError, SourceResult};
use crate::model::types::Value;
use crate::sql::{Dialect, Statement};

/// VM instructions between cancellation checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// A SQLite database shared by every clone of the source.
///
/// Statements on one source run one at a time.
#[derive(Clone)]
pub struct SqliteSource {
    conn: Arc<Mutex<Connection>>,
    dialect: Dialect,
    native_count: bool,
}

impl SqliteSource {
    /// Open (or create) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> SourceResult<Self> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// Private in-memory database.
    pub fn in_memory() -> SourceResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            dialect: Dialect::Sqlite,
            native_count: true,
        }
    }

    /// Render statements for another dialect. SQLite accepts most of the
    /// MySQL and PostgreSQL surface, which makes this useful for checking
    /// dialect-specific rendering end to end.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Report count support as unavailable, forcing the session onto its
    /// materializing fallback.
    pub fn without_native_count(mut self) -> Self {
        self.native_count = false;
        self
    }

    /// Run a batch of statements (DDL, fixtures) synchronously.
    pub fn execute_batch(&self, sql: &str) -> SourceResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> SourceResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SourceError::Other("SQLite connection mutex poisoned".into()))
    }
}

impl std::fmt::Debug for SqliteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSource")
            .field("dialect", &self.dialect)
            .field("native_count", &self.native_count)
            .finish()
    }
}

#[async_trait]
impl DataSource for SqliteSource {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn query(
        &self,
        statement: &Statement,
        cancel: &CancellationToken,
    ) -> SourceResult<Vec<RawRow>> {
        if cancel.is_cancelled() {
            return Err(SourceError::Interrupted);
        }
        let conn = self.conn.clone();
        let sql = statement.sql.clone();
        let params = statement.params.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| SourceError::Other("SQLite connection mutex poisoned".into()))?;
            run_interruptible(&conn, &sql, &params, cancel)
        })
        .await?
    }

    fn supports_native_count(&self) -> bool {
        self.native_count
    }
}

fn run_interruptible(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    cancel: CancellationToken,
) -> SourceResult<Vec<RawRow>> {
    let token = AssertUnwindSafe(cancel);
    conn.progress_handler(
        PROGRESS_INTERVAL,
        Some(move || {
            let AssertUnwindSafe(token) = &token;
            token.is_cancelled()
        }),
    );
    let result = read_rows(conn, sql, params);
    conn.progress_handler(0, None::<fn() -> bool>);

    result.map_err(|err| match err {
        SourceError::Sqlite(e) if e.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) => {
            SourceError::Interrupted
        }
        other => other,
    })
}

fn read_rows(conn: &Connection, sql: &str, params: &[Value]) -> SourceResult<Vec<RawRow>> {
    let mut stmt = conn.prepare(sql)?;
    let width = stmt.column_count();
    let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql)))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for index in 0..width {
            values.push(from_sql(row.get_ref(index)?, index)?);
        }
        out.push(values);
    }
    tracing::trace!(rows = out.len(), "sqlite query finished");
    Ok(out)
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int(n) => SqlValue::Integer(*n),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
    }
}

fn from_sql(value: ValueRef<'_>, index: usize) -> SourceResult<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| SourceError::Decode {
                    index,
                    message: e.to_string(),
                })?
                .to_string(),
        ),
        ValueRef::Blob(_) => {
            return Err(SourceError::Decode {
                index,
                message: "BLOB columns are not supported".into(),
            })
        }
    })
}
