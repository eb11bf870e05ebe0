//! Data source boundary.
//!
//! A [`DataSource`] runs rendered statements and hands back raw rows. It
//! owns connections and transactions; the session only decides what to
//! run and how to read the result.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::model::types::Value;
use crate::sql::{Dialect, Statement};

/// Errors raised by a data source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Statement was interrupted")]
    Interrupted,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Cannot decode column {index}: {message}")]
    Decode { index: usize, message: String },

    #[error("{0}")]
    Other(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// One undecoded result row, columns in select-list order.
pub type RawRow = Vec<Value>;

/// Anything that can run a parameterized statement.
///
/// # Example
///
/// ```ignore
/// use quarry::exec::DataSource;
///
/// async fn run(source: &impl DataSource, statement: &Statement) -> SourceResult<()> {
///     let rows = source.query(statement, &CancellationToken::new()).await?;
///     println!("{} rows", rows.len());
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Dialect statements for this source are rendered in.
    fn dialect(&self) -> Dialect;

    /// Run `statement` and return every row.
    ///
    /// Implementations abort the in-flight statement once `cancel` fires.
    async fn query(&self, statement: &Statement, cancel: &CancellationToken)
        -> SourceResult<Vec<RawRow>>;

    /// Run a `SELECT COUNT(*)` statement.
    async fn count(&self, statement: &Statement, cancel: &CancellationToken) -> SourceResult<u64> {
        let rows = self.query(statement, cancel).await?;
        let cell = rows.first().and_then(|row| row.first()).ok_or_else(|| {
            SourceError::Decode {
                index: 0,
                message: "count query returned no rows".into(),
            }
        })?;
        cell.as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| SourceError::Decode {
                index: 0,
                message: format!("count query returned {}", cell),
            })
    }

    /// Whether [`count`](Self::count) is answered by the source itself.
    ///
    /// When false the session counts by materializing every row.
    fn supports_native_count(&self) -> bool {
        true
    }
}

#[async_trait]
impl<S: DataSource + ?Sized> DataSource for Arc<S> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    async fn query(
        &self,
        statement: &Statement,
        cancel: &CancellationToken,
    ) -> SourceResult<Vec<RawRow>> {
        (**self).query(statement, cancel).await
    }

    async fn count(&self, statement: &Statement, cancel: &CancellationToken) -> SourceResult<u64> {
        (**self).count(statement, cancel).await
    }

    fn supports_native_count(&self) -> bool {
        (**self).supports_native_count()
    }
}
