//! Query execution against a data source.
//!
//! Every fetch compiles the spec for the source's dialect, runs exactly one
//! statement (two for [`Session::fetch_page`]) and decodes the rows. Each
//! call gets its own child cancellation token: a timeout cancels only that
//! call, cancelling the session token cancels every call in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::row::{decode_rows, Page, Row};
use super::source::{DataSource, SourceResult};
use crate::error::{QueryError, QueryResult};
use crate::query::compile::{compile, compile_count, CompiledQuery};
use crate::query::spec::QuerySpec;

/// Per-session execution options.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Deadline for each call. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Cancelling this token aborts every call made through the session.
    pub cancel: CancellationToken,
    /// Use the source's count query when it has one.
    pub native_count: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            cancel: CancellationToken::new(),
            native_count: true,
        }
    }
}

impl ExecOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Runs query specs against one data source.
///
/// A session holds no per-query state, so one session (or clones of it)
/// can serve any number of concurrent calls.
#[derive(Debug, Clone)]
pub struct Session<S> {
    source: S,
    options: ExecOptions,
}

impl<S: DataSource> Session<S> {
    pub fn new(source: S) -> Self {
        Self::with_options(source, ExecOptions::default())
    }

    pub fn with_options(source: S, options: ExecOptions) -> Self {
        Self { source, options }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    /// Compile `spec` for this session's dialect without running it.
    pub fn compile(&self, spec: &QuerySpec) -> QueryResult<CompiledQuery> {
        compile(spec, self.source.dialect())
    }

    /// Every row matching `spec`, in spec order. No match is an empty list.
    pub async fn fetch_list(&self, spec: &QuerySpec) -> QueryResult<Vec<Row>> {
        let compiled = self.compile(spec)?;
        let layout = Arc::new(compiled.layout);
        let raw = self
            .guarded(|token| async move { self.source.query(&compiled.statement, &token).await })
            .await?;
        tracing::trace!(rows = raw.len(), "fetched rows");
        Ok(decode_rows(&layout, raw)?)
    }

    /// The only row matching `spec`, or `None`.
    ///
    /// Fails with [`QueryError::MultipleResults`] when more than one row
    /// matches. At most two rows are read to find out.
    pub async fn fetch_one(&self, spec: &QuerySpec) -> QueryResult<Option<Row>> {
        let limit = spec.limit().map_or(2, |l| l.min(2));
        let mut rows = self.fetch_list(&spec.with_page(spec.offset(), Some(limit))).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            found => Err(QueryError::MultipleResults { found }),
        }
    }

    /// The first row in spec order, or `None`. Never fails on multiple matches.
    pub async fn fetch_first(&self, spec: &QuerySpec) -> QueryResult<Option<Row>> {
        let rows = self.fetch_list(&spec.with_page(spec.offset(), Some(1))).await?;
        Ok(rows.into_iter().next())
    }

    /// Number of rows `spec` matches, ignoring its offset and limit.
    pub async fn fetch_count(&self, spec: &QuerySpec) -> QueryResult<u64> {
        let dialect = self.source.dialect();
        if self.options.native_count && self.source.supports_native_count() {
            let statement = compile_count(spec, dialect)?;
            return self
                .guarded(|token| async move { self.source.count(&statement, &token).await })
                .await;
        }

        tracing::warn!(
            "counting by materializing every row; the data source has no native count"
        );
        let compiled = compile(&spec.without_paging(), dialect)?;
        let rows = self
            .guarded(|token| async move { self.source.query(&compiled.statement, &token).await })
            .await?;
        Ok(rows.len() as u64)
    }

    /// One page of `spec` plus the total row count.
    pub async fn fetch_page(&self, spec: &QuerySpec) -> QueryResult<Page<Row>> {
        let total = self.fetch_count(spec).await?;
        let items = self.fetch_list(spec).await?;
        Ok(Page {
            total,
            offset: spec.offset().unwrap_or(0),
            limit: spec.limit(),
            items,
        })
    }

    /// Run `call` under the session's deadline and cancellation token.
    async fn guarded<'a, T, F, Fut>(&'a self, call: F) -> QueryResult<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = SourceResult<T>> + 'a,
    {
        let token = self.options.cancel.child_token();
        if token.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        let work = call(token.clone());
        let deadline = async {
            match self.options.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        // Cancellation wins over a statement that reports the interrupt.
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::warn!("query cancelled");
                Err(QueryError::Cancelled)
            }
            _ = deadline => {
                token.cancel();
                let timeout = self.options.timeout.unwrap_or_default();
                tracing::warn!(?timeout, "query timed out");
                Err(QueryError::Timeout(timeout))
            }
            result = work => result.map_err(QueryError::from),
        }
    }
}
