//! Error type for building and executing queries.

use std::time::Duration;

use crate::exec::source::SourceError;
use crate::model::metamodel::MetamodelError;
use crate::model::types::ValueType;

/// Errors raised while building, compiling or executing a query.
///
/// Construction-time errors (`TypeMismatch`, `InvalidPredicate`) are returned
/// by the call that creates the offending node, before anything reaches a
/// data source.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Invalid query state: {0}")]
    InvalidState(String),

    #[error("Expected at most one result, found {found}")]
    MultipleResults { found: usize },

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Query was cancelled")]
    Cancelled,

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Unknown attribute '{attribute}' on entity '{entity}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("Data source error: {0}")]
    DataSource(#[from] SourceError),

    #[error(transparent)]
    Metamodel(#[from] MetamodelError),
}

impl QueryError {
    /// Mismatch between an expected type and an actual one.
    pub(crate) fn mismatch(
        context: impl Into<String>,
        expected: impl std::fmt::Display,
        found: ValueType,
    ) -> Self {
        QueryError::TypeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

/// Result alias for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
