//! # Quarry
//!
//! A typed, composable query builder that compiles to multi-dialect SQL and
//! executes against relational data sources.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Metamodel (entities, attributes)              │
//! │          loaded once from a TOML declaration             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [EntityPath / AttrPath]
//! ┌─────────────────────────────────────────────────────────┐
//! │      Typed expressions, predicates, CASE, builder        │
//! │         (type errors raised at construction)             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [build]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 QuerySpec (immutable)                    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compile]
//! ┌─────────────────────────────────────────────────────────┐
//! │       SQL AST → TokenStream → Statement { sql, params }  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [Session + DataSource]
//! ┌─────────────────────────────────────────────────────────┐
//! │              Rows, tuples, records, pages                │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use quarry::prelude::*;
//!
//! let member = quarry::shop::model().entity("member")?;
//! let spec = select([member.attr("username")?])
//!     .from(&member)
//!     .filter(member.attr("age")?.goe(18)?)
//!     .order_by([member.attr("age")?.desc()])
//!     .build()?;
//!
//! let session = Session::new(quarry::shop::in_memory_source()?);
//! let rows = session.fetch_list(&spec).await?;
//! ```

pub mod config;
pub mod error;
pub mod exec;
pub mod model;
pub mod query;
pub mod shop;
pub mod sql;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::exec::{
        DataSource, ExecOptions, Page, Record, Row, Session, SqliteSource, Tuple,
    };
    pub use crate::model::{AttrPath, EntityPath, Metamodel, Value, ValueType};
    pub use crate::query::{
        select, select_from, Case, Expression, JoinKind, OrderKey, Predicate, Projection,
        QueryBuilder, QuerySpec,
    };
    pub use crate::sql::{Dialect, NullsOrder, SortDir};
}

pub use error::{QueryError, QueryResult};
pub use exec::{Session, SqliteSource};
pub use model::Metamodel;
pub use query::{select, select_from, QuerySpec};
pub use sql::Dialect;
