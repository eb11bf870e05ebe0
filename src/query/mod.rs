//! Typed query layer.
//!
//! - [`expression`] - typed expression nodes with construction-time checks
//! - [`predicate`] - boolean composition
//! - [`case`] - searched and simple CASE
//! - [`spec`] - immutable [`QuerySpec`]
//! - [`builder`] - fluent [`QueryBuilder`]
//! - [`compile`] - lowering to [`crate::sql::Query`]

pub mod builder;
pub mod case;
pub mod compile;
pub mod expression;
pub mod predicate;
pub mod spec;

pub use builder::{select, select_from, QueryBuilder};
pub use case::{Case, CaseBuilder, CaseWhen};
pub use compile::{compile, compile_count, ColumnInfo, CompiledQuery, RowLayout, Slot};
pub use expression::{AggregateFunc, ArithOp, CompareOp, ExprKind, Expression};
pub use predicate::Predicate;
pub use spec::{JoinClause, JoinKind, OrderKey, Projection, QuerySpec};
