//! SQL generation module.
//!
//! This module provides the untyped SQL layer the query compiler lowers into.
//! It includes:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`token`] - Token types, parameter binding and [`Statement`]
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;

#[doc(hidden)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    avg, col, count, count_distinct, count_star, func, lit_int, lit_null, lit_str, max, min,
    param, star, sum, table_col, BinaryOperator, Expr, ExprExt, Literal, UnaryOperator,
};
pub use query::{
    Join, JoinType, LimitOffset, NullsOrder, OrderByExpr, Query, SelectExpr, SortDir, TableFactor,
    TableRef,
};
pub use token::{Statement, Token, TokenStream};
