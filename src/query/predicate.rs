//! Boolean composition.
//!
//! `and`/`or` build binary nodes in call order, so `a.and(b).or(c)` means
//! `(a AND b) OR c`. Nested logical nodes always render parenthesized.

use super::expression::{ExprKind, Expression};
use crate::error::{QueryError, QueryResult};
use crate::model::types::ValueType;

/// A boolean-valued expression usable as a filter or join condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate(Expression);

impl Predicate {
    pub(crate) fn from_bool(expr: Expression) -> Self {
        debug_assert_eq!(expr.value_type(), Some(ValueType::Bool));
        Predicate(expr)
    }

    pub fn as_expression(&self) -> &Expression {
        &self.0
    }

    pub fn into_expression(self) -> Expression {
        self.0
    }

    pub fn and(self, other: Predicate) -> Predicate {
        let nullable = self.0.nullable() || other.0.nullable();
        Predicate(Expression::new(
            ExprKind::And(Box::new(self.0), Box::new(other.0)),
            Some(ValueType::Bool),
            nullable,
        ))
    }

    pub fn or(self, other: Predicate) -> Predicate {
        let nullable = self.0.nullable() || other.0.nullable();
        Predicate(Expression::new(
            ExprKind::Or(Box::new(self.0), Box::new(other.0)),
            Some(ValueType::Bool),
            nullable,
        ))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        let nullable = self.0.nullable();
        Predicate(Expression::new(
            ExprKind::Not(Box::new(self.0)),
            Some(ValueType::Bool),
            nullable,
        ))
    }

    /// Conjunction of every predicate, left to right.
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> QueryResult<Predicate> {
        fold(predicates, "all", Predicate::and)
    }

    /// Disjunction of every predicate, left to right.
    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> QueryResult<Predicate> {
        fold(predicates, "any", Predicate::or)
    }
}

fn fold(
    predicates: impl IntoIterator<Item = Predicate>,
    name: &str,
    combine: fn(Predicate, Predicate) -> Predicate,
) -> QueryResult<Predicate> {
    let mut iter = predicates.into_iter();
    let first = iter.next().ok_or_else(|| {
        QueryError::InvalidPredicate(format!("{}() needs at least one predicate", name))
    })?;
    Ok(iter.fold(first, combine))
}

impl TryFrom<Expression> for Predicate {
    type Error = QueryError;

    /// Boolean expressions (a bool attribute, a bool case) become predicates.
    fn try_from(expr: Expression) -> QueryResult<Self> {
        match expr.value_type() {
            Some(ValueType::Bool) => Ok(Predicate(expr)),
            Some(other) => Err(QueryError::mismatch("predicate", ValueType::Bool, other)),
            None => Err(QueryError::InvalidPredicate(
                "NULL literal is not a predicate".into(),
            )),
        }
    }
}

impl From<Predicate> for Expression {
    fn from(predicate: Predicate) -> Self {
        predicate.0
    }
}
