//! CASE expressions.
//!
//! Branches are tried top to bottom and the first match wins. A default is
//! mandatory and every result must share one type (numeric results widen to
//! float). `NULL` results are allowed and make the case nullable.
//!
//! ```ignore
//! let label = Case::when(age.loe(20)?)
//!     .then("young")?
//!     .when(age.loe(30)?)
//!     .then("adult")?
//!     .otherwise("other")?;
//! ```

use super::expression::{ExprKind, Expression};
use super::predicate::Predicate;
use crate::error::{QueryError, QueryResult};
use crate::model::types::ValueType;

/// Entry point for searched cases.
pub struct Case;

impl Case {
    /// `CASE WHEN condition THEN ...`.
    pub fn when(condition: Predicate) -> CaseWhen {
        CaseWhen {
            cases: Cases::default(),
            condition: condition.into_expression(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Cases {
    operand: Option<Expression>,
    branches: Vec<(Expression, Expression)>,
}

/// A case with a pending `WHEN` awaiting its result.
#[derive(Debug, Clone)]
#[must_use = "a WHEN needs a THEN"]
pub struct CaseWhen {
    cases: Cases,
    condition: Expression,
}

impl CaseWhen {
    pub(crate) fn simple(operand: Expression, value: Expression) -> Self {
        CaseWhen {
            cases: Cases {
                operand: Some(operand),
                branches: Vec::new(),
            },
            condition: value,
        }
    }

    /// Result for the pending branch.
    pub fn then(self, result: impl Into<Expression>) -> QueryResult<CaseBuilder> {
        let result = result.into();
        let mut cases = self.cases;
        match &cases.operand {
            Some(operand) => match (operand.value_type(), self.condition.value_type()) {
                (Some(o), Some(v)) if o.comparable_with(v) => {}
                (Some(o), Some(v)) => return Err(QueryError::mismatch("case when value", o, v)),
                _ => {
                    return Err(QueryError::InvalidPredicate(
                        "simple case cannot match NULL; use a searched case with is_null()".into(),
                    ))
                }
            },
            None => {
                Predicate::try_from(self.condition.clone())?;
            }
        }
        result_type(&cases.branches, &result)?;
        cases.branches.push((self.condition, result));
        Ok(CaseBuilder { cases })
    }
}

/// A case with at least one complete branch.
#[derive(Debug, Clone)]
#[must_use = "a case needs otherwise() to become an expression"]
pub struct CaseBuilder {
    cases: Cases,
}

impl CaseBuilder {
    /// Next searched branch.
    pub fn when(self, condition: impl Into<Expression>) -> CaseWhen {
        CaseWhen {
            cases: self.cases,
            condition: condition.into(),
        }
    }

    /// Default result, closing the case.
    pub fn otherwise(self, default: impl Into<Expression>) -> QueryResult<Expression> {
        let default = default.into();
        let ty = result_type(&self.cases.branches, &default)?;
        let nullable = default.nullable() || self.cases.branches.iter().any(|(_, r)| r.nullable());
        Ok(Expression::new(
            ExprKind::Case {
                operand: self.cases.operand.map(Box::new),
                branches: self.cases.branches,
                default: Box::new(default),
            },
            ty,
            nullable,
        ))
    }
}

/// Common type of existing branch results and `next`.
fn result_type(
    branches: &[(Expression, Expression)],
    next: &Expression,
) -> QueryResult<Option<ValueType>> {
    let mut ty: Option<ValueType> = None;
    for result in branches.iter().map(|(_, r)| r).chain(std::iter::once(next)) {
        ty = match (ty, result.value_type()) {
            (None, t) | (t, None) => t,
            (Some(a), Some(b)) => Some(
                a.unify(b)
                    .ok_or_else(|| QueryError::mismatch("case result", a, b))?,
            ),
        };
    }
    Ok(ty)
}
