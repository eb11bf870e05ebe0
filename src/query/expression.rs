//! Typed expressions over attribute paths and literals.
//!
//! Every node carries its static result type. Operators check operand types
//! when the node is built, so an ill-typed comparison never reaches the
//! compiler or a data source.

use std::collections::BTreeSet;

use super::case::CaseWhen;
use super::predicate::Predicate;
use super::spec::{OrderKey, Projection, QuerySpec};
use crate::error::{QueryError, QueryResult};
use crate::model::path::AttrPath;
use crate::model::types::{Value, ValueType};
use crate::sql::{NullsOrder, SortDir};

/// A typed expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    kind: ExprKind,
    /// `None` only for an untyped `NULL` literal.
    ty: Option<ValueType>,
    nullable: bool,
}

/// Expression node variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Value),
    Path(AttrPath),
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
    },
    In {
        expr: Box<Expression>,
        values: Vec<Expression>,
    },
    Like {
        expr: Box<Expression>,
        pattern: String,
    },
    IsNull {
        expr: Box<Expression>,
        negated: bool,
    },
    Arithmetic {
        op: ArithOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `arg` is `None` for `COUNT(*)`.
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expression>>,
        distinct: bool,
    },
    Case {
        operand: Option<Box<Expression>>,
        branches: Vec<(Expression, Expression)>,
        default: Box<Expression>,
    },
    Subquery(Box<QuerySpec>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Lte => "<=",
            CompareOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Avg => "avg",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
        }
    }
}

impl Expression {
    pub(crate) fn new(kind: ExprKind, ty: Option<ValueType>, nullable: bool) -> Self {
        Self { kind, ty, nullable }
    }

    /// Expression reading an attribute.
    pub fn path(path: AttrPath) -> Self {
        let ty = path.value_type();
        let nullable = path.nullable();
        Self::new(ExprKind::Path(path), Some(ty), nullable)
    }

    /// Literal value, bound as a parameter when compiled.
    pub fn literal(value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = value.value_type();
        let nullable = value.is_null();
        Self::new(ExprKind::Literal(value), ty, nullable)
    }

    /// `COUNT(*)`.
    pub fn count_all() -> Self {
        Self::new(
            ExprKind::Aggregate {
                func: AggregateFunc::Count,
                arg: None,
                distinct: false,
            },
            Some(ValueType::Int),
            false,
        )
    }

    /// Scalar subquery. The spec must project exactly one expression.
    ///
    /// An empty subquery result reads as `NULL`, so the node is nullable.
    pub fn subquery(spec: QuerySpec) -> QueryResult<Self> {
        let ty = match spec.projections() {
            [Projection::Expr(expr)] => expr.ty,
            [Projection::Entity(entity)] => {
                return Err(QueryError::InvalidState(format!(
                    "subquery must project a single value, not entity '{}'",
                    entity.name()
                )))
            }
            other => {
                return Err(QueryError::InvalidState(format!(
                    "subquery must project exactly one expression, found {}",
                    other.len()
                )))
            }
        };
        Ok(Self::new(ExprKind::Subquery(Box::new(spec)), ty, true))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    /// Static result type, `None` for a bare `NULL` literal.
    pub fn value_type(&self) -> Option<ValueType> {
        self.ty
    }

    /// Whether the value can be `NULL`, judged from the metamodel and the
    /// operators alone. Whether an attribute's entity is left joined is
    /// only known once the expression sits in a query; the compiled
    /// layout's [`ColumnInfo::nullable`](super::compile::ColumnInfo)
    /// accounts for that.
    pub fn nullable(&self) -> bool {
        self.nullable
    }

    // -------------------------------------------------------------------------
    // Comparisons
    // -------------------------------------------------------------------------

    fn compare(&self, op: CompareOp, other: impl Into<Expression>) -> QueryResult<Predicate> {
        let other = other.into();
        let context = format!("comparison '{}'", op.symbol());
        check_comparable(&context, self, &other)?;
        let nullable = self.nullable || other.nullable;
        Ok(Predicate::from_bool(Self::new(
            ExprKind::Compare {
                op,
                left: Box::new(self.clone()),
                right: Box::new(other),
            },
            Some(ValueType::Bool),
            nullable,
        )))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn eq(&self, other: impl Into<Expression>) -> QueryResult<Predicate> {
        self.compare(CompareOp::Eq, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn ne(&self, other: impl Into<Expression>) -> QueryResult<Predicate> {
        self.compare(CompareOp::Ne, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn gt(&self, other: impl Into<Expression>) -> QueryResult<Predicate> {
        self.compare(CompareOp::Gt, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn lt(&self, other: impl Into<Expression>) -> QueryResult<Predicate> {
        self.compare(CompareOp::Lt, other)
    }

    /// Greater than or equal.
    pub fn goe(&self, other: impl Into<Expression>) -> QueryResult<Predicate> {
        self.compare(CompareOp::Gte, other)
    }

    /// Less than or equal.
    pub fn loe(&self, other: impl Into<Expression>) -> QueryResult<Predicate> {
        self.compare(CompareOp::Lte, other)
    }

    /// Inclusive range check.
    pub fn between(
        &self,
        low: impl Into<Expression>,
        high: impl Into<Expression>,
    ) -> QueryResult<Predicate> {
        let low = low.into();
        let high = high.into();
        check_comparable("between lower bound", self, &low)?;
        check_comparable("between upper bound", self, &high)?;
        let nullable = self.nullable || low.nullable || high.nullable;
        Ok(Predicate::from_bool(Self::new(
            ExprKind::Between {
                expr: Box::new(self.clone()),
                low: Box::new(low),
                high: Box::new(high),
            },
            Some(ValueType::Bool),
            nullable,
        )))
    }

    /// Membership test. An empty list matches nothing.
    pub fn in_list<I, V>(&self, values: I) -> QueryResult<Predicate>
    where
        I: IntoIterator<Item = V>,
        V: Into<Expression>,
    {
        let values: Vec<Expression> = values.into_iter().map(Into::into).collect();
        for value in &values {
            check_comparable("in list", self, value)?;
        }
        Ok(Predicate::from_bool(Self::new(
            ExprKind::In {
                expr: Box::new(self.clone()),
                values,
            },
            Some(ValueType::Bool),
            self.nullable,
        )))
    }

    /// SQL `LIKE` with a caller-supplied pattern.
    pub fn like(&self, pattern: &str) -> QueryResult<Predicate> {
        self.require_type("like", ValueType::Text)?;
        Ok(Predicate::from_bool(Self::new(
            ExprKind::Like {
                expr: Box::new(self.clone()),
                pattern: pattern.to_string(),
            },
            Some(ValueType::Bool),
            self.nullable,
        )))
    }

    /// Substring match.
    pub fn contains(&self, needle: &str) -> QueryResult<Predicate> {
        self.like(&format!("%{}%", needle))
    }

    pub fn starts_with(&self, prefix: &str) -> QueryResult<Predicate> {
        self.like(&format!("{}%", prefix))
    }

    pub fn is_null(&self) -> Predicate {
        self.null_check(false)
    }

    pub fn is_not_null(&self) -> Predicate {
        self.null_check(true)
    }

    fn null_check(&self, negated: bool) -> Predicate {
        Predicate::from_bool(Self::new(
            ExprKind::IsNull {
                expr: Box::new(self.clone()),
                negated,
            },
            Some(ValueType::Bool),
            false,
        ))
    }

    // -------------------------------------------------------------------------
    // Arithmetic
    // -------------------------------------------------------------------------

    fn arithmetic(&self, op: ArithOp, other: impl Into<Expression>) -> QueryResult<Expression> {
        let other = other.into();
        let context = "arithmetic";
        let left = self.numeric_type(context)?;
        let right = other.numeric_type(context)?;
        // Both sides are numeric, so unify always succeeds.
        let ty = left.unify(right).unwrap_or(ValueType::Float);
        let nullable = self.nullable || other.nullable || op == ArithOp::Div;
        Ok(Self::new(
            ExprKind::Arithmetic {
                op,
                left: Box::new(self.clone()),
                right: Box::new(other),
            },
            Some(ty),
            nullable,
        ))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(&self, other: impl Into<Expression>) -> QueryResult<Expression> {
        self.arithmetic(ArithOp::Add, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(&self, other: impl Into<Expression>) -> QueryResult<Expression> {
        self.arithmetic(ArithOp::Sub, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(&self, other: impl Into<Expression>) -> QueryResult<Expression> {
        self.arithmetic(ArithOp::Mul, other)
    }

    /// Division. Integer operands divide with the data source's integer
    /// semantics; divide by zero reads as `NULL` on SQLite.
    #[allow(clippy::should_implement_trait)]
    pub fn div(&self, other: impl Into<Expression>) -> QueryResult<Expression> {
        self.arithmetic(ArithOp::Div, other)
    }

    // -------------------------------------------------------------------------
    // Aggregates
    // -------------------------------------------------------------------------

    fn aggregate(&self, func: AggregateFunc, distinct: bool) -> QueryResult<Expression> {
        if self.contains_aggregate() {
            return Err(QueryError::InvalidState(format!(
                "aggregate '{}' cannot wrap another aggregate",
                func.name()
            )));
        }
        let ty = self.ty.ok_or_else(|| {
            QueryError::mismatch(func.name(), "numeric or identity expression", ValueType::Text)
        })?;
        let identity_bearing = self.is_identity_bearing();
        let (result, nullable) = match func {
            AggregateFunc::Count => {
                if !ty.is_numeric() && !identity_bearing {
                    return Err(QueryError::mismatch(
                        func.name(),
                        "numeric or identity expression",
                        ty,
                    ));
                }
                (ValueType::Int, false)
            }
            AggregateFunc::Min | AggregateFunc::Max => {
                if !ty.is_numeric() && !identity_bearing {
                    return Err(QueryError::mismatch(
                        func.name(),
                        "numeric or identity expression",
                        ty,
                    ));
                }
                (ty, true)
            }
            AggregateFunc::Sum => (self.numeric_type(func.name())?, true),
            AggregateFunc::Avg => {
                self.numeric_type(func.name())?;
                (ValueType::Float, true)
            }
        };
        Ok(Self::new(
            ExprKind::Aggregate {
                func,
                arg: Some(Box::new(self.clone())),
                distinct,
            },
            Some(result),
            nullable,
        ))
    }

    pub fn count(&self) -> QueryResult<Expression> {
        self.aggregate(AggregateFunc::Count, false)
    }

    pub fn count_distinct(&self) -> QueryResult<Expression> {
        self.aggregate(AggregateFunc::Count, true)
    }

    pub fn sum(&self) -> QueryResult<Expression> {
        self.aggregate(AggregateFunc::Sum, false)
    }

    /// Average, always `Float`: 10 and 25 average to 17.5.
    pub fn avg(&self) -> QueryResult<Expression> {
        self.aggregate(AggregateFunc::Avg, false)
    }

    pub fn min(&self) -> QueryResult<Expression> {
        self.aggregate(AggregateFunc::Min, false)
    }

    pub fn max(&self) -> QueryResult<Expression> {
        self.aggregate(AggregateFunc::Max, false)
    }

    // -------------------------------------------------------------------------
    // Case and ordering
    // -------------------------------------------------------------------------

    /// Start a simple case over this expression: `CASE self WHEN v THEN ...`.
    pub fn when(&self, value: impl Into<Expression>) -> CaseWhen {
        CaseWhen::simple(self.clone(), value.into())
    }

    pub fn asc(&self) -> OrderKey {
        OrderKey::new(self.clone(), SortDir::Asc)
    }

    pub fn desc(&self) -> OrderKey {
        OrderKey::new(self.clone(), SortDir::Desc)
    }

    /// Ascending with nulls placed last.
    pub fn asc_nulls_last(&self) -> OrderKey {
        self.asc().nulls(NullsOrder::Last)
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Whether an aggregate appears in this expression outside subqueries.
    pub fn contains_aggregate(&self) -> bool {
        match &self.kind {
            ExprKind::Aggregate { .. } => true,
            ExprKind::Literal(_) | ExprKind::Path(_) | ExprKind::Subquery(_) => false,
            _ => self.children().iter().any(|c| c.contains_aggregate()),
        }
    }

    /// Identity attributes and relation keys count as identity-bearing.
    fn is_identity_bearing(&self) -> bool {
        match &self.kind {
            ExprKind::Path(path) => path.is_identity() || path.attribute().relation_target().is_some(),
            _ => false,
        }
    }

    /// Aliases this expression reads, including those a subquery takes from
    /// its enclosing scope.
    pub fn referenced_aliases(&self, out: &mut BTreeSet<String>) {
        match &self.kind {
            ExprKind::Path(path) => {
                out.insert(path.root_alias().to_string());
            }
            ExprKind::Subquery(spec) => out.extend(spec.outer_references()),
            _ => {
                for child in self.children() {
                    child.referenced_aliases(out);
                }
            }
        }
    }

    fn children(&self) -> Vec<&Expression> {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Path(_) | ExprKind::Subquery(_) => Vec::new(),
            ExprKind::Compare { left, right, .. }
            | ExprKind::Arithmetic { left, right, .. }
            | ExprKind::And(left, right)
            | ExprKind::Or(left, right) => vec![left, right],
            ExprKind::Between { expr, low, high } => vec![expr, low, high],
            ExprKind::In { expr, values } => {
                let mut out: Vec<&Expression> = vec![expr];
                out.extend(values.iter());
                out
            }
            ExprKind::Like { expr, .. } | ExprKind::IsNull { expr, .. } | ExprKind::Not(expr) => {
                vec![expr]
            }
            ExprKind::Aggregate { arg, .. } => arg.iter().map(|a| a.as_ref()).collect(),
            ExprKind::Case {
                operand,
                branches,
                default,
            } => {
                let mut out: Vec<&Expression> = operand.iter().map(|o| o.as_ref()).collect();
                for (when, then) in branches {
                    out.push(when);
                    out.push(then);
                }
                out.push(default);
                out
            }
        }
    }

    fn numeric_type(&self, context: &str) -> QueryResult<ValueType> {
        match self.ty {
            Some(ty) if ty.is_numeric() => Ok(ty),
            Some(ty) => Err(QueryError::mismatch(context, "numeric", ty)),
            None => Err(QueryError::InvalidPredicate(format!(
                "NULL literal is not a valid operand for {}",
                context
            ))),
        }
    }

    fn require_type(&self, context: &str, expected: ValueType) -> QueryResult<()> {
        match self.ty {
            Some(ty) if ty == expected => Ok(()),
            Some(ty) => Err(QueryError::mismatch(context, expected, ty)),
            None => Err(QueryError::InvalidPredicate(format!(
                "NULL literal is not a valid operand for {}",
                context
            ))),
        }
    }
}

fn check_comparable(context: &str, left: &Expression, right: &Expression) -> QueryResult<()> {
    match (left.ty, right.ty) {
        (Some(l), Some(r)) if l.comparable_with(r) => Ok(()),
        (Some(l), Some(r)) => Err(QueryError::mismatch(context, l, r)),
        _ => Err(QueryError::InvalidPredicate(format!(
            "{} against NULL is never true; use is_null()",
            context
        ))),
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::literal(value)
    }
}

impl From<i64> for Expression {
    fn from(n: i64) -> Self {
        Expression::literal(n)
    }
}

impl From<i32> for Expression {
    fn from(n: i32) -> Self {
        Expression::literal(n)
    }
}

impl From<f64> for Expression {
    fn from(f: f64) -> Self {
        Expression::literal(f)
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Expression::literal(s)
    }
}

impl From<String> for Expression {
    fn from(s: String) -> Self {
        Expression::literal(s)
    }
}

impl From<bool> for Expression {
    fn from(b: bool) -> Self {
        Expression::literal(b)
    }
}

impl From<AttrPath> for Expression {
    fn from(path: AttrPath) -> Self {
        Expression::path(path)
    }
}

impl From<&Expression> for Expression {
    fn from(expr: &Expression) -> Self {
        expr.clone()
    }
}
