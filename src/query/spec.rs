//! Immutable query specifications.

use std::collections::BTreeSet;

use super::expression::Expression;
use super::predicate::Predicate;
use crate::model::path::{AttrPath, EntityPath};
use crate::sql::{NullsOrder, SortDir};

/// One item of the select list.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// A single typed value.
    Expr(Expression),
    /// Every attribute of an aliased entity.
    Entity(EntityPath),
}

impl Projection {
    fn referenced_aliases(&self, out: &mut BTreeSet<String>) {
        match self {
            Projection::Expr(expr) => expr.referenced_aliases(out),
            Projection::Entity(entity) => {
                out.insert(entity.alias_name().to_string());
            }
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        matches!(self, Projection::Expr(e) if e.contains_aggregate())
    }
}

impl From<Expression> for Projection {
    fn from(expr: Expression) -> Self {
        Projection::Expr(expr)
    }
}

impl From<&Expression> for Projection {
    fn from(expr: &Expression) -> Self {
        Projection::Expr(expr.clone())
    }
}

impl From<EntityPath> for Projection {
    fn from(entity: EntityPath) -> Self {
        Projection::Entity(entity)
    }
}

impl From<&EntityPath> for Projection {
    fn from(entity: &EntityPath) -> Self {
        Projection::Entity(entity.clone())
    }
}

impl From<AttrPath> for Projection {
    fn from(path: AttrPath) -> Self {
        Projection::Expr(Expression::path(path))
    }
}

impl From<Predicate> for Projection {
    fn from(predicate: Predicate) -> Self {
        Projection::Expr(predicate.into_expression())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
}

/// A join onto `target`, either along a declared relation or onto an
/// unrelated entity with an explicit condition.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub target: EntityPath,
    /// Relation followed from an already bound alias. `None` for an entity join.
    pub via: Option<AttrPath>,
    /// Extra join-time condition. It restricts which target rows match and
    /// never drops source rows of a left join.
    pub on: Option<Predicate>,
}

/// A sort key with direction and optional null placement.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub expr: Expression,
    pub dir: SortDir,
    pub nulls: Option<NullsOrder>,
}

impl OrderKey {
    pub fn new(expr: Expression, dir: SortDir) -> Self {
        Self {
            expr,
            dir,
            nulls: None,
        }
    }

    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }

    pub fn nulls_first(self) -> Self {
        self.nulls(NullsOrder::First)
    }

    pub fn nulls_last(self) -> Self {
        self.nulls(NullsOrder::Last)
    }
}

/// A finalized query.
///
/// Specs are plain values: they can be cloned, compared, executed any number
/// of times and shared between tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub(crate) projections: Vec<Projection>,
    pub(crate) distinct: bool,
    pub(crate) sources: Vec<EntityPath>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) filter: Option<Predicate>,
    pub(crate) group_by: Vec<Expression>,
    pub(crate) having: Option<Predicate>,
    pub(crate) order_by: Vec<OrderKey>,
    pub(crate) offset: Option<u64>,
    pub(crate) limit: Option<u64>,
}

impl QuerySpec {
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// The `FROM` list. More than one source is a theta-style cartesian
    /// product; pair it with a filter.
    pub fn sources(&self) -> &[EntityPath] {
        &self.sources
    }

    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    pub fn filter(&self) -> Option<&Predicate> {
        self.filter.as_ref()
    }

    pub fn group_by(&self) -> &[Expression] {
        &self.group_by
    }

    pub fn having(&self) -> Option<&Predicate> {
        self.having.as_ref()
    }

    pub fn order_by(&self) -> &[OrderKey] {
        &self.order_by
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn is_paged(&self) -> bool {
        self.offset.is_some() || self.limit.is_some()
    }

    /// Whether the spec aggregates its rows (grouping or aggregate projections).
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty()
            || self.having.is_some()
            || self.projections.iter().any(Projection::contains_aggregate)
    }

    /// Same spec with a different page window.
    pub fn with_page(&self, offset: Option<u64>, limit: Option<u64>) -> QuerySpec {
        QuerySpec {
            offset,
            limit,
            ..self.clone()
        }
    }

    /// Same spec without offset and limit.
    pub fn without_paging(&self) -> QuerySpec {
        self.with_page(None, None)
    }

    /// Aliases bound by this spec's sources and joins.
    pub fn bound_aliases(&self) -> BTreeSet<String> {
        self.sources
            .iter()
            .chain(self.joins.iter().map(|j| &j.target))
            .map(|e| e.alias_name().to_string())
            .collect()
    }

    /// Aliases this spec reads without binding them.
    ///
    /// Non-empty means the spec is correlated and only valid as a subquery
    /// inside a query that binds these aliases.
    pub fn outer_references(&self) -> BTreeSet<String> {
        let mut used = BTreeSet::new();
        for projection in &self.projections {
            projection.referenced_aliases(&mut used);
        }
        for join in &self.joins {
            if let Some(via) = &join.via {
                used.insert(via.root_alias().to_string());
            }
            if let Some(on) = &join.on {
                on.as_expression().referenced_aliases(&mut used);
            }
        }
        let predicates = self.filter.iter().chain(self.having.iter());
        for predicate in predicates {
            predicate.as_expression().referenced_aliases(&mut used);
        }
        for expr in &self.group_by {
            expr.referenced_aliases(&mut used);
        }
        for key in &self.order_by {
            key.expr.referenced_aliases(&mut used);
        }

        let bound = self.bound_aliases();
        used.retain(|alias| !bound.contains(alias));
        used
    }

    pub fn is_correlated(&self) -> bool {
        !self.outer_references().is_empty()
    }
}
