//! Fluent query builder.
//!
//! Every method consumes the builder and returns it, so a finished builder
//! can only be turned into a spec once. Structural mistakes (an `on` with no
//! join, an empty select list) surface from [`QueryBuilder::build`]; type
//! errors surface earlier, from the expression constructors.
//!
//! ```ignore
//! let m = model.entity("member")?;
//! let t = model.entity("team")?;
//! let spec = select([t.attr("name")?, m.attr("age")?.avg()?])
//!     .from(&m)
//!     .join(m.path("team")?, &t)
//!     .group_by([t.attr("name")?])
//!     .build()?;
//! ```

use std::collections::BTreeSet;

use super::expression::Expression;
use super::predicate::Predicate;
use super::spec::{JoinClause, JoinKind, OrderKey, Projection, QuerySpec};
use crate::error::{QueryError, QueryResult};
use crate::model::path::{AttrPath, EntityPath};

/// Start a query with the given projections.
pub fn select<I, P>(projections: I) -> QueryBuilder
where
    I: IntoIterator<Item = P>,
    P: Into<Projection>,
{
    QueryBuilder::new().select(projections)
}

/// Select every attribute of `entity` from `entity`.
pub fn select_from(entity: &EntityPath) -> QueryBuilder {
    QueryBuilder::new().select([entity]).from(entity)
}

/// Accumulates the parts of a [`QuerySpec`].
#[derive(Debug, Default)]
#[must_use = "builders have no effect until build() is called"]
pub struct QueryBuilder {
    spec: QuerySpec,
    error: Option<QueryError>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(mut self, error: QueryError) -> Self {
        self.error.get_or_insert(error);
        self
    }

    /// Append projections to the select list.
    pub fn select<I, P>(mut self, projections: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Projection>,
    {
        self.spec
            .projections
            .extend(projections.into_iter().map(Into::into));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.spec.distinct = true;
        self
    }

    /// Add a source. Several sources form a cartesian product (a theta
    /// join); it needs a filter to relate them and cannot use indexes on
    /// declared relations, so prefer [`join`](Self::join) where a relation
    /// exists.
    pub fn from(mut self, entity: &EntityPath) -> Self {
        self.spec.sources.push(entity.clone());
        self
    }

    fn push_join(mut self, kind: JoinKind, target: &EntityPath, via: Option<AttrPath>) -> Self {
        self.spec.joins.push(JoinClause {
            kind,
            target: target.clone(),
            via,
            on: None,
        });
        self
    }

    /// Inner join along a relation, e.g. `.join(m.path("team")?, &t)`.
    pub fn join(self, relation: AttrPath, target: &EntityPath) -> Self {
        self.push_join(JoinKind::Inner, target, Some(relation))
    }

    pub fn inner_join(self, relation: AttrPath, target: &EntityPath) -> Self {
        self.join(relation, target)
    }

    /// Left outer join along a relation. Source rows without a match keep
    /// `NULL` for every target projection.
    pub fn left_join(self, relation: AttrPath, target: &EntityPath) -> Self {
        self.push_join(JoinKind::Left, target, Some(relation))
    }

    /// Inner join onto an unrelated entity. Requires [`on`](Self::on).
    pub fn join_entity(self, target: &EntityPath) -> Self {
        self.push_join(JoinKind::Inner, target, None)
    }

    /// Left join onto an unrelated entity. Requires [`on`](Self::on).
    pub fn left_join_entity(self, target: &EntityPath) -> Self {
        self.push_join(JoinKind::Left, target, None)
    }

    /// Join-time condition for the most recent join.
    ///
    /// On a left join this only limits which target rows match; moving the
    /// same condition into [`filter`](Self::filter) would drop unmatched
    /// source rows instead.
    pub fn on(mut self, condition: Predicate) -> Self {
        if self.spec.joins.is_empty() {
            return self.fail(QueryError::InvalidState(
                "on() called before any join".into(),
            ));
        }
        if let Some(join) = self.spec.joins.last_mut() {
            join.on = Some(match join.on.take() {
                Some(existing) => existing.and(condition),
                None => condition,
            });
        }
        self
    }

    /// Add a filter, ANDed with any filter already present.
    pub fn filter(mut self, condition: Predicate) -> Self {
        self.spec.filter = Some(match self.spec.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Add several filters as one conjunction. Equivalent to calling
    /// [`filter`](Self::filter) once per predicate.
    ///
    /// An empty list is recorded like any other structural mistake and
    /// reported by [`build`](Self::build), which returns the first error
    /// the chain made. [`Predicate::all`] reports it immediately.
    pub fn filter_all(self, conditions: impl IntoIterator<Item = Predicate>) -> Self {
        match Predicate::all(conditions) {
            Ok(condition) => self.filter(condition),
            Err(err) => self.fail(err),
        }
    }

    /// Append grouping keys.
    pub fn group_by<I, E>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
    {
        self.spec.group_by.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Filter on grouped rows, ANDed with any existing `having`.
    pub fn having(mut self, condition: Predicate) -> Self {
        self.spec.having = Some(match self.spec.having.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Append sort keys; earlier keys take precedence.
    pub fn order_by(mut self, keys: impl IntoIterator<Item = OrderKey>) -> Self {
        self.spec.order_by.extend(keys);
        self
    }

    /// Rows to skip after ordering.
    pub fn offset(mut self, offset: u64) -> Self {
        self.spec.offset = Some(offset);
        self
    }

    /// Maximum rows to return.
    pub fn limit(mut self, limit: u64) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    /// Validate and finalize.
    pub fn build(self) -> QueryResult<QuerySpec> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let spec = self.spec;

        if spec.projections.is_empty() {
            return Err(QueryError::InvalidState("select list is empty".into()));
        }
        if spec.sources.is_empty() {
            return Err(QueryError::InvalidState("query has no source entity".into()));
        }

        let mut bound = BTreeSet::new();
        for source in &spec.sources {
            bind(&mut bound, source)?;
        }
        for join in &spec.joins {
            check_join(&bound, join)?;
            bind(&mut bound, &join.target)?;
        }

        if let Some(filter) = &spec.filter {
            if filter.as_expression().contains_aggregate() {
                return Err(QueryError::InvalidPredicate(
                    "aggregates are not allowed in filter(); use having()".into(),
                ));
            }
        }
        for join in &spec.joins {
            if let Some(on) = &join.on {
                if on.as_expression().contains_aggregate() {
                    return Err(QueryError::InvalidPredicate(
                        "aggregates are not allowed in a join condition".into(),
                    ));
                }
            }
        }
        if spec.group_by.iter().any(Expression::contains_aggregate) {
            return Err(QueryError::InvalidState(
                "group_by() keys cannot contain aggregates".into(),
            ));
        }
        if spec.is_aggregate()
            && spec
                .projections
                .iter()
                .any(|p| matches!(p, Projection::Entity(_)))
        {
            return Err(QueryError::InvalidState(
                "entity projections cannot be combined with aggregation".into(),
            ));
        }

        Ok(spec)
    }
}

fn bind(bound: &mut BTreeSet<String>, entity: &EntityPath) -> QueryResult<()> {
    if !bound.insert(entity.alias_name().to_string()) {
        return Err(QueryError::InvalidState(format!(
            "alias '{}' is bound twice",
            entity.alias_name()
        )));
    }
    Ok(())
}

fn check_join(bound: &BTreeSet<String>, join: &JoinClause) -> QueryResult<()> {
    let target = &join.target;
    let Some(via) = &join.via else {
        if join.on.is_none() {
            return Err(QueryError::InvalidState(format!(
                "join onto unrelated entity '{}' needs an on() condition",
                target.alias_name()
            )));
        }
        return Ok(());
    };

    if !bound.contains(via.root_alias()) {
        return Err(QueryError::InvalidState(format!(
            "join path '{}' starts from alias '{}', which is not bound yet",
            via,
            via.root_alias()
        )));
    }
    let related = via.attribute().relation_target().ok_or_else(|| {
        QueryError::InvalidState(format!("'{}' is not a relation", via))
    })?;
    if !target.model().is_subtype_of(target.name(), related) {
        return Err(QueryError::InvalidState(format!(
            "relation '{}' points at '{}', not '{}'",
            via,
            related,
            target.name()
        )));
    }
    Ok(())
}
