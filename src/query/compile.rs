//! Lowering from typed query specs to SQL.
//!
//! Attribute paths that cross relations become implicit joins with aliases
//! of the form `root_relation`. They are inner joins unless the path can
//! only be read through an outer join: paths rooted at a left join target,
//! and paths first reached from a left join's own condition, join LEFT so
//! the outer side keeps its unmatched rows. A path a join's `on()` reads
//! through the join's own target is joined inside a parenthesized join
//! tree, `LEFT JOIN (team AS t LEFT JOIN company AS t_company ON ...) ON`,
//! so the condition only sees aliases already bound.
//!
//! A path read inside a subquery joins inside that subquery, even when it
//! is rooted in the enclosing query: `m.team.name` in a correlated subquery
//! adds `team AS m_team` to the subquery's FROM, correlated on `m`. Outer
//! rows whose relation is NULL stay; the subquery sees no match for them.
//!
//! Subtype scans get a discriminator restriction: in `WHERE` for sources,
//! in `ON` for join targets so a left join keeps its unmatched rows.
//!
//! A paged spec without an order gets a default order (grouping keys, the
//! select list for `DISTINCT`, or the source identities) so the same spec
//! pages the same way on every execution.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::expression::{ArithOp, CompareOp, ExprKind, Expression};
use super::spec::{JoinClause, JoinKind, Projection, QuerySpec};
use crate::error::{QueryError, QueryResult};
use crate::model::entity::EntityDescriptor;
use crate::model::path::{implicit_alias, AttrPath};
use crate::model::types::{Value, ValueType};
use crate::sql::{
    count_star, lit_int, lit_str, table_col, BinaryOperator, Dialect, Expr, ExprExt, Join,
    JoinType, Literal, OrderByExpr, Query, SelectExpr, SortDir, Statement, TableFactor,
    TableRef, UnaryOperator,
};

/// Alias of the derived table wrapping grouped or distinct count queries.
const COUNT_ALIAS: &str = "counted";

/// Output column of a compiled query.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub label: String,
    /// Declared type; decoded values are coerced to it.
    pub ty: Option<ValueType>,
    /// Whether the column can read `NULL`, counting the unmatched side of
    /// left joins.
    pub nullable: bool,
}

/// The columns produced by one projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub projection: Projection,
    pub columns: Vec<ColumnInfo>,
}

/// How result columns map back onto projections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowLayout {
    slots: Vec<Slot>,
}

impl RowLayout {
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Total number of columns.
    pub fn width(&self) -> usize {
        self.slots.iter().map(|s| s.columns.len()).sum()
    }

    /// Index of the slot built from `projection`.
    pub fn position(&self, projection: &Projection) -> Option<usize> {
        self.slots.iter().position(|s| &s.projection == projection)
    }
}

/// A spec lowered for one dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub query: Query,
    pub statement: Statement,
    pub layout: RowLayout,
}

impl CompiledQuery {
    pub fn sql(&self) -> &str {
        &self.statement.sql
    }
}

/// Lower `spec` into a parameterized statement for `dialect`.
pub fn compile(spec: &QuerySpec, dialect: Dialect) -> QueryResult<CompiledQuery> {
    let (query, layout) = lower_root(spec)?;
    let statement = query.to_statement(dialect);
    tracing::debug!(%dialect, sql = %statement.sql, params = statement.params.len(), "compiled query");
    Ok(CompiledQuery {
        query,
        statement,
        layout,
    })
}

/// Statement counting the rows `spec` matches, ignoring offset and limit.
///
/// Plain specs become `SELECT COUNT(*)` over the same sources, joins and
/// filter. Grouped, aggregated or distinct specs are counted through a
/// derived table.
pub fn compile_count(spec: &QuerySpec, dialect: Dialect) -> QueryResult<Statement> {
    let unpaged = spec.without_paging();
    let (mut query, _) = lower_root(&unpaged)?;
    query.order_by.clear();

    let counted = if unpaged.is_aggregate() || unpaged.is_distinct() {
        for (i, item) in query.select.iter_mut().enumerate() {
            item.alias = Some(format!("c{}", i + 1));
        }
        Query::new()
            .select(vec![count_star()])
            .from(TableRef::derived(query).with_alias(COUNT_ALIAS))
    } else {
        query.select = vec![SelectExpr::new(count_star())];
        query
    };

    let statement = counted.to_statement(dialect);
    tracing::debug!(%dialect, sql = %statement.sql, "compiled count query");
    Ok(statement)
}

fn lower_root(spec: &QuerySpec) -> QueryResult<(Query, RowLayout)> {
    if let Some(alias) = spec.outer_references().into_iter().next() {
        return Err(QueryError::InvalidState(format!(
            "alias '{}' is used but not bound by the query",
            alias
        )));
    }
    Lowerer::default().lower_spec(spec)
}

/// An implicit join waiting to be emitted, with the alias its path starts
/// from.
struct PendingJoin {
    root: String,
    join: Join,
}

/// Aliases bound by one query level, plus the implicit joins it still
/// has to emit.
#[derive(Default)]
struct Scope {
    bound: BTreeMap<String, Arc<EntityDescriptor>>,
    /// Left join targets.
    optional: BTreeSet<String>,
    /// Implicit joins registered so far, by alias.
    implicit: BTreeMap<String, JoinType>,
    /// Implicit LEFT joins that a later use needs as INNER.
    required: BTreeSet<String>,
    /// Set while lowering the conditions of a left join.
    in_left_join: bool,
    pending: Vec<PendingJoin>,
}

#[derive(Default)]
struct Lowerer {
    scopes: Vec<Scope>,
}

impl Lowerer {
    fn lower_spec(&mut self, spec: &QuerySpec) -> QueryResult<(Query, RowLayout)> {
        let mut scope = Scope::default();
        for entity in spec.sources().iter().chain(spec.joins().iter().map(|j| &j.target)) {
            scope
                .bound
                .insert(entity.alias_name().to_string(), entity.descriptor().clone());
        }
        for join in spec.joins() {
            if join.kind == JoinKind::Left {
                scope.optional.insert(join.target.alias_name().to_string());
            }
        }
        self.scopes.push(scope);
        let result = self.lower_in_scope(spec);
        self.scopes.pop();
        result
    }

    fn lower_in_scope(&mut self, spec: &QuerySpec) -> QueryResult<(Query, RowLayout)> {
        let mut query = Query::new();
        if spec.is_distinct() {
            query = query.distinct();
        }

        let mut restrictions = Vec::new();
        for source in spec.sources() {
            let descriptor = source.descriptor();
            query = query.from(table_ref(descriptor, source.alias_name()));
            if let Some(restriction) = discriminator_restriction(descriptor, source.alias_name()) {
                restrictions.push(restriction);
            }
        }

        for join in spec.joins() {
            let alias = join.target.alias_name();
            let left = join.kind == JoinKind::Left;
            self.set_in_left_join(left);
            let conditions = self.join_conditions(join);
            self.set_in_left_join(false);
            let on = conjunction(conditions?).ok_or_else(|| {
                QueryError::InvalidState(format!("join onto '{}' has no condition", alias))
            })?;

            // paths rooted at the target join inside it, so `on` sees them
            let (nested, before): (Vec<_>, Vec<_>) = self
                .flush_implicit()
                .into_iter()
                .partition(|pending| pending.root == alias);
            query.joins.extend(before.into_iter().map(|p| p.join));
            let mut table = table_ref(join.target.descriptor(), alias);
            if !nested.is_empty() {
                table = TableRef::nested(table, nested.into_iter().map(|p| p.join).collect());
            }
            let join_type = if left { JoinType::Left } else { JoinType::Inner };
            query = query.join(join_type, table, on);
        }

        let mut select = Vec::new();
        let mut slots = Vec::new();
        for (index, projection) in spec.projections().iter().enumerate() {
            match projection {
                Projection::Expr(expr) => {
                    select.push(SelectExpr::new(self.lower_expr(expr)?));
                    slots.push(Slot {
                        projection: projection.clone(),
                        columns: vec![ColumnInfo {
                            label: label(expr, index),
                            ty: expr.value_type(),
                            nullable: expr.nullable() || self.reads_optional(expr),
                        }],
                    });
                }
                Projection::Entity(entity) => {
                    let alias = entity.alias_name();
                    let optional = self.is_optional(alias);
                    let mut columns = Vec::new();
                    for attribute in &entity.descriptor().attributes {
                        select.push(SelectExpr::new(table_col(alias, &attribute.column)));
                        columns.push(ColumnInfo {
                            label: format!("{}.{}", alias, attribute.name),
                            ty: Some(attribute.value_type()),
                            nullable: attribute.nullable || optional,
                        });
                    }
                    slots.push(Slot {
                        projection: projection.clone(),
                        columns,
                    });
                }
            }
        }
        query = query.select(select);

        if let Some(filter) = spec.filter() {
            restrictions.push(self.lower_expr(filter.as_expression())?);
        }
        if let Some(condition) = conjunction(restrictions) {
            query = query.filter(condition);
        }

        let mut group_by = Vec::new();
        for key in spec.group_by() {
            group_by.push(self.lower_expr(key)?);
        }
        if !group_by.is_empty() {
            query = query.group_by(group_by.clone());
        }
        if let Some(having) = spec.having() {
            query = query.having(self.lower_expr(having.as_expression())?);
        }

        let mut order_by = Vec::new();
        for key in spec.order_by() {
            let expr = self.lower_expr(&key.expr)?;
            let mut item = match key.dir {
                SortDir::Asc => OrderByExpr::asc(expr),
                SortDir::Desc => OrderByExpr::desc(expr),
            };
            item.nulls = key.nulls;
            order_by.push(item);
        }
        if order_by.is_empty() && spec.is_paged() {
            order_by = default_order(spec, &query, group_by);
            tracing::debug!(keys = order_by.len(), "applied default order to paged query");
        }
        if !order_by.is_empty() {
            query = query.order_by(order_by);
        }

        if let Some(offset) = spec.offset() {
            query = query.offset(offset);
        }
        if let Some(limit) = spec.limit() {
            query = query.limit(limit);
        }

        query.joins.extend(self.flush_implicit().into_iter().map(|p| p.join));
        if let Some(scope) = self.scopes.last() {
            require_inner(&mut query.joins, &scope.required);
        }

        Ok((query, RowLayout { slots }))
    }

    /// Relation, discriminator and `on()` conditions of one join.
    fn join_conditions(&mut self, join: &JoinClause) -> QueryResult<Vec<Expr>> {
        let target = &join.target;
        let alias = target.alias_name();
        let mut conditions = Vec::new();
        if let Some(via) = &join.via {
            let identity = target.descriptor().identity().ok_or_else(|| {
                QueryError::InvalidState(format!("join target '{}' has no identity", target.name()))
            })?;
            let fk = self.lower_path(via)?;
            conditions.push(table_col(alias, &identity.column).eq(fk));
        }
        if let Some(restriction) = discriminator_restriction(target.descriptor(), alias) {
            conditions.push(restriction);
        }
        if let Some(on) = &join.on {
            conditions.push(self.lower_expr(on.as_expression())?);
        }
        Ok(conditions)
    }

    fn set_in_left_join(&mut self, value: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.in_left_join = value;
        }
    }

    fn flush_implicit(&mut self) -> Vec<PendingJoin> {
        self.scopes
            .last_mut()
            .map(|scope| std::mem::take(&mut scope.pending))
            .unwrap_or_default()
    }

    /// Whether `alias` is a left join target in the scope that binds it.
    fn is_optional(&self, alias: &str) -> bool {
        self.scopes
            .iter()
            .rev()
            .find(|s| s.bound.contains_key(alias))
            .is_some_and(|s| s.optional.contains(alias))
    }

    fn reads_optional(&self, expr: &Expression) -> bool {
        let mut aliases = BTreeSet::new();
        expr.referenced_aliases(&mut aliases);
        aliases.iter().any(|alias| self.is_optional(alias))
    }

    /// Column reference for `path`, registering implicit joins for its hops
    /// in the current scope.
    fn lower_path(&mut self, path: &AttrPath) -> QueryResult<Expr> {
        if path.hops().is_empty() {
            return Ok(table_col(path.root_alias(), path.column()));
        }

        let root = path.root_alias();
        if !self.scopes.iter().any(|s| s.bound.contains_key(root)) {
            return Err(QueryError::InvalidState(format!("alias '{}' is not bound", root)));
        }
        let optional = self.is_optional(root);
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| QueryError::InvalidState("path lowered outside a query".into()))?;
        let join_type = if optional || scope.in_left_join {
            JoinType::Left
        } else {
            JoinType::Inner
        };

        let mut previous = root.to_string();
        for (depth, hop) in path.hops().iter().enumerate() {
            let alias = implicit_alias(
                root,
                path.hops()[..=depth].iter().map(|h| h.attribute.as_str()),
            );
            match scope.implicit.get(&alias).copied() {
                None => {
                    let identity = hop.target.identity().ok_or_else(|| {
                        QueryError::InvalidState(format!(
                            "relation target '{}' has no identity",
                            hop.target.name
                        ))
                    })?;
                    let mut on = table_col(&alias, &identity.column)
                        .eq(table_col(&previous, &hop.fk_column));
                    if let Some(restriction) = discriminator_restriction(&hop.target, &alias) {
                        on = on.and(restriction);
                    }
                    scope.implicit.insert(alias.clone(), join_type);
                    scope.pending.push(PendingJoin {
                        root: root.to_string(),
                        join: Join {
                            join_type,
                            table: table_ref(&hop.target, &alias),
                            on,
                        },
                    });
                }
                Some(JoinType::Left) if join_type == JoinType::Inner => {
                    scope.required.insert(alias.clone());
                }
                Some(_) => {}
            }
            previous = alias;
        }
        Ok(table_col(&previous, path.column()))
    }

    fn lower_expr(&mut self, expr: &Expression) -> QueryResult<Expr> {
        Ok(match expr.kind() {
            ExprKind::Literal(Value::Null) => Expr::Literal(Literal::Null),
            ExprKind::Literal(value) => Expr::Param(value.clone()),
            ExprKind::Path(path) => self.lower_path(path)?,
            ExprKind::Compare { op, left, right } => {
                let left = self.lower_operand(left)?;
                let right = self.lower_operand(right)?;
                left.binary(compare_operator(*op), right)
            }
            ExprKind::Between { expr, low, high } => Expr::Between {
                expr: Box::new(self.lower_operand(expr)?),
                low: Box::new(self.lower_operand(low)?),
                high: Box::new(self.lower_operand(high)?),
                negated: false,
            },
            // no candidates: matches nothing on every dialect
            ExprKind::In { values, .. } if values.is_empty() => lit_int(1).eq(lit_int(0)),
            ExprKind::In { expr, values } => {
                let mut lowered = Vec::with_capacity(values.len());
                for value in values {
                    lowered.push(self.lower_operand(value)?);
                }
                self.lower_operand(expr)?.in_list(lowered)
            }
            ExprKind::Like { expr, pattern } => self
                .lower_operand(expr)?
                .like(Expr::Param(Value::Text(pattern.clone()))),
            ExprKind::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(self.lower_operand(expr)?),
                negated: *negated,
            },
            ExprKind::Arithmetic { op, left, right } => {
                let left = self.lower_operand(left)?;
                let right = self.lower_operand(right)?;
                left.binary(arith_operator(*op), right)
            }
            ExprKind::Aggregate {
                func,
                arg,
                distinct,
            } => match arg {
                None => count_star(),
                Some(arg) => Expr::Function {
                    name: func.name().to_string(),
                    args: vec![self.lower_expr(arg)?],
                    distinct: *distinct,
                },
            },
            ExprKind::Case {
                operand,
                branches,
                default,
            } => {
                let operand = match operand {
                    Some(o) => Some(Box::new(self.lower_operand(o)?)),
                    None => None,
                };
                let mut when_clauses = Vec::with_capacity(branches.len());
                for (when, then) in branches {
                    when_clauses.push((self.lower_expr(when)?, self.lower_expr(then)?));
                }
                Expr::Case {
                    operand,
                    when_clauses,
                    else_clause: Some(Box::new(self.lower_expr(default)?)),
                }
            }
            ExprKind::Subquery(spec) => Expr::Subquery(Box::new(self.lower_subquery(spec)?)),
            ExprKind::And(left, right) => {
                let left = self.lower_logical_operand(left)?;
                let right = self.lower_logical_operand(right)?;
                left.and(right)
            }
            ExprKind::Or(left, right) => {
                let left = self.lower_logical_operand(left)?;
                let right = self.lower_logical_operand(right)?;
                left.or(right)
            }
            ExprKind::Not(inner) => Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(self.lower_expr(inner)?.paren()),
            },
        })
    }

    /// Operand of a comparison or arithmetic node; compound operands are
    /// parenthesized.
    fn lower_operand(&mut self, expr: &Expression) -> QueryResult<Expr> {
        let lowered = self.lower_expr(expr)?;
        Ok(if is_atomic(expr) {
            lowered
        } else {
            lowered.paren()
        })
    }

    /// Operand of AND/OR; only nested AND/OR nodes are parenthesized.
    fn lower_logical_operand(&mut self, expr: &Expression) -> QueryResult<Expr> {
        let lowered = self.lower_expr(expr)?;
        Ok(match expr.kind() {
            ExprKind::And(..) | ExprKind::Or(..) => lowered.paren(),
            _ => lowered,
        })
    }

    fn lower_subquery(&mut self, spec: &QuerySpec) -> QueryResult<Query> {
        let outer = spec.outer_references();
        for alias in &outer {
            if !self.scopes.iter().any(|s| s.bound.contains_key(alias)) {
                return Err(QueryError::InvalidState(format!(
                    "subquery references alias '{}', which no enclosing query binds",
                    alias
                )));
            }
        }
        tracing::debug!(
            correlated = !outer.is_empty(),
            outer = ?outer,
            "lowering subquery"
        );
        let (query, _) = self.lower_spec(spec)?;
        Ok(query)
    }
}

/// Turn the implicit joins named in `required` into inner joins.
fn require_inner(joins: &mut [Join], required: &BTreeSet<String>) {
    for join in joins {
        if join.table.alias.as_ref().is_some_and(|a| required.contains(a)) {
            join.join_type = JoinType::Inner;
        }
        if let TableFactor::Nested { joins, .. } = &mut join.table.factor {
            require_inner(joins, required);
        }
    }
}

fn is_atomic(expr: &Expression) -> bool {
    matches!(
        expr.kind(),
        ExprKind::Literal(_)
            | ExprKind::Path(_)
            | ExprKind::Aggregate { .. }
            | ExprKind::Case { .. }
            | ExprKind::Subquery(_)
    )
}

fn compare_operator(op: CompareOp) -> BinaryOperator {
    match op {
        CompareOp::Eq => BinaryOperator::Eq,
        CompareOp::Ne => BinaryOperator::Ne,
        CompareOp::Lt => BinaryOperator::Lt,
        CompareOp::Gt => BinaryOperator::Gt,
        CompareOp::Lte => BinaryOperator::Lte,
        CompareOp::Gte => BinaryOperator::Gte,
    }
}

fn arith_operator(op: ArithOp) -> BinaryOperator {
    match op {
        ArithOp::Add => BinaryOperator::Plus,
        ArithOp::Sub => BinaryOperator::Minus,
        ArithOp::Mul => BinaryOperator::Mul,
        ArithOp::Div => BinaryOperator::Div,
    }
}

fn table_ref(descriptor: &EntityDescriptor, alias: &str) -> TableRef {
    let table = TableRef::new(&descriptor.table).with_alias(alias);
    match &descriptor.schema {
        Some(schema) => table.with_schema(schema),
        None => table,
    }
}

/// `alias.dtype = 'Book'` (or `IN (...)` for a subtype with descendants).
fn discriminator_restriction(descriptor: &EntityDescriptor, alias: &str) -> Option<Expr> {
    let discriminator = descriptor.discriminator_filter()?;
    let column = table_col(alias, &discriminator.column);
    Some(match discriminator.values.as_slice() {
        [single] => column.eq(lit_str(single)),
        values => column.in_list(values.iter().map(|v| lit_str(v)).collect()),
    })
}

/// AND of `conditions`. A lone condition is returned as is; compound
/// members are parenthesized.
fn conjunction(conditions: Vec<Expr>) -> Option<Expr> {
    if conditions.len() <= 1 {
        return conditions.into_iter().next();
    }
    conditions
        .into_iter()
        .map(|c| match c {
            Expr::BinaryOp {
                op: BinaryOperator::And | BinaryOperator::Or,
                ..
            } => c.paren(),
            other => other,
        })
        .reduce(|acc, next| acc.and(next))
}

/// Order used when a paged spec has none of its own.
fn default_order(spec: &QuerySpec, query: &Query, group_by: Vec<Expr>) -> Vec<OrderByExpr> {
    if !group_by.is_empty() {
        return group_by.into_iter().map(OrderByExpr::asc).collect();
    }
    if spec.is_aggregate() {
        // a single aggregate row needs no order
        return Vec::new();
    }
    if spec.is_distinct() {
        return query
            .select
            .iter()
            .map(|item| OrderByExpr::asc(item.expr.clone()))
            .collect();
    }
    spec.sources()
        .iter()
        .chain(spec.joins().iter().map(|j| &j.target))
        .filter_map(|entity| {
            entity
                .descriptor()
                .identity()
                .map(|id| OrderByExpr::asc(table_col(entity.alias_name(), &id.column)))
        })
        .collect()
}

/// Column label for an expression projection.
fn label(expr: &Expression, index: usize) -> String {
    match expr.kind() {
        ExprKind::Path(path) => path.dotted(),
        ExprKind::Aggregate { func, arg: None, .. } => format!("{}(*)", func.name()),
        ExprKind::Aggregate {
            func,
            arg: Some(arg),
            distinct,
        } => match arg.kind() {
            ExprKind::Path(path) if *distinct => format!("{}(distinct {})", func.name(), path),
            ExprKind::Path(path) => format!("{}({})", func.name(), path),
            _ => format!("{}_{}", func.name(), index + 1),
        },
        _ => format!("expr_{}", index + 1),
    }
}
