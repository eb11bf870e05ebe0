//! Query builder - construct SQL SELECT statements with a fluent API.

use super::dialect::{Dialect, SqlDialect};
use super::expr::{lit_int, Expr, ExprExt};
use super::token::{Statement, Token, TokenStream};

// =============================================================================
// Select Expression (column with optional alias)
// =============================================================================

/// A SELECT list item: expression with optional alias.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct SelectExpr {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectExpr {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = self.expr.to_tokens_for_dialect(dialect);
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

impl From<Expr> for SelectExpr {
    fn from(expr: Expr) -> Self {
        SelectExpr::new(expr)
    }
}

// =============================================================================
// Table Reference
// =============================================================================

/// What a FROM item reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum TableFactor {
    /// A named table, optionally schema-qualified.
    Named {
        schema: Option<String>,
        name: String,
    },
    /// A derived table: `(SELECT ...)`.
    Derived(Box<Query>),
    /// A parenthesized join tree: `(t INNER JOIN u ON ...)`.
    Nested { table: Box<TableRef>, joins: Vec<Join> },
}

/// A FROM item with optional alias.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct TableRef {
    pub factor: TableFactor,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: &str) -> Self {
        Self {
            factor: TableFactor::Named {
                schema: None,
                name: table.into(),
            },
            alias: None,
        }
    }

    /// A derived table over `query`.
    pub fn derived(query: Query) -> Self {
        Self {
            factor: TableFactor::Derived(Box::new(query)),
            alias: None,
        }
    }

    /// `table` joined with `joins`, grouped so an outer join treats the
    /// whole tree as its target.
    pub fn nested(table: TableRef, joins: Vec<Join>) -> Self {
        Self {
            factor: TableFactor::Nested {
                table: Box::new(table),
                joins,
            },
            alias: None,
        }
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        if let TableFactor::Named { schema: s, .. } = &mut self.factor {
            *s = Some(schema.into());
        }
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        match &self.factor {
            TableFactor::Named { schema, name } => {
                ts.push(Token::QualifiedIdent {
                    schema: schema.clone(),
                    name: name.clone(),
                });
            }
            TableFactor::Derived(query) => {
                ts.lparen()
                    .append(&query.to_tokens_inline(dialect))
                    .rparen();
            }
            TableFactor::Nested { table, joins } => {
                ts.lparen().append(&table.to_tokens_for_dialect(dialect));
                for join in joins {
                    ts.space().append(&join.to_tokens_for_dialect(dialect));
                }
                ts.rparen();
            }
        }
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

// =============================================================================
// Joins
// =============================================================================

/// Type of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on: Expr,
}

impl Join {
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self.join_type {
            JoinType::Inner => ts.push(Token::Inner),
            JoinType::Left => ts.push(Token::Left),
        };

        ts.space().push(Token::Join).space();
        ts.append(&self.table.to_tokens_for_dialect(dialect));
        ts.space().push(Token::On).space();
        ts.append(&self.on.to_tokens_for_dialect(dialect));

        ts
    }
}

// =============================================================================
// ORDER BY
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// NULLS ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullsOrder {
    First,
    Last,
}

/// An ORDER BY expression.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct OrderByExpr {
    pub expr: Expr,
    pub dir: Option<SortDir>,
    pub nulls: Option<NullsOrder>,
}

impl OrderByExpr {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            dir: None,
            nulls: None,
        }
    }

    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            dir: Some(SortDir::Asc),
            nulls: None,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            dir: Some(SortDir::Desc),
            nulls: None,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    /// Convert to tokens for a specific dialect.
    ///
    /// Dialects without NULLS FIRST/LAST get a leading
    /// `CASE WHEN <expr> IS NULL THEN .. END` key that sorts nulls into
    /// the requested position ahead of the real key.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        if let Some(nulls) = self.nulls {
            if !dialect.supports_nulls_ordering() {
                let (null_rank, value_rank) = match nulls {
                    NullsOrder::First => (0, 1),
                    NullsOrder::Last => (1, 0),
                };
                let null_key = Expr::Case {
                    operand: None,
                    when_clauses: vec![(self.expr.clone().is_null(), lit_int(null_rank))],
                    else_clause: Some(Box::new(lit_int(value_rank))),
                };
                ts.append(&null_key.to_tokens_for_dialect(dialect));
                ts.comma().space();
            }
        }

        ts.append(&self.expr.to_tokens_for_dialect(dialect));

        if let Some(dir) = &self.dir {
            ts.space().push(match dir {
                SortDir::Asc => Token::Asc,
                SortDir::Desc => Token::Desc,
            });
        }

        if let Some(nulls) = &self.nulls {
            if dialect.supports_nulls_ordering() {
                ts.space().push(match nulls {
                    NullsOrder::First => Token::NullsFirst,
                    NullsOrder::Last => Token::NullsLast,
                });
            }
        }

        ts
    }
}

// =============================================================================
// LIMIT / OFFSET
// =============================================================================

/// LIMIT and OFFSET clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitOffset {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl LimitOffset {
    /// Convert to token stream using dialect-specific pagination.
    ///
    /// Delegates to `SqlDialect::emit_limit_offset()` for the actual formatting.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        dialect.emit_limit_offset(self.limit, self.offset)
    }
}

// =============================================================================
// Query Builder
// =============================================================================

/// A SELECT query.
///
/// Multiple FROM items render comma-separated (a cartesian source list).
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "Query has no effect until converted to SQL with to_sql() or to_statement()"]
pub struct Query {
    pub select: Vec<SelectExpr>,
    pub distinct: bool,
    pub from: Vec<TableRef>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit_offset: Option<LimitOffset>,
}

impl Query {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SELECT list.
    pub fn select(mut self, exprs: Vec<impl Into<SelectExpr>>) -> Self {
        self.select = exprs.into_iter().map(|e| e.into()).collect();
        self
    }

    /// Add DISTINCT.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Add a FROM item.
    pub fn from(mut self, table: TableRef) -> Self {
        self.from.push(table);
        self
    }

    /// Add a JOIN.
    pub fn join(mut self, join_type: JoinType, table: TableRef, on: Expr) -> Self {
        self.joins.push(Join {
            join_type,
            table,
            on,
        });
        self
    }

    /// Add an INNER JOIN.
    pub fn inner_join(self, table: TableRef, on: Expr) -> Self {
        self.join(JoinType::Inner, table, on)
    }

    /// Add a LEFT JOIN.
    pub fn left_join(self, table: TableRef, on: Expr) -> Self {
        self.join(JoinType::Left, table, on)
    }

    /// Add a WHERE condition (ANDed with existing conditions).
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Set the GROUP BY clause.
    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    /// Set the HAVING clause.
    pub fn having(mut self, condition: Expr) -> Self {
        self.having = Some(condition);
        self
    }

    /// Set the ORDER BY clause.
    pub fn order_by(mut self, exprs: Vec<OrderByExpr>) -> Self {
        self.order_by = exprs;
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_offset.get_or_insert_with(LimitOffset::default).limit = Some(limit);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, offset: u64) -> Self {
        self.limit_offset.get_or_insert_with(LimitOffset::default).offset = Some(offset);
        self
    }

    /// Convert to token stream for the default dialect.
    pub fn to_tokens(&self) -> TokenStream {
        self.to_tokens_for_dialect(Dialect::default())
    }

    /// Convert to token stream for a specific dialect, one clause per line.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        self.emit(dialect, false)
    }

    /// Single-line token stream, used when nested in another statement.
    pub fn to_tokens_inline(&self, dialect: Dialect) -> TokenStream {
        self.emit(dialect, true)
    }

    fn emit(&self, dialect: Dialect, inline: bool) -> TokenStream {
        let brk = |ts: &mut TokenStream| {
            if inline {
                ts.space();
            } else {
                ts.newline();
            }
        };

        let mut ts = TokenStream::new();

        // SELECT
        ts.push(Token::Select);
        if self.distinct {
            ts.space().push(Token::Distinct);
        }

        // Columns
        for (i, select_expr) in self.select.iter().enumerate() {
            if i > 0 {
                ts.comma();
            }
            if inline {
                ts.space();
            } else {
                ts.newline().indent(1);
            }
            ts.append(&select_expr.to_tokens_for_dialect(dialect));
        }

        // FROM
        if !self.from.is_empty() {
            brk(&mut ts);
            ts.push(Token::From).space();
            for (i, table) in self.from.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&table.to_tokens_for_dialect(dialect));
            }
        }

        // JOINs
        for join in &self.joins {
            brk(&mut ts);
            ts.append(&join.to_tokens_for_dialect(dialect));
        }

        // WHERE
        if let Some(where_clause) = &self.where_clause {
            brk(&mut ts);
            ts.push(Token::Where).space();
            ts.append(&where_clause.to_tokens_for_dialect(dialect));
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            brk(&mut ts);
            ts.push(Token::GroupBy).space();
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&expr.to_tokens_for_dialect(dialect));
            }
        }

        // HAVING
        if let Some(having) = &self.having {
            brk(&mut ts);
            ts.push(Token::Having).space();
            ts.append(&having.to_tokens_for_dialect(dialect));
        }

        // ORDER BY
        // T-SQL requires ORDER BY for OFFSET FETCH syntax.
        let needs_order_by_placeholder = dialect.requires_order_by_for_offset()
            && self.order_by.is_empty()
            && self.limit_offset.is_some();

        if !self.order_by.is_empty() {
            brk(&mut ts);
            ts.push(Token::OrderBy).space();
            for (i, order_expr) in self.order_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&order_expr.to_tokens_for_dialect(dialect));
            }
        } else if needs_order_by_placeholder {
            // Row order is unspecified here; callers wanting stable pages
            // must order explicitly.
            brk(&mut ts);
            ts.push(Token::OrderBy)
                .space()
                .lparen()
                .push(Token::Select)
                .space()
                .push(Token::Null)
                .rparen();
        }

        // LIMIT / OFFSET
        if let Some(lo) = &self.limit_offset {
            brk(&mut ts);
            ts.append(&lo.to_tokens(dialect));
        }

        ts
    }

    /// Generate SQL string for a specific dialect, parameters inlined.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens_for_dialect(dialect).serialize(dialect)
    }

    /// Generate a parameterized statement for a specific dialect.
    pub fn to_statement(&self, dialect: Dialect) -> Statement {
        self.to_tokens_for_dialect(dialect).render(dialect)
    }
}

impl std::fmt::Display for Query {
    /// Formats the query using the default dialect (SQLite).
    ///
    /// For dialect-specific SQL, use [`Query::to_sql`] instead.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sql(Dialect::default()))
    }
}

// =============================================================================
// Tests
// =============================================================================
