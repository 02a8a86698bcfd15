//! Clause-level view of a single SELECT block.

use sqlparser::ast::{
    BinaryOperator, Expr, GroupByExpr, Query, Select, SelectItem, TableFactor, UnaryOperator,
    Value, Visit, Visitor,
};
use std::collections::BTreeSet;
use std::ops::ControlFlow;

use super::extract::{is_comparison, object_name, ColumnRef};
use crate::functions::{is_aggregate, normalize_function_name};

/// What an expression references, ignoring anything inside subqueries.
#[derive(Debug, Clone, Default)]
pub struct ExprSummary {
    /// Lower-cased rendering, used to compare whole expressions
    pub text: String,
    /// Every column referenced
    pub columns: Vec<ColumnRef>,
    /// Columns referenced outside any aggregate call
    pub bare_columns: Vec<ColumnRef>,
    /// Upper-cased names of (non-windowed) aggregate calls
    pub aggregates: Vec<String>,
    /// Set when the expression is a single column
    pub column: Option<ColumnRef>,
    /// Set when the expression is a positional reference such as `1`
    pub ordinal: Option<usize>,
}

impl ExprSummary {
    pub fn of(expr: &Expr) -> Self {
        let summarizer = Summarizer::run(expr);
        Self {
            text: expr.to_string().to_lowercase(),
            columns: summarizer.columns,
            bare_columns: summarizer.bare_columns,
            aggregates: summarizer.aggregates,
            column: ColumnRef::from_expr(expr),
            ordinal: match expr {
                Expr::Value(Value::Number(number, _)) => number.parse().ok(),
                _ => None,
            },
        }
    }

    pub fn has_aggregate(&self) -> bool {
        !self.aggregates.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ProjectionItem {
    pub summary: ExprSummary,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub enum GroupBy {
    Absent,
    /// `GROUP BY ALL`
    All,
    Exprs(Vec<ExprSummary>),
}

/// Clause structure of one SELECT block.
#[derive(Debug, Clone)]
pub struct SelectShape {
    /// Part of the top-level query rather than a subquery or CTE
    pub outermost: bool,
    pub projection: Vec<ProjectionItem>,
    /// `*` or `t.*` appears in the SELECT list
    pub wildcard: bool,
    /// Number of comma-separated FROM relations
    pub from_relations: usize,
    /// Lower-cased names and aliases of every relation in FROM and JOIN
    pub sources: BTreeSet<String>,
    /// Columns referenced by JOIN constraints
    pub join_columns: Vec<ColumnRef>,
    pub selection: Option<ExprSummary>,
    pub group_by: GroupBy,
    pub having: Option<ExprSummary>,
    pub order_by: Vec<ExprSummary>,
    pub has_limit: bool,
    /// WHERE/HAVING leaves that always evaluate the same way
    pub constant_predicates: Vec<String>,
}

impl SelectShape {
    /// Builds the shape of `select`. `query` supplies ORDER BY and LIMIT,
    /// which belong to the enclosing query rather than the SELECT itself.
    pub fn from_select(select: &Select, query: Option<&Query>) -> Self {
        let mut projection = Vec::new();
        let mut wildcard = false;
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) => projection.push(ProjectionItem {
                    summary: ExprSummary::of(expr),
                    alias: None,
                }),
                SelectItem::ExprWithAlias { expr, alias } => {
                    projection.push(ProjectionItem {
                        summary: ExprSummary::of(expr),
                        alias: Some(alias.value.clone()),
                    })
                }
                _ => wildcard = true,
            }
        }

        let mut sources = BTreeSet::new();
        let mut join_columns = Vec::new();
        for table in &select.from {
            add_sources(&table.relation, &mut sources);
            for join in &table.joins {
                add_sources(&join.relation, &mut sources);
                join_columns.extend(Summarizer::run(&join.join_operator).columns);
            }
        }

        let group_by = match &select.group_by {
            GroupByExpr::All(_) => GroupBy::All,
            GroupByExpr::Expressions(exprs, _) if exprs.is_empty() => GroupBy::Absent,
            GroupByExpr::Expressions(exprs, _) => {
                GroupBy::Exprs(exprs.iter().map(ExprSummary::of).collect())
            }
        };

        let mut constant_predicates = Vec::new();
        for predicate in select.selection.iter().chain(select.having.iter()) {
            collect_constant_predicates(predicate, &mut constant_predicates);
        }

        let order_by = query
            .and_then(|query| query.order_by.as_ref())
            .map(|order_by| {
                order_by
                    .exprs
                    .iter()
                    .map(|item| ExprSummary::of(&item.expr))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            outermost: false,
            projection,
            wildcard,
            from_relations: select.from.len(),
            sources,
            join_columns,
            selection: select.selection.as_ref().map(ExprSummary::of),
            group_by,
            having: select.having.as_ref().map(ExprSummary::of),
            order_by,
            has_limit: select.top.is_some()
                || query.is_some_and(|query| query.limit.is_some() || query.fetch.is_some()),
            constant_predicates,
        }
    }

    /// True if the SELECT list calls an aggregate outside a window
    pub fn has_aggregate_projection(&self) -> bool {
        self.projection.iter().any(|item| item.summary.has_aggregate())
    }

    pub fn projection_aliases(&self) -> impl Iterator<Item = &str> {
        self.projection.iter().filter_map(|item| item.alias.as_deref())
    }

    /// Lower-cased column names the block mentions outside ORDER BY
    pub fn declared_columns(&self) -> BTreeSet<String> {
        let mut declared: BTreeSet<String> = self
            .projection
            .iter()
            .flat_map(|item| item.summary.columns.iter())
            .chain(self.join_columns.iter())
            .chain(self.selection.iter().flat_map(|s| s.columns.iter()))
            .chain(self.having.iter().flat_map(|s| s.columns.iter()))
            .map(|column| column.name.to_lowercase())
            .collect();
        if let GroupBy::Exprs(exprs) = &self.group_by {
            declared.extend(
                exprs
                    .iter()
                    .flat_map(|expr| expr.columns.iter())
                    .map(|column| column.name.to_lowercase()),
            );
        }
        declared.extend(self.projection_aliases().map(str::to_lowercase));
        declared
    }
}

fn add_sources(relation: &TableFactor, sources: &mut BTreeSet<String>) {
    match relation {
        TableFactor::Table { name, alias, .. } => {
            let full = object_name(name).to_lowercase();
            if let Some(last) = full.rsplit('.').next() {
                sources.insert(last.to_string());
            }
            sources.insert(full);
            if let Some(alias) = alias {
                sources.insert(alias.name.value.to_lowercase());
            }
        }
        TableFactor::Derived {
            alias: Some(alias), ..
        } => {
            sources.insert(alias.name.value.to_lowercase());
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            add_sources(&table_with_joins.relation, sources);
            for join in &table_with_joins.joins {
                add_sources(&join.relation, sources);
            }
        }
        _ => {}
    }
}

/// Walks the AND/OR/NOT skeleton of a predicate and records leaves that
/// cannot depend on row data.
fn collect_constant_predicates(expr: &Expr, found: &mut Vec<String>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And | BinaryOperator::Or,
            right,
        } => {
            collect_constant_predicates(left, found);
            collect_constant_predicates(right, found);
        }
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: inner,
        }
        | Expr::Nested(inner) => collect_constant_predicates(inner, found),
        Expr::Value(Value::Boolean(_)) => found.push(expr.to_string()),
        Expr::BinaryOp { left, op, right } if is_comparison(op) => {
            let both_literals = is_literal(left) && is_literal(right);
            let same_column = match (ColumnRef::from_expr(left), ColumnRef::from_expr(right)) {
                (Some(left), Some(right)) => left.same_as(&right),
                _ => false,
            };
            if both_literals || same_column {
                found.push(expr.to_string());
            }
        }
        _ => {}
    }
}

fn is_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Value(value) => !matches!(value, Value::Placeholder(_)),
        Expr::Nested(inner) => is_literal(inner),
        Expr::UnaryOp { expr, .. } => is_literal(expr),
        _ => false,
    }
}

#[derive(Default)]
struct Summarizer {
    query_depth: usize,
    aggregate_depth: usize,
    columns: Vec<ColumnRef>,
    bare_columns: Vec<ColumnRef>,
    aggregates: Vec<String>,
}

impl Summarizer {
    fn run<T: Visit>(node: &T) -> Self {
        let mut summarizer = Self::default();
        let _ = node.visit(&mut summarizer);
        summarizer
    }

    fn aggregate_name(expr: &Expr) -> Option<String> {
        match expr {
            Expr::Function(function) if function.over.is_none() => {
                let name = object_name(&function.name);
                is_aggregate(&name).then(|| normalize_function_name(&name))
            }
            _ => None,
        }
    }
}

impl Visitor for Summarizer {
    type Break = ();

    fn pre_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.query_depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.query_depth -= 1;
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if self.query_depth > 0 {
            return ControlFlow::Continue(());
        }
        if let Some(name) = Self::aggregate_name(expr) {
            self.aggregates.push(name);
            self.aggregate_depth += 1;
        } else if matches!(expr, Expr::Identifier(_) | Expr::CompoundIdentifier(_)) {
            if let Some(column) = ColumnRef::from_expr(expr) {
                if self.aggregate_depth == 0 {
                    self.bare_columns.push(column.clone());
                }
                self.columns.push(column);
            }
        }
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if self.query_depth == 0 && Self::aggregate_name(expr).is_some() {
            self.aggregate_depth -= 1;
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::ast::{SetExpr, Statement};
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn shape(sql: &str) -> SelectShape {
        let statement = Parser::parse_sql(&GenericDialect {}, sql).unwrap().remove(0);
        let Statement::Query(query) = statement else {
            panic!("expected a query");
        };
        let SetExpr::Select(select) = query.body.as_ref() else {
            panic!("expected a plain select");
        };
        SelectShape::from_select(select, Some(&query))
    }

    #[test]
    fn separates_bare_and_aggregated_columns() {
        let shape = shape("SELECT region, SUM(net_revenue) AS total FROM sales GROUP BY region");
        let first = &shape.projection[0].summary;
        let second = &shape.projection[1].summary;
        assert_eq!(first.bare_columns, vec![ColumnRef::bare("region")]);
        assert!(second.bare_columns.is_empty());
        assert_eq!(second.aggregates, vec!["SUM".to_string()]);
        assert_eq!(shape.projection[1].alias.as_deref(), Some("total"));
        assert!(matches!(shape.group_by, GroupBy::Exprs(ref exprs) if exprs.len() == 1));
    }

    #[test]
    fn window_calls_are_not_aggregates() {
        let shape = shape("SELECT SUM(x) OVER (PARTITION BY y) FROM t");
        assert!(!shape.has_aggregate_projection());
    }

    #[test]
    fn subqueries_do_not_leak_into_summaries() {
        let shape = shape("SELECT a FROM t WHERE b > (SELECT MAX(b) FROM u)");
        let selection = shape.selection.unwrap();
        assert!(!selection.has_aggregate());
        assert_eq!(selection.columns, vec![ColumnRef::bare("b")]);
    }

    #[test]
    fn captures_order_limit_and_sources() {
        let shape = shape("SELECT s.a FROM sales s JOIN regions r ON s.rid = r.id ORDER BY 1 LIMIT 5");
        assert!(shape.has_limit);
        assert_eq!(shape.order_by[0].ordinal, Some(1));
        assert!(shape.sources.contains("s") && shape.sources.contains("regions"));
        assert_eq!(shape.join_columns.len(), 2);
    }

    #[test]
    fn finds_constant_predicates() {
        let shape = shape("SELECT a FROM t WHERE 1 = 1 AND (b = b OR NOT TRUE) AND c > 3");
        assert_eq!(shape.constant_predicates, vec!["1 = 1", "b = b", "true"]);
    }
}
