//! Deterministic rewrites for the issue codes that have one.
//!
//! The corrector makes exactly one pass per call and never re-scores; the
//! caller evaluates the corrected SQL and decides whether to try again.
//! Rewrites reach every SELECT block of the statement: CTE bodies,
//! subqueries, derived tables and each side of a set operation.

use sqlparser::ast::{
    BinaryOperator, Expr, GroupByExpr, Ident, ObjectName, Query, Select, SetExpr, Statement,
    VisitMut, VisitorMut,
};
use sqlparser::dialect::dialect_from_str;
use sqlparser::parser::Parser;
use std::ops::ControlFlow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::{CorrectionResult, FixCode, Issue, IssueCode, Replacement};
use crate::parser::extract::object_name;
use crate::parser::{expression_depth, ExprSummary, SelectShape};
use crate::validators::semantic::ungrouped_columns;

/// Rewrites applied in this order when several are requested
const FIX_ORDER: [FixCode; 3] = [
    FixCode::RenameToSuggestion,
    FixCode::MoveAggregateToHaving,
    FixCode::AddGroupByColumns,
];

/// The rewrite registered for an issue code, if any.
///
/// Renames only apply to issues that carry a [`Replacement`].
pub fn registered_fix(code: IssueCode) -> Option<FixCode> {
    match code {
        IssueCode::HallucinatedTable | IssueCode::HallucinatedColumn => {
            Some(FixCode::RenameToSuggestion)
        }
        IssueCode::AggregateInWhere => Some(FixCode::MoveAggregateToHaving),
        IssueCode::GroupByMismatch | IssueCode::MissingGroupBy => Some(FixCode::AddGroupByColumns),
        _ => None,
    }
}

fn requests(issue: &Issue, fix: FixCode) -> bool {
    registered_fix(issue.code) == Some(fix)
        && (fix != FixCode::RenameToSuggestion || issue.replacement.is_some())
}

#[derive(Debug, Clone)]
pub struct SelfCorrector {
    dialect: String,
    recursion_limit: usize,
    max_expression_depth: usize,
}

impl SelfCorrector {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        if dialect_from_str(&config.parser.dialect).is_none() {
            return Err(EngineError::UnknownDialect(config.parser.dialect.clone()));
        }
        Ok(Self {
            dialect: config.parser.dialect.clone(),
            recursion_limit: config.parser.recursion_limit,
            max_expression_depth: config.parser.max_expression_depth,
        })
    }

    /// Applies every registered rewrite that `issues` call for to each
    /// SELECT block of `sql`.
    ///
    /// `corrected_sql` is `None` when no rewrite changed anything.
    pub fn correct(&self, sql: &str, issues: &[Issue]) -> CorrectionResult {
        let requested: Vec<FixCode> = FIX_ORDER
            .into_iter()
            .filter(|fix| issues.iter().any(|issue| requests(issue, *fix)))
            .collect();
        if requested.is_empty() {
            return CorrectionResult::unchanged();
        }

        let Some(mut statements) = self.parse(sql) else {
            return CorrectionResult::unchanged();
        };

        let mut rewriter = Rewriter::new(&requested, issues);
        let _ = statements.visit(&mut rewriter);
        let applied_fixes: Vec<FixCode> = requested
            .iter()
            .copied()
            .filter(|fix| rewriter.applied.contains(fix))
            .collect();
        if applied_fixes.is_empty() {
            return CorrectionResult::unchanged();
        }

        let corrected = statements
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        debug!(fixes = ?applied_fixes, %corrected, "rewrote query");
        CorrectionResult {
            corrected_sql: Some(corrected),
            applied_fixes,
            attempts: 1,
        }
    }

    fn parse(&self, sql: &str) -> Option<Vec<Statement>> {
        if let Some(depth) = expression_depth(&self.dialect, sql) {
            if depth > self.max_expression_depth {
                debug!(depth, limit = self.max_expression_depth, "expression too deep to rewrite");
                return None;
            }
        }

        let dialect = dialect_from_str(&self.dialect)?;
        let parsed = catch_unwind(AssertUnwindSafe(|| {
            Parser::new(dialect.as_ref())
                .with_recursion_limit(self.recursion_limit)
                .try_with_sql(sql)
                .and_then(|mut parser| parser.parse_statements())
        }));
        match parsed {
            Ok(Ok(statements)) => Some(statements),
            Ok(Err(err)) => {
                debug!(%err, "cannot correct unparsable SQL");
                None
            }
            Err(_) => {
                warn!("SQL parser panicked while preparing a correction");
                None
            }
        }
    }
}

/// Applies the requested rewrites while walking the statement.
///
/// Names are renamed on the way down; the SELECT-level fixes run once a
/// query's children have been visited, so inner blocks are fixed first.
struct Rewriter<'a> {
    requested: &'a [FixCode],
    tables: Vec<&'a Replacement>,
    columns: Vec<&'a Replacement>,
    applied: Vec<FixCode>,
}

impl<'a> Rewriter<'a> {
    fn new(requested: &'a [FixCode], issues: &'a [Issue]) -> Self {
        let mut tables = Vec::new();
        let mut columns = Vec::new();
        if requested.contains(&FixCode::RenameToSuggestion) {
            for issue in issues {
                match (issue.code, &issue.replacement) {
                    (IssueCode::HallucinatedTable, Some(replacement)) => tables.push(replacement),
                    (IssueCode::HallucinatedColumn, Some(replacement)) => columns.push(replacement),
                    _ => {}
                }
            }
        }
        Self {
            requested,
            tables,
            columns,
            applied: Vec::new(),
        }
    }

    fn mark(&mut self, fix: FixCode) {
        if !self.applied.contains(&fix) {
            self.applied.push(fix);
        }
    }

    fn table_for(&self, name: &str) -> Option<&'a Replacement> {
        self.tables
            .iter()
            .copied()
            .find(|replacement| replacement.from.eq_ignore_ascii_case(name))
    }

    fn column_for(&self, name: &str) -> Option<&'a Replacement> {
        self.columns
            .iter()
            .copied()
            .find(|replacement| replacement.from.eq_ignore_ascii_case(name))
    }
}

impl VisitorMut for Rewriter<'_> {
    type Break = ();

    fn post_visit_relation(&mut self, relation: &mut ObjectName) -> ControlFlow<Self::Break> {
        if let Some(replacement) = self.table_for(&object_name(relation)) {
            *relation = dotted(&replacement.to);
            self.mark(FixCode::RenameToSuggestion);
        }
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => {
                if let Some(replacement) = self.column_for(&ident.value) {
                    ident.value = replacement.to.clone();
                    self.mark(FixCode::RenameToSuggestion);
                }
            }
            Expr::CompoundIdentifier(idents) if !idents.is_empty() => {
                let last = idents.len() - 1;
                if let Some(replacement) = self.column_for(&idents[last].value) {
                    idents[last].value = replacement.to.clone();
                    self.mark(FixCode::RenameToSuggestion);
                }
                let qualifier = idents[..last]
                    .iter()
                    .map(|ident| ident.value.as_str())
                    .collect::<Vec<_>>()
                    .join(".");
                if let Some(replacement) = self.table_for(&qualifier) {
                    let column = idents[last].clone();
                    *idents = dotted(&replacement.to).0;
                    idents.push(column);
                    self.mark(FixCode::RenameToSuggestion);
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, query: &mut Query) -> ControlFlow<Self::Break> {
        let requested = self.requested;
        let mut applied = Vec::new();
        for_each_select(query.body.as_mut(), &mut |select: &mut Select| {
            for fix in requested {
                let changed = match fix {
                    FixCode::RenameToSuggestion => false,
                    FixCode::MoveAggregateToHaving => move_aggregates_to_having(select),
                    FixCode::AddGroupByColumns => add_group_by_columns(select),
                };
                if changed {
                    applied.push(*fix);
                }
            }
        });
        for fix in applied {
            self.mark(fix);
        }
        ControlFlow::Continue(())
    }
}

fn dotted(name: &str) -> ObjectName {
    ObjectName(name.split('.').map(Ident::new).collect())
}

/// Calls `apply` on each SELECT of a query body. Nested queries are left to
/// the visitor, which reaches them as queries of their own.
fn for_each_select(body: &mut SetExpr, apply: &mut dyn FnMut(&mut Select)) {
    match body {
        SetExpr::Select(select) => apply(select.as_mut()),
        SetExpr::SetOperation { left, right, .. } => {
            for_each_select(left.as_mut(), apply);
            for_each_select(right.as_mut(), apply);
        }
        _ => {}
    }
}

/// Moves WHERE conjuncts that call an aggregate into HAVING.
fn move_aggregates_to_having(select: &mut Select) -> bool {
    let has_aggregate = select
        .selection
        .as_ref()
        .is_some_and(|selection| ExprSummary::of(selection).has_aggregate());
    if !has_aggregate {
        return false;
    }
    let Some(selection) = select.selection.take() else {
        return false;
    };

    let (aggregated, kept): (Vec<Expr>, Vec<Expr>) = split_conjuncts(selection)
        .into_iter()
        .partition(|conjunct| ExprSummary::of(conjunct).has_aggregate());
    select.selection = conjoin(kept);
    select.having = conjoin(select.having.take().into_iter().chain(aggregated).collect());
    true
}

/// Appends the ungrouped SELECT-list columns to GROUP BY.
fn add_group_by_columns(select: &mut Select) -> bool {
    let missing = ungrouped_columns(&SelectShape::from_select(select, None));
    if missing.is_empty() {
        return false;
    }
    match &mut select.group_by {
        GroupByExpr::All(_) => false,
        GroupByExpr::Expressions(exprs, _) => {
            exprs.extend(missing.iter().map(|column| column.to_expr()));
            true
        }
    }
}

fn split_conjuncts(expr: Expr) -> Vec<Expr> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let mut conjuncts = split_conjuncts(*left);
            conjuncts.extend(split_conjuncts(*right));
            conjuncts
        }
        Expr::Nested(inner)
            if matches!(
                inner.as_ref(),
                Expr::BinaryOp {
                    op: BinaryOperator::And,
                    ..
                }
            ) =>
        {
            split_conjuncts(*inner)
        }
        other => vec![other],
    }
}

fn conjoin(parts: Vec<Expr>) -> Option<Expr> {
    parts
        .into_iter()
        .map(|part| match part {
            Expr::BinaryOp {
                op: BinaryOperator::Or,
                ..
            } => Expr::Nested(Box::new(part)),
            part => part,
        })
        .reduce(|left, right| Expr::BinaryOp {
            left: Box::new(left),
            op: BinaryOperator::And,
            right: Box::new(right),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrector() -> SelfCorrector {
        SelfCorrector::new(&EngineConfig::default()).unwrap()
    }

    fn issue(code: IssueCode) -> Issue {
        Issue::new(code, "test")
    }

    fn rename(code: IssueCode, from: &str, to: &str) -> Issue {
        issue(code).with_replacement(from, to)
    }

    #[test]
    fn registry_covers_grouping_and_where_aggregates() {
        assert_eq!(
            registered_fix(IssueCode::AggregateInWhere),
            Some(FixCode::MoveAggregateToHaving)
        );
        assert_eq!(
            registered_fix(IssueCode::MissingGroupBy),
            Some(FixCode::AddGroupByColumns)
        );
        assert_eq!(
            registered_fix(IssueCode::HallucinatedColumn),
            Some(FixCode::RenameToSuggestion)
        );
        assert_eq!(registered_fix(IssueCode::UnknownTable), None);
    }

    #[test]
    fn moves_aggregate_conjuncts_into_having() {
        let result = corrector().correct(
            "SELECT region, SUM(net_revenue) FROM sales WHERE fiscal_year = 2024 AND SUM(net_revenue) > 1000 GROUP BY region",
            &[issue(IssueCode::AggregateInWhere)],
        );
        assert_eq!(
            result.corrected_sql.as_deref(),
            Some("SELECT region, SUM(net_revenue) FROM sales WHERE fiscal_year = 2024 GROUP BY region HAVING SUM(net_revenue) > 1000")
        );
        assert_eq!(result.applied_fixes, vec![FixCode::MoveAggregateToHaving]);
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn extends_an_existing_having_clause() {
        let result = corrector().correct(
            "SELECT region FROM sales WHERE COUNT(*) > 1 OR MAX(net_revenue) > 5 GROUP BY region HAVING SUM(net_revenue) > 0",
            &[issue(IssueCode::AggregateInWhere)],
        );
        assert_eq!(
            result.corrected_sql.as_deref(),
            Some("SELECT region FROM sales GROUP BY region HAVING SUM(net_revenue) > 0 AND (COUNT(*) > 1 OR MAX(net_revenue) > 5)")
        );
    }

    #[test]
    fn adds_missing_group_by_columns() {
        let result = corrector().correct(
            "SELECT sales.region, fiscal_year, COUNT(*) FROM sales",
            &[issue(IssueCode::MissingGroupBy)],
        );
        assert_eq!(
            result.corrected_sql.as_deref(),
            Some("SELECT sales.region, fiscal_year, COUNT(*) FROM sales GROUP BY sales.region, fiscal_year")
        );
    }

    #[test]
    fn appends_to_an_existing_group_by() {
        let result = corrector().correct(
            "SELECT region, fiscal_year, SUM(x) FROM sales GROUP BY region",
            &[issue(IssueCode::GroupByMismatch)],
        );
        assert_eq!(
            result.corrected_sql.as_deref(),
            Some("SELECT region, fiscal_year, SUM(x) FROM sales GROUP BY region, fiscal_year")
        );
    }

    #[test]
    fn fixes_reach_subqueries() {
        let result = corrector().correct(
            "SELECT region FROM sales WHERE region IN (SELECT region FROM sales WHERE SUM(net_revenue) > 10 GROUP BY region)",
            &[issue(IssueCode::AggregateInWhere)],
        );
        assert_eq!(
            result.corrected_sql.as_deref(),
            Some("SELECT region FROM sales WHERE region IN (SELECT region FROM sales GROUP BY region HAVING SUM(net_revenue) > 10)")
        );
    }

    #[test]
    fn fixes_reach_both_sides_of_a_union() {
        let result = corrector().correct(
            "SELECT region, COUNT(*) FROM sales UNION ALL SELECT region, COUNT(*) FROM archive",
            &[issue(IssueCode::MissingGroupBy)],
        );
        assert_eq!(
            result.corrected_sql.as_deref(),
            Some("SELECT region, COUNT(*) FROM sales GROUP BY region UNION ALL SELECT region, COUNT(*) FROM archive GROUP BY region")
        );
    }

    #[test]
    fn fixes_reach_cte_bodies() {
        let result = corrector().correct(
            "WITH totals AS (SELECT region, SUM(net_revenue) AS total FROM sales WHERE SUM(net_revenue) > 0 GROUP BY region) SELECT region, total FROM totals",
            &[issue(IssueCode::AggregateInWhere)],
        );
        assert_eq!(
            result.corrected_sql.as_deref(),
            Some("WITH totals AS (SELECT region, SUM(net_revenue) AS total FROM sales GROUP BY region HAVING SUM(net_revenue) > 0) SELECT region, total FROM totals")
        );
        assert_eq!(result.applied_fixes, vec![FixCode::MoveAggregateToHaving]);
    }

    #[test]
    fn renames_invented_names_to_their_suggestion() {
        let result = corrector().correct(
            "SELECT s.regoin, SUM(net_revenu) FROM sale s GROUP BY regoin",
            &[
                rename(IssueCode::HallucinatedColumn, "regoin", "region"),
                rename(IssueCode::HallucinatedColumn, "net_revenu", "net_revenue"),
                rename(IssueCode::HallucinatedTable, "sale", "sales"),
            ],
        );
        assert_eq!(
            result.corrected_sql.as_deref(),
            Some("SELECT s.region, SUM(net_revenue) FROM sales AS s GROUP BY region")
        );
        assert_eq!(result.applied_fixes, vec![FixCode::RenameToSuggestion]);
    }

    #[test]
    fn renames_table_qualifiers() {
        let result = corrector().correct(
            "SELECT sale.region FROM sale",
            &[rename(IssueCode::HallucinatedTable, "sale", "sales")],
        );
        assert_eq!(
            result.corrected_sql.as_deref(),
            Some("SELECT sales.region FROM sales")
        );
    }

    #[test]
    fn renames_need_a_replacement() {
        let result = corrector().correct(
            "SELECT regoin FROM sales",
            &[issue(IssueCode::HallucinatedColumn)],
        );
        assert_eq!(result, CorrectionResult::unchanged());
    }

    #[test]
    fn overly_deep_input_is_left_alone() {
        let sql = format!(
            "SELECT region FROM sales WHERE {}SUM(net_revenue) > 0",
            "fiscal_year = 1 AND ".repeat(5_000)
        );
        let result = corrector().correct(&sql, &[issue(IssueCode::AggregateInWhere)]);
        assert_eq!(result.corrected_sql, None);
    }

    #[test]
    fn unregistered_codes_are_left_alone() {
        let result = corrector().correct(
            "SELECT region FROM revenues",
            &[issue(IssueCode::UnknownTable), issue(IssueCode::SelectStar)],
        );
        assert_eq!(result, CorrectionResult::unchanged());
        assert!(!result.is_corrected());
    }

    #[test]
    fn nothing_to_rewrite_yields_no_sql() {
        let result = corrector().correct(
            "SELECT region FROM sales WHERE region = 'x'",
            &[issue(IssueCode::AggregateInWhere)],
        );
        assert_eq!(result.corrected_sql, None);
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn unparsable_sql_is_not_corrected() {
        let result = corrector().correct("SELEC nope", &[issue(IssueCode::AggregateInWhere)]);
        assert_eq!(result.corrected_sql, None);
    }
}
