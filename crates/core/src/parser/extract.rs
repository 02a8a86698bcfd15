//! Flattens a parsed statement into the references validators look at.

use sqlparser::ast::{
    BinaryOperator, Expr, Ident, ObjectName, Query, SetExpr, Statement, TableFactor, Value, Visit,
    Visitor,
};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::ControlFlow;
use tracing::trace;

use super::shape::SelectShape;
use crate::functions::is_niladic;

/// A base-table reference as written in FROM or JOIN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

/// A column reference, optionally qualified by a table, alias or schema path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }

    pub fn from_idents(parts: &[Ident]) -> Option<Self> {
        let (last, rest) = parts.split_last()?;
        Some(Self {
            qualifier: if rest.is_empty() {
                None
            } else {
                Some(join_idents(rest))
            },
            name: last.value.clone(),
        })
    }

    /// The column an expression consists of, if it is nothing but a column
    pub fn from_expr(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::Identifier(ident) if ident.quote_style.is_some() || !is_niladic(&ident.value) => {
                Some(Self::bare(ident.value.clone()))
            }
            Expr::CompoundIdentifier(parts) => Self::from_idents(parts),
            Expr::Nested(inner) => Self::from_expr(inner),
            _ => None,
        }
    }

    pub fn same_as(&self, other: &ColumnRef) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && match (&self.qualifier, &other.qualifier) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                (None, None) => true,
                _ => false,
            }
    }

    /// Lower-cased `qualifier.name`, used to de-duplicate findings
    pub fn key(&self) -> String {
        self.to_string().to_lowercase()
    }

    /// Converts back into an expression for rewriting
    pub fn to_expr(&self) -> Expr {
        match &self.qualifier {
            None => Expr::Identifier(Ident::new(self.name.clone())),
            Some(qualifier) => {
                let mut parts: Vec<Ident> = qualifier.split('.').map(Ident::new).collect();
                parts.push(Ident::new(self.name.clone()));
                Expr::CompoundIdentifier(parts)
            }
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}.{}", qualifier, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    /// Called with an OVER clause
    pub windowed: bool,
}

/// `column <op> number`, in either operand order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralComparison {
    pub column: ColumnRef,
    pub literal: String,
}

/// The parsed form of the first statement in the input.
///
/// Owned by one evaluation; validators only read it.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub sql: String,
    pub statement: Statement,
    pub tables: Vec<TableRef>,
    /// Lower-cased names of CTEs declared anywhere in the statement
    pub ctes: BTreeSet<String>,
    /// Lower-cased aliases of derived tables and CTE references
    pub derived: BTreeSet<String>,
    /// True when any FROM reads something other than a base table
    pub reads_derived: bool,
    pub columns: Vec<ColumnRef>,
    pub functions: Vec<FunctionCall>,
    pub literals: Vec<String>,
    pub comparisons: Vec<LiteralComparison>,
    pub selects: Vec<SelectShape>,
}

impl ParsedStatement {
    pub fn from_statement(sql: &str, statement: Statement) -> Self {
        let mut extractor = Extractor::default();
        let _ = statement.visit(&mut extractor);

        let parsed = Self {
            sql: sql.to_string(),
            statement,
            tables: extractor.tables,
            ctes: extractor.ctes,
            derived: extractor.derived,
            reads_derived: extractor.reads_derived,
            columns: extractor.columns,
            functions: extractor.functions,
            literals: extractor.literals,
            comparisons: extractor.comparisons,
            selects: extractor.selects,
        };
        trace!(
            tables = parsed.tables.len(),
            columns = parsed.columns.len(),
            functions = parsed.functions.len(),
            selects = parsed.selects.len(),
            "extracted references"
        );
        parsed
    }

    pub fn is_query(&self) -> bool {
        matches!(self.statement, Statement::Query(_))
    }

    /// Lower-cased aliases given to SELECT-list expressions
    pub fn projection_aliases(&self) -> BTreeSet<String> {
        self.selects
            .iter()
            .flat_map(|select| select.projection.iter())
            .filter_map(|item| item.alias.as_ref())
            .map(|alias| alias.to_lowercase())
            .collect()
    }

    pub fn table_aliases(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().filter_map(|table| table.alias.as_deref())
    }

    /// True if the (lower-cased) qualifier names a CTE or a derived table
    pub fn is_derived_source(&self, qualifier: &str) -> bool {
        let lowered = qualifier.to_lowercase();
        self.ctes.contains(&lowered) || self.derived.contains(&lowered)
    }

    /// The outermost SELECT blocks
    pub fn outermost_selects(&self) -> impl Iterator<Item = &SelectShape> {
        self.selects.iter().filter(|select| select.outermost)
    }
}

#[derive(Default)]
struct Extractor {
    query_depth: usize,
    tables: Vec<TableRef>,
    ctes: BTreeSet<String>,
    derived: BTreeSet<String>,
    reads_derived: bool,
    columns: Vec<ColumnRef>,
    functions: Vec<FunctionCall>,
    literals: Vec<String>,
    comparisons: Vec<LiteralComparison>,
    selects: Vec<SelectShape>,
}

impl Extractor {
    fn collect_selects(&mut self, body: &SetExpr, query: &Query, outermost: bool, leftmost: bool) {
        match body {
            SetExpr::Select(select) => {
                let mut shape = SelectShape::from_select(select, Some(query));
                shape.outermost = outermost;
                // ORDER BY of a set operation is resolved against its first member
                if !leftmost {
                    shape.order_by.clear();
                }
                self.selects.push(shape);
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.collect_selects(left, query, outermost, leftmost);
                self.collect_selects(right, query, outermost, false);
            }
            _ => {}
        }
    }

    fn record_comparison(&mut self, column: &Expr, literal: &Expr) {
        if let (Some(column), Expr::Value(Value::Number(literal, _))) =
            (ColumnRef::from_expr(column), literal)
        {
            self.comparisons.push(LiteralComparison {
                column,
                literal: literal.clone(),
            });
        }
    }
}

impl Visitor for Extractor {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
            }
        }
        self.collect_selects(&query.body, query, self.query_depth == 0, true);
        self.query_depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.query_depth -= 1;
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        match table_factor {
            TableFactor::Table { name, alias, .. } => {
                let name = object_name(name);
                let alias = alias.as_ref().map(|alias| alias.name.value.clone());
                if self.ctes.contains(&name.to_lowercase()) {
                    self.reads_derived = true;
                    if let Some(alias) = alias {
                        self.derived.insert(alias.to_lowercase());
                    }
                } else {
                    self.tables.push(TableRef { name, alias });
                }
            }
            TableFactor::Derived { alias, .. } => {
                self.reads_derived = true;
                if let Some(alias) = alias {
                    self.derived.insert(alias.name.value.to_lowercase());
                }
            }
            TableFactor::NestedJoin { .. } => {}
            _ => self.reads_derived = true,
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                if let Some(column) = ColumnRef::from_expr(expr) {
                    self.columns.push(column);
                }
            }
            Expr::Function(function) => self.functions.push(FunctionCall {
                name: object_name(&function.name),
                windowed: function.over.is_some(),
            }),
            Expr::Value(value) => {
                if let Some(text) = literal_text(value) {
                    self.literals.push(text);
                }
            }
            Expr::BinaryOp { left, op, right } if is_comparison(op) => {
                self.record_comparison(left, right);
                self.record_comparison(right, left);
            }
            Expr::InList { expr, list, .. } => {
                for item in list {
                    self.record_comparison(expr, item);
                }
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                self.record_comparison(expr, low);
                self.record_comparison(expr, high);
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

pub(crate) fn join_idents(idents: &[Ident]) -> String {
    idents
        .iter()
        .map(|ident| ident.value.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

/// Dotted name without quoting, e.g. `public.sales`
pub fn object_name(name: &ObjectName) -> String {
    join_idents(&name.0)
}

pub(crate) fn is_comparison(op: &BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
    )
}

fn literal_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(number, _) => Some(number.clone()),
        Value::SingleQuotedString(text)
        | Value::DoubleQuotedString(text)
        | Value::NationalStringLiteral(text)
        | Value::EscapedStringLiteral(text) => Some(text.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn extract(sql: &str) -> ParsedStatement {
        let mut statements = Parser::parse_sql(&GenericDialect {}, sql).unwrap();
        ParsedStatement::from_statement(sql, statements.remove(0))
    }

    #[test]
    fn collects_tables_with_aliases() {
        let parsed = extract("SELECT s.region FROM public.sales s JOIN regions ON s.rid = regions.id");
        assert_eq!(
            parsed.tables,
            vec![
                TableRef {
                    name: "public.sales".into(),
                    alias: Some("s".into())
                },
                TableRef {
                    name: "regions".into(),
                    alias: None
                },
            ]
        );
        assert!(!parsed.reads_derived);
    }

    #[test]
    fn cte_references_are_not_base_tables() {
        let parsed = extract(
            "WITH totals AS (SELECT region FROM sales) SELECT t.region FROM totals t",
        );
        assert_eq!(parsed.tables.len(), 1);
        assert_eq!(parsed.tables[0].name, "sales");
        assert!(parsed.reads_derived);
        assert!(parsed.is_derived_source("T"));
        assert!(parsed.is_derived_source("totals"));
    }

    #[test]
    fn qualified_columns_keep_their_qualifier() {
        let parsed = extract("SELECT s.region, amount FROM sales s");
        assert_eq!(parsed.columns[0].qualifier.as_deref(), Some("s"));
        assert_eq!(parsed.columns[0].name, "region");
        assert_eq!(parsed.columns[1], ColumnRef::bare("amount"));
    }

    #[test]
    fn records_functions_and_windowing() {
        let parsed = extract(
            "SELECT SUM(x), ROW_NUMBER() OVER (ORDER BY x), CALCULATE_REVENUE(x) FROM t",
        );
        let names: Vec<_> = parsed.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["SUM", "ROW_NUMBER", "CALCULATE_REVENUE"]);
        assert!(parsed.functions[1].windowed);
        assert!(!parsed.functions[0].windowed);
    }

    #[test]
    fn records_numeric_comparisons_in_either_order() {
        let parsed = extract(
            "SELECT * FROM orders WHERE customer_id = 1234 AND 2020 < order_year AND id IN (1, 2)",
        );
        let pairs: Vec<_> = parsed
            .comparisons
            .iter()
            .map(|c| (c.column.name.as_str(), c.literal.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("customer_id", "1234"), ("order_year", "2020"), ("id", "1"), ("id", "2")]
        );
    }

    #[test]
    fn shapes_every_select_block() {
        let parsed = extract("SELECT a FROM t WHERE b IN (SELECT b FROM u)");
        assert_eq!(parsed.selects.len(), 2);
        assert!(parsed.selects[0].outermost);
        assert!(!parsed.selects[1].outermost);
    }

    #[test]
    fn column_ref_converts_back_to_expression() {
        let column = ColumnRef {
            qualifier: Some("s".into()),
            name: "region".into(),
        };
        assert_eq!(column.to_expr().to_string(), "s.region");
        assert_eq!(ColumnRef::bare("region").to_expr().to_string(), "region");
    }
}
