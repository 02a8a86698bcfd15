//! Detects references the generator most likely invented.
//!
//! Findings are tagged with the schema dimension. The detector's score only
//! counts each distinct category once, so a single invented table referenced
//! many times is not over-penalized.

use regex::{Regex, RegexSet, RegexSetBuilder};
use std::collections::BTreeSet;

use super::schema::unresolved_references;
use super::ValidatorOutput;
use crate::config::{Deductions, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::functions::{normalize_function_name, FunctionCatalog};
use crate::model::{Issue, IssueCode, Location};
use crate::parser::{LiteralComparison, ParsedStatement};
use crate::schema::SchemaIndex;

#[derive(Debug, Clone)]
pub struct HallucinationDetector {
    functions: FunctionCatalog,
    placeholders: RegexSet,
}

impl HallucinationDetector {
    /// Compiles the configured placeholder patterns, reporting the first
    /// one that is not a valid regex.
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let patterns = &config.hallucination.placeholder_patterns;
        for pattern in patterns {
            Regex::new(pattern).map_err(|source| EngineError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        let placeholders = RegexSetBuilder::new(patterns)
            .case_insensitive(true)
            .build()
            .map_err(|source| EngineError::InvalidPattern {
                pattern: patterns.join(" | "),
                source,
            })?;

        Ok(Self {
            functions: FunctionCatalog::new(&config.hallucination.extra_functions),
            placeholders,
        })
    }

    pub fn detect(&self, parsed: &ParsedStatement, index: &SchemaIndex, deductions: &Deductions) -> ValidatorOutput {
        let sql = &parsed.sql;
        let mut issues = Vec::new();

        let unresolved = unresolved_references(parsed, index);
        for table in &unresolved.tables {
            let mut issue = Issue::new(
                IssueCode::HallucinatedTable,
                format!("Table '{}' does not exist; the query likely invented it", table),
            )
            .at(Location::of_word(sql, table));
            if let Some(closest) = index.closest_table(table) {
                issue = issue
                    .with_suggestion(format!("Did you mean '{}'?", closest))
                    .with_replacement(table.as_str(), closest);
            }
            issues.push(issue);
        }
        for unresolved in &unresolved.columns {
            let column = &unresolved.column;
            let candidates: Vec<&str> = unresolved.candidates.iter().map(String::as_str).collect();
            let mut issue = Issue::new(
                IssueCode::HallucinatedColumn,
                format!("Column '{}' does not exist; the query likely invented it", column),
            )
            .at(Location::of_word(sql, &column.name));
            if let Some(closest) = index.closest_column(&candidates, &column.name) {
                issue = issue
                    .with_suggestion(format!("Did you mean '{}'?", closest))
                    .with_replacement(column.name.as_str(), closest);
            }
            issues.push(issue);
        }

        self.check_functions(parsed, &mut issues);
        self.check_placeholders(parsed, index, &mut issues);
        check_literals(parsed, &mut issues);

        let categories: BTreeSet<IssueCode> = issues.iter().map(|issue| issue.code).collect();
        let penalty: f64 = categories
            .iter()
            .map(|code| deductions.for_severity(code.severity()))
            .sum();
        ValidatorOutput {
            score: (1.0 - penalty).max(0.0),
            issues,
        }
    }

    fn check_functions(&self, parsed: &ParsedStatement, issues: &mut Vec<Issue>) {
        let mut seen = BTreeSet::new();
        for function in &parsed.functions {
            if self.functions.contains(&function.name) {
                continue;
            }
            if seen.insert(normalize_function_name(&function.name)) {
                issues.push(
                    Issue::new(
                        IssueCode::HallucinatedFunction,
                        format!("Function '{}' is not a standard SQL function", function.name),
                    )
                    .at(Location::of_word(&parsed.sql, &function.name))
                    .with_suggestion("Verify the function exists in the target database or register it in hallucination.extra_functions"),
                );
            }
        }
    }

    fn check_placeholders(&self, parsed: &ParsedStatement, index: &SchemaIndex, issues: &mut Vec<Issue>) {
        let tables = parsed
            .tables
            .iter()
            .filter(|table| index.resolve_table(&table.name).is_none())
            .filter_map(|table| table.name.rsplit('.').next());
        let columns = parsed
            .columns
            .iter()
            .filter(|column| !index.knows_column(&column.name))
            .map(|column| column.name.as_str());

        let mut seen = BTreeSet::new();
        for name in tables.chain(columns) {
            if self.placeholders.is_match(name) && seen.insert(name.to_lowercase()) {
                issues.push(
                    Issue::new(
                        IssueCode::SuspiciousPattern,
                        format!("Identifier '{}' looks like a placeholder", name),
                    )
                    .at(Location::of_word(&parsed.sql, name)),
                );
            }
        }
    }
}

fn check_literals(parsed: &ParsedStatement, issues: &mut Vec<Issue>) {
    let mut seen = BTreeSet::new();
    for comparison in &parsed.comparisons {
        let Some(reason) = implausible_literal(comparison) else {
            continue;
        };
        if seen.insert((comparison.column.key(), comparison.literal.clone())) {
            issues.push(
                Issue::new(
                    IssueCode::SuspiciousPattern,
                    format!(
                        "Value {} compared with '{}' looks {}",
                        comparison.literal, comparison.column, reason
                    ),
                )
                .at(Location::of_word(&parsed.sql, &comparison.literal))
                .with_suggestion("Use a value taken from the data or a bound parameter"),
            );
        }
    }
}

/// Explains why a literal compared with an ID- or date-like column is
/// implausible, if it is.
fn implausible_literal(comparison: &LiteralComparison) -> Option<&'static str> {
    let column = comparison.column.name.to_lowercase();
    let id_like = column == "id" || column.ends_with("_id");
    let date_like = ["date", "year", "month", "day", "time"]
        .iter()
        .any(|part| column.contains(part));
    if !id_like && !date_like {
        return None;
    }

    let digits: Vec<u32> = comparison
        .literal
        .chars()
        .map(|c| c.to_digit(10))
        .collect::<Option<_>>()?;
    if digits.len() < 4 {
        return None;
    }

    if digits.windows(2).all(|pair| pair[0] == pair[1]) {
        return Some("like a repeated digit");
    }
    if digits.windows(2).all(|pair| pair[1] == pair[0] + 1)
        || digits.windows(2).all(|pair| pair[0] == pair[1] + 1)
    {
        return Some("like a sequential run");
    }
    if id_like && digits[0] != 0 && digits[1..].iter().all(|digit| *digit == 0) {
        return Some("suspiciously round");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ColumnRef, DialectParser, ParseOutcome, SqlParser};
    use crate::schema::Schema;

    fn detect(sql: &str) -> ValidatorOutput {
        let schema = Schema::new()
            .with_table("sales", ["region", "net_revenue", "fiscal_year"])
            .with_table("orders", ["id", "customer_id", "order_date"]);
        let index = SchemaIndex::new(&schema, true);
        let detector = HallucinationDetector::new(&EngineConfig::default()).unwrap();
        match DialectParser::default().parse(sql) {
            ParseOutcome::Parsed { statement, .. } => {
                detector.detect(&statement, &index, &Deductions::default())
            }
            ParseOutcome::Failed { message, .. } => panic!("{}", message),
        }
    }

    fn codes(output: &ValidatorOutput) -> Vec<IssueCode> {
        output.issues.iter().map(|issue| issue.code).collect()
    }

    fn comparison(column: &str, literal: &str) -> LiteralComparison {
        LiteralComparison {
            column: ColumnRef::bare(column),
            literal: literal.into(),
        }
    }

    #[test]
    fn clean_query_has_no_hallucinations() {
        let output = detect("SELECT region, SUM(net_revenue) FROM sales GROUP BY region");
        assert_eq!(output, ValidatorOutput::clean());
    }

    #[test]
    fn invented_table_comes_with_a_suggestion() {
        let output = detect("SELECT region FROM sale");
        assert_eq!(codes(&output), vec![IssueCode::HallucinatedTable]);
        assert_eq!(output.issues[0].suggestion.as_deref(), Some("Did you mean 'sales'?"));
        assert!((output.score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn invented_column_suggests_from_its_table() {
        let output = detect("SELECT net_revenu FROM sales");
        assert_eq!(codes(&output), vec![IssueCode::HallucinatedColumn]);
        assert_eq!(
            output.issues[0].suggestion.as_deref(),
            Some("Did you mean 'net_revenue'?")
        );
    }

    #[test]
    fn unknown_functions_are_reported_once() {
        let output = detect(
            "SELECT CALCULATE_REVENUE(net_revenue), calculate_revenue(net_revenue) FROM sales",
        );
        assert_eq!(codes(&output), vec![IssueCode::HallucinatedFunction]);
    }

    #[test]
    fn score_counts_categories_not_occurrences() {
        let output = detect("SELECT foo, bar FROM sales JOIN table1 ON 1 = 1");
        // hallucinated table + column, and placeholder names
        assert!(output.issues.len() >= 3);
        assert!(codes(&output).contains(&IssueCode::SuspiciousPattern));
        assert_eq!(output.score, 0.0);
    }

    #[test]
    fn placeholder_names_in_the_schema_are_exempt() {
        let schema = Schema::new().with_table("table1", ["col1"]);
        let index = SchemaIndex::new(&schema, false);
        let detector = HallucinationDetector::new(&EngineConfig::default()).unwrap();
        let ParseOutcome::Parsed { statement, .. } =
            DialectParser::default().parse("SELECT col1 FROM table1")
        else {
            panic!("expected a parse");
        };
        let output = detector.detect(&statement, &index, &Deductions::default());
        assert_eq!(output, ValidatorOutput::clean());
    }

    #[test]
    fn implausible_literals() {
        assert!(implausible_literal(&comparison("customer_id", "1234")).is_some());
        assert!(implausible_literal(&comparison("id", "11111")).is_some());
        assert!(implausible_literal(&comparison("id", "10000")).is_some());
        assert!(implausible_literal(&comparison("order_date", "9876")).is_some());
        assert!(implausible_literal(&comparison("fiscal_year", "2000")).is_none());
        assert!(implausible_literal(&comparison("fiscal_year", "2024")).is_none());
        assert!(implausible_literal(&comparison("customer_id", "4711")).is_none());
        assert!(implausible_literal(&comparison("amount", "1234")).is_none());
        assert!(implausible_literal(&comparison("id", "123")).is_none());
        assert!(implausible_literal(&comparison("id", "12.5")).is_none());
    }

    #[test]
    fn flags_literals_in_queries() {
        let output = detect("SELECT id FROM orders WHERE customer_id = 1234");
        assert_eq!(codes(&output), vec![IssueCode::SuspiciousPattern]);
        assert!((output.score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn invalid_patterns_are_configuration_errors() {
        let mut config = EngineConfig::default();
        config.hallucination.placeholder_patterns = vec!["(unclosed".into()];
        let err = HallucinationDetector::new(&config).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }
}
