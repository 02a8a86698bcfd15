//! Parsing capability used by the syntax validator.
//!
//! The engine talks to the parser only through [`SqlParser`], so a caller
//! can substitute its own implementation. [`DialectParser`] is the default,
//! backed by `sqlparser`.

pub mod extract;
pub mod shape;
pub mod tokens;

use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::dialect::dialect_from_str;
use sqlparser::parser::Parser;
use std::fmt;
use std::sync::LazyLock;

pub use extract::{ColumnRef, FunctionCall, LiteralComparison, ParsedStatement, TableRef};
pub use shape::{ExprSummary, GroupBy, ProjectionItem, SelectShape};
pub use tokens::{expression_depth, SourceTokens};

use crate::config::ParserConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::Location;

static PARSER_POSITION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Line: (\d+), Column: (\d+)").ok());

/// Turns SQL text into a [`ParsedStatement`].
///
/// Implementations must be stateless with respect to calls.
pub trait SqlParser: Send + Sync {
    fn parse(&self, sql: &str) -> ParseOutcome;
}

/// Non-fatal observations made while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// The input held this many statements; only the first is analyzed
    MultipleStatements(usize),
    /// The first statement is not a query; carries its leading keyword
    NonQueryStatement(String),
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleStatements(count) => write!(
                f,
                "input contains {} statements; only the first was analyzed",
                count
            ),
            Self::NonQueryStatement(kind) => {
                write!(f, "{} statement is not a read-only query", kind)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Parsed {
        statement: Box<ParsedStatement>,
        warnings: Vec<ParseWarning>,
    },
    Failed {
        message: String,
        location: Option<Location>,
    },
}

impl ParseOutcome {
    /// A failure, located from the `Line: n, Column: m` suffix if the
    /// message carries one
    pub fn failed(sql: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let location = PARSER_POSITION
            .as_ref()
            .and_then(|re| re.captures(&message))
            .and_then(|caps| {
                let line = caps.get(1)?.as_str().parse().ok()?;
                let column = caps.get(2)?.as_str().parse().ok()?;
                Location::from_line_column(sql, line, column)
            });
        Self::Failed { message, location }
    }
}

/// [`SqlParser`] over a named `sqlparser` dialect.
#[derive(Debug, Clone)]
pub struct DialectParser {
    dialect: String,
    recursion_limit: usize,
}

impl DialectParser {
    pub fn new(dialect: impl Into<String>, recursion_limit: usize) -> EngineResult<Self> {
        let dialect = dialect.into();
        if dialect_from_str(&dialect).is_none() {
            return Err(EngineError::UnknownDialect(dialect));
        }
        Ok(Self {
            dialect,
            recursion_limit,
        })
    }

    pub fn from_config(config: &ParserConfig) -> EngineResult<Self> {
        Self::new(config.dialect.clone(), config.recursion_limit)
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }
}

impl Default for DialectParser {
    fn default() -> Self {
        let config = ParserConfig::default();
        Self {
            dialect: config.dialect,
            recursion_limit: config.recursion_limit,
        }
    }
}

impl SqlParser for DialectParser {
    fn parse(&self, sql: &str) -> ParseOutcome {
        let Some(dialect) = dialect_from_str(&self.dialect) else {
            return ParseOutcome::failed(sql, format!("unknown SQL dialect `{}`", self.dialect));
        };

        let parsed = Parser::new(dialect.as_ref())
            .with_recursion_limit(self.recursion_limit)
            .try_with_sql(sql)
            .and_then(|mut parser| parser.parse_statements());
        let mut statements = match parsed {
            Ok(statements) => statements,
            Err(err) => return ParseOutcome::failed(sql, err.to_string()),
        };
        if statements.is_empty() {
            return ParseOutcome::failed(sql, "input contains no SQL statement");
        }

        let mut warnings = Vec::new();
        if statements.len() > 1 {
            warnings.push(ParseWarning::MultipleStatements(statements.len()));
        }
        let statement = statements.swap_remove(0);
        if !matches!(statement, Statement::Query(_)) {
            warnings.push(ParseWarning::NonQueryStatement(leading_keyword(sql)));
        }

        ParseOutcome::Parsed {
            statement: Box::new(ParsedStatement::from_statement(sql, statement)),
            warnings,
        }
    }
}

fn leading_keyword(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .map(|word| word.trim_end_matches(|c: char| !c.is_alphanumeric()))
        .unwrap_or_default()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> ParseOutcome {
        DialectParser::default().parse(sql)
    }

    #[test]
    fn parses_a_plain_query_without_warnings() {
        match parse("SELECT region FROM sales") {
            ParseOutcome::Parsed {
                statement,
                warnings,
            } => {
                assert!(warnings.is_empty());
                assert!(statement.is_query());
                assert_eq!(statement.tables[0].name, "sales");
            }
            other => panic!("expected a parse, got {:?}", other),
        }
    }

    #[test]
    fn warns_about_extra_and_non_query_statements() {
        let ParseOutcome::Parsed { warnings, .. } =
            parse("DELETE FROM sales; SELECT 1")
        else {
            panic!("expected a parse");
        };
        assert_eq!(
            warnings,
            vec![
                ParseWarning::MultipleStatements(2),
                ParseWarning::NonQueryStatement("DELETE".into()),
            ]
        );
    }

    #[test]
    fn failures_carry_a_location() {
        let ParseOutcome::Failed { message, location } = parse("SELECT region FROM sales WHERE") else {
            panic!("expected a failure");
        };
        assert!(!message.is_empty());
        if let Some(location) = location {
            assert_eq!(location.line, 1);
        }
    }

    #[test]
    fn deep_nesting_hits_the_recursion_limit() {
        let parser = DialectParser::new("generic", 8).unwrap();
        let sql = format!("SELECT {}1{} FROM t", "(".repeat(64), ")".repeat(64));
        assert!(matches!(parser.parse(&sql), ParseOutcome::Failed { .. }));
    }

    #[test]
    fn rejects_unknown_dialects() {
        assert!(matches!(
            DialectParser::new("klingon", 50),
            Err(EngineError::UnknownDialect(_))
        ));
    }
}
