//! Parses the input and scores the syntax dimension.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

use super::ValidatorOutput;
use crate::config::EngineConfig;
use crate::model::{Issue, IssueCode, Location};
use crate::parser::{expression_depth, ParseOutcome, ParseWarning, ParsedStatement, SourceTokens, SqlParser};

/// Result of the syntax pass. Only a successful parse lets the other
/// dimensions run.
#[derive(Debug)]
pub enum SyntaxOutcome {
    Valid {
        statement: Box<ParsedStatement>,
        output: ValidatorOutput,
    },
    Invalid(ValidatorOutput),
}

pub fn validate<P: SqlParser + ?Sized>(
    parser: &P,
    sql: &str,
    config: &EngineConfig,
) -> SyntaxOutcome {
    if sql.trim().is_empty() {
        return invalid(Issue::new(IssueCode::SyntaxError, "query is empty"));
    }
    if sql.len() > config.max_sql_length {
        return invalid(Issue::new(
            IssueCode::SyntaxError,
            format!(
                "query is {} bytes long, the limit is {}",
                sql.len(),
                config.max_sql_length
            ),
        ));
    }

    // The AST passes recurse once per nesting level
    if let Some(depth) = expression_depth(&config.parser.dialect, sql) {
        let limit = config.parser.max_expression_depth;
        if depth > limit {
            return invalid(
                Issue::new(
                    IssueCode::SyntaxError,
                    format!(
                        "expression nesting of {} levels exceeds the limit of {}",
                        depth, limit
                    ),
                )
                .with_suggestion("Split long chains of conditions into fewer terms, for example with IN lists"),
            );
        }
    }

    let outcome = match catch_unwind(AssertUnwindSafe(|| parser.parse(sql))) {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("SQL parser panicked, treating input as unparsable");
            return invalid(Issue::new(
                IssueCode::SyntaxError,
                "parser failed unexpectedly on this input",
            ));
        }
    };

    match outcome {
        ParseOutcome::Failed { message, location } => {
            invalid(Issue::new(IssueCode::SyntaxError, message).at(location))
        }
        ParseOutcome::Parsed {
            statement,
            warnings,
        } => {
            let issues = warnings
                .iter()
                .map(|warning| warning_issue(sql, warning))
                .collect();
            SyntaxOutcome::Valid {
                statement,
                output: ValidatorOutput::deducted(issues, &config.deductions),
            }
        }
    }
}

fn invalid(issue: Issue) -> SyntaxOutcome {
    SyntaxOutcome::Invalid(ValidatorOutput {
        score: 0.0,
        issues: vec![issue],
    })
}

fn warning_issue(sql: &str, warning: &ParseWarning) -> Issue {
    match warning {
        ParseWarning::MultipleStatements(_) => {
            Issue::new(IssueCode::MultipleStatements, warning.to_string())
                .at(SourceTokens::new(sql).statement_separator())
                .with_suggestion("Submit one statement per evaluation")
        }
        ParseWarning::NonQueryStatement(kind) => {
            Issue::new(IssueCode::NonQueryStatement, warning.to_string())
                .at(Location::of_word(sql, kind))
        }
    }
}
