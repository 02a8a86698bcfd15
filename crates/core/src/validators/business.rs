//! Residual rule compliance: conventions a reviewer would flag even when
//! the query is semantically valid.

use sqlparser::keywords::Keyword;

use super::ValidatorOutput;
use crate::config::Deductions;
use crate::model::{Issue, IssueCode};
use crate::parser::{GroupBy, ParsedStatement, SourceTokens};

pub fn validate(parsed: &ParsedStatement, deductions: &Deductions) -> ValidatorOutput {
    let tokens = SourceTokens::new(&parsed.sql);
    let mut issues = Vec::new();

    if parsed.outermost_selects().any(|select| select.wildcard) {
        issues.push(
            Issue::new(IssueCode::SelectStar, "Query selects every column with '*'")
                .at(tokens.select_wildcard())
                .with_suggestion("List the columns the answer needs"),
        );
    }

    let unbounded_grouping = parsed
        .outermost_selects()
        .any(|select| !matches!(select.group_by, GroupBy::Absent) && !select.has_limit);
    if unbounded_grouping {
        issues.push(
            Issue::new(
                IssueCode::MissingLimit,
                "Grouped result has no LIMIT; the number of groups is unbounded",
            )
            .at(tokens.keyword(Keyword::GROUP)),
        );
    }

    if parsed
        .selects
        .iter()
        .any(|select| select.from_relations > 1 && select.selection.is_none())
    {
        issues.push(
            Issue::new(
                IssueCode::CartesianJoin,
                "Several FROM relations are listed without a WHERE clause to join them",
            )
            .at(tokens.keyword(Keyword::FROM))
            .with_suggestion("Use an explicit JOIN ... ON or add a join condition"),
        );
    }

    ValidatorOutput::deducted(issues, deductions)
}
