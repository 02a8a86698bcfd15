//! Schema-independent checks on the logical structure of each SELECT block.

use std::collections::BTreeSet;

use super::ValidatorOutput;
use crate::config::Deductions;
use crate::model::{Issue, IssueCode, Location};
use crate::parser::{ColumnRef, GroupBy, ParsedStatement, SelectShape, SourceTokens};

pub fn validate(parsed: &ParsedStatement, deductions: &Deductions) -> ValidatorOutput {
    let sql = &parsed.sql;
    let tokens = SourceTokens::new(sql);
    let mut issues = Vec::new();
    for select in &parsed.selects {
        check_grouping(sql, select, &mut issues);
        check_where_aggregates(sql, &tokens, select, &mut issues);
        check_order_columns(sql, select, &mut issues);
        check_constant_predicates(&tokens, select, &mut issues);
    }
    ValidatorOutput::deducted(issues, deductions)
}

/// SELECT-list columns used outside an aggregate that the block does not group by.
///
/// Without a GROUP BY clause this is every bare column, but only when the
/// SELECT list aggregates at all.
pub fn ungrouped_columns(select: &SelectShape) -> Vec<ColumnRef> {
    let group_exprs = match &select.group_by {
        GroupBy::All => return Vec::new(),
        GroupBy::Absent if !select.has_aggregate_projection() => return Vec::new(),
        GroupBy::Absent => &[][..],
        GroupBy::Exprs(exprs) => exprs.as_slice(),
    };

    let mut seen = BTreeSet::new();
    let mut ungrouped = Vec::new();
    for (position, item) in select.projection.iter().enumerate() {
        let whole_expr_grouped = group_exprs.iter().any(|group| {
            group.text == item.summary.text
                || group.ordinal == Some(position + 1)
                || match (&group.column, &item.alias) {
                    (Some(column), Some(alias)) => {
                        column.qualifier.is_none() && column.name.eq_ignore_ascii_case(alias)
                    }
                    _ => false,
                }
        });
        if whole_expr_grouped {
            continue;
        }

        for column in &item.summary.bare_columns {
            let grouped = group_exprs.iter().any(|group| {
                group
                    .column
                    .as_ref()
                    .is_some_and(|grouped| grouped.name.eq_ignore_ascii_case(&column.name))
            });
            if !grouped && seen.insert(column.key()) {
                ungrouped.push(column.clone());
            }
        }
    }
    ungrouped
}

fn check_grouping(sql: &str, select: &SelectShape, issues: &mut Vec<Issue>) {
    let ungrouped = ungrouped_columns(select);
    if ungrouped.is_empty() {
        return;
    }

    if matches!(select.group_by, GroupBy::Absent) {
        let names: Vec<String> = ungrouped.iter().map(ToString::to_string).collect();
        issues.push(
            Issue::new(
                IssueCode::MissingGroupBy,
                format!(
                    "SELECT list mixes aggregates with non-aggregated columns ({}) but has no GROUP BY",
                    names.join(", ")
                ),
            )
            .at(Location::of_word(sql, &ungrouped[0].name))
            .with_suggestion(format!("Add GROUP BY {}", names.join(", "))),
        );
        return;
    }

    for column in ungrouped {
        issues.push(
            Issue::new(
                IssueCode::GroupByMismatch,
                format!(
                    "Column '{}' is selected without an aggregate but is not in GROUP BY",
                    column
                ),
            )
            .at(Location::of_word(sql, &column.name))
            .with_suggestion(format!("Add '{}' to GROUP BY or wrap it in an aggregate", column)),
        );
    }
}

fn check_where_aggregates(sql: &str, tokens: &SourceTokens<'_>, select: &SelectShape, issues: &mut Vec<Issue>) {
    let Some(selection) = &select.selection else {
        return;
    };
    if let Some(aggregate) = selection.aggregates.first() {
        let location = tokens
            .call_in_where(aggregate)
            .or_else(|| Location::of_word(sql, aggregate));
        issues.push(
            Issue::new(
                IssueCode::AggregateInWhere,
                format!(
                    "Aggregate function {} cannot be used in WHERE; rows are filtered before aggregation",
                    aggregate
                ),
            )
            .at(location)
            .with_suggestion("Move the aggregate condition into a HAVING clause"),
        );
    }
}

fn check_order_columns(sql: &str, select: &SelectShape, issues: &mut Vec<Issue>) {
    if select.wildcard || select.order_by.is_empty() {
        return;
    }
    let declared = select.declared_columns();
    let mut reported = BTreeSet::new();
    for order in &select.order_by {
        if order.ordinal.is_some() {
            continue;
        }
        for column in &order.columns {
            let qualified_by_source = column
                .qualifier
                .as_ref()
                .is_some_and(|qualifier| select.sources.contains(&qualifier.to_lowercase()));
            if qualified_by_source || declared.contains(&column.name.to_lowercase()) {
                continue;
            }
            if reported.insert(column.key()) {
                issues.push(
                    Issue::new(
                        IssueCode::UnknownOrderColumn,
                        format!(
                            "ORDER BY column '{}' does not appear anywhere else in the query",
                            column
                        ),
                    )
                    .at(Location::of_word(sql, &column.name)),
                );
            }
        }
    }
}

fn check_constant_predicates(tokens: &SourceTokens<'_>, select: &SelectShape, issues: &mut Vec<Issue>) {
    for predicate in &select.constant_predicates {
        let location = tokens.find_fragment(predicate);
        issues.push(
            Issue::new(
                IssueCode::SuspiciousPredicate,
                format!("Predicate '{}' always evaluates to the same result", predicate),
            )
            .at(location),
        );
    }
}
