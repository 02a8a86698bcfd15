//! Checks referenced tables and columns against the supplied schema.

use std::collections::{BTreeMap, BTreeSet};

use super::ValidatorOutput;
use crate::config::Deductions;
use crate::model::{Issue, IssueCode, Location};
use crate::parser::{ColumnRef, ParsedStatement};
use crate::schema::SchemaIndex;

/// A column that none of its candidate tables declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedColumn {
    pub column: ColumnRef,
    /// Index keys of the tables the column was checked against
    pub candidates: Vec<String>,
}

/// References that could not be matched to the schema, each reported once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unresolved {
    pub tables: Vec<String>,
    pub columns: Vec<UnresolvedColumn>,
}

/// Resolves every table and column reference of `parsed` against `index`.
///
/// Shared by the schema validator and the hallucination detector so that
/// both apply identical resolution rules.
pub fn unresolved_references(parsed: &ParsedStatement, index: &SchemaIndex) -> Unresolved {
    let mut unresolved = Unresolved::default();
    if index.is_empty() {
        return unresolved;
    }

    let mut known: Vec<String> = Vec::new();
    let mut qualifiers: BTreeMap<String, Option<String>> = BTreeMap::new();
    let mut seen_tables = BTreeSet::new();
    for table in &parsed.tables {
        let key = index.resolve_table(&table.name).map(str::to_string);
        match &key {
            Some(key) if !known.contains(key) => known.push(key.clone()),
            Some(_) => {}
            None => {
                if seen_tables.insert(table.name.to_lowercase()) {
                    unresolved.tables.push(table.name.clone());
                }
            }
        }

        let lowered = table.name.to_lowercase();
        if let Some(last) = lowered.rsplit('.').next() {
            qualifiers.insert(last.to_string(), key.clone());
        }
        qualifiers.insert(lowered, key.clone());
        if let Some(alias) = &table.alias {
            qualifiers.insert(alias.to_lowercase(), key);
        }
    }

    // Nothing to check columns against; the missing tables are reported.
    if known.is_empty() {
        return unresolved;
    }

    let aliases = parsed.projection_aliases();
    let mut seen_columns = BTreeSet::new();
    for column in &parsed.columns {
        let candidates = match &column.qualifier {
            Some(qualifier) if parsed.is_derived_source(qualifier) => continue,
            Some(qualifier) => match lookup_qualifier(&qualifiers, qualifier) {
                Some(Some(key)) => vec![key.clone()],
                Some(None) => continue,
                None => known.clone(),
            },
            None => {
                if parsed.reads_derived || aliases.contains(&column.name.to_lowercase()) {
                    continue;
                }
                known.clone()
            }
        };

        if candidates
            .iter()
            .any(|table| index.has_column(table, &column.name))
        {
            continue;
        }
        if seen_columns.insert(column.key()) {
            unresolved.columns.push(UnresolvedColumn {
                column: column.clone(),
                candidates,
            });
        }
    }

    unresolved
}

fn lookup_qualifier<'a>(
    qualifiers: &'a BTreeMap<String, Option<String>>,
    qualifier: &str,
) -> Option<&'a Option<String>> {
    let lowered = qualifier.to_lowercase();
    qualifiers.get(&lowered).or_else(|| {
        lowered
            .rsplit('.')
            .next()
            .and_then(|last| qualifiers.get(last))
    })
}

pub fn validate(parsed: &ParsedStatement, index: &SchemaIndex, deductions: &Deductions) -> ValidatorOutput {
    let unresolved = unresolved_references(parsed, index);
    let sql = &parsed.sql;

    let mut issues: Vec<Issue> = unresolved
        .tables
        .iter()
        .map(|table| {
            Issue::new(
                IssueCode::UnknownTable,
                format!("Table '{}' does not exist in the schema", table),
            )
            .at(Location::of_word(sql, table))
        })
        .collect();

    issues.extend(unresolved.columns.iter().map(|unresolved| {
        Issue::new(
            IssueCode::UnknownColumn,
            format!(
                "Column '{}' does not exist in {}",
                unresolved.column,
                describe_tables(&unresolved.candidates)
            ),
        )
        .at(Location::of_word(sql, &unresolved.column.name))
    }));

    ValidatorOutput::deducted(issues, deductions)
}

fn describe_tables(tables: &[String]) -> String {
    match tables {
        [table] => format!("table '{}'", table),
        tables => format!("tables {}", tables.join(", ")),
    }
}
