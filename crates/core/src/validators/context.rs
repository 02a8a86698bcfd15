//! Measures how well the query reflects the caller's business statements.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::ValidatorOutput;
use crate::config::ContextConfig;
use crate::model::{Issue, IssueCode};
use crate::parser::ParsedStatement;

static TERM: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"'([^']+)'|"([^"]+)"|([A-Za-z_][A-Za-z0-9_]*)"#).ok()
});

#[derive(Debug, Clone)]
pub struct ContextValidator {
    min_term_length: usize,
    stop_words: BTreeSet<String>,
}

impl ContextValidator {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            min_term_length: config.min_term_length,
            stop_words: config
                .stop_words
                .iter()
                .map(|word| word.to_lowercase())
                .collect(),
        }
    }

    /// Significant terms of one statement: quoted phrases plus identifier-like
    /// words of at least `min_term_length` characters that are not stop words.
    pub fn terms(&self, statement: &str) -> Vec<String> {
        let Some(term) = TERM.as_ref() else {
            return Vec::new();
        };
        term.captures_iter(statement)
            .filter_map(|caps| {
                if let Some(phrase) = caps.get(1).or_else(|| caps.get(2)) {
                    return Some(phrase.as_str().to_string());
                }
                let word = caps.get(3)?.as_str();
                (word.chars().count() >= self.min_term_length
                    && !self.stop_words.contains(&word.to_lowercase()))
                .then(|| word.to_string())
            })
            .collect()
    }

    pub fn validate(&self, parsed: &ParsedStatement, context: &[String]) -> ValidatorOutput {
        if context.is_empty() {
            return ValidatorOutput::clean();
        }

        let references = references(parsed);
        let mut satisfied = 0usize;
        let mut issues = Vec::new();
        for statement in context {
            let terms = self.terms(statement);
            let matched = terms.is_empty()
                || terms.iter().any(|term| {
                    let needle = normalize(term);
                    !needle.is_empty() && references.iter().any(|reference| reference.contains(&needle))
                });
            if matched {
                satisfied += 1;
            } else {
                issues.push(
                    Issue::new(
                        IssueCode::ContextUnused,
                        format!("Business context '{}' is not reflected in the query", statement),
                    )
                    .with_suggestion(format!("Expected a reference to one of: {}", terms.join(", "))),
                );
            }
        }

        ValidatorOutput {
            score: satisfied as f64 / context.len() as f64,
            issues,
        }
    }
}

/// Normalized names the query mentions: tables, columns, aliases and literals
fn references(parsed: &ParsedStatement) -> BTreeSet<String> {
    let mut references = BTreeSet::new();
    for table in &parsed.tables {
        references.insert(normalize(&table.name));
    }
    references.extend(parsed.table_aliases().map(normalize));
    references.extend(parsed.columns.iter().map(|column| normalize(&column.name)));
    references.extend(parsed.projection_aliases().iter().map(|alias| normalize(alias)));
    references.extend(parsed.literals.iter().map(|literal| normalize(literal)));
    references.extend(parsed.ctes.iter().map(|cte| normalize(cte)));
    references.remove("");
    references
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
