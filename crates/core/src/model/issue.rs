use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five independent scoring axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Syntax,
    Schema,
    Semantic,
    Context,
    Business,
}

impl Dimension {
    /// Evaluation order. Issues in a result are reported in this order.
    pub const ALL: [Dimension; 5] = [
        Dimension::Syntax,
        Dimension::Schema,
        Dimension::Semantic,
        Dimension::Context,
        Dimension::Business,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Schema => "schema",
            Self::Semantic => "semantic",
            Self::Context => "context",
            Self::Business => "business",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed taxonomy of everything a validator can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    // syntax
    SyntaxError,
    BlockedBySyntaxError,
    MultipleStatements,
    NonQueryStatement,
    // schema
    UnknownTable,
    UnknownColumn,
    // semantic
    AggregateInWhere,
    GroupByMismatch,
    MissingGroupBy,
    UnknownOrderColumn,
    SuspiciousPredicate,
    // context
    ContextUnused,
    // hallucination
    HallucinatedTable,
    HallucinatedColumn,
    HallucinatedFunction,
    SuspiciousPattern,
    // business
    SelectStar,
    MissingLimit,
    CartesianJoin,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyntaxError => "syntax_error",
            Self::BlockedBySyntaxError => "blocked_by_syntax_error",
            Self::MultipleStatements => "multiple_statements",
            Self::NonQueryStatement => "non_query_statement",
            Self::UnknownTable => "unknown_table",
            Self::UnknownColumn => "unknown_column",
            Self::AggregateInWhere => "aggregate_in_where",
            Self::GroupByMismatch => "group_by_mismatch",
            Self::MissingGroupBy => "missing_group_by",
            Self::UnknownOrderColumn => "unknown_order_column",
            Self::SuspiciousPredicate => "suspicious_predicate",
            Self::ContextUnused => "context_unused",
            Self::HallucinatedTable => "hallucinated_table",
            Self::HallucinatedColumn => "hallucinated_column",
            Self::HallucinatedFunction => "hallucinated_function",
            Self::SuspiciousPattern => "suspicious_pattern",
            Self::SelectStar => "select_star",
            Self::MissingLimit => "missing_limit",
            Self::CartesianJoin => "cartesian_join",
        }
    }

    /// Dimension the code is scored under. `BlockedBySyntaxError` is
    /// reported once per blocked dimension and overrides this.
    pub fn dimension(&self) -> Dimension {
        match self {
            Self::SyntaxError
            | Self::BlockedBySyntaxError
            | Self::MultipleStatements
            | Self::NonQueryStatement => Dimension::Syntax,
            Self::UnknownTable
            | Self::UnknownColumn
            | Self::HallucinatedTable
            | Self::HallucinatedColumn
            | Self::HallucinatedFunction
            | Self::SuspiciousPattern => Dimension::Schema,
            Self::AggregateInWhere
            | Self::GroupByMismatch
            | Self::MissingGroupBy
            | Self::UnknownOrderColumn
            | Self::SuspiciousPredicate => Dimension::Semantic,
            Self::ContextUnused => Dimension::Context,
            Self::SelectStar | Self::MissingLimit | Self::CartesianJoin => Dimension::Business,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::SyntaxError
            | Self::UnknownTable
            | Self::UnknownColumn
            | Self::AggregateInWhere
            | Self::GroupByMismatch
            | Self::MissingGroupBy
            | Self::HallucinatedTable
            | Self::HallucinatedColumn
            | Self::HallucinatedFunction => Severity::Critical,
            Self::MultipleStatements
            | Self::NonQueryStatement
            | Self::UnknownOrderColumn
            | Self::SuspiciousPredicate
            | Self::SuspiciousPattern
            | Self::SelectStar
            | Self::CartesianJoin => Severity::Warning,
            Self::BlockedBySyntaxError | Self::ContextUnused | Self::MissingLimit => Severity::Info,
        }
    }

    /// Returns true for the categories the hallucination detector produces
    pub fn is_hallucination(&self) -> bool {
        matches!(
            self,
            Self::HallucinatedTable
                | Self::HallucinatedColumn
                | Self::HallucinatedFunction
                | Self::SuspiciousPattern
        )
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pointer into the SQL text. `line` and `column` are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    /// Location of a byte offset within `sql`
    pub fn at_offset(sql: &str, offset: usize) -> Self {
        let before = &sql[..offset.min(sql.len())];
        let line = before.matches('\n').count() + 1;
        let column = before
            .rfind('\n')
            .map_or(before.chars().count(), |nl| before[nl + 1..].chars().count())
            + 1;
        Self {
            offset,
            line,
            column,
        }
    }

    /// Location of a 1-based line/column pair as reported by the parser
    pub fn from_line_column(sql: &str, line: usize, column: usize) -> Option<Self> {
        let line_start = if line <= 1 {
            0
        } else {
            sql.match_indices('\n').nth(line - 2).map(|(idx, _)| idx + 1)?
        };
        let offset = sql[line_start..]
            .char_indices()
            .nth(column.saturating_sub(1))
            .map_or(sql.len(), |(idx, _)| line_start + idx);
        Some(Self {
            offset,
            line: line.max(1),
            column: column.max(1),
        })
    }

    /// First case-insensitive whole-word occurrence of `word` in `sql`
    pub fn of_word(sql: &str, word: &str) -> Option<Self> {
        if word.is_empty() {
            return None;
        }
        let pattern = format!(r"\b{}\b", regex::escape(word));
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .ok()?;
        re.find(sql).map(|m| Self::at_offset(sql, m.start()))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single finding. Issues are the only output unit of every validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub dimension: Dimension,
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Name to substitute for the one this issue is about, when the
    /// schema offers a close match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<Replacement>,
}

/// An invented name and the schema name closest to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

impl Issue {
    /// Creates an issue with the code's default dimension and severity
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            dimension: code.dimension(),
            severity: code.severity(),
            code,
            message: message.into(),
            location: None,
            suggestion: None,
            replacement: None,
        }
    }

    /// The placeholder issue for a dimension that could not run
    pub fn blocked(dimension: Dimension) -> Self {
        Self {
            dimension,
            ..Self::new(
                IssueCode::BlockedBySyntaxError,
                format!("{} validation skipped: the query did not parse", dimension),
            )
        }
    }

    pub fn at(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Records the rename behind a "Did you mean" suggestion
    pub fn with_replacement(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.replacement = Some(Replacement {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}: {}", self.dimension, self.severity, self.code, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " (at {})", location)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_as_snake_case() {
        let json = serde_json::to_string(&IssueCode::AggregateInWhere).unwrap();
        assert_eq!(json, "\"aggregate_in_where\"");
        for code in [IssueCode::HallucinatedFunction, IssueCode::BlockedBySyntaxError] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json.trim_matches('"'), code.as_str());
        }
    }

    #[test]
    fn blocked_issue_keeps_requested_dimension() {
        let issue = Issue::blocked(Dimension::Context);
        assert_eq!(issue.dimension, Dimension::Context);
        assert_eq!(issue.code, IssueCode::BlockedBySyntaxError);
        assert_eq!(issue.severity, Severity::Info);
    }

    #[test]
    fn locates_whole_words_case_insensitively() {
        let sql = "SELECT region\nFROM Revenues r";
        let loc = Location::of_word(sql, "revenues").unwrap();
        assert_eq!((loc.line, loc.column, loc.offset), (2, 6, 19));
        assert!(Location::of_word(sql, "reg").is_none());
    }

    #[test]
    fn converts_parser_line_and_column() {
        let sql = "SELECT a\nFROM t WHERE";
        let loc = Location::from_line_column(sql, 2, 8).unwrap();
        assert_eq!(&sql[loc.offset..], "WHERE");
        assert!(Location::from_line_column(sql, 5, 1).is_none());
    }
}
