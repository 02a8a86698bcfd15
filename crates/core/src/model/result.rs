use serde::{Deserialize, Serialize};
use std::fmt;

use super::issue::{Dimension, Issue, IssueCode};
use crate::config::Thresholds;

/// Three-way verdict derived from the overall confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Accept,
    Correct,
    Reject,
}

impl Recommendation {
    /// Maps a confidence onto its band. Each band is closed at its lower
    /// bound, so exactly one band holds for any score.
    pub fn from_confidence(confidence: f64, thresholds: &Thresholds) -> Self {
        if confidence >= thresholds.accept {
            Self::Accept
        } else if confidence >= thresholds.correct {
            Self::Correct
        } else {
            Self::Reject
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Correct => "CORRECT",
            Self::Reject => "REJECT",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score of a single dimension together with the issues that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: Dimension,
    pub raw_score: f64,
    pub weight: f64,
    pub contributing_issues: Vec<Issue>,
}

impl DimensionScore {
    /// Contribution of this dimension to the overall confidence
    pub fn weighted(&self) -> f64 {
        self.raw_score * self.weight
    }
}

/// The terminal artifact of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    pub overall_confidence: f64,
    pub recommendation: Recommendation,
    pub issues: Vec<Issue>,
    pub dimension_scores: Vec<DimensionScore>,
    pub hallucinations_detected: bool,
}

impl ConfidenceResult {
    pub fn dimension(&self, dimension: Dimension) -> Option<&DimensionScore> {
        self.dimension_scores
            .iter()
            .find(|score| score.dimension == dimension)
    }

    /// Raw score of a dimension, 0.0 if absent
    pub fn score(&self, dimension: Dimension) -> f64 {
        self.dimension(dimension).map_or(0.0, |score| score.raw_score)
    }

    pub fn has_issue(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }

    pub fn issues_with(&self, code: IssueCode) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |issue| issue.code == code)
    }

    pub fn critical_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| issue.is_critical())
    }

    /// Issues raised by the hallucination detector
    pub fn hallucinations(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| issue.code.is_hallucination())
    }
}

/// Rewrites the self-corrector knows how to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixCode {
    /// Replaces an invented table or column with the closest schema name
    RenameToSuggestion,
    MoveAggregateToHaving,
    AddGroupByColumns,
}

impl FixCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RenameToSuggestion => "rename_to_suggestion",
            Self::MoveAggregateToHaving => "move_aggregate_to_having",
            Self::AddGroupByColumns => "add_group_by_columns",
        }
    }
}

impl fmt::Display for FixCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one correction pass. The caller re-scores `corrected_sql`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResult {
    pub corrected_sql: Option<String>,
    pub applied_fixes: Vec<FixCode>,
    pub attempts: u32,
}

impl CorrectionResult {
    pub(crate) fn unchanged() -> Self {
        Self {
            corrected_sql: None,
            applied_fixes: Vec::new(),
            attempts: 1,
        }
    }

    pub fn is_corrected(&self) -> bool {
        self.corrected_sql.is_some()
    }
}
