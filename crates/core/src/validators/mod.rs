//! Independent checks, one per scoring dimension.
//!
//! Each validator is a pure function over the parsed statement (and the
//! schema or business context where relevant) returning its own
//! [`ValidatorOutput`]. The scorer only concatenates outputs; validators
//! never see each other's findings.

pub mod business;
pub mod context;
pub mod hallucination;
pub mod schema;
pub mod semantic;
pub mod syntax;

pub use context::ContextValidator;
pub use hallucination::HallucinationDetector;

use crate::config::Deductions;
use crate::model::{Dimension, Issue};

/// Issues found by one validator and the dimension score they imply
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorOutput {
    pub score: f64,
    pub issues: Vec<Issue>,
}

impl ValidatorOutput {
    pub fn clean() -> Self {
        Self {
            score: 1.0,
            issues: Vec::new(),
        }
    }

    /// Scores `1.0` minus one severity deduction per issue, floored at zero
    pub fn deducted(issues: Vec<Issue>, deductions: &Deductions) -> Self {
        let penalty: f64 = issues
            .iter()
            .map(|issue| deductions.for_severity(issue.severity))
            .sum();
        Self {
            score: (1.0 - penalty).max(0.0),
            issues,
        }
    }

    /// The degraded output of a dimension that could not run
    pub fn blocked(dimension: Dimension) -> Self {
        Self {
            score: 0.0,
            issues: vec![Issue::blocked(dimension)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueCode;

    #[test]
    fn deductions_are_floored_at_zero() {
        let issues = vec![
            Issue::new(IssueCode::UnknownTable, "a"),
            Issue::new(IssueCode::UnknownTable, "b"),
            Issue::new(IssueCode::UnknownColumn, "c"),
        ];
        let output = ValidatorOutput::deducted(issues, &Deductions::default());
        assert_eq!(output.score, 0.0);
        assert_eq!(output.issues.len(), 3);
    }

    #[test]
    fn mixed_severities_deduct_independently() {
        let issues = vec![
            Issue::new(IssueCode::SelectStar, "warning"),
            Issue::new(IssueCode::MissingLimit, "info"),
        ];
        let output = ValidatorOutput::deducted(issues, &Deductions::default());
        assert!((output.score - 0.80).abs() < 1e-9);
    }
}
