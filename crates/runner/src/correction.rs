//! The bounded evaluate / correct / re-evaluate loop.

use serde::Serialize;
use sqlguard_core::model::{ConfidenceResult, FixCode, Recommendation};
use sqlguard_core::parser::SqlParser;
use sqlguard_core::{ConfidenceScorer, Schema, SelfCorrector};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Accepted,
    NoFixApplied,
    Unchanged,
    AttemptLimit,
}

/// One rewrite and the evaluation of its output
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionAttempt {
    pub attempt: usize,
    pub sql: String,
    pub applied_fixes: Vec<FixCode>,
    pub result: ConfidenceResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionOutcome {
    pub original_sql: String,
    pub initial: ConfidenceResult,
    pub attempts: Vec<CorrectionAttempt>,
    pub stop_reason: StopReason,
}

impl CorrectionOutcome {
    /// SQL after the last successful rewrite, or the original
    pub fn final_sql(&self) -> &str {
        self.attempts
            .last()
            .map_or(self.original_sql.as_str(), |attempt| attempt.sql.as_str())
    }

    pub fn final_result(&self) -> &ConfidenceResult {
        self.attempts
            .last()
            .map_or(&self.initial, |attempt| &attempt.result)
    }

    pub fn improved(&self) -> bool {
        self.final_result().overall_confidence > self.initial.overall_confidence
    }
}

/// Evaluates `sql` and keeps applying registered fixes until the query is
/// accepted, nothing changes, or `max_attempts` rewrites have been made.
pub fn correct_until_stable<P: SqlParser>(
    scorer: &ConfidenceScorer<P>,
    corrector: &SelfCorrector,
    sql: &str,
    schema: &Schema,
    context: &[String],
    max_attempts: usize,
) -> CorrectionOutcome {
    let initial = scorer.evaluate(sql, schema, context);
    let mut attempts: Vec<CorrectionAttempt> = Vec::new();

    let stop_reason = loop {
        let (current_sql, current) = attempts
            .last()
            .map_or((sql, &initial), |attempt| (attempt.sql.as_str(), &attempt.result));

        if current.recommendation == Recommendation::Accept {
            break StopReason::Accepted;
        }
        if attempts.len() >= max_attempts {
            break StopReason::AttemptLimit;
        }

        let correction = corrector.correct(current_sql, &current.issues);
        let Some(corrected) = correction.corrected_sql else {
            break StopReason::NoFixApplied;
        };
        if corrected == current_sql {
            break StopReason::Unchanged;
        }

        let result = scorer.evaluate(&corrected, schema, context);
        info!(
            attempt = attempts.len() + 1,
            fixes = ?correction.applied_fixes,
            confidence = result.overall_confidence,
            "correction attempt"
        );
        attempts.push(CorrectionAttempt {
            attempt: attempts.len() + 1,
            sql: corrected,
            applied_fixes: correction.applied_fixes,
            result,
        });
    };

    CorrectionOutcome {
        original_sql: sql.to_string(),
        initial,
        attempts,
        stop_reason,
    }
}
