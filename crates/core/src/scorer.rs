use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::{ConfidenceResult, Dimension, DimensionScore, Issue, Recommendation};
use crate::parser::{DialectParser, SqlParser};
use crate::request::EvaluationRequest;
use crate::schema::{Schema, SchemaIndex};
use crate::validators::syntax::{self, SyntaxOutcome};
use crate::validators::{
    business, schema, semantic, ContextValidator, HallucinationDetector, ValidatorOutput,
};

/// Runs every validator over one query and aggregates their scores.
///
/// Holds only immutable configuration, so a single scorer can serve any
/// number of concurrent evaluations.
///
/// ```rust
/// use sqlguard_core::prelude::*;
///
/// let scorer = ConfidenceScorer::default();
/// let schema = Schema::new().with_table("sales", ["region", "net_revenue"]);
/// let result = scorer.evaluate("SELECT region FROM sales", &schema, &[]);
/// assert_eq!(result.recommendation, Recommendation::Accept);
/// ```
#[derive(Debug, Clone)]
pub struct ConfidenceScorer<P = DialectParser> {
    config: EngineConfig,
    parser: P,
    context: ContextValidator,
    hallucinations: HallucinationDetector,
}

impl ConfidenceScorer<DialectParser> {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let parser = DialectParser::from_config(&config.parser)?;
        Self::with_parser(config, parser)
    }
}

impl Default for ConfidenceScorer<DialectParser> {
    fn default() -> Self {
        Self::new(EngineConfig::default()).expect("default engine configuration is valid")
    }
}

impl<P: SqlParser> ConfidenceScorer<P> {
    /// Builds a scorer around a caller-supplied parser
    pub fn with_parser(config: EngineConfig, parser: P) -> EngineResult<Self> {
        config.validate()?;
        let hallucinations = HallucinationDetector::new(&config)?;
        let context = ContextValidator::new(&config.context);
        Ok(Self {
            config,
            parser,
            context,
            hallucinations,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Scores `sql` against `schema` and the business `context`.
    ///
    /// Never fails: malformed input is reported as issues and a REJECT.
    pub fn evaluate(&self, sql: &str, schema: &Schema, context: &[String]) -> ConfidenceResult {
        let deductions = &self.config.deductions;

        let (statement, syntax) = match syntax::validate(&self.parser, sql, &self.config) {
            SyntaxOutcome::Valid { statement, output } => (statement, output),
            SyntaxOutcome::Invalid(output) => {
                debug!("query did not parse, dependent dimensions are blocked");
                return self.assemble([
                    (Dimension::Syntax, output),
                    (Dimension::Schema, ValidatorOutput::blocked(Dimension::Schema)),
                    (Dimension::Semantic, ValidatorOutput::blocked(Dimension::Semantic)),
                    (Dimension::Context, ValidatorOutput::blocked(Dimension::Context)),
                    (Dimension::Business, ValidatorOutput::blocked(Dimension::Business)),
                ]);
            }
        };

        let index = SchemaIndex::new(schema, self.config.include_system_catalog);
        let schema_output = schema::validate(&statement, &index, deductions);
        let hallucination = self.hallucinations.detect(&statement, &index, deductions);
        debug!(
            schema = schema_output.score,
            hallucination = hallucination.score,
            "folding hallucination score into schema dimension"
        );
        let schema_output = ValidatorOutput {
            score: schema_output.score.min(hallucination.score),
            issues: schema_output
                .issues
                .into_iter()
                .chain(hallucination.issues)
                .collect(),
        };

        self.assemble([
            (Dimension::Syntax, syntax),
            (Dimension::Schema, schema_output),
            (Dimension::Semantic, semantic::validate(&statement, deductions)),
            (Dimension::Context, self.context.validate(&statement, context)),
            (Dimension::Business, business::validate(&statement, deductions)),
        ])
    }

    /// Evaluates a request envelope. Fails only when the request has no schema.
    pub fn evaluate_request(&self, request: &EvaluationRequest) -> EngineResult<ConfidenceResult> {
        let schema = request.schema.as_ref().ok_or(EngineError::MissingSchema)?;
        Ok(self.evaluate(&request.sql, schema, &request.context))
    }

    fn assemble(&self, outputs: [(Dimension, ValidatorOutput); 5]) -> ConfidenceResult {
        let mut issues: Vec<Issue> = Vec::new();
        let mut dimension_scores = Vec::with_capacity(outputs.len());
        for (dimension, output) in outputs {
            debug!(
                %dimension,
                score = output.score,
                issues = output.issues.len(),
                "scored dimension"
            );
            issues.extend(output.issues.iter().cloned());
            dimension_scores.push(DimensionScore {
                dimension,
                raw_score: output.score,
                weight: self.config.weights.get(dimension),
                contributing_issues: output.issues,
            });
        }

        let mut overall: f64 = dimension_scores.iter().map(DimensionScore::weighted).sum();
        if issues.iter().any(Issue::is_critical) {
            overall = overall.min(self.config.critical_ceiling);
        }
        let overall_confidence = round_to(overall.clamp(0.0, 1.0), self.config.precision);
        let recommendation =
            Recommendation::from_confidence(overall_confidence, &self.config.thresholds);
        debug!(overall_confidence, %recommendation, "evaluated query");

        ConfidenceResult {
            overall_confidence,
            recommendation,
            hallucinations_detected: issues.iter().any(|issue| issue.code.is_hallucination()),
            issues,
            dimension_scores,
        }
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}
