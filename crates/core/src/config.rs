//! Tunable parameters of the engine.
//!
//! Every magic number the validators use lives here so that it can be
//! calibrated from `sqlguard.toml` without touching code. All sections
//! deserialize with defaults, so a partial `[engine]` table is valid.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::model::{Dimension, Severity};

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: Weights,
    pub deductions: Deductions,
    pub thresholds: Thresholds,
    /// Upper bound on the overall confidence whenever a critical issue exists
    pub critical_ceiling: f64,
    /// Decimal places the overall confidence is rounded to
    pub precision: u32,
    /// Inputs longer than this are rejected before parsing
    pub max_sql_length: usize,
    /// Merge the PostgreSQL system catalog into non-empty schemas
    pub include_system_catalog: bool,
    pub parser: ParserConfig,
    pub hallucination: HallucinationConfig,
    pub context: ContextConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            deductions: Deductions::default(),
            thresholds: Thresholds::default(),
            critical_ceiling: 0.65,
            precision: 4,
            max_sql_length: 100_000,
            include_system_catalog: true,
            parser: ParserConfig::default(),
            hallucination: HallucinationConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

/// Weight of each dimension in the overall confidence. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub schema: f64,
    pub syntax: f64,
    pub semantic: f64,
    pub context: f64,
    pub business: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            schema: 0.30,
            syntax: 0.25,
            semantic: 0.20,
            context: 0.15,
            business: 0.10,
        }
    }
}

impl Weights {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Schema => self.schema,
            Dimension::Syntax => self.syntax,
            Dimension::Semantic => self.semantic,
            Dimension::Context => self.context,
            Dimension::Business => self.business,
        }
    }

    pub fn total(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }
}

/// Score deducted per issue, by severity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deductions {
    pub critical: f64,
    pub warning: f64,
    pub info: f64,
}

impl Default for Deductions {
    fn default() -> Self {
        Self {
            critical: 0.5,
            warning: 0.15,
            info: 0.05,
        }
    }
}

impl Deductions {
    pub fn for_severity(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::Warning => self.warning,
            Severity::Info => self.info,
        }
    }
}

/// Lower bounds of the ACCEPT and CORRECT bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub accept: f64,
    pub correct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            accept: 0.7,
            correct: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Dialect name understood by `sqlparser::dialect::dialect_from_str`
    pub dialect: String,
    /// Maximum expression nesting depth before the parser gives up
    pub recursion_limit: usize,
    /// Inputs whose estimated expression nesting (chained operators plus
    /// parentheses) exceeds this are rejected before parsing
    pub max_expression_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            dialect: "generic".to_string(),
            recursion_limit: 50,
            max_expression_depth: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HallucinationConfig {
    /// Functions accepted in addition to the built-in standard list
    pub extra_functions: Vec<String>,
    /// Case-insensitive patterns for placeholder-like identifiers
    pub placeholder_patterns: Vec<String>,
}

impl Default for HallucinationConfig {
    fn default() -> Self {
        Self {
            extra_functions: Vec::new(),
            placeholder_patterns: DEFAULT_PLACEHOLDER_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

pub const DEFAULT_PLACEHOLDER_PATTERNS: &[&str] = &[
    r"^table_?\d*$",
    r"^table_?name$",
    r"^(my|your|some|sample|example|test|dummy)_?(table|column|field)\d*$",
    r"^col(umn)?_?([a-z]|\d+)?$",
    r"^col(umn)?_?name$",
    r"^field_?\d+$",
    r"^(foo|bar|baz|qux|quux|placeholder|dummy|tbd|todo|x{3,})$",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Identifier-like terms shorter than this are ignored
    pub min_term_length: usize,
    /// Terms too generic to count as a match
    pub stop_words: Vec<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            min_term_length: 4,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "check", "use", "for", "with", "from", "where", "select", "group", "order", "having",
    "revenue", "column", "table", "query", "queries", "clause",
];

impl EngineConfig {
    /// Checks that the configuration is internally consistent.
    ///
    /// Regex patterns are compiled (and reported) when the scorer is built.
    pub fn validate(&self) -> EngineResult<()> {
        for dimension in Dimension::ALL {
            check_unit(&format!("weights.{}", dimension), self.weights.get(dimension))?;
        }
        if (self.weights.total() - 1.0).abs() > 1e-6 {
            return Err(EngineError::invalid_config(
                "weights",
                format!("weights must sum to 1.0, got {}", self.weights.total()),
            ));
        }

        check_unit("deductions.critical", self.deductions.critical)?;
        check_unit("deductions.warning", self.deductions.warning)?;
        check_unit("deductions.info", self.deductions.info)?;
        if self.deductions.critical < self.deductions.warning {
            return Err(EngineError::invalid_config(
                "deductions",
                "critical deduction must not be smaller than the warning deduction",
            ));
        }

        check_unit("thresholds.accept", self.thresholds.accept)?;
        check_unit("thresholds.correct", self.thresholds.correct)?;
        if self.thresholds.correct > self.thresholds.accept {
            return Err(EngineError::invalid_config(
                "thresholds",
                "correct threshold must not exceed the accept threshold",
            ));
        }

        check_unit("critical_ceiling", self.critical_ceiling)?;
        if self.precision > 10 {
            return Err(EngineError::invalid_config(
                "precision",
                "at most 10 decimal places are supported",
            ));
        }
        if self.max_sql_length == 0 {
            return Err(EngineError::invalid_config(
                "max_sql_length",
                "must be greater than zero",
            ));
        }
        if self.parser.recursion_limit == 0 {
            return Err(EngineError::invalid_config(
                "parser.recursion_limit",
                "must be greater than zero",
            ));
        }
        if self.parser.max_expression_depth == 0 {
            return Err(EngineError::invalid_config(
                "parser.max_expression_depth",
                "must be greater than zero",
            ));
        }
        if sqlparser::dialect::dialect_from_str(&self.parser.dialect).is_none() {
            return Err(EngineError::UnknownDialect(self.parser.dialect.clone()));
        }
        Ok(())
    }
}

fn check_unit(field: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::invalid_config(
            field,
            format!("{} is outside [0, 1]", value),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default()
            .validate()
            .expect("default configuration should validate");
    }

    #[test]
    fn default_weights_sum_to_one() {
        assert!((Weights::default().total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let mut config = EngineConfig::default();
        config.weights.business = 0.5;
        let err = config.validate().unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("weights"));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut config = EngineConfig::default();
        config.thresholds.correct = 0.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_dialect() {
        let mut config = EngineConfig::default();
        config.parser.dialect = "cobol".to_string();
        assert!(matches!(config.validate(), Err(EngineError::UnknownDialect(_))));
    }

    #[test]
    fn rejects_zero_expression_depth() {
        let mut config = EngineConfig::default();
        config.parser.max_expression_depth = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_expression_depth"));
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "deductions": { "critical": 0.4 }, "precision": 2 }"#)
                .expect("partial config should deserialize");
        assert_eq!(config.deductions.critical, 0.4);
        assert_eq!(config.deductions.warning, 0.15);
        assert_eq!(config.precision, 2);
        assert_eq!(config.weights, Weights::default());
    }
}
