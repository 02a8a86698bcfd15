pub use crate::config::EngineConfig;
pub use crate::corrector::{registered_fix, SelfCorrector};
pub use crate::error::{EngineError, EngineResult};
pub use crate::model::{
    BusinessContext, ConfidenceResult, CorrectionResult, Dimension, DimensionScore, FixCode,
    Issue, IssueCode, Location, Recommendation, Replacement, Severity,
};
pub use crate::parser::{DialectParser, ParseOutcome, SqlParser};
pub use crate::request::EvaluationRequest;
pub use crate::schema::Schema;
pub use crate::scorer::ConfidenceScorer;
