//! Data types shared by the validators, the scorer and the corrector.
//!
//! Everything here is plain, immutable data that serializes to the JSON
//! shape the presentation layer consumes.

pub mod issue;
pub mod result;

pub use issue::{Dimension, Issue, IssueCode, Location, Replacement, Severity};
pub use result::{ConfidenceResult, CorrectionResult, DimensionScore, FixCode, Recommendation};

/// Free-text business statements such as "Revenue = net_revenue column"
pub type BusinessContext = Vec<String>;
