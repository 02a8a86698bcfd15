//! SqlGuard scores generated SQL for trustworthiness before it is executed.
//!
//! # Overview
//!
//! Given a query, the schema it is supposed to run against and a list of
//! business statements, the engine runs five independent checks (syntax,
//! schema, semantic, context, business rules) plus a hallucination pass and
//! folds them into a single confidence with an ACCEPT / CORRECT / REJECT
//! recommendation.
//!
//! # Key Features
//!
//! - Schema validation with case-insensitive, alias-aware resolution
//! - Detection of invented tables, columns and functions
//! - GROUP BY / WHERE / ORDER BY semantic checks
//! - Deterministic self-correction of aggregate and grouping mistakes
//!
//! # Quick Start
//!
//! ```rust
//! use sqlguard_core::prelude::*;
//!
//! let scorer = ConfidenceScorer::default();
//! let schema = Schema::new().with_table("sales", ["region", "net_revenue", "fiscal_year"]);
//!
//! let sql = "SELECT region, net_revenue FROM sales WHERE SUM(net_revenue) > 1000";
//! let result = scorer.evaluate(sql, &schema, &[]);
//! assert_eq!(result.recommendation, Recommendation::Correct);
//!
//! let corrector = SelfCorrector::new(scorer.config()).expect("valid config");
//! let fixed = corrector.correct(sql, &result.issues);
//! assert!(fixed.corrected_sql.unwrap().contains("HAVING"));
//! ```

extern crate self as sqlguard_core;

pub mod config;
pub mod corrector;
pub mod error;
pub mod functions;
pub mod model;
pub mod parser;
pub mod prelude;
pub mod request;
pub mod schema;
pub mod scorer;
pub mod validators;

pub use config::EngineConfig;
pub use corrector::SelfCorrector;
pub use error::{EngineError, EngineResult};
pub use request::EvaluationRequest;
pub use schema::Schema;
pub use scorer::ConfidenceScorer;
