use serde::{Deserialize, Serialize};

use crate::model::BusinessContext;
use crate::schema::Schema;

/// A self-contained evaluation request, as received from a caller over JSON.
///
/// `schema` is optional only so that its absence can be told apart from an
/// empty schema; evaluating a request without one is an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub sql: String,
    #[serde(default)]
    pub schema: Option<Schema>,
    #[serde(default)]
    pub context: BusinessContext,
}

impl EvaluationRequest {
    pub fn new(sql: impl Into<String>, schema: Schema) -> Self {
        Self {
            sql: sql.into(),
            schema: Some(schema),
            context: BusinessContext::new(),
        }
    }

    pub fn with_context<I, S>(mut self, context: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context = context.into_iter().map(Into::into).collect();
        self
    }
}
