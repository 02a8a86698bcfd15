use thiserror::Error;

/// Result type for engine construction and request handling
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported to the caller of the engine.
///
/// Problems with the SQL being evaluated are never errors; they are scored
/// as issues. These variants describe a broken call contract or an unusable
/// configuration.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request carried no schema at all (as opposed to an empty one)
    #[error("Evaluation request is missing a schema")]
    MissingSchema,

    /// A configuration value is out of range or inconsistent
    #[error("Invalid configuration for '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    /// A configured regex pattern failed to compile
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The configured SQL dialect is not known to the parser
    #[error("Unknown SQL dialect '{0}'")]
    UnknownDialect(String),
}

impl EngineError {
    /// Creates an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn report(&self) -> String {
        match self {
            Self::MissingSchema => "Evaluation request is missing a schema\n\
                 Suggestion: Pass an empty schema ({}) if no table information is available."
                .to_string(),
            Self::InvalidConfig { field, message } => {
                format!(
                    "Invalid configuration for '{}': {}\n\
                         Suggestion: Check the [engine] section of sqlguard.toml.",
                    field, message
                )
            }
            Self::InvalidPattern { pattern, source } => {
                format!(
                    "Invalid pattern '{}': {}\n\
                         Suggestion: Placeholder patterns use Rust regex syntax.",
                    pattern, source
                )
            }
            Self::UnknownDialect(dialect) => {
                format!(
                    "Unknown SQL dialect '{}'\n\
                         Suggestion: Use one of generic, postgresql, mysql, sqlite, mssql, snowflake, bigquery, duckdb.",
                    dialect
                )
            }
        }
    }

    /// Returns true if this error comes from configuration rather than a request
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::InvalidPattern { .. } | Self::UnknownDialect(_)
        )
    }
}
