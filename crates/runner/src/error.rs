use sqlguard_core::EngineError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Config file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl RunnerError {
    pub fn report(&self) -> String {
        match self {
            Self::ConfigNotFound(dir) => format!(
                "No sqlguard.toml found in {} or any parent directory\n\
                 Suggestion: Run 'sqlguard init' to create one.",
                dir.display()
            ),
            Self::InvalidPath(path) => format!(
                "Path {} does not exist\n\
                 Suggestion: Paths in sqlguard.toml are relative to the directory containing it.",
                path.display()
            ),
            Self::Engine(err) => err.report(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RunnerError>;
