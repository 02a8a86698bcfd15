use serde::Deserialize;
use sqlguard_core::EngineConfig;
use std::path::{Path, PathBuf};

use crate::error::{Result, RunnerError};
use crate::report::OutputFormat;

pub const CONFIG_FILE: &str = "sqlguard.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: String,
    pub schema: SchemaSource,
    #[serde(default)]
    pub context: ContextSource,
    pub queries: QuerySource,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// JSON object mapping table names to column lists
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaSource {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextSource {
    pub path: Option<PathBuf>,
}

/// A single `.sql` file or a directory searched recursively
#[derive(Debug, Clone, Deserialize)]
pub struct QuerySource {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Report file; stdout when absent
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    pub max_attempts: usize,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

impl Config {
    /// Walks up from `start_dir` until a `sqlguard.toml` is found.
    ///
    /// Returns the loaded config together with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<(Self, PathBuf)> {
        let mut current_dir = start_dir.to_path_buf();

        loop {
            let config_path = current_dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::load(&config_path)?;
                return Ok((config, current_dir));
            }

            if !current_dir.pop() {
                return Err(RunnerError::ConfigNotFound(start_dir.to_path_buf()));
            }
        }
    }

    /// Loads a config file. Relative paths are resolved against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        if let Some(root) = path.parent() {
            config.resolve_paths(root);
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, root: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        };
        resolve(&mut self.schema.path);
        resolve(&mut self.queries.path);
        if let Some(path) = self.context.path.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.output.path.as_mut() {
            resolve(path);
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.schema.path.is_file() {
            return Err(RunnerError::InvalidPath(self.schema.path.clone()));
        }

        if !self.queries.path.exists() {
            return Err(RunnerError::InvalidPath(self.queries.path.clone()));
        }

        if let Some(path) = &self.context.path {
            if !path.is_file() {
                return Err(RunnerError::InvalidPath(path.clone()));
            }
        }

        if let Some(parent) = self.output.path.as_ref().and_then(|path| path.parent()) {
            if !parent.exists() {
                return Err(RunnerError::InvalidPath(parent.to_path_buf()));
            }
        }

        self.engine.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MINIMAL: &str = r#"version = "1.0"

[schema]
path = "schema.json"

[queries]
path = "queries"
"#;

    fn workspace(config: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("schema.json"), r#"{"sales": ["region"]}"#).unwrap();
        fs::create_dir(dir.path().join("queries")).unwrap();
        fs::write(dir.path().join(CONFIG_FILE), config).unwrap();
        dir
    }

    #[test]
    fn finds_config_in_a_parent_directory() {
        let dir = workspace(MINIMAL);
        let nested = dir.path().join("queries");

        let (config, root) = Config::find_and_load(&nested).unwrap();
        assert_eq!(root, dir.path());
        assert_eq!(config.schema.path, dir.path().join("schema.json"));
        assert_eq!(config.correction.max_attempts, 2);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn engine_section_overrides_defaults() {
        let dir = workspace(&format!(
            "{}\n[engine]\ncritical_ceiling = 0.6\n\n[engine.parser]\ndialect = \"postgresql\"\n",
            MINIMAL
        ));
        let config = Config::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.engine.critical_ceiling, 0.6);
        assert_eq!(config.engine.parser.dialect, "postgresql");
        assert_eq!(config.engine.weights, EngineConfig::default().weights);
    }

    #[test]
    fn missing_paths_are_rejected() {
        let dir = workspace(&MINIMAL.replace("schema.json", "nope.json"));
        let err = Config::load(&dir.path().join(CONFIG_FILE)).unwrap_err();
        assert!(matches!(err, RunnerError::InvalidPath(path) if path.ends_with("nope.json")));
    }

    #[test]
    fn invalid_engine_settings_are_rejected() {
        let dir = workspace(&format!("{}\n[engine]\ncritical_ceiling = 3.0\n", MINIMAL));
        let err = Config::load(&dir.path().join(CONFIG_FILE)).unwrap_err();
        assert!(matches!(err, RunnerError::Engine(_)));
    }
}
