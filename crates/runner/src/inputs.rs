//! Loading schemas, business context and query files from disk.

use serde::Serialize;
use sqlguard_core::model::BusinessContext;
use sqlguard_core::Schema;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, RunnerError};

/// One `.sql` file found under the configured query path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryFile {
    /// Path relative to the query root, without the extension
    pub name: String,
    pub path: PathBuf,
    pub sql: String,
}

/// Reads a schema from a JSON object of `table -> [columns]`.
pub fn load_schema(path: &Path) -> Result<Schema> {
    let content = fs::read_to_string(path)?;
    let schema: Schema = serde_json::from_str(&content)?;
    debug!(path = %path.display(), tables = schema.tables().count(), "loaded schema");
    Ok(schema)
}

/// Reads business context from a JSON array of strings, or from plain text
/// with one statement per line. Blank lines and `#` comments are skipped.
pub fn load_context(path: &Path) -> Result<BusinessContext> {
    let content = fs::read_to_string(path)?;
    if content.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(&content)?);
    }
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Collects every `.sql` file under `path`, sorted by path.
pub fn discover_queries(path: &Path) -> Result<Vec<QueryFile>> {
    if path.is_file() {
        return Ok(vec![read_query(path, path.parent().unwrap_or(path))?]);
    }
    if !path.is_dir() {
        return Err(RunnerError::InvalidPath(path.to_path_buf()));
    }

    let mut queries = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "sql") {
            queries.push(read_query(entry.path(), path)?);
        }
    }
    debug!(path = %path.display(), count = queries.len(), "discovered queries");
    Ok(queries)
}

fn read_query(path: &Path, root: &Path) -> Result<QueryFile> {
    let sql = fs::read_to_string(path)?;
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    let name = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Ok(QueryFile {
        name,
        path: path.to_path_buf(),
        sql: sql.trim().to_string(),
    })
}
