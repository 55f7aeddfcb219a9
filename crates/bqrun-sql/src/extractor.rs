//! Fact extraction from a directory of scripts

use std::path::{Path, PathBuf};

use bqrun_core::DependencyFact;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::tokens::{parse_script, SyntaxError};

/// Failure to produce dependency facts
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to scan {}: {source}", .dir.display())]
    Walk {
        dir: PathBuf,
        source: walkdir::Error,
    },

    #[error("{}: {source}", .path.display())]
    Syntax {
        path: PathBuf,
        source: SyntaxError,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}\n{stderr}")]
    AnalyzerFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("unreadable analyzer output {}: {message}", .path.display())]
    InvalidOutput { path: PathBuf, message: String },
}

/// Source of dependency facts for a project directory
pub trait FactExtractor {
    /// Extract one or more facts per script in `dir`
    fn extract(&self, dir: &Path) -> Result<Vec<DependencyFact>, ExtractionError>;
}

/// `*.sql` files directly inside `dir`, sorted by name
pub fn discover_sql_files(dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| ExtractionError::Walk {
            dir: dir.to_path_buf(),
            source,
        })?;

        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

/// In-process extractor built on the sqlparser tokenizer
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlExtractor;

impl SqlExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the fact of a single script; the origin is its file name
    pub fn extract_file(&self, path: &Path) -> Result<DependencyFact, ExtractionError> {
        let sql = std::fs::read_to_string(path).map_err(|source| ExtractionError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let tables = parse_script(&sql).map_err(|source| ExtractionError::Syntax {
            path: path.to_path_buf(),
            source,
        })?;

        let origin = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        debug!(
            origin = %origin,
            targets = ?tables.targets,
            sources = ?tables.sources,
            "extracted script"
        );

        Ok(DependencyFact::new(tables.targets, tables.sources, origin))
    }
}

impl FactExtractor for SqlExtractor {
    fn extract(&self, dir: &Path) -> Result<Vec<DependencyFact>, ExtractionError> {
        let files = discover_sql_files(dir)?;
        info!(dir = %dir.display(), files = files.len(), "extracting dependencies");

        files.iter().map(|path| self.extract_file(path)).collect()
    }
}
