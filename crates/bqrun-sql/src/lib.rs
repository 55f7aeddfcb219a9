//! Dependency fact extraction
//!
//! This crate handles:
//! - Finding the SQL scripts of a project directory
//! - Tokenizing BigQuery scripts to find created and read tables
//! - Delegating extraction to the external alphadag analyzer

pub mod tokens;
pub mod extractor;
pub mod alphadag;

pub use tokens::{parse_script, ScriptTables, SyntaxError};
pub use extractor::{discover_sql_files, ExtractionError, FactExtractor, SqlExtractor};
pub use alphadag::{AlphadagExtractor, AlphadagMode};
