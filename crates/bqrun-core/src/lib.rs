//! bqrun Core
//!
//! Core domain model shared by every bqrun crate.
//! Never rename diagnostic codes - they are part of the public API.

pub mod fact;
pub mod diagnostic;
pub mod report;
pub mod config;

pub use fact::{DependencyFact, TableId, OriginId, short_name};
pub use diagnostic::{Diagnostic, DiagnosticCode, Severity};
pub use report::{Report, ReportSummary, ReportVersion};
pub use config::{Config, ConfigError, ExtractorKind};
