//! Build rule synthesis and execution
//!
//! This crate handles:
//! - Naming completion markers
//! - Rendering make rules from a resolved graph
//! - Merging generated rules into a hand-written makefile
//! - Running make

pub mod marker;
pub mod synthesizer;
pub mod merge;
pub mod executor;

pub use marker::MarkerNamespace;
pub use synthesizer::{RuleSynthesizer, SynthesisError, BUILD_TARGET, RESET_TARGET};
pub use merge::merge_generated;
pub use executor::{MakeInvocation, ExecutorError};
