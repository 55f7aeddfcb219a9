//! Dependency resolution and graph construction
//!
//! This crate handles:
//! - Validating table ownership across all scripts
//! - Computing the scripts each script must wait for
//! - Optional cycle detection
//! - Rendering the table graph for visualization
//! - Diagnostics over a whole fact set

pub mod resolver;
pub mod graph;
pub mod render;
pub mod analysis;

pub use resolver::{Resolver, ResolveError, OwnerIndex};
pub use graph::ResolvedGraph;
pub use render::{render, RenderedGraph, GraphNode, GraphEdge, NodeKind};
pub use analysis::analyze;
