//! Makefile rule synthesis
//!
//! Projects a resolved graph into make rules:
//! - one rule per origin whose target is the origin's completion marker and
//!   whose prerequisites are the script plus the markers it waits for
//! - an `all` rule over every marker
//! - a `clean` rule removing the marker directory
//!
//! Each origin rule pipes the script into the query command and then touches
//! its marker. make stops a recipe at the first failing line, so a failed
//! query leaves no marker and the origin is retried on the next run.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use bqrun_core::Config;
use bqrun_dag::ResolvedGraph;
use minijinja::{context, Environment};
use serde::Serialize;
use tracing::{debug, info};

use crate::marker::MarkerNamespace;
use crate::merge::merge_generated;

/// Target building every origin
pub const BUILD_TARGET: &str = "all";

/// Target removing every completion marker
pub const RESET_TARGET: &str = "clean";

const TEMPLATE_NAME: &str = "Makefile";

const TEMPLATE: &str = "\
.PHONY: all clean
all: {{ markers | join(\" \") }}

{% for dir in marker_dirs -%}
{{ dir }}:
\tmkdir -p $@

{% endfor -%}
{% for rule in rules -%}
{{ rule.marker }}: {{ rule.prerequisites | join(\" \") }} | {{ rule.marker_dir }}
\tcat {{ rule.source }} | {{ query_command }}
\ttouch $@

{% endfor -%}
clean:
\trm -rf {{ marker_dir }}
";

/// Rule synthesis errors
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("origins {first} and {second} share the completion marker {marker}")]
    MarkerCollision {
        marker: String,
        first: String,
        second: String,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
struct Rule {
    marker: String,
    marker_dir: String,
    source: String,
    prerequisites: Vec<String>,
}

/// Renders build rules for a resolved graph
#[derive(Debug, Clone)]
pub struct RuleSynthesizer {
    markers: MarkerNamespace,
    query_command: String,
}

impl RuleSynthesizer {
    pub fn new(markers: MarkerNamespace, query_command: impl Into<String>) -> Self {
        Self {
            markers,
            query_command: query_command.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            MarkerNamespace::new(config.marker_dir.as_str()),
            config.query_command.as_str(),
        )
    }

    pub fn markers(&self) -> &MarkerNamespace {
        &self.markers
    }

    /// Build rule text for every origin of `graph`, sorted by origin
    pub fn emit(&self, graph: &ResolvedGraph) -> Result<String, SynthesisError> {
        let mut rules = Vec::with_capacity(graph.len());
        let mut owners: BTreeMap<String, &str> = BTreeMap::new();

        for origin in graph.origins() {
            let mut waits_for: Vec<String> = graph
                .prerequisites(origin)
                .into_iter()
                .flatten()
                .map(|dep| self.markers.marker(dep))
                .collect();
            waits_for.sort();

            let mut prerequisites = Vec::with_capacity(waits_for.len() + 1);
            prerequisites.push(origin.clone());
            prerequisites.extend(waits_for);

            let marker = self.markers.marker(origin);
            if let Some(first) = owners.insert(marker.clone(), origin.as_str()) {
                return Err(SynthesisError::MarkerCollision {
                    marker,
                    first: first.to_string(),
                    second: origin.clone(),
                });
            }

            debug!(origin = %origin, ?prerequisites, "rule");
            rules.push(Rule {
                marker,
                marker_dir: self.markers.marker_dir(origin),
                source: origin.clone(),
                prerequisites,
            });
        }

        let markers: Vec<&str> = owners.keys().map(String::as_str).collect();
        let marker_dirs: BTreeSet<&str> = rules.iter().map(|r| r.marker_dir.as_str()).collect();

        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.add_template(TEMPLATE_NAME, TEMPLATE)?;

        let rendered = env.get_template(TEMPLATE_NAME)?.render(context! {
            markers => &markers,
            marker_dir => self.markers.root(),
            marker_dirs => &marker_dirs,
            rules => &rules,
            query_command => &self.query_command,
        })?;

        Ok(rendered)
    }

    /// Write the rules to `sink`
    pub fn write_to(&self, graph: &ResolvedGraph, sink: &mut impl Write) -> Result<(), SynthesisError> {
        let text = self.emit(graph)?;
        sink.write_all(text.as_bytes())
            .map_err(|source| SynthesisError::Io {
                path: PathBuf::from("<sink>"),
                source,
            })
    }

    /// Regenerate the rules below `sentinel` in `path`, keeping anything
    /// written above it. A missing file is created.
    pub fn merge_into_file(
        &self,
        graph: &ResolvedGraph,
        path: &Path,
        sentinel: &str,
    ) -> Result<(), SynthesisError> {
        let existing = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(SynthesisError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let merged = merge_generated(&existing, sentinel, &self.emit(graph)?);
        std::fs::write(path, merged).map_err(|source| SynthesisError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), origins = graph.len(), "wrote build rules");
        Ok(())
    }
}
