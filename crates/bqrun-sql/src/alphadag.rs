//! External `alphadag` analyzer
//!
//! Runs alphadag (directly or through docker) with `--with_tables` and reads
//! the DOT graph it writes: script nodes are labelled with their `.sql`
//! path, `script -> table` edges are writes and `table -> script` edges
//! are reads.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use bqrun_core::DependencyFact;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::extractor::{ExtractionError, FactExtractor};

/// Mount point of the output directory inside the container
const DOCKER_OUTPUT_DIR: &str = "/bqrun_output";

/// Where alphadag runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlphadagMode {
    /// `alphadag` found on PATH
    Binary,

    /// `alphadag` inside a docker image
    Docker { image: String },
}

/// Fact extractor delegating to alphadag
#[derive(Debug, Clone)]
pub struct AlphadagExtractor {
    mode: AlphadagMode,
}

impl AlphadagExtractor {
    pub fn binary() -> Self {
        Self {
            mode: AlphadagMode::Binary,
        }
    }

    pub fn docker(image: impl Into<String>) -> Self {
        Self {
            mode: AlphadagMode::Docker {
                image: image.into(),
            },
        }
    }

    /// Full command line writing the graph to `output_dir/dag.dot`
    pub fn command(&self, dir: &str, output_dir: &str) -> Vec<String> {
        match &self.mode {
            AlphadagMode::Binary => binary_command(dir, &format!("{}/dag.dot", output_dir)),
            AlphadagMode::Docker { image } => docker_command(dir, output_dir, image),
        }
    }
}

/// `alphadag --with_tables --output_path <output> <dir>`
pub fn binary_command(dir: &str, output_path: &str) -> Vec<String> {
    vec![
        "alphadag".to_string(),
        "--with_tables".to_string(),
        "--output_path".to_string(),
        output_path.to_string(),
        dir.to_string(),
    ]
}

/// Same as [`binary_command`] inside a container with `dir` mounted as the
/// working directory and `output_dir` mounted for the graph file
pub fn docker_command(dir: &str, output_dir: &str, image: &str) -> Vec<String> {
    let mut cmd = vec![
        "docker".to_string(),
        "run".to_string(),
        "--rm".to_string(),
        "-v".to_string(),
        format!("{}:{}", output_dir, DOCKER_OUTPUT_DIR),
        "-v".to_string(),
        format!("{}:/home", dir),
        "-w".to_string(),
        "/home".to_string(),
        image.to_string(),
    ];

    cmd.extend(binary_command(".", &format!("{}/dag.dot", DOCKER_OUTPUT_DIR)));
    cmd
}

impl FactExtractor for AlphadagExtractor {
    fn extract(&self, dir: &Path) -> Result<Vec<DependencyFact>, ExtractionError> {
        let dir = std::fs::canonicalize(dir).map_err(|source| ExtractionError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        // removed together with the graph file when dropped
        let output_dir = tempfile::tempdir().map_err(|source| ExtractionError::Io {
            path: std::env::temp_dir(),
            source,
        })?;

        let dir_str = dir.display().to_string();
        let cmd = self.command(&dir_str, &output_dir.path().display().to_string());
        info!(command = %cmd.join(" "), "running alphadag");

        let output = Command::new(&cmd[0])
            .args(&cmd[1..])
            .output()
            .map_err(|source| ExtractionError::Spawn {
                program: cmd[0].clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractionError::AnalyzerFailed {
                program: cmd[0].clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let dot_path = output_dir.path().join("dag.dot");
        let dot = std::fs::read_to_string(&dot_path).map_err(|source| ExtractionError::Io {
            path: dot_path.clone(),
            source,
        })?;

        let root = match self.mode {
            AlphadagMode::Binary => dir_str.as_str(),
            AlphadagMode::Docker { .. } => ".",
        };

        parse_dot(&dot, root).map_err(|message| ExtractionError::InvalidOutput {
            path: dot_path,
            message,
        })
    }
}

static NODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*"?(\w+)"?\s*\[\s*label\s*=\s*"([^"]*)""#).expect("node pattern is valid")
});
static EDGE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*"?(\w+)"?\s*->\s*"?(\w+)"?"#).expect("edge pattern is valid"));

/// Convert an alphadag graph into one fact per script
///
/// Script labels are made relative to `root`.
pub fn parse_dot(dot: &str, root: &str) -> Result<Vec<DependencyFact>, String> {
    let mut labels: BTreeMap<&str, &str> = BTreeMap::new();
    for caps in NODE_PATTERN.captures_iter(dot) {
        let (_, [id, label]) = caps.extract();
        labels.insert(id, label);
    }

    // origin -> (targets, sources)
    let mut scripts: BTreeMap<String, (Vec<String>, Vec<String>)> = labels
        .values()
        .filter(|label| is_script(label))
        .map(|label| (origin_name(label, root), Default::default()))
        .collect();

    for caps in EDGE_PATTERN.captures_iter(dot) {
        let (_, [from, to]) = caps.extract();
        let from: &str = labels
            .get(from)
            .copied()
            .ok_or_else(|| format!("edge from undeclared node {}", from))?;
        let to: &str = labels
            .get(to)
            .copied()
            .ok_or_else(|| format!("edge to undeclared node {}", to))?;

        match (is_script(from), is_script(to)) {
            (true, false) => {
                if let Some(entry) = scripts.get_mut(&origin_name(from, root)) {
                    entry.0.push(to.to_string());
                }
            }
            (false, true) => {
                if let Some(entry) = scripts.get_mut(&origin_name(to, root)) {
                    entry.1.push(from.to_string());
                }
            }
            // script -> script edges are alphadag's own inference
            _ => debug!(from = %from, to = %to, "skipping edge"),
        }
    }

    Ok(scripts
        .into_iter()
        .map(|(origin, (targets, sources))| DependencyFact::new(targets, sources, origin))
        .collect())
}

fn is_script(label: &str) -> bool {
    label.ends_with(".sql")
}

fn origin_name(label: &str, root: &str) -> String {
    let relative = label
        .strip_prefix(root)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(label);
    relative.trim_start_matches("./").to_string()
}
