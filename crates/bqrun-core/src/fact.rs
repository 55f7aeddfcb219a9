//! Dependency facts produced by an extractor
//!
//! A fact records which tables one production unit writes and reads.

use serde::{Deserialize, Serialize};

/// Fully-qualified table name (e.g. `project.dataset.table`)
pub type TableId = String;

/// File-level identifier of a production unit (e.g. `1.sql`)
pub type OriginId = String;

/// Tables written and read by a single origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawFact")]
pub struct DependencyFact {
    targets: Vec<TableId>,
    sources: Vec<TableId>,
    origin: OriginId,
}

impl DependencyFact {
    /// Create a fact. Duplicate targets and sources are dropped, keeping
    /// the first occurrence.
    pub fn new<T, S>(targets: T, sources: S, origin: impl Into<OriginId>) -> Self
    where
        T: IntoIterator,
        T::Item: Into<TableId>,
        S: IntoIterator,
        S::Item: Into<TableId>,
    {
        Self {
            targets: dedup(targets.into_iter().map(Into::into)),
            sources: dedup(sources.into_iter().map(Into::into)),
            origin: origin.into(),
        }
    }

    /// Tables this unit writes
    pub fn targets(&self) -> &[TableId] {
        &self.targets
    }

    /// Tables this unit reads
    pub fn sources(&self) -> &[TableId] {
        &self.sources
    }

    /// Producing unit
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether `table` is one of this fact's own targets
    pub fn writes(&self, table: &str) -> bool {
        self.targets.iter().any(|t| t == table)
    }

    /// Copy of this fact keeping only sources accepted by `keep`
    pub fn filter_sources(&self, mut keep: impl FnMut(&str) -> bool) -> Self {
        Self {
            targets: self.targets.clone(),
            sources: self
                .sources
                .iter()
                .filter(|s| keep(s))
                .cloned()
                .collect(),
            origin: self.origin.clone(),
        }
    }
}

/// Wire shape of a fact; deserializing goes through [`DependencyFact::new`]
#[derive(Deserialize)]
struct RawFact {
    #[serde(default)]
    targets: Vec<TableId>,
    #[serde(default)]
    sources: Vec<TableId>,
    origin: OriginId,
}

impl From<RawFact> for DependencyFact {
    fn from(raw: RawFact) -> Self {
        Self::new(raw.targets, raw.sources, raw.origin)
    }
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Unqualified part of a table name (`p.d.t1` -> `t1`)
pub fn short_name(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}
