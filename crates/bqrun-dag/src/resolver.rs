//! Table ownership and dependency resolution
//!
//! Turns a flat list of dependency facts into per-origin prerequisite sets.
//! A read is *internal* when some origin in the set creates the table and
//! *external* otherwise; only internal reads produce prerequisite edges.

use std::collections::{BTreeMap, BTreeSet};

use bqrun_core::{DependencyFact, OriginId, TableId};
use tracing::debug;

use crate::graph::ResolvedGraph;

/// Resolution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("table '{table}' is created in multiple files: {}", .origins.join(", "))]
    DuplicateTarget { table: TableId, origins: Vec<OriginId> },

    #[error("table '{0}' is not created by any file")]
    NotFound(TableId),

    #[error("table '{table}' has multiple owners: {}", .origins.join(", "))]
    MultipleOwners { table: TableId, origins: Vec<OriginId> },

    #[error("no file named '{0}' in the dependency set")]
    UnknownOrigin(OriginId),

    #[error("circular dependency: {}", .origins.join(" -> "))]
    Cycle { origins: Vec<OriginId> },
}

/// Index from table to the origins whose facts create it
///
/// Built without validation, so it can also describe fact sets that
/// violate target uniqueness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerIndex {
    owners: BTreeMap<TableId, Vec<OriginId>>,
}

impl OwnerIndex {
    /// Index the targets of every fact
    pub fn from_facts(facts: &[DependencyFact]) -> Self {
        let mut owners: BTreeMap<TableId, Vec<OriginId>> = BTreeMap::new();

        for fact in facts {
            for target in fact.targets() {
                owners
                    .entry(target.clone())
                    .or_default()
                    .push(fact.origin().to_string());
            }
        }

        Self { owners }
    }

    /// Look up the single origin creating `table`
    pub fn resolve(&self, table: &str) -> Result<&str, ResolveError> {
        match self.owners.get(table).map(Vec::as_slice) {
            None | Some([]) => Err(ResolveError::NotFound(table.to_string())),
            Some([origin]) => Ok(origin.as_str()),
            Some(origins) => Err(ResolveError::MultipleOwners {
                table: table.to_string(),
                origins: origins.to_vec(),
            }),
        }
    }

    /// Whether some fact creates `table`
    pub fn contains(&self, table: &str) -> bool {
        self.owners.contains_key(table)
    }

    /// All created tables, sorted
    pub fn tables(&self) -> impl Iterator<Item = &TableId> {
        self.owners.keys()
    }

    /// Tables claimed by more than one fact, sorted by table
    pub fn duplicates(&self) -> impl Iterator<Item = (&TableId, &[OriginId])> {
        self.owners
            .iter()
            .filter(|(_, origins)| origins.len() > 1)
            .map(|(table, origins)| (table, origins.as_slice()))
    }
}

/// Dependency resolver over a validated fact set
#[derive(Debug, Clone)]
pub struct Resolver {
    /// Facts as extracted (kept for rendering)
    facts: Vec<DependencyFact>,

    /// Facts whose sources are restricted to internal, non-self tables
    filtered: Vec<DependencyFact>,

    owners: OwnerIndex,
}

impl Resolver {
    /// Validate target uniqueness and classify every read
    pub fn new(facts: Vec<DependencyFact>) -> Result<Self, ResolveError> {
        let owners = OwnerIndex::from_facts(&facts);

        if let Some((table, origins)) = owners.duplicates().next() {
            return Err(ResolveError::DuplicateTarget {
                table: table.clone(),
                origins: origins.to_vec(),
            });
        }

        let filtered: Vec<DependencyFact> = facts
            .iter()
            .map(|fact| fact.filter_sources(|s| owners.contains(s) && !fact.writes(s)))
            .collect();

        for (orig, kept) in facts.iter().zip(&filtered) {
            debug!(
                origin = orig.origin(),
                internal = kept.sources().len(),
                external = orig.sources().iter().filter(|s| !owners.contains(s)).count(),
                "classified sources"
            );
        }

        Ok(Self {
            facts,
            filtered,
            owners,
        })
    }

    /// Origin creating `table`
    pub fn resolve(&self, table: &str) -> Result<&str, ResolveError> {
        self.owners.resolve(table)
    }

    /// Origins that must finish before `origin` can run
    pub fn prerequisites(&self, origin: &str) -> Result<BTreeSet<OriginId>, ResolveError> {
        let mut facts = self
            .filtered
            .iter()
            .filter(|fact| fact.origin() == origin)
            .peekable();

        if facts.peek().is_none() {
            return Err(ResolveError::UnknownOrigin(origin.to_string()));
        }

        let mut prerequisites = BTreeSet::new();
        for fact in facts {
            for source in fact.sources() {
                let owner = self.owners.resolve(source)?;
                if owner != origin {
                    prerequisites.insert(owner.to_string());
                }
            }
        }

        Ok(prerequisites)
    }

    /// Distinct origins, sorted
    pub fn origins(&self) -> BTreeSet<&str> {
        self.facts.iter().map(DependencyFact::origin).collect()
    }

    /// Facts as extracted
    pub fn facts(&self) -> &[DependencyFact] {
        &self.facts
    }

    /// Ownership index
    pub fn owners(&self) -> &OwnerIndex {
        &self.owners
    }

    /// Compute the prerequisite set of every origin
    pub fn graph(&self) -> Result<ResolvedGraph, ResolveError> {
        let mut prerequisites = BTreeMap::new();

        for origin in self.origins() {
            let deps = self.prerequisites(origin)?;
            debug!(origin, prerequisites = ?deps, "resolved origin");
            prerequisites.insert(origin.to_string(), deps);
        }

        Ok(ResolvedGraph::new(
            prerequisites,
            self.facts.clone(),
            self.owners.clone(),
        ))
    }
}
