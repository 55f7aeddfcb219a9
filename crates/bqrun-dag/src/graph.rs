//! Resolved dependency graph
//!
//! Read-only result of resolution: the direct prerequisite origins of every
//! origin, plus the unfiltered facts and ownership index for rendering.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use bqrun_core::{DependencyFact, OriginId};

use crate::resolver::{OwnerIndex, ResolveError};

/// Origin-level dependency graph
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    /// origin -> origins it waits for
    prerequisites: BTreeMap<OriginId, BTreeSet<OriginId>>,

    facts: Vec<DependencyFact>,

    owners: OwnerIndex,
}

impl ResolvedGraph {
    pub(crate) fn new(
        prerequisites: BTreeMap<OriginId, BTreeSet<OriginId>>,
        facts: Vec<DependencyFact>,
        owners: OwnerIndex,
    ) -> Self {
        Self {
            prerequisites,
            facts,
            owners,
        }
    }

    /// All origins, sorted
    pub fn origins(&self) -> impl Iterator<Item = &OriginId> {
        self.prerequisites.keys()
    }

    /// Direct prerequisites of an origin
    pub fn prerequisites(&self, origin: &str) -> Option<&BTreeSet<OriginId>> {
        self.prerequisites.get(origin)
    }

    /// Number of origins
    pub fn len(&self) -> usize {
        self.prerequisites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prerequisites.is_empty()
    }

    /// Facts as extracted, before internal/external classification
    pub fn facts(&self) -> &[DependencyFact] {
        &self.facts
    }

    pub fn owners(&self) -> &OwnerIndex {
        &self.owners
    }

    /// Tables read by some origin but created by none
    pub fn external_tables(&self) -> BTreeSet<&str> {
        self.facts
            .iter()
            .flat_map(|fact| fact.sources())
            .filter(|source| !self.owners.contains(source))
            .map(String::as_str)
            .collect()
    }

    /// Origins in an order where every origin follows its prerequisites
    ///
    /// Fails with [`ResolveError::Cycle`] naming one cycle if there is none.
    pub fn topological_order(&self) -> Result<Vec<OriginId>, ResolveError> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();

        for (origin, prerequisites) in &self.prerequisites {
            in_degree.insert(origin, prerequisites.len());
            for prerequisite in prerequisites {
                children.entry(prerequisite).or_default().push(origin);
            }
        }

        // Kahn's algorithm, seeded in sorted order for a stable result
        let mut queue: VecDeque<&str> = self
            .prerequisites
            .iter()
            .filter(|(_, prerequisites)| prerequisites.is_empty())
            .map(|(origin, _)| origin.as_str())
            .collect();
        let mut order = Vec::with_capacity(self.prerequisites.len());

        while let Some(origin) = queue.pop_front() {
            order.push(origin.to_string());

            for child in children.get(origin).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        if order.len() == self.prerequisites.len() {
            return Ok(order);
        }

        let remaining: BTreeSet<&str> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(origin, _)| origin)
            .collect();

        Err(ResolveError::Cycle {
            origins: self.find_cycle(&remaining),
        })
    }

    /// Reject graphs the executor could not schedule
    pub fn check_acyclic(&self) -> Result<(), ResolveError> {
        self.topological_order().map(|_| ())
    }

    /// Walk prerequisites inside `remaining` until an origin repeats.
    ///
    /// Every origin left over by Kahn's algorithm has a prerequisite that is
    /// also left over, so the walk always closes a loop.
    fn find_cycle(&self, remaining: &BTreeSet<&str>) -> Vec<OriginId> {
        let mut path: Vec<&str> = Vec::new();
        let mut current = match remaining.iter().next() {
            Some(origin) => *origin,
            None => return Vec::new(),
        };

        loop {
            if let Some(start) = path.iter().position(|origin| *origin == current) {
                let mut cycle: Vec<OriginId> =
                    path[start..].iter().map(|o| o.to_string()).collect();
                cycle.push(current.to_string());
                return cycle;
            }
            path.push(current);

            let next = self
                .prerequisites
                .get(current)
                .and_then(|deps| deps.iter().find(|d| remaining.contains(d.as_str())));

            match next {
                Some(next) => current = next,
                None => return path.into_iter().map(String::from).collect(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Resolver;

    const NONE: [&str; 0] = [];

    fn graph(facts: Vec<DependencyFact>) -> ResolvedGraph {
        Resolver::new(facts).unwrap().graph().unwrap()
    }

    #[test]
    fn origins_are_sorted() {
        let g = graph(vec![
            DependencyFact::new(["b"], NONE, "2.sql"),
            DependencyFact::new(["a"], NONE, "1.sql"),
        ]);
        let origins: Vec<&OriginId> = g.origins().collect();
        assert_eq!(origins, ["1.sql", "2.sql"]);
    }

    #[test]
    fn topological_order_follows_prerequisites() {
        let g = graph(vec![
            DependencyFact::new(["t3"], ["t2"], "c.sql"),
            DependencyFact::new(["t2"], ["t1"], "b.sql"),
            DependencyFact::new(["t1"], NONE, "a.sql"),
        ]);

        assert_eq!(g.topological_order().unwrap(), ["a.sql", "b.sql", "c.sql"]);
        assert!(g.check_acyclic().is_ok());
    }

    #[test]
    fn cycle_is_reported_with_its_members() {
        let g = graph(vec![
            DependencyFact::new(["t1"], ["t2"], "1.sql"),
            DependencyFact::new(["t2"], ["t1"], "2.sql"),
            DependencyFact::new(["t3"], NONE, "3.sql"),
        ]);

        match g.check_acyclic() {
            Err(ResolveError::Cycle { origins }) => {
                assert_eq!(origins, ["1.sql", "2.sql", "1.sql"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn external_tables_are_collected() {
        let g = graph(vec![
            DependencyFact::new(["t1"], ["x", "y"], "1.sql"),
            DependencyFact::new(["t2"], ["t1", "x"], "2.sql"),
        ]);

        assert_eq!(g.external_tables(), BTreeSet::from(["x", "y"]));
    }
}
