//! Dependency graph construction and install planning.
//!
//! Graph problems are fatal configuration errors and must surface before any
//! build process is spawned: a cycle discovered mid-install would leave the
//! library in an unrecoverable half-built state.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use thiserror::Error;

use crate::lockfile::PackageRecord;
use crate::types::PackageName;

/// Fatal graph construction errors.
#[derive(Error, Debug)]
pub enum GraphError {
    /// The requirement edges form a cycle.
    #[error("circular dependency detected involving package: {0}")]
    Cycle(PackageName),

    /// A requirement names a package that is neither in the record set nor
    /// provided by the base installation.
    #[error("package {package} requires {requirement}, which is not available")]
    Unresolved {
        /// The package whose requirement could not be satisfied.
        package: PackageName,
        /// The missing requirement.
        requirement: PackageName,
    },
}

/// Packages shipped with every R installation; requirements on these are
/// always considered satisfied.
pub fn base_packages() -> HashSet<PackageName> {
    [
        "R",
        "base",
        "compiler",
        "datasets",
        "grDevices",
        "graphics",
        "grid",
        "methods",
        "parallel",
        "splines",
        "stats",
        "stats4",
        "tcltk",
        "tools",
        "utils",
    ]
    .into_iter()
    .map(PackageName::new)
    .collect()
}

/// A validated, acyclic dependency graph over package records.
///
/// Nodes are keyed by package name; an edge A -> B means A requires B. Edges
/// to provided (base) packages are dropped at construction since they are
/// already satisfied.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeMap<PackageName, PackageRecord>,
}

impl DependencyGraph {
    /// Build and validate a graph from parsed records.
    ///
    /// `provided` names packages satisfied outside this run (see
    /// [`base_packages`]). Unresolved requirements and cycles are fatal.
    pub fn build(
        records: Vec<PackageRecord>,
        provided: &HashSet<PackageName>,
    ) -> Result<Self, GraphError> {
        let mut nodes: BTreeMap<PackageName, PackageRecord> = BTreeMap::new();
        for mut record in records {
            record.requires.retain(|req| !provided.contains(req));
            if let Some(previous) = nodes.insert(record.package.clone(), record) {
                tracing::warn!(package = %previous.package, "duplicate record, keeping the later one");
            }
        }

        let graph = Self { nodes };
        graph.check_resolved()?;
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Number of packages in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no packages.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up one package's record.
    pub fn get(&self, name: &PackageName) -> Option<&PackageRecord> {
        self.nodes.get(name)
    }

    /// Package names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.nodes.keys()
    }

    /// A deterministic installation order: a topological sort with
    /// lexicographic tie-breaking, so identical inputs always produce the
    /// same plan.
    pub fn install_plan(&self) -> Vec<PackageName> {
        let mut pending: BTreeMap<&PackageName, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&PackageName, Vec<&PackageName>> = BTreeMap::new();

        for (name, record) in &self.nodes {
            pending.entry(name).or_insert(0);
            for req in &record.requires {
                *pending.entry(name).or_insert(0) += 1;
                dependents.entry(req).or_default().push(name);
            }
        }

        let mut ready: BTreeSet<&PackageName> = pending
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut plan = Vec::with_capacity(self.nodes.len());
        while let Some(name) = ready.pop_first() {
            plan.push(name.clone());
            for &dependent in dependents.get(name).into_iter().flatten() {
                let degree = pending
                    .get_mut(dependent)
                    .expect("dependent is a known node");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }

        debug_assert_eq!(plan.len(), self.nodes.len(), "graph was validated acyclic");
        plan
    }

    /// Every requirement must be another node. Edges to provided packages
    /// were already dropped in `build`.
    fn check_resolved(&self) -> Result<(), GraphError> {
        for (name, record) in &self.nodes {
            for req in &record.requires {
                if !self.nodes.contains_key(req) {
                    return Err(GraphError::Unresolved {
                        package: name.clone(),
                        requirement: req.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Depth-first cycle detection with visiting/visited marking.
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut visited: HashSet<&PackageName> = HashSet::new();
        let mut visiting: HashSet<&PackageName> = HashSet::new();

        for name in self.nodes.keys() {
            self.visit(name, &mut visited, &mut visiting)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a PackageName,
        visited: &mut HashSet<&'a PackageName>,
        visiting: &mut HashSet<&'a PackageName>,
    ) -> Result<(), GraphError> {
        if visited.contains(name) {
            return Ok(());
        }
        if !visiting.insert(name) {
            return Err(GraphError::Cycle(name.clone()));
        }

        if let Some(record) = self.nodes.get(name) {
            for req in &record.requires {
                self.visit(req, visited, visiting)?;
            }
        }

        visiting.remove(name);
        visited.insert(name);
        Ok(())
    }
}
