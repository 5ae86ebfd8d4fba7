use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use thiserror::Error;
use trellis_project::SourceRootKind;

use crate::view::{ViewKey, ViewKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("view `{dependent}` cannot depend on `{dependency}`: the edge would close a cycle")]
    Cycle {
        dependent: ViewKey,
        dependency: ViewKey,
    },
}

/// "View X is derived from view Y" edges, used to propagate invalidation.
///
/// Edges are checked on registration; the graph is always acyclic.
#[derive(Debug, Clone, Default)]
pub struct ViewGraph {
    /// dependency -> views derived from it.
    dependents: HashMap<ViewKey, BTreeSet<ViewKey>>,
}

impl ViewGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The edges between the built-in views, for both source-root kinds.
    pub fn standard() -> Self {
        use ViewKind::*;
        const EDGES: &[(ViewKind, ViewKind)] = &[
            (LegacyBoot, Endorsed),
            (LegacyCompile, LegacyBoot),
            (LegacyRuntime, LegacyBoot),
            (Processor, LegacyCompile),
            (Compile, LegacyCompile),
            (ModulePath, LegacyCompile),
            (Runtime, LegacyRuntime),
            (ModuleRuntime, LegacyRuntime),
            (Boot, LegacyBoot),
            (Boot, ModuleBoot),
        ];

        let mut graph = Self::new();
        for root in SourceRootKind::ALL {
            for &(dependent, dependency) in EDGES {
                // The table above is acyclic; a failure here is a programming error caught
                // by the unit tests.
                let _ = graph.add_edge(
                    ViewKey::new(dependent, root),
                    ViewKey::new(dependency, root),
                );
            }
        }
        graph
    }

    /// Declare that `dependent` is derived from `dependency`.
    pub fn add_edge(&mut self, dependent: ViewKey, dependency: ViewKey) -> Result<(), GraphError> {
        if dependent == dependency || self.reaches(dependent, dependency) {
            return Err(GraphError::Cycle {
                dependent,
                dependency,
            });
        }
        self.dependents
            .entry(dependency)
            .or_default()
            .insert(dependent);
        Ok(())
    }

    /// Whether `to` is (transitively) derived from `from`.
    fn reaches(&self, from: ViewKey, to: ViewKey) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(key) = queue.pop_front() {
            if key == to {
                return true;
            }
            if !seen.insert(key) {
                continue;
            }
            if let Some(next) = self.dependents.get(&key) {
                queue.extend(next.iter().copied());
            }
        }
        false
    }

    pub fn dependents_of(&self, key: ViewKey) -> impl Iterator<Item = ViewKey> + '_ {
        self.dependents.get(&key).into_iter().flatten().copied()
    }

    /// `roots` plus every view derived from them, breadth-first, each key once.
    pub fn closure(&self, roots: impl IntoIterator<Item = ViewKey>) -> Vec<ViewKey> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<ViewKey> = roots.into_iter().collect();
        while let Some(key) = queue.pop_front() {
            if !seen.insert(key) {
                continue;
            }
            order.push(key);
            queue.extend(self.dependents_of(key));
        }
        order
    }
}
