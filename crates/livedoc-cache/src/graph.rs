//! File dependency graph
//!
//! Records `path -> {paths it depends on}` together with the reverse index
//! used for cascade invalidation. Cycles are allowed; traversal is guarded
//! by a visited set so every node is yielded at most once.

use std::collections::{HashMap, HashSet, VecDeque};

/// Forward and reverse dependency edges keyed by normalized path
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    forward: HashMap<String, HashSet<String>>,
    reverse: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    /// Create empty graph
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the dependency set of `path`
    pub fn record(&mut self, path: &str, dependencies: impl IntoIterator<Item = String>) {
        self.forget(path);
        let deps: HashSet<String> = dependencies
            .into_iter()
            .filter(|dep| dep != path)
            .collect();
        for dep in &deps {
            self.reverse
                .entry(dep.clone())
                .or_default()
                .insert(path.to_string());
        }
        if !deps.is_empty() {
            self.forward.insert(path.to_string(), deps);
        }
    }

    /// Drop the outgoing edges of `path`
    pub fn forget(&mut self, path: &str) {
        let Some(old) = self.forward.remove(path) else {
            return;
        };
        for dep in old {
            if let Some(dependents) = self.reverse.get_mut(&dep) {
                dependents.remove(path);
                if dependents.is_empty() {
                    self.reverse.remove(&dep);
                }
            }
        }
    }

    /// Paths `path` depends on
    #[must_use]
    pub fn dependencies(&self, path: &str) -> Vec<String> {
        sorted(self.forward.get(path))
    }

    /// Paths whose dependency set contains `path`
    #[must_use]
    pub fn dependents(&self, path: &str) -> Vec<String> {
        sorted(self.reverse.get(path))
    }

    /// `start` followed by every transitive dependent, breadth first
    #[must_use]
    pub fn cascade(&self, start: &str) -> Vec<String> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            order.push(current.to_string());
            if let Some(dependents) = self.reverse.get(current) {
                let mut next: Vec<&str> = dependents.iter().map(String::as_str).collect();
                next.sort_unstable();
                queue.extend(next.into_iter().filter(|d| !visited.contains(d)));
            }
        }
        order
    }

    /// Number of paths with at least one dependency
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.forward.len()
    }

    /// Total number of edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.forward.values().map(HashSet::len).sum()
    }

    /// Remove every edge
    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }
}

fn sorted(set: Option<&HashSet<String>>) -> Vec<String> {
    let mut out: Vec<String> = set.into_iter().flatten().cloned().collect();
    out.sort_unstable();
    out
}
