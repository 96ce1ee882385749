//! Declaration dependency graph and compute levels.
//!
//! This graph is over declaration identities, not over cells. A declaration
//! with no dependency has level 0; any other has level
//! `1 + max(level of its dependencies)`. Evaluating declarations in
//! ascending level order never reads a declaration before the ones it is
//! built from.

use crate::{GraphError, KeyId};

/// Dependency graph over declarations.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    names: Vec<String>,
    dependencies: Vec<Vec<KeyId>>,
    dependents: Vec<Vec<KeyId>>,
    levels: Option<Vec<usize>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of declarations.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no declaration was added.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns true if `key` belongs to this graph.
    pub fn contains(&self, key: KeyId) -> bool {
        key.0 < self.names.len()
    }

    /// Add a declaration without dependencies.
    pub fn add_key(&mut self, name: impl Into<String>) -> KeyId {
        let id = KeyId(self.names.len());
        self.names.push(name.into());
        self.dependencies.push(Vec::new());
        self.dependents.push(Vec::new());
        self.levels = None;
        id
    }

    /// Name of `key`.
    pub fn name(&self, key: KeyId) -> Option<&str> {
        self.names.get(key.0).map(String::as_str)
    }

    /// Record that `key` is computed from `depends_on`.
    ///
    /// A declaration depending on itself (inheriting from its own value in
    /// the parent scope) adds no edge. Fails if the edge closes a cycle.
    pub fn add_dependency(&mut self, key: KeyId, depends_on: KeyId) -> Result<(), GraphError> {
        for id in [key, depends_on] {
            if !self.contains(id) {
                return Err(GraphError::UnknownKey { key: id });
            }
        }
        if key == depends_on || self.dependencies[key.0].contains(&depends_on) {
            return Ok(());
        }
        if let Some(mut path) = self.path(depends_on, key) {
            path.insert(0, key);
            return Err(self.cycle_error(&path));
        }
        self.dependencies[key.0].push(depends_on);
        self.dependents[depends_on.0].push(key);
        self.levels = None;
        Ok(())
    }

    /// Declarations `key` is computed from.
    pub fn dependencies(&self, key: KeyId) -> &[KeyId] {
        self.dependencies.get(key.0).map_or(&[], Vec::as_slice)
    }

    /// Declarations computed from `key`.
    pub fn dependents(&self, key: KeyId) -> &[KeyId] {
        self.dependents.get(key.0).map_or(&[], Vec::as_slice)
    }

    /// Returns true if levels are up to date.
    pub fn is_resolved(&self) -> bool {
        self.levels.is_some()
    }

    /// Assign a compute level to every declaration.
    ///
    /// Levels are assigned in rounds: a round takes every declaration whose
    /// dependencies all got a level in earlier rounds. A round that takes
    /// nothing means the remaining declarations form a cycle.
    pub fn resolve(&mut self) -> Result<(), GraphError> {
        if self.levels.is_some() {
            return Ok(());
        }
        let mut levels: Vec<Option<usize>> = vec![None; self.len()];
        let mut remaining: Vec<KeyId> = (0..self.len()).map(KeyId).collect();
        let mut level = 0;
        while !remaining.is_empty() {
            let ready: Vec<KeyId> = remaining
                .iter()
                .copied()
                .filter(|key| {
                    self.dependencies[key.0]
                        .iter()
                        .all(|dep| levels[dep.0].is_some_and(|l| l < level))
                })
                .collect();
            if ready.is_empty() {
                return Err(self.cycle_error(&self.find_cycle(&remaining, &levels)));
            }
            for key in &ready {
                levels[key.0] = Some(level);
            }
            remaining.retain(|key| levels[key.0].is_none());
            level += 1;
        }
        let levels: Vec<usize> = levels.into_iter().flatten().collect();
        tracing::debug!(
            declarations = levels.len(),
            levels = level,
            "resolved declaration dependencies"
        );
        self.levels = Some(levels);
        Ok(())
    }

    /// Compute level of `key`, if resolved.
    pub fn level(&self, key: KeyId) -> Option<usize> {
        self.levels.as_ref()?.get(key.0).copied()
    }

    /// `keys` and everything they are computed from, grouped by ascending
    /// compute level.
    pub fn key_order(&mut self, keys: &[KeyId]) -> Result<Vec<Vec<KeyId>>, GraphError> {
        self.resolve()?;
        let mut needed = vec![false; self.len()];
        let mut stack: Vec<KeyId> = Vec::new();
        for &key in keys {
            if !self.contains(key) {
                return Err(GraphError::UnknownKey { key });
            }
            stack.push(key);
        }
        while let Some(key) = stack.pop() {
            if !std::mem::replace(&mut needed[key.0], true) {
                stack.extend(self.dependencies[key.0].iter().copied());
            }
        }

        let mut groups: Vec<Vec<KeyId>> = Vec::new();
        for (index, _) in needed.iter().enumerate().filter(|(_, needed)| **needed) {
            let key = KeyId(index);
            let Some(level) = self.level(key) else {
                continue;
            };
            if groups.len() <= level {
                groups.resize_with(level + 1, Vec::new);
            }
            groups[level].push(key);
        }
        groups.retain(|group| !group.is_empty());
        Ok(groups)
    }

    /// Path of dependency edges from `from` to `to`, both included.
    fn path(&self, from: KeyId, to: KeyId) -> Option<Vec<KeyId>> {
        let mut parent: Vec<Option<KeyId>> = vec![None; self.len()];
        let mut visited = vec![false; self.len()];
        let mut stack = vec![from];
        visited[from.0] = true;
        while let Some(key) = stack.pop() {
            if key == to {
                let mut path = vec![to];
                let mut current = to;
                while let Some(previous) = parent[current.0] {
                    path.push(previous);
                    current = previous;
                }
                path.reverse();
                return Some(path);
            }
            for &dep in &self.dependencies[key.0] {
                if !visited[dep.0] {
                    visited[dep.0] = true;
                    parent[dep.0] = Some(key);
                    stack.push(dep);
                }
            }
        }
        None
    }

    fn find_cycle(&self, remaining: &[KeyId], levels: &[Option<usize>]) -> Vec<KeyId> {
        let mut path: Vec<KeyId> = Vec::new();
        let mut current = remaining[0];
        loop {
            if let Some(start) = path.iter().position(|key| *key == current) {
                let mut cycle = path.split_off(start);
                cycle.push(current);
                return cycle;
            }
            path.push(current);
            match self.dependencies[current.0]
                .iter()
                .find(|dep| levels[dep.0].is_none())
            {
                Some(next) => current = *next,
                None => return path,
            }
        }
    }

    fn cycle_error(&self, path: &[KeyId]) -> GraphError {
        GraphError::DependencyCycle {
            path: path
                .iter()
                .map(|key| self.names[key.0].clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test levels along a chain
    #[test]
    fn test_chain_levels() {
        let mut graph = DependencyGraph::new();
        let indent = graph.add_key("INDENT");
        let max = graph.add_key("MAX_INDENT");
        let add = graph.add_key("ADD_INDENT");
        graph.add_dependency(max, indent).unwrap();
        graph.add_dependency(add, max).unwrap();
        graph.resolve().unwrap();
        assert_eq!(graph.level(indent), Some(0));
        assert_eq!(graph.level(max), Some(1));
        assert_eq!(graph.level(add), Some(2));
    }

    // Test that a level is one more than the deepest dependency
    #[test]
    fn test_diamond_levels() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_key("a");
        let b = graph.add_key("b");
        let c = graph.add_key("c");
        let d = graph.add_key("d");
        graph.add_dependency(b, a).unwrap();
        graph.add_dependency(c, b).unwrap();
        graph.add_dependency(d, a).unwrap();
        graph.add_dependency(d, c).unwrap();
        graph.resolve().unwrap();
        assert_eq!(graph.level(d), Some(3));
        assert_eq!(graph.dependents(a), &[b, d]);
    }

    // Test that self dependencies leave a declaration independent
    #[test]
    fn test_self_dependency_is_ignored() {
        let mut graph = DependencyGraph::new();
        let indent = graph.add_key("INDENT");
        graph.add_dependency(indent, indent).unwrap();
        assert!(graph.dependencies(indent).is_empty());
        graph.resolve().unwrap();
        assert_eq!(graph.level(indent), Some(0));
    }

    // Test cycle detection at registration
    #[test]
    fn test_cycle_detection() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_key("a");
        let b = graph.add_key("b");
        let c = graph.add_key("c");
        graph.add_dependency(b, a).unwrap();
        graph.add_dependency(c, b).unwrap();
        assert_eq!(
            graph.add_dependency(a, c),
            Err(GraphError::DependencyCycle {
                path: vec!["a".into(), "c".into(), "b".into(), "a".into()],
            })
        );
        assert!(graph.dependencies(a).is_empty());
        graph.resolve().unwrap();
    }

    // Test that levels are invalidated by new edges
    #[test]
    fn test_new_edges_require_resolution() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_key("a");
        let b = graph.add_key("b");
        graph.resolve().unwrap();
        assert_eq!(graph.level(b), Some(0));
        graph.add_dependency(b, a).unwrap();
        assert!(!graph.is_resolved());
        assert_eq!(graph.level(b), None);
        graph.resolve().unwrap();
        assert_eq!(graph.level(b), Some(1));
    }

    // Test grouping of keys and their dependencies by level
    #[test]
    fn test_key_order() {
        let mut graph = DependencyGraph::new();
        let width = graph.add_key("WIDTH");
        let length = graph.add_key("LENGTH");
        let perimeter = graph.add_key("PERIMETER");
        let total = graph.add_key("TOTAL");
        let unrelated = graph.add_key("UNRELATED");
        graph.add_dependency(perimeter, width).unwrap();
        graph.add_dependency(perimeter, length).unwrap();
        graph.add_dependency(total, perimeter).unwrap();
        let order = graph.key_order(&[total]).unwrap();
        assert_eq!(order, vec![vec![width, length], vec![perimeter], vec![total]]);
        assert!(!order.concat().contains(&unrelated));
        assert_eq!(
            graph.key_order(&[KeyId(99)]),
            Err(GraphError::UnknownKey { key: KeyId(99) })
        );
    }

    // Test unknown keys are rejected
    #[test]
    fn test_unknown_key() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_key("a");
        assert_eq!(
            graph.add_dependency(a, KeyId(7)),
            Err(GraphError::UnknownKey { key: KeyId(7) })
        );
        assert_eq!(graph.name(a), Some("a"));
        assert_eq!(graph.name(KeyId(7)), None);
    }
}
