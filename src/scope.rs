//! Scope tree, declaration resolution and finalization.
//!
//! Every (scope, declaration, index) triple resolves to exactly one concrete
//! cell:
//!
//! 1. an explicit value installed at the scope wins;
//! 2. a stored declaration inherits the nearest ancestor's cell, a root
//!    falls back to the declaration default;
//! 3. a parent-computed declaration wraps the parent's cell;
//! 4. any other declaration collects its source cells over its scope set
//!    and builds a derived cell from them.
//!
//! Consumers never hold the resolved cell directly. [`Scope::data_point`]
//! hands out an alias, and [`Scope::finalize_all_scopes`] repoints every
//! alias once the tree is complete.

use std::cell::{Cell as StdCell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use crate::dependency::DependencyGraph;
use crate::key::{BuildFn, Declaration, KeyRule};
use crate::node::{Kind, Value};
use crate::serial::Stamp;
use crate::{Cell, CellId, CellKind, Graph, GraphError, Key, KeyId, ScopeSet, Volatile};

/// ScopeId identifies a scope within its [`DataManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScopeId(pub(crate) usize);

/// Wiring state of one (scope, declaration, index) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Never requested through [`Scope::data_point`].
    Unresolved,
    /// Wired against the tree as it was when requested or last finalized.
    Provisional,
    /// Wired by a finalize pass and no structural change since.
    Finalized,
}

type Slot = (KeyId, usize);

struct ScopeNode {
    name: String,
    parent: Option<ScopeId>,
    depth: usize,
    children: Vec<ScopeId>,
    descendants: Vec<ScopeId>,
    overrides: HashMap<Slot, CellId>,
    points: HashMap<Slot, Point>,
    derived: HashMap<Slot, DerivedEntry>,
}

/// Alias handed out to a consumer.
struct Point {
    alias: CellId,
    finalized: Option<u64>,
}

/// Derived cell together with the inputs it was built from.
struct DerivedEntry {
    cell: CellId,
    inputs: Vec<(KeyId, CellId)>,
}

/// DataManager owns the declarations and the scope tree.
///
/// This is cheap to clone, so you can pass it around by just cloning it.
#[derive(Clone)]
pub struct DataManager {
    inner: Rc<ManagerInner>,
}

struct ManagerInner {
    graph: Graph,
    declarations: RefCell<Vec<Declaration>>,
    dependencies: RefCell<DependencyGraph>,
    scopes: RefCell<Vec<ScopeNode>>,
    /// Advances on every structural change.
    epoch: StdCell<u64>,
}

impl Default for DataManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DataManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataManager")
            .field("declarations", &self.inner.declarations.borrow().len())
            .field("scopes", &self.inner.scopes.borrow().len())
            .field("graph", &self.inner.graph)
            .finish()
    }
}

impl DataManager {
    /// Create a manager with a new default graph.
    pub fn new() -> Self {
        Self::with_graph(Graph::new())
    }

    /// Create a manager building its cells in `graph`.
    pub fn with_graph(graph: Graph) -> Self {
        Self {
            inner: Rc::new(ManagerInner {
                graph,
                declarations: RefCell::new(Vec::new()),
                dependencies: RefCell::new(DependencyGraph::new()),
                scopes: RefCell::new(Vec::new()),
                epoch: StdCell::new(0),
            }),
        }
    }

    /// The graph holding every cell of this manager.
    pub fn graph(&self) -> &Graph {
        &self.inner.graph
    }

    /// Create a root scope.
    pub fn create_scope(&self, name: &str) -> Scope {
        self.add_scope(name, None)
    }

    /// Handle for an existing scope.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this manager.
    pub fn scope(&self, id: ScopeId) -> Scope {
        assert!(
            id.0 < self.inner.scopes.borrow().len(),
            "{id:?} does not belong to this manager"
        );
        Scope {
            manager: self.clone(),
            id,
        }
    }

    /// Number of scopes.
    pub fn scope_count(&self) -> usize {
        self.inner.scopes.borrow().len()
    }

    /// Number of declarations.
    pub fn key_count(&self) -> usize {
        self.inner.declarations.borrow().len()
    }

    /// Name of a declaration.
    pub fn key_name(&self, key: impl Into<KeyId>) -> Option<String> {
        let key = key.into();
        self.inner
            .declarations
            .borrow()
            .get(key.0)
            .map(|declaration| declaration.name.clone())
    }

    /// Assign compute levels to every declaration.
    pub fn resolve_dependencies(&self) -> Result<(), GraphError> {
        self.inner.dependencies.borrow_mut().resolve()
    }

    /// Compute level of a declaration, resolving levels first if needed.
    pub fn compute_level(&self, key: impl Into<KeyId>) -> Result<usize, GraphError> {
        let key = key.into();
        let mut dependencies = self.inner.dependencies.borrow_mut();
        dependencies.resolve()?;
        dependencies
            .level(key)
            .ok_or(GraphError::UnknownKey { key })
    }

    /// Declarations computed from `key`.
    pub fn dependent_keys(&self, key: impl Into<KeyId>) -> Vec<KeyId> {
        self.inner.dependencies.borrow().dependents(key.into()).to_vec()
    }

    /// Declarations `key` is computed from.
    pub fn key_dependencies(&self, key: impl Into<KeyId>) -> Vec<KeyId> {
        self.inner
            .dependencies
            .borrow()
            .dependencies(key.into())
            .to_vec()
    }

    /// `keys` and everything they are computed from, grouped by ascending
    /// compute level.
    pub fn compute_key_order(&self, keys: &[KeyId]) -> Result<Vec<Vec<KeyId>>, GraphError> {
        self.inner.dependencies.borrow_mut().key_order(keys)
    }

    pub(crate) fn register_independent(&self, name: &str, default: Value, rule: KeyRule) -> KeyId {
        let key = self.inner.dependencies.borrow_mut().add_key(name);
        self.push_declaration(name, default, rule);
        key
    }

    pub(crate) fn register(
        &self,
        name: &str,
        default: Value,
        rule: KeyRule,
        dependencies: &[KeyId],
    ) -> Result<KeyId, GraphError> {
        let mut graph = self.inner.dependencies.borrow_mut();
        if let Some(&key) = dependencies.iter().find(|key| !graph.contains(**key)) {
            return Err(GraphError::UnknownKey { key });
        }
        let key = graph.add_key(name);
        for &dependency in dependencies {
            graph.add_dependency(key, dependency)?;
        }
        drop(graph);
        self.push_declaration(name, default, rule);
        Ok(key)
    }

    fn push_declaration(&self, name: &str, default: Value, rule: KeyRule) {
        self.inner.declarations.borrow_mut().push(Declaration {
            name: name.to_string(),
            default,
            default_cell: None,
            rule,
        });
        self.bump_epoch();
    }

    fn bump_epoch(&self) {
        self.inner.epoch.set(self.inner.epoch.get() + 1);
    }

    fn add_scope(&self, name: &str, parent: Option<ScopeId>) -> Scope {
        let id = {
            let mut scopes = self.inner.scopes.borrow_mut();
            let id = ScopeId(scopes.len());
            let depth = parent.map_or(0, |parent| scopes[parent.0].depth + 1);
            scopes.push(ScopeNode {
                name: name.to_string(),
                parent,
                depth,
                children: Vec::new(),
                descendants: Vec::new(),
                overrides: HashMap::new(),
                points: HashMap::new(),
                derived: HashMap::new(),
            });
            if let Some(parent) = parent {
                scopes[parent.0].children.push(id);
                let mut ancestor = scopes[parent.0].parent;
                while let Some(current) = ancestor {
                    scopes[current.0].descendants.push(id);
                    ancestor = scopes[current.0].parent;
                }
            }
            id
        };
        self.bump_epoch();
        self.graph().tracer().on_scope_created(id, name);
        tracing::debug!(scope = name, id = id.0, ?parent, "created scope");
        Scope {
            manager: self.clone(),
            id,
        }
    }

    fn with_scope<R>(&self, id: ScopeId, f: impl FnOnce(&ScopeNode) -> R) -> R {
        f(&self.inner.scopes.borrow()[id.0])
    }

    fn with_scope_mut<R>(&self, id: ScopeId, f: impl FnOnce(&mut ScopeNode) -> R) -> R {
        f(&mut self.inner.scopes.borrow_mut()[id.0])
    }

    fn rule(&self, key: KeyId) -> KeyRule {
        match self.inner.declarations.borrow().get(key.0) {
            Some(declaration) => declaration.rule.clone(),
            None => panic!("{key:?} does not belong to this manager"),
        }
    }

    fn check_key(&self, key: KeyId) -> Result<(), GraphError> {
        if key.0 < self.inner.declarations.borrow().len() {
            Ok(())
        } else {
            Err(GraphError::UnknownKey { key })
        }
    }

    fn level(&self, key: KeyId) -> usize {
        self.inner
            .dependencies
            .borrow()
            .level(key)
            .unwrap_or_default()
    }

    fn default_cell(&self, key: KeyId) -> CellId {
        let (cached, default) = {
            let declarations = self.inner.declarations.borrow();
            let declaration = &declarations[key.0];
            (declaration.default_cell, declaration.default.clone())
        };
        if let Some(cell) = cached {
            return cell;
        }
        let cell = self.graph().insert(Some(default), Stamp::ZERO, Kind::Immutable);
        self.inner.declarations.borrow_mut()[key.0].default_cell = Some(cell);
        cell
    }

    fn root_of(&self, mut scope: ScopeId) -> ScopeId {
        while let Some(parent) = self.with_scope(scope, |node| node.parent) {
            scope = parent;
        }
        scope
    }

    /// Scopes selected by `set` relative to `scope`, by depth then creation.
    fn select(&self, scope: ScopeId, set: ScopeSet) -> Vec<ScopeId> {
        let scopes = self.inner.scopes.borrow();
        let node = &scopes[scope.0];
        let mut selected = Vec::new();
        if set.contains(ScopeSet::SELF) {
            selected.push(scope);
        }
        if set.contains(ScopeSet::PARENT) {
            selected.extend(node.parent);
        }
        if set.contains(ScopeSet::ANCESTORS) {
            let mut ancestor = node.parent.and_then(|parent| scopes[parent.0].parent);
            while let Some(current) = ancestor {
                selected.push(current);
                ancestor = scopes[current.0].parent;
            }
        }
        if set.contains(ScopeSet::CHILDREN) {
            selected.extend(node.children.iter().copied());
        }
        if set.contains(ScopeSet::DESCENDANTS) {
            selected.extend(node.descendants.iter().copied());
        }
        selected.sort_by_key(|id| (scopes[id.0].depth, *id));
        selected.dedup();
        selected
    }

    /// Indices with an explicit value or a consumer for `key` in `scope`.
    fn indices(&self, scope: ScopeId, key: KeyId) -> Vec<usize> {
        self.with_scope(scope, |node| {
            let mut indices: Vec<usize> = node
                .overrides
                .keys()
                .chain(node.points.keys())
                .filter(|(id, _)| *id == key)
                .map(|(_, index)| *index)
                .collect();
            indices.sort_unstable();
            indices.dedup();
            indices
        })
    }

    /// The concrete cell for a triple against the current tree.
    fn resolve(&self, scope: ScopeId, key: KeyId, index: usize) -> CellId {
        if let Some(cell) = self.with_scope(scope, |node| node.overrides.get(&(key, index)).copied()) {
            return cell;
        }
        let parent = self.with_scope(scope, |node| node.parent);
        match self.rule(key) {
            KeyRule::Stored => match parent {
                Some(parent) => self.resolve(parent, key, index),
                None => self.default_cell(key),
            },
            KeyRule::ParentComputed(build) => match parent {
                Some(parent) => {
                    let input = self.resolve(parent, key, index);
                    self.derive(scope, (key, index), vec![(key, input)], &build)
                }
                None => self.default_cell(key),
            },
            KeyRule::Gather {
                sources,
                scopes,
                build,
            } => {
                if scopes.contains(ScopeSet::RESULT_TOP) {
                    let root = self.root_of(scope);
                    if root != scope {
                        return self.resolve(root, key, index);
                    }
                }
                let mut inputs = Vec::new();
                for selected in self.select(scope, scopes) {
                    for &source in sources.iter() {
                        if scopes.contains(ScopeSet::INDICES) {
                            for i in self.indices(selected, source) {
                                inputs.push((source, self.resolve(selected, source, i)));
                            }
                        } else {
                            inputs.push((source, self.resolve(selected, source, index)));
                        }
                    }
                }
                if inputs.is_empty() {
                    return self.default_cell(key);
                }
                self.derive(scope, (key, index), inputs, &build)
            }
        }
    }

    /// Reuse the derived cell of `slot` if it was built from the same inputs.
    fn derive(
        &self,
        scope: ScopeId,
        slot: Slot,
        inputs: Vec<(KeyId, CellId)>,
        build: &BuildFn,
    ) -> CellId {
        let cached = self.with_scope(scope, |node| {
            node.derived
                .get(&slot)
                .filter(|entry| entry.inputs == inputs)
                .map(|entry| entry.cell)
        });
        if let Some(cell) = cached {
            return cell;
        }
        let cell = build(self.graph(), &inputs);
        self.with_scope_mut(scope, |node| {
            node.derived.insert(slot, DerivedEntry { cell, inputs });
        });
        cell
    }

    fn finalize(&self, scope: ScopeId) -> Result<usize, GraphError> {
        self.resolve_dependencies()?;
        let root = self.root_of(scope);

        let mut order = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            order.push(current);
            queue.extend(self.with_scope(current, |node| node.children.clone()));
        }

        let mut triples: Vec<(usize, usize, ScopeId, KeyId, usize, CellId)> = Vec::new();
        for &current in &order {
            self.with_scope(current, |node| {
                for (&(key, index), point) in &node.points {
                    triples.push((self.level(key), node.depth, current, key, index, point.alias));
                }
            });
        }
        triples.sort_unstable_by_key(|&(level, depth, scope, key, index, _)| {
            (level, depth, scope, key, index)
        });

        let epoch = self.inner.epoch.get();
        let graph = self.graph();
        graph.grouped_compute(|| {
            for &(_, _, current, key, index, alias) in &triples {
                let target = self.resolve(current, key, index);
                if graph.alias_target(alias) != Some(target) {
                    graph.retarget(alias, target)?;
                }
                self.with_scope_mut(current, |node| {
                    if let Some(point) = node.points.get_mut(&(key, index)) {
                        point.finalized = Some(epoch);
                    }
                });
            }
            Ok::<(), GraphError>(())
        })?;

        let name = self.with_scope(root, |node| node.name.clone());
        graph.tracer().on_finalize(root, triples.len());
        tracing::debug!(
            root = name.as_str(),
            scopes = order.len(),
            resolved = triples.len(),
            "finalized scope tree"
        );
        Ok(triples.len())
    }
}

/// Scope is a handle to a node of the scope tree.
///
/// This is cheap to clone.
#[derive(Clone)]
pub struct Scope {
    manager: DataManager,
    id: ScopeId,
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.manager.inner, &other.manager.inner)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}

impl Scope {
    fn node<R>(&self, f: impl FnOnce(&ScopeNode) -> R) -> R {
        self.manager.with_scope(self.id, f)
    }

    fn handles(&self, ids: Vec<ScopeId>) -> Vec<Scope> {
        ids.into_iter()
            .map(|id| Scope {
                manager: self.manager.clone(),
                id,
            })
            .collect()
    }

    /// The identifier of this scope.
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// The manager owning this scope.
    pub fn manager(&self) -> &DataManager {
        &self.manager
    }

    /// The graph holding the cells of this scope.
    pub fn graph(&self) -> &Graph {
        self.manager.graph()
    }

    /// The name given at creation.
    pub fn name(&self) -> String {
        self.node(|node| node.name.clone())
    }

    /// Distance from the root; roots are at depth 0.
    pub fn depth(&self) -> usize {
        self.node(|node| node.depth)
    }

    /// Returns true for scopes without a parent.
    pub fn is_root(&self) -> bool {
        self.node(|node| node.parent.is_none())
    }

    /// The parent scope.
    pub fn parent(&self) -> Option<Scope> {
        self.node(|node| node.parent).map(|id| Scope {
            manager: self.manager.clone(),
            id,
        })
    }

    /// Direct children in creation order.
    pub fn children(&self) -> Vec<Scope> {
        self.handles(self.node(|node| node.children.clone()))
    }

    /// Grandchildren and below, in creation order.
    pub fn descendants(&self) -> Vec<Scope> {
        self.handles(self.node(|node| node.descendants.clone()))
    }

    /// Grandparent and above, nearest first.
    pub fn ancestors(&self) -> Vec<Scope> {
        let grandparent = self.parent().and_then(|parent| parent.parent());
        let mut ancestors = Vec::new();
        let mut current = grandparent;
        while let Some(scope) = current {
            current = scope.parent();
            ancestors.push(scope);
        }
        ancestors
    }

    /// Create a child scope.
    pub fn create_scope(&self, name: &str) -> Scope {
        self.manager.add_scope(name, Some(self.id))
    }

    /// The cell a consumer reads for `key` at `index` in this scope.
    ///
    /// The first request wires the triple against the tree as it is now.
    /// Later structural changes are picked up by
    /// [`finalize_all_scopes`](Scope::finalize_all_scopes). Repeated requests
    /// return the same cell.
    ///
    /// # Panics
    ///
    /// Panics if `key` does not belong to this scope's manager.
    pub fn data_point<T: 'static>(&self, key: Key<T>, index: usize) -> Cell<T> {
        let slot = (key.id(), index);
        if let Some(alias) = self.node(|node| node.points.get(&slot).map(|point| point.alias)) {
            return Cell::from_id(alias);
        }
        let target = self.manager.resolve(self.id, key.id(), index);
        let alias = self.graph().alias(Cell::<T>::from_id(target));
        self.manager.with_scope_mut(self.id, |node| {
            node.points.insert(
                slot,
                Point {
                    alias: alias.id(),
                    finalized: None,
                },
            );
        });
        alias.cell()
    }

    /// Install `cell` as the explicit value of `key` at `index` in this
    /// scope, replacing any previous one.
    ///
    /// A consumer of the same triple in this scope follows immediately;
    /// other scopes follow after the next finalize. Fails if the consumer
    /// would end up reading itself.
    pub fn set_value<T: 'static>(
        &self,
        key: Key<T>,
        index: usize,
        cell: impl Into<Cell<T>>,
    ) -> Result<(), GraphError> {
        self.manager.check_key(key.id())?;
        let slot = (key.id(), index);
        let cell = cell.into().id();
        let point = self.node(|node| node.points.get(&slot).map(|point| point.alias));
        if let Some(alias) = point {
            if self.graph().alias_target(alias) != Some(cell) {
                self.graph().retarget(alias, cell)?;
            }
        }
        let replaced = self.manager.with_scope_mut(self.id, |node| node.overrides.insert(slot, cell));
        if replaced != Some(cell) {
            self.manager.bump_epoch();
        }
        Ok(())
    }

    /// Store `value` as the explicit value of `key` at `index`.
    ///
    /// An existing volatile value is updated in place, so cells already
    /// wired to it see the change without another finalize. Otherwise a new
    /// volatile cell is installed with [`set_value`](Scope::set_value).
    pub fn set<T: PartialEq + 'static>(
        &self,
        key: Key<T>,
        index: usize,
        value: T,
    ) -> Result<Volatile<T>, GraphError> {
        let existing = self.node(|node| node.overrides.get(&(key.id(), index)).copied());
        if let Some(id) = existing {
            if self.graph().kind(id) == CellKind::Volatile {
                let volatile = Volatile::from_id(id);
                volatile.set(self.graph(), value);
                return Ok(volatile);
            }
        }
        let volatile = self.graph().volatile(value);
        self.set_value(key, index, volatile)?;
        Ok(volatile)
    }

    /// The concrete cell for `key` at `index`, looking in this scope first
    /// and then up the ancestor chain. Aliases are followed to their target.
    pub fn get_value<T: 'static>(&self, key: Key<T>, index: usize) -> Option<Cell<T>> {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            if let Some(cell) = scope.get_raw_value(key, index) {
                return Some(Cell::from_id(self.graph().resolve_alias(cell.id())));
            }
            current = scope.parent();
        }
        None
    }

    /// The explicit value of `key` at `index` in this scope, or the
    /// consumer alias if there is none.
    pub fn get_raw_value<T: 'static>(&self, key: Key<T>, index: usize) -> Option<Cell<T>> {
        let slot = (key.id(), index);
        self.node(|node| {
            node.overrides
                .get(&slot)
                .copied()
                .or_else(|| node.points.get(&slot).map(|point| point.alias))
        })
        .map(Cell::from_id)
    }

    /// Indices at which `key` was requested through
    /// [`data_point`](Scope::data_point) in this scope.
    pub fn consumed_indices<T>(&self, key: Key<T>) -> Vec<usize> {
        let mut indices: Vec<usize> = self.node(|node| {
            node.points
                .keys()
                .filter(|(id, _)| *id == key.id())
                .map(|(_, index)| *index)
                .collect()
        });
        indices.sort_unstable();
        indices
    }

    /// Wiring state of `key` at `index` in this scope.
    pub fn resolution_state<T>(&self, key: Key<T>, index: usize) -> ResolutionState {
        let epoch = self.manager.inner.epoch.get();
        self.node(|node| match node.points.get(&(key.id(), index)) {
            None => ResolutionState::Unresolved,
            Some(point) if point.finalized == Some(epoch) => ResolutionState::Finalized,
            Some(_) => ResolutionState::Provisional,
        })
    }

    /// Re-resolve every consumer in the tree containing this scope, in
    /// ascending compute level, and repoint their aliases.
    ///
    /// Returns the number of consumer triples resolved.
    ///
    /// Derived cells whose inputs are unchanged are reused. When the inputs
    /// changed a new cell is built and the old one stays in the graph, since
    /// handles returned by [`get_value`](Scope::get_value) may still read it.
    /// Each structural change followed by a finalize can therefore grow the
    /// graph by one cell per affected consumer.
    pub fn finalize_all_scopes(&self) -> Result<usize, GraphError> {
        self.manager.finalize(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test that selected scopes come out by depth, then creation
    #[test]
    fn test_select_order() {
        let manager = DataManager::new();
        let root = manager.create_scope("root");
        let a = root.create_scope("a");
        let a1 = a.create_scope("a1");
        let b = root.create_scope("b");
        let b1 = b.create_scope("b1");

        let selected = manager.select(root.id(), ScopeSet::TOP_DOWN);
        assert_eq!(selected, vec![root.id(), a.id(), b.id(), a1.id(), b1.id()]);
        assert_eq!(manager.select(b1.id(), ScopeSet::PARENT), vec![b.id()]);
        assert_eq!(manager.select(b1.id(), ScopeSet::ANCESTORS), vec![root.id()]);
        assert!(manager.select(root.id(), ScopeSet::PARENT).is_empty());
    }

    // Test that indices come from both explicit values and consumers
    #[test]
    fn test_indices() {
        let manager = DataManager::new();
        let scope = manager.create_scope("scope");
        let width = manager.stored_key("WIDTH", 0);
        scope.set(width, 3, 1).unwrap();
        scope.data_point(width, 1);
        scope.data_point(width, 3);
        assert_eq!(manager.indices(scope.id(), width.id()), vec![1, 3]);
    }

    // Test that equal inputs reuse the derived cell
    #[test]
    fn test_derive_reuses_cell() {
        let manager = DataManager::new();
        let root = manager.create_scope("root");
        let child = root.create_scope("child");
        let indent = manager.parent_computed_key("INDENT", 0, |p| p + 1);
        let first = manager.resolve(child.id(), indent.id(), 0);
        assert_eq!(manager.resolve(child.id(), indent.id(), 0), first);

        root.set(indent, 0, 5).unwrap();
        let second = manager.resolve(child.id(), indent.id(), 0);
        assert_ne!(second, first);
        assert_eq!(Cell::<i32>::from_id(second).get(manager.graph()), 6);
    }

    // Test that registering against a foreign key fails without side effects
    #[test]
    fn test_register_unknown_dependency() {
        let manager = DataManager::new();
        let other = DataManager::new();
        other.stored_key("A", 0);
        let foreign = other.stored_key("B", 0);
        assert_eq!(
            manager.scope_aggregated_key("C", 0, foreign, ScopeSet::SELF, |v| v[0]),
            Err(GraphError::UnknownKey { key: foreign.id() })
        );
        assert_eq!(manager.key_count(), 0);
    }
}
