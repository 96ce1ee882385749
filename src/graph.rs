use std::any::type_name;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use slab::Slab;

use crate::node::{ComputeFn, Derived, Kind, Node, PropertyState, Rule, SameFn, Value};
use crate::serial::Stamp;
use crate::{
    Alias, Cell, CellId, CellKind, Clock, Connection, GraphError, NoopTracer, Property, Serial,
    Tracer, Volatile,
};

/// Graph owns the version clock and the arena every cell lives in.
///
/// This is cheap to clone, so you can pass it around by just cloning it.
/// Cell handles are plain indices into the arena and every operation on
/// them takes the graph they were created by.
pub struct Graph {
    inner: Rc<GraphInner>,
}

struct GraphInner {
    clock: Clock,
    cells: RefCell<Slab<Node>>,
    tracer: Box<dyn Tracer>,
    eager: bool,
}

impl Clone for Graph {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("cells", &self.len())
            .field("serial", &self.inner.clock.current_serial())
            .finish()
    }
}

impl Graph {
    /// Create a new graph with default settings.
    pub fn new() -> Self {
        GraphBuilder::new().build()
    }

    /// Create a builder for configuring a graph.
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// The version clock of this graph.
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Run `f` as one grouped transaction. See [`Clock::grouped_update`].
    pub fn grouped_update(&self, f: impl FnOnce()) {
        self.inner.clock.grouped_update(f)
    }

    /// Run `f` as one grouped transaction and return its result.
    pub fn grouped_compute<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.clock.grouped_compute(f)
    }

    /// Number of cells in the arena.
    pub fn len(&self) -> usize {
        self.inner.cells.borrow().len()
    }

    /// Returns true if no cell was created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if both handles refer to the same graph.
    pub fn ptr_eq(&self, other: &Graph) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn tracer(&self) -> &dyn Tracer {
        &*self.inner.tracer
    }

    pub(crate) fn with_node<R>(&self, id: CellId, f: impl FnOnce(&Node) -> R) -> R {
        let cells = self.inner.cells.borrow();
        f(&cells[id.0])
    }

    /// Flag `id` as running user code until the guard drops.
    pub(crate) fn enter_busy(&self, id: CellId) -> BusyGuard<'_> {
        self.with_node_mut(id, |node| {
            if let Some(busy) = node.kind.busy_mut() {
                *busy = true;
            }
        });
        BusyGuard { graph: self, id }
    }

    pub(crate) fn with_node_mut<R>(&self, id: CellId, f: impl FnOnce(&mut Node) -> R) -> R {
        let mut cells = self.inner.cells.borrow_mut();
        f(&mut cells[id.0])
    }

    pub(crate) fn insert(&self, value: Option<Value>, stamp: Stamp, kind: Kind) -> CellId {
        let public = kind.public();
        let id = CellId(
            self.inner
                .cells
                .borrow_mut()
                .insert(Node { value, stamp, kind }),
        );
        self.tracer().on_cell_created(id, public);
        id
    }

    pub(crate) fn insert_derived(&self, sources: Vec<CellId>, rule: Rule) -> CellId {
        let mutable = sources.iter().any(|source| self.is_mutable(*source));
        let run_now = self.inner.eager || matches!(rule, Rule::Effect(_));
        let id = self.insert(
            None,
            Stamp::ZERO,
            Kind::Derived(Derived {
                sources: sources.into(),
                rule,
                probe: None,
                mutable,
                busy: false,
            }),
        );
        if run_now {
            self.refresh(id);
        }
        id
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Graph {
    /// Create a cell whose value and serial never change.
    pub fn immutable<T: 'static>(&self, value: T) -> Cell<T> {
        Cell::from_id(self.insert(Some(Rc::new(value)), Stamp::ZERO, Kind::Immutable))
    }

    /// Create a settable cell.
    pub fn volatile<T: 'static>(&self, value: T) -> Volatile<T> {
        let stamp = self.clock().stamp();
        Volatile::from_id(self.insert(Some(Rc::new(value)), stamp, Kind::Volatile))
    }

    /// Create a cell computed from `sources` by `f`.
    ///
    /// `f` receives the graph and reads its sources through their handles.
    /// Only the cells listed in `sources` are tracked for staleness.
    ///
    /// # Example
    ///
    /// ```
    /// # use cell_scope::Graph;
    /// let graph = Graph::new();
    /// let a = graph.volatile(1);
    /// let b = graph.volatile(2);
    /// let sum = graph.dependent([a.id(), b.id()], move |g| a.get(g) + b.get(g));
    /// assert_eq!(sum.get(&graph), 3);
    /// a.set(&graph, 10);
    /// assert!(sum.is_stale(&graph));
    /// assert_eq!(sum.get(&graph), 12);
    /// ```
    pub fn dependent<T, F>(&self, sources: impl IntoIterator<Item = CellId>, f: F) -> Cell<T>
    where
        T: 'static,
        F: Fn(&Graph) -> T + 'static,
    {
        let compute: ComputeFn = Rc::new(move |graph: &Graph| Rc::new(f(graph)) as Value);
        Cell::from_id(self.insert_derived(sources.into_iter().collect(), Rule::Map(compute)))
    }

    /// Create a cell that applies `f` to the value of `source`.
    pub fn map<S, T>(&self, source: impl Into<Cell<S>>, f: impl Fn(&S) -> T + 'static) -> Cell<T>
    where
        S: 'static,
        T: 'static,
    {
        let source = source.into();
        self.dependent([source.id()], move |graph| source.with(graph, &f))
    }

    /// Create a cell that folds the values of `sources` with `f`.
    pub fn vector<S, T>(&self, sources: &[Cell<S>], f: impl Fn(&[S]) -> T + 'static) -> Cell<T>
    where
        S: Clone + 'static,
        T: 'static,
    {
        let cells: Rc<[Cell<S>]> = sources.into();
        let ids: Vec<CellId> = cells.iter().map(Cell::id).collect();
        self.dependent(ids, move |graph| {
            let values: Vec<S> = cells.iter().map(|cell| cell.get(graph)).collect();
            f(&values)
        })
    }

    /// Create a cell holding the value of whichever source has the highest
    /// serial. Ties go to the earlier source.
    ///
    /// # Panics
    ///
    /// Panics if `sources` is empty.
    pub fn latest<T: 'static>(&self, sources: &[Cell<T>]) -> Cell<T> {
        assert!(!sources.is_empty(), "a latest cell needs at least one source");
        let ids = sources.iter().map(Cell::id).collect();
        Cell::from_id(self.insert_derived(ids, Rule::Latest))
    }

    /// Create an alias forwarding to `target`.
    pub fn alias<T: 'static>(&self, target: impl Into<Cell<T>>) -> Alias<T> {
        let stamp = self.clock().stamp();
        let target = target.into().id();
        Alias::from_id(self.insert(None, stamp, Kind::Alias { target }))
    }

    /// Create an unconnected property holding `default`.
    pub fn property<T: 'static>(&self, default: T) -> Property<T> {
        let stamp = self.clock().stamp();
        Property::from_id(self.insert(
            Some(Rc::new(default)),
            stamp,
            Kind::Property(PropertyState {
                connection: Connection::Unconnected,
                seen: stamp.revision,
                owner: None,
            }),
        ))
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Graph`] with customizable settings.
///
/// # Example
///
/// ```
/// # use cell_scope::{Graph, NoopTracer};
/// let graph = Graph::builder().tracer(NoopTracer).eager(false).build();
/// let a = graph.volatile(2);
/// let squared = graph.map(a, |a| a * a);
/// assert!(squared.is_stale(&graph));
/// assert_eq!(squared.get(&graph), 4);
/// ```
pub struct GraphBuilder {
    tracer: Box<dyn Tracer>,
    eager: bool,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            tracer: Box::new(NoopTracer),
            eager: true,
        }
    }

    /// Set the tracer receiving engine events.
    pub fn tracer(mut self, tracer: impl Tracer) -> Self {
        self.tracer = Box::new(tracer);
        self
    }

    /// Whether dependent cells compute their value when they are created.
    ///
    /// Enabled by default. When disabled a dependent cell stays stale until
    /// its first read. Effects always run at construction.
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// Build the graph with the configured settings.
    pub fn build(self) -> Graph {
        Graph {
            inner: Rc::new(GraphInner {
                clock: Clock::new(),
                cells: RefCell::new(Slab::new()),
                tracer: self.tracer,
                eager: self.eager,
            }),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

impl Graph {
    /// Latest change reachable from `id`, without recomputing anything.
    pub(crate) fn probe(&self, id: CellId) -> Stamp {
        enum Step {
            Done(Stamp),
            Sources(Rc<[CellId]>),
            Chain(Stamp, Option<CellId>, Option<CellId>),
            Array(Stamp, Option<CellId>, Rc<[CellId]>),
        }
        let revision = self.clock().revision();
        let step = self.with_node(id, |node| match &node.kind {
            Kind::Immutable | Kind::Volatile => Step::Done(node.stamp),
            Kind::Derived(d) => match d.probe {
                Some((at, stamp)) if at == revision => Step::Done(stamp),
                _ => Step::Sources(d.sources.clone()),
            },
            Kind::Alias { target } => Step::Chain(node.stamp, Some(*target), None),
            Kind::Property(p) => Step::Chain(node.stamp, p.connection.source(), p.owner),
            Kind::Array(a) => Step::Array(node.stamp, a.connection.source(), a.slots.clone()),
        });
        match step {
            Step::Done(stamp) => stamp,
            Step::Sources(sources) => {
                let stamp = self.probe_all(&sources);
                self.with_node_mut(id, |node| {
                    if let Kind::Derived(d) = &mut node.kind {
                        d.probe = Some((revision, stamp));
                    }
                });
                stamp
            }
            Step::Chain(own, source, owner) => {
                let mut stamp = own;
                if let Some(source) = source {
                    stamp = stamp.max(self.probe(source));
                }
                if let Some(owner) = owner {
                    stamp = stamp.max(self.own_stamp(owner));
                }
                stamp
            }
            Step::Array(own, source, slots) => {
                let mut stamp = own;
                if let Some(source) = source {
                    stamp = stamp.max(self.probe(source));
                }
                slots
                    .iter()
                    .fold(stamp, |acc, slot| acc.max(self.own_stamp(*slot)))
            }
        }
    }

    pub(crate) fn probe_all(&self, sources: &[CellId]) -> Stamp {
        sources
            .iter()
            .fold(Stamp::ZERO, |acc, source| acc.max(self.probe(*source)))
    }

    /// Stamp of a property or array aggregate ignoring its array partners.
    pub(crate) fn own_stamp(&self, id: CellId) -> Stamp {
        let (own, source) = self.with_node(id, |node| {
            let source = match &node.kind {
                Kind::Property(p) => p.connection.source(),
                Kind::Array(a) => a.connection.source(),
                _ => None,
            };
            (node.stamp, source)
        });
        match source {
            Some(source) => own.max(self.probe(source)),
            None => own,
        }
    }

    /// Bring `id` up to date and return its value.
    pub(crate) fn refresh(&self, id: CellId) -> Value {
        enum Step {
            Ready(Value),
            Forward(CellId),
            Derived,
            Property(Option<CellId>),
            Array,
        }
        let step = self.with_node(id, |node| match &node.kind {
            Kind::Immutable | Kind::Volatile => Step::Ready(stored(id, node)),
            Kind::Alias { target } => Step::Forward(*target),
            Kind::Derived(_) => Step::Derived,
            Kind::Property(p) => Step::Property(p.owner),
            Kind::Array(_) => Step::Array,
        });
        match step {
            Step::Ready(value) => value,
            Step::Forward(target) => self.refresh(target),
            Step::Derived => self.refresh_derived(id),
            Step::Property(owner) => {
                if let Some(owner) = owner {
                    self.sync_array(owner);
                }
                self.read_property(id)
            }
            Step::Array => {
                self.sync_array(id);
                self.stored_value(id)
            }
        }
    }

    pub(crate) fn stored_value(&self, id: CellId) -> Value {
        self.with_node(id, |node| stored(id, node))
    }

    /// Read the current value of `id` through a typed reference.
    ///
    /// # Panics
    ///
    /// Panics if the cell holds a value of another type.
    pub(crate) fn read<T: 'static, R>(&self, id: CellId, f: impl FnOnce(&T) -> R) -> R {
        let value = self.refresh(id);
        match value.downcast_ref::<T>() {
            Some(value) => f(value),
            None => panic!("{id:?} does not hold a {}", type_name::<T>()),
        }
    }

    fn read_property(&self, id: CellId) -> Value {
        let source = self.connection(id).source();
        let value = match source {
            Some(source) => self.refresh(source),
            None => self.stored_value(id),
        };
        let seen = self.probe(id).revision;
        self.with_node_mut(id, |node| {
            if let Kind::Property(p) = &mut node.kind {
                p.seen = seen;
            }
        });
        value
    }

    fn refresh_derived(&self, id: CellId) -> Value {
        let (sources, cached, computed, busy) = self.with_node(id, |node| match &node.kind {
            Kind::Derived(d) => (d.sources.clone(), node.value.clone(), node.stamp, d.busy),
            _ => unreachable!("refresh_derived on a leaf cell"),
        });
        assert!(!busy, "{id:?} reads itself while recomputing");
        if let Some(value) = cached {
            if self.probe_all(&sources).revision <= computed.revision {
                return value;
            }
        }

        for source in sources.iter() {
            self.refresh(*source);
        }
        let mut stamp = self.probe_all(&sources);
        let rule = self.with_node(id, |node| match &node.kind {
            Kind::Derived(d) => d.rule.clone(),
            _ => unreachable!("refresh_derived on a leaf cell"),
        });
        let busy = self.enter_busy(id);
        let value = match &rule {
            Rule::Map(compute) => compute(self),
            Rule::Latest => {
                let (value, serial) = self.pick_latest(&sources);
                stamp.serial = serial;
                value
            }
            Rule::Effect(run) => {
                (&mut *run.borrow_mut())(self);
                Rc::new(()) as Value
            }
        };
        drop(busy);
        self.with_node_mut(id, |node| {
            node.value = Some(value.clone());
            node.stamp = stamp;
        });

        match rule {
            Rule::Effect(_) => self.tracer().on_effect_run(id),
            _ => self.tracer().on_recompute(id, stamp.serial),
        }
        tracing::trace!(cell = id.0, serial = stamp.serial.0, "recomputed");
        value
    }

    fn pick_latest(&self, sources: &[CellId]) -> (Value, Serial) {
        let mut best: Option<(CellId, Serial)> = None;
        for &source in sources {
            let serial = self.version_serial(source);
            if best.map_or(true, |(_, top)| serial > top) {
                best = Some((source, serial));
            }
        }
        let Some((source, serial)) = best else {
            unreachable!("latest cells are created with at least one source")
        };
        (self.refresh(source), serial)
    }

    pub(crate) fn version_serial(&self, id: CellId) -> Serial {
        let (own, next) = self.with_node(id, |node| {
            let next = match &node.kind {
                Kind::Alias { target } => Some(*target),
                Kind::Property(p) => p.connection.source(),
                Kind::Array(a) => a.connection.source(),
                _ => None,
            };
            (node.stamp.serial, next)
        });
        match next {
            Some(next) => own.max(self.version_serial(next)),
            None => own,
        }
    }

    pub(crate) fn is_stale(&self, id: CellId) -> bool {
        enum Step {
            Fresh,
            Derived(Rc<[CellId]>, Stamp, bool),
            Forward(CellId),
            Seen(u64),
        }
        let step = self.with_node(id, |node| match &node.kind {
            Kind::Immutable | Kind::Volatile => Step::Fresh,
            Kind::Derived(d) => Step::Derived(d.sources.clone(), node.stamp, node.value.is_some()),
            Kind::Alias { target } => Step::Forward(*target),
            Kind::Property(p) if p.connection.is_connected() || p.owner.is_some() => {
                Step::Seen(p.seen)
            }
            Kind::Property(_) => Step::Fresh,
            Kind::Array(a) => Step::Seen(a.synced),
        });
        match step {
            Step::Fresh => false,
            Step::Derived(sources, computed, has_value) => {
                !has_value || self.probe_all(&sources).revision > computed.revision
            }
            Step::Forward(target) => self.is_stale(target),
            Step::Seen(seen) => self.probe(id).revision > seen,
        }
    }

    pub(crate) fn is_mutable(&self, id: CellId) -> bool {
        self.with_node(id, |node| match &node.kind {
            Kind::Immutable => false,
            Kind::Derived(d) => d.mutable,
            _ => true,
        })
    }

    pub(crate) fn kind(&self, id: CellId) -> CellKind {
        self.with_node(id, |node| node.kind.public())
    }

    pub(crate) fn connection(&self, id: CellId) -> Connection {
        self.with_node(id, |node| match &node.kind {
            Kind::Property(p) => p.connection,
            Kind::Array(a) => a.connection,
            _ => Connection::Unconnected,
        })
    }

    pub(crate) fn alias_target(&self, id: CellId) -> Option<CellId> {
        self.with_node(id, |node| match &node.kind {
            Kind::Alias { target } => Some(*target),
            _ => None,
        })
    }

    /// Follow alias targets down to the first cell that is not an alias.
    pub(crate) fn resolve_alias(&self, mut id: CellId) -> CellId {
        while let Some(target) = self.alias_target(id) {
            id = target;
        }
        id
    }

    /// Returns true if reading `from` can end up reading `to`.
    pub(crate) fn reaches(&self, from: CellId, to: CellId) -> bool {
        let mut stack = vec![from];
        let mut visited = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            self.with_node(id, |node| match &node.kind {
                Kind::Derived(d) => stack.extend(d.sources.iter().copied()),
                Kind::Alias { target } => stack.push(*target),
                Kind::Property(p) => {
                    stack.extend(p.connection.source());
                    stack.extend(p.owner);
                }
                Kind::Array(a) => {
                    stack.extend(a.connection.source());
                    stack.extend(a.slots.iter().copied());
                }
                Kind::Immutable | Kind::Volatile => {}
            });
        }
        false
    }
}

// ============================================================================
// Writes
// ============================================================================

impl Graph {
    /// Store `value` in a volatile cell, property or array aggregate.
    ///
    /// Equal values are ignored unless the write drops a connection. Array
    /// aggregates always advance and distribute immediately.
    pub(crate) fn assign<T: PartialEq + 'static>(&self, id: CellId, value: T) {
        let (connected, is_array, unchanged) = self.with_node(id, |node| {
            let connected = match &node.kind {
                Kind::Property(p) => p.connection.is_connected(),
                Kind::Array(a) => a.connection.is_connected(),
                _ => false,
            };
            let unchanged = node
                .value
                .as_ref()
                .and_then(|old| old.downcast_ref::<T>())
                .is_some_and(|old| *old == value);
            (connected, matches!(node.kind, Kind::Array(_)), unchanged)
        });
        if unchanged && !connected && !is_array {
            return;
        }

        let stamp = self.clock().stamp();
        self.with_node_mut(id, |node| {
            if let Some(connection) = node.kind.connection_mut() {
                *connection = Connection::Unconnected;
            }
            node.value = Some(Rc::new(value));
            node.stamp = stamp;
        });
        if connected {
            self.tracer().on_connection(id, None);
        }
        self.tracer().on_value_changed(id, stamp.serial);
        if is_array {
            self.sync_array(id);
        }
    }

    /// Store an already erased value if it differs from the current one.
    pub(crate) fn write_if_changed(&self, id: CellId, value: Value, same: &SameFn) -> bool {
        let unchanged = self.with_node(id, |node| {
            node.value.as_ref().is_some_and(|old| same(old, &value))
        });
        if unchanged {
            return false;
        }
        let stamp = self.clock().stamp();
        self.with_node_mut(id, |node| {
            node.value = Some(value);
            node.stamp = stamp;
        });
        self.tracer().on_value_changed(id, stamp.serial);
        true
    }

    /// Advance the serial of `id` without changing its value.
    pub(crate) fn touch(&self, id: CellId) {
        let stamp = self.clock().stamp();
        self.with_node_mut(id, |node| node.stamp = stamp);
        self.tracer().on_value_changed(id, stamp.serial);
    }

    pub(crate) fn retarget(&self, alias: CellId, target: CellId) -> Result<(), GraphError> {
        if self.reaches(target, alias) {
            return Err(GraphError::CellCycle {
                cell: alias,
                target,
            });
        }
        let stamp = self.clock().stamp();
        self.with_node_mut(alias, |node| {
            if let Kind::Alias { target: current } = &mut node.kind {
                *current = target;
            }
            node.stamp = stamp;
        });
        self.tracer().on_retarget(alias, target);
        Ok(())
    }

    pub(crate) fn connect(&self, id: CellId, source: CellId) -> Result<(), GraphError> {
        if self.reaches(source, id) {
            return Err(GraphError::CellCycle {
                cell: id,
                target: source,
            });
        }
        let stamp = self.clock().stamp();
        self.with_node_mut(id, |node| {
            if let Some(connection) = node.kind.connection_mut() {
                *connection = Connection::Live(source);
            }
            node.stamp = stamp;
        });
        self.tracer().on_connection(id, Some(source));
        Ok(())
    }

    /// Stop mirroring, keeping the last value of the source.
    pub(crate) fn disconnect(&self, id: CellId) {
        let Some(source) = self.connection(id).source() else {
            return;
        };
        let value = self.refresh(source);
        let stamp = self.clock().stamp();
        self.with_node_mut(id, |node| {
            if let Some(connection) = node.kind.connection_mut() {
                *connection = Connection::Unconnected;
            }
            node.value = Some(value);
            node.stamp = stamp;
        });
        self.tracer().on_connection(id, None);
    }

    /// Rebind a connection to the concrete cell behind its alias chain.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never connected.
    pub(crate) fn finalize_connection(&self, id: CellId) {
        let source = match self.connection(id) {
            Connection::Unconnected => {
                panic!("finalize_connection on {id:?}, which is not connected")
            }
            Connection::Live(source) | Connection::Finalized(source) => source,
        };
        let concrete = self.resolve_alias(source);
        self.with_node_mut(id, |node| {
            if let Some(connection) = node.kind.connection_mut() {
                *connection = Connection::Finalized(concrete);
            }
        });
        self.tracer().on_connection(id, Some(concrete));
    }
}

/// Clears the busy flag on drop, so a panicking closure does not leave the
/// cell looking re-entered.
pub(crate) struct BusyGuard<'a> {
    graph: &'a Graph,
    id: CellId,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        // Unwinding may pass through a held borrow; skip rather than double panic.
        let Ok(mut cells) = self.graph.inner.cells.try_borrow_mut() else {
            return;
        };
        if let Some(busy) = cells
            .get_mut(self.id.0)
            .and_then(|node| node.kind.busy_mut())
        {
            *busy = false;
        }
    }
}

fn stored(id: CellId, node: &Node) -> Value {
    match &node.value {
        Some(value) => value.clone(),
        None => unreachable!("{id:?} has no stored value"),
    }
}

/// Clone a typed value out of an erased one.
///
/// # Panics
///
/// Panics if the value is not a `T`.
pub(crate) fn downcast<T: Clone + 'static>(value: &Value) -> T {
    match value.downcast_ref::<T>() {
        Some(value) => value.clone(),
        None => panic!("value is not a {}", type_name::<T>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test that probing a derived cell is cached until the next write
    #[test]
    fn test_probe_cache_follows_revision() {
        let graph = Graph::new();
        let a = graph.volatile(1);
        let b = graph.map(a, |a| a + 1);
        let first = graph.probe(b.id());
        assert_eq!(graph.probe(b.id()), first);
        a.set(&graph, 2);
        assert!(graph.probe(b.id()).revision > first.revision);
    }

    // Test that reaches follows aliases and dependent sources
    #[test]
    fn test_reaches() {
        let graph = Graph::new();
        let a = graph.volatile(1);
        let alias = graph.alias(a);
        let b = graph.map(alias, |v| *v);
        assert!(graph.reaches(b.id(), a.id()));
        assert!(!graph.reaches(a.id(), b.id()));
    }

    // Test that an alias cannot be pointed at a cell reading it
    #[test]
    fn test_retarget_rejects_cycle() {
        let graph = Graph::new();
        let a = graph.volatile(1);
        let alias = graph.alias(a);
        let b = graph.map(alias, |v| v + 1);
        assert_eq!(
            alias.retarget(&graph, b),
            Err(GraphError::CellCycle {
                cell: alias.id(),
                target: b.id(),
            })
        );
        assert_eq!(
            alias.retarget(&graph, alias),
            Err(GraphError::CellCycle {
                cell: alias.id(),
                target: alias.id(),
            })
        );
        assert_eq!(b.get(&graph), 2);
    }

    // Test that a recursive compute function is caught
    #[test]
    #[should_panic(expected = "reads itself")]
    fn test_self_read_panics() {
        let graph = Graph::builder().eager(false).build();
        let a = graph.volatile(1);
        let slot: Rc<std::cell::Cell<Option<Cell<i32>>>> = Rc::default();
        let inner = slot.clone();
        let b = graph.dependent([a.id()], move |g| match inner.get() {
            Some(me) => me.get(g),
            None => 0,
        });
        slot.set(Some(b));
        b.get(&graph);
    }

    // Test that the arena grows with each constructor
    #[test]
    fn test_len() {
        let graph = Graph::new();
        assert!(graph.is_empty());
        graph.immutable(1);
        graph.volatile(2);
        assert_eq!(graph.len(), 2);
        assert!(graph.ptr_eq(&graph.clone()));
        assert!(!graph.ptr_eq(&Graph::new()));
    }
}
