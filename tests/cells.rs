//! Tests for cell versioning, recomputation and rewiring.

use std::cell::{Cell as StdCell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use cell_scope::{CellId, CellKind, Connection, Graph, GraphError, Serial, Tracer};

// =============================================================================
// Volatile Cells and Grouped Transactions
// =============================================================================

#[test]
fn test_setting_same_value_keeps_serial() {
    let graph = Graph::new();
    let a = graph.volatile(1);
    a.set(&graph, 2);
    let serial = a.version_serial(&graph);
    a.set(&graph, 2);
    assert_eq!(a.version_serial(&graph), serial);
    a.set(&graph, 3);
    assert!(a.version_serial(&graph) > serial);
}

#[test]
fn test_grouped_writes_share_serial() {
    let graph = Graph::new();
    let a = graph.volatile(1);
    let b = graph.volatile(1);

    graph.grouped_update(|| {
        a.set(&graph, 2);
        b.set(&graph, 3);
    });
    assert_eq!(a.version_serial(&graph), b.version_serial(&graph));

    a.set(&graph, 4);
    b.set(&graph, 5);
    assert!(a.version_serial(&graph) < b.version_serial(&graph));
}

#[test]
fn test_grouped_compute_returns_value() {
    let graph = Graph::new();
    let a = graph.volatile(1);
    let serial = graph.grouped_compute(|| {
        a.set(&graph, 10);
        assert!(graph.clock().is_grouped());
        a.version_serial(&graph)
    });
    assert_eq!(a.version_serial(&graph), serial);
    assert!(!graph.clock().is_grouped());
}

// =============================================================================
// Dependent Cells
// =============================================================================

#[test]
fn test_dependent_serial_is_max_of_sources() {
    let graph = Graph::new();
    let a = graph.volatile(1);
    let b = graph.volatile(2);
    let sum = graph.vector(&[a.cell(), b.cell()], |v| v.iter().sum::<i32>());

    assert_eq!(sum.get(&graph), 3);
    assert_eq!(sum.version_serial(&graph), b.version_serial(&graph));

    a.set(&graph, 5);
    assert!(sum.is_stale(&graph));
    // Not recomputed yet, still reports the serial it was computed at.
    assert_eq!(sum.version_serial(&graph), b.version_serial(&graph));
    assert_eq!(sum.get(&graph), 7);
    assert!(!sum.is_stale(&graph));
    assert_eq!(sum.version_serial(&graph), a.version_serial(&graph));
}

#[test]
fn test_unrelated_write_does_not_stale() {
    let graph = Graph::new();
    let a = graph.volatile(1);
    let other = graph.volatile(1);
    let double = graph.map(a, |a| a * 2);
    other.set(&graph, 2);
    assert!(!double.is_stale(&graph));
}

#[test]
fn test_chained_dependents() {
    let graph = Graph::new();
    let a = graph.volatile(2);
    let b = graph.map(a, |a| a + 1);
    let c = graph.map(b, |b| b * 10);
    assert_eq!(c.get(&graph), 30);
    a.set(&graph, 4);
    assert!(c.is_stale(&graph));
    assert_eq!(c.get(&graph), 50);
    assert_eq!(c.version_serial(&graph), a.version_serial(&graph));
}

#[test]
fn test_immutable_composite_is_not_mutable() {
    let graph = Graph::new();
    let a = graph.immutable(2);
    let b = graph.immutable(3);
    let product = graph.vector(&[a, b], |v| v.iter().product::<i32>());
    assert_eq!(product.get(&graph), 6);
    assert!(!product.is_mutable(&graph));
    assert_eq!(product.version_serial(&graph), Serial::NULL);

    let v = graph.volatile(1);
    let mixed = graph.vector(&[a, v.cell()], |v| v.iter().sum::<i32>());
    assert!(mixed.is_mutable(&graph));
}

#[test]
fn test_lazy_graph_computes_on_first_read() {
    let graph = Graph::builder().eager(false).build();
    let a = graph.volatile(1);
    let b = graph.map(a, |a| a + 1);
    assert!(b.is_stale(&graph));
    assert_eq!(b.get(&graph), 2);
    assert!(!b.is_stale(&graph));
}

#[test]
fn test_panicking_compute_recovers() {
    let graph = Graph::new();
    let input = graph.volatile(1i32);
    let fail = Rc::new(StdCell::new(false));
    let flag = fail.clone();
    let double = graph.map(input, move |v: &i32| {
        if flag.get() {
            panic!("compute failed");
        }
        v * 2
    });
    assert_eq!(double.get(&graph), 2);

    fail.set(true);
    input.set(&graph, 2);
    assert!(catch_unwind(AssertUnwindSafe(|| double.get(&graph))).is_err());

    fail.set(false);
    assert_eq!(double.get(&graph), 4);
}

// =============================================================================
// Alias Cells
// =============================================================================

#[test]
fn test_alias_forwards_and_retargets() {
    let graph = Graph::new();
    let a = graph.volatile(1);
    let b = graph.volatile(2);
    let alias = graph.alias(a);
    let read = graph.map(alias, |v| *v);
    assert_eq!(read.get(&graph), 1);
    assert_eq!(alias.kind(&graph), CellKind::Alias);

    alias.retarget(&graph, b).unwrap();
    assert!(read.is_stale(&graph));
    assert_eq!(read.get(&graph), 2);
    assert_eq!(alias.target(&graph), b.cell());

    b.set(&graph, 20);
    assert_eq!(read.get(&graph), 20);
    a.set(&graph, 10);
    assert!(!read.is_stale(&graph));
}

#[test]
fn test_alias_touch() {
    let graph = Graph::new();
    let a = graph.volatile(1);
    let alias = graph.alias(a);
    let read = graph.map(alias, |v| *v);
    let before = alias.version_serial(&graph);
    alias.touch(&graph);
    assert!(alias.version_serial(&graph) > before);
    assert!(read.is_stale(&graph));
    assert_eq!(read.get(&graph), 1);
}

#[test]
fn test_alias_chain_resolves() {
    let graph = Graph::new();
    let a = graph.volatile(1);
    let inner = graph.alias(a);
    let outer = graph.alias(inner);
    assert_eq!(outer.resolve(&graph), a.cell());
    assert_eq!(outer.target(&graph), inner.cell());
    assert_eq!(
        inner.retarget(&graph, outer),
        Err(GraphError::CellCycle {
            cell: inner.id(),
            target: outer.id(),
        })
    );
}

// =============================================================================
// Property Cells
// =============================================================================

#[test]
fn test_property_connection_lifecycle() {
    let graph = Graph::new();
    let v1 = graph.volatile(2);
    let v2 = graph.volatile(20);
    let alias = graph.alias(v1);
    let property = graph.property(0);
    assert_eq!(property.get(&graph), 0);
    assert!(!property.is_stale(&graph));

    property.connect(&graph, alias).unwrap();
    assert_eq!(property.connection(&graph), Connection::Live(alias.id()));
    assert_eq!(property.get(&graph), 2);

    // Disconnecting keeps the mirrored value.
    property.disconnect(&graph);
    assert!(!property.is_connected(&graph));
    v1.set(&graph, 5);
    assert!(!property.is_stale(&graph));
    assert_eq!(property.get(&graph), 2);

    property.connect(&graph, alias).unwrap();
    assert!(property.is_stale(&graph));
    assert_eq!(property.get(&graph), 5);

    // Setting a connected property drops the connection.
    property.set(&graph, 2);
    assert!(!property.is_connected(&graph));
    assert_eq!(property.get(&graph), 2);

    // A live connection follows the alias.
    property.connect(&graph, alias).unwrap();
    alias.retarget(&graph, v2).unwrap();
    assert_eq!(property.get(&graph), 20);

    // A finalized connection does not.
    property.finalize_connection(&graph);
    assert_eq!(property.connection(&graph), Connection::Finalized(v2.id()));
    alias.retarget(&graph, v1).unwrap();
    v1.set(&graph, 100);
    assert_eq!(property.get(&graph), 20);
    v2.set(&graph, 200);
    assert!(property.is_stale(&graph));
    assert_eq!(property.get(&graph), 200);
}

#[test]
#[should_panic(expected = "not connected")]
fn test_finalize_unconnected_property_panics() {
    let graph = Graph::new();
    let property = graph.property(1);
    property.finalize_connection(&graph);
}

#[test]
fn test_property_cannot_mirror_itself() {
    let graph = Graph::new();
    let property = graph.property(1);
    let double = graph.map(property, |v| v * 2);
    assert!(matches!(
        property.connect(&graph, double),
        Err(GraphError::CellCycle { .. })
    ));
    assert_eq!(double.get(&graph), 2);
}

// =============================================================================
// Latest Cells
// =============================================================================

#[test]
fn test_latest_follows_most_recent_write() {
    let graph = Graph::new();
    let a = graph.volatile(1);
    let b = graph.volatile(2);
    let latest = graph.latest(&[a.cell(), b.cell()]);
    assert_eq!(latest.get(&graph), 2);
    assert_eq!(latest.kind(&graph), CellKind::Latest);

    a.set(&graph, 10);
    assert_eq!(latest.get(&graph), 10);
    assert_eq!(latest.version_serial(&graph), a.version_serial(&graph));

    b.set(&graph, 20);
    assert_eq!(latest.get(&graph), 20);

    // Simultaneous writes go to the first source.
    graph.grouped_update(|| {
        a.set(&graph, 3);
        b.set(&graph, 4);
    });
    assert_eq!(latest.get(&graph), 3);
}

#[test]
#[should_panic(expected = "at least one source")]
fn test_latest_without_sources_panics() {
    let graph = Graph::new();
    graph.latest::<i32>(&[]);
}

// =============================================================================
// Effects
// =============================================================================

#[test]
fn test_effect_runs_once_per_transition() {
    let graph = Graph::new();
    let a = graph.volatile(1);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let effect = graph.effect([a.id()], move |g| log.borrow_mut().push(a.get(g)));
    assert_eq!(*seen.borrow(), vec![1]);
    assert!(!effect.is_stale(&graph));

    a.set(&graph, 2);
    a.set(&graph, 3);
    assert!(effect.is_stale(&graph));
    assert!(effect.update(&graph));
    assert!(!effect.update(&graph));
    assert_eq!(*seen.borrow(), vec![1, 3]);
    assert_eq!(effect.version_serial(&graph), a.version_serial(&graph));
}

// =============================================================================
// Tracing
// =============================================================================

#[derive(Default)]
struct RecordingTracer {
    recomputes: Rc<StdCell<usize>>,
    created: Rc<RefCell<Vec<CellKind>>>,
}

impl Tracer for RecordingTracer {
    fn on_cell_created(&self, _cell: CellId, kind: CellKind) {
        self.created.borrow_mut().push(kind);
    }

    fn on_recompute(&self, _cell: CellId, _serial: Serial) {
        self.recomputes.set(self.recomputes.get() + 1);
    }
}

#[test]
fn test_one_recompute_per_group() {
    let tracer = RecordingTracer::default();
    let recomputes = tracer.recomputes.clone();
    let created = tracer.created.clone();
    let graph = Graph::builder().tracer(tracer).build();

    let a = graph.volatile(1);
    let b = graph.volatile(2);
    let sum = graph.vector(&[a.cell(), b.cell()], |v| v.iter().sum::<i32>());
    assert_eq!(recomputes.get(), 1);
    assert_eq!(
        *created.borrow(),
        vec![CellKind::Volatile, CellKind::Volatile, CellKind::Dependent]
    );

    graph.grouped_update(|| {
        a.set(&graph, 10);
        b.set(&graph, 20);
    });
    assert_eq!(sum.get(&graph), 30);
    assert_eq!(sum.get(&graph), 30);
    assert_eq!(recomputes.get(), 2);
}
