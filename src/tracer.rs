//! Tracer trait for observing the cell graph and the scope manager.
//!
//! The default [`NoopTracer`] provides zero cost when tracing is not needed.
//!
//! # Example
//!
//! ```
//! use cell_scope::{CellId, Graph, Serial, Tracer};
//!
//! struct PrintTracer;
//!
//! impl Tracer for PrintTracer {
//!     fn on_recompute(&self, cell: CellId, serial: Serial) {
//!         println!("recomputed {cell:?} at {serial:?}");
//!     }
//! }
//!
//! let graph = Graph::builder().tracer(PrintTracer).build();
//! let a = graph.volatile(1);
//! let double = graph.map(a, |a| a * 2);
//! assert_eq!(double.get(&graph), 2);
//! ```

use crate::{CellId, CellKind, ScopeId, Serial};

/// Tracer trait for observing engine events.
///
/// All methods have default empty implementations, so you only need to
/// override the events you're interested in.
pub trait Tracer: 'static {
    /// Called when a cell is added to the arena.
    #[inline]
    fn on_cell_created(&self, _cell: CellId, _kind: CellKind) {}

    /// Called when a stored value changes and its serial advances.
    #[inline]
    fn on_value_changed(&self, _cell: CellId, _serial: Serial) {}

    /// Called after a dependent cell recomputed its value.
    #[inline]
    fn on_recompute(&self, _cell: CellId, _serial: Serial) {}

    /// Called when an alias is pointed at a new target.
    #[inline]
    fn on_retarget(&self, _alias: CellId, _target: CellId) {}

    /// Called when a property is connected, finalized or disconnected.
    ///
    /// `source` is `None` on disconnect.
    #[inline]
    fn on_connection(&self, _property: CellId, _source: Option<CellId>) {}

    /// Called after an array cell pushed its aggregate into its slots.
    #[inline]
    fn on_distribute(&self, _array: CellId) {}

    /// Called after an array cell folded its slots into the aggregate.
    #[inline]
    fn on_aggregate(&self, _array: CellId) {}

    /// Called each time an effect's runnable executes.
    #[inline]
    fn on_effect_run(&self, _effect: CellId) {}

    /// Called when a scope is created.
    #[inline]
    fn on_scope_created(&self, _scope: ScopeId, _name: &str) {}

    /// Called at the end of a finalize pass with the number of consumer
    /// triples that were resolved.
    #[inline]
    fn on_finalize(&self, _root: ScopeId, _resolved: usize) {}
}

/// A tracer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}
