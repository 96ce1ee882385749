use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::serial::Stamp;
use crate::{Graph, RevisionCounter};

/// Type-erased cell value. Cloning is cheap.
pub(crate) type Value = Rc<dyn Any>;

/// CellId is the stable index of a cell in its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellId(pub(crate) usize);

impl CellId {
    /// Position of the cell in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// The flavor of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// Fixed value, null serial.
    Immutable,
    /// Settable value.
    Volatile,
    /// Pure function over source cells.
    Dependent,
    /// Value of the most recently changed source.
    Latest,
    /// Reassignable indirection.
    Alias,
    /// Settable value that can mirror a source.
    Property,
    /// Aggregate of an array aggregator/distributor.
    Array,
    /// Runnable attached to source cells.
    Effect,
}

/// Connection state of a property or array aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connection {
    /// Holds its own value.
    #[default]
    Unconnected,
    /// Mirrors the source, following any alias retargeting.
    Live(CellId),
    /// Mirrors the concrete cell behind the source alias chain.
    Finalized(CellId),
}

impl Connection {
    /// The cell currently mirrored, if any.
    pub fn source(&self) -> Option<CellId> {
        match self {
            Connection::Unconnected => None,
            Connection::Live(id) | Connection::Finalized(id) => Some(*id),
        }
    }

    /// Returns true unless unconnected.
    pub fn is_connected(&self) -> bool {
        !matches!(self, Connection::Unconnected)
    }
}

/// Node is the arena record of one cell.
pub(crate) struct Node {
    /// Stored or cached value. `None` for aliases and for dependents that
    /// have not been computed yet.
    pub value: Option<Value>,
    /// For leaves: when the value last changed. For dependents: the latest
    /// source change seen by the last computation. For aliases: the last
    /// retarget or touch.
    pub stamp: Stamp,
    pub kind: Kind,
}

pub(crate) enum Kind {
    Immutable,
    Volatile,
    Derived(Derived),
    Alias { target: CellId },
    Property(PropertyState),
    Array(Box<ArrayState>),
}

impl Kind {
    pub fn public(&self) -> CellKind {
        match self {
            Kind::Immutable => CellKind::Immutable,
            Kind::Volatile => CellKind::Volatile,
            Kind::Derived(d) => match d.rule {
                Rule::Map(_) => CellKind::Dependent,
                Rule::Latest => CellKind::Latest,
                Rule::Effect(_) => CellKind::Effect,
            },
            Kind::Alias { .. } => CellKind::Alias,
            Kind::Property(_) => CellKind::Property,
            Kind::Array(_) => CellKind::Array,
        }
    }

    pub fn connection_mut(&mut self) -> Option<&mut Connection> {
        match self {
            Kind::Property(p) => Some(&mut p.connection),
            Kind::Array(a) => Some(&mut a.connection),
            _ => None,
        }
    }

    /// Flag set while the cell runs user code.
    pub fn busy_mut(&mut self) -> Option<&mut bool> {
        match self {
            Kind::Derived(d) => Some(&mut d.busy),
            Kind::Array(a) => Some(&mut a.busy),
            _ => None,
        }
    }
}

pub(crate) type ComputeFn = Rc<dyn Fn(&Graph) -> Value>;
pub(crate) type EffectFn = Rc<RefCell<dyn FnMut(&Graph)>>;

#[derive(Clone)]
pub(crate) enum Rule {
    Map(ComputeFn),
    Latest,
    Effect(EffectFn),
}

pub(crate) struct Derived {
    pub sources: Rc<[CellId]>,
    pub rule: Rule,
    /// Last probe result and the clock revision it was taken at.
    pub probe: Option<(RevisionCounter, Stamp)>,
    pub mutable: bool,
    pub busy: bool,
}

pub(crate) struct PropertyState {
    pub connection: Connection,
    /// Probe revision at the last read.
    pub seen: RevisionCounter,
    /// The array cell this property is a slot of.
    pub owner: Option<CellId>,
}

pub(crate) type AggregateFn = Rc<dyn Fn(&[Value]) -> Value>;
pub(crate) type DistributeFn = Rc<dyn Fn(&Value, usize) -> Vec<Value>>;
pub(crate) type SameFn = Rc<dyn Fn(&Value, &Value) -> bool>;

pub(crate) struct ArrayState {
    pub slots: Rc<[CellId]>,
    pub connection: Connection,
    pub aggregate: AggregateFn,
    pub distribute: DistributeFn,
    pub same: SameFn,
    /// Revision at which aggregate and slots were last consistent.
    pub synced: RevisionCounter,
    pub busy: bool,
}
