use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;

use crate::{CellId, CellKind, Connection, Graph, GraphError, Serial};

/// Cell is a typed handle to a versioned value in a [`Graph`].
///
/// Handles are `Copy`; the value itself lives in the graph's arena.
pub struct Cell<T> {
    id: CellId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Cell<T> {
    pub(crate) const fn from_id(id: CellId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The arena index of this cell.
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Serial of the value currently visible through this cell.
    pub fn version_serial(&self, graph: &Graph) -> Serial {
        graph.version_serial(self.id)
    }

    /// Returns true if the next [`get`](Cell::get) would recompute or
    /// re-mirror the value.
    pub fn is_stale(&self, graph: &Graph) -> bool {
        graph.is_stale(self.id)
    }

    /// Returns false only for cells built purely from immutable sources.
    pub fn is_mutable(&self, graph: &Graph) -> bool {
        graph.is_mutable(self.id)
    }

    /// The flavor of this cell.
    pub fn kind(&self, graph: &Graph) -> CellKind {
        graph.kind(self.id)
    }
}

impl<T: 'static> Cell<T> {
    /// Get the current value, recomputing it first if it is stale.
    pub fn get(&self, graph: &Graph) -> T
    where
        T: Clone,
    {
        graph.read(self.id, T::clone)
    }

    /// Apply `f` to the current value without cloning it.
    pub fn with<R>(&self, graph: &Graph, f: impl FnOnce(&T) -> R) -> R {
        graph.read(self.id, f)
    }
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cell<T> {}

impl<T> PartialEq for Cell<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Cell<T> {}

impl<T> Hash for Cell<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({})", self.id.0)
    }
}

/// Implements the handle traits shared by the cell flavors.
macro_rules! handle {
    ($name:ident) => {
        impl<T> $name<T> {
            pub(crate) const fn from_id(id: CellId) -> Self {
                Self(Cell::from_id(id))
            }

            /// The underlying read handle.
            pub fn cell(&self) -> Cell<T> {
                self.0
            }
        }

        impl<T> Deref for $name<T> {
            type Target = Cell<T>;

            fn deref(&self) -> &Cell<T> {
                &self.0
            }
        }

        impl<T> From<$name<T>> for Cell<T> {
            fn from(handle: $name<T>) -> Cell<T> {
                handle.0
            }
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $name<T> {}

        impl<T> PartialEq for $name<T> {
            fn eq(&self, other: &Self) -> bool {
                self.0 == other.0
            }
        }

        impl<T> Eq for $name<T> {}

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0.id.0)
            }
        }
    };
}

/// A settable cell.
pub struct Volatile<T>(Cell<T>);

handle!(Volatile);

impl<T: PartialEq + 'static> Volatile<T> {
    /// Store `value`. The serial advances only if it differs from the
    /// current value.
    pub fn set(&self, graph: &Graph, value: T) {
        graph.assign(self.id(), value)
    }
}

impl<T> Volatile<T> {
    /// Advance the serial without changing the value.
    pub fn touch(&self, graph: &Graph) {
        graph.touch(self.id())
    }
}

/// A reassignable indirection to another cell.
pub struct Alias<T>(Cell<T>);

handle!(Alias);

impl<T> Alias<T> {
    /// Point the alias at `target`.
    ///
    /// Always advances the alias serial, even if the target did not change.
    /// Fails if `target` reads this alias.
    pub fn retarget(&self, graph: &Graph, target: impl Into<Cell<T>>) -> Result<(), GraphError> {
        graph.retarget(self.id(), target.into().id())
    }

    /// Mark the alias changed without moving it.
    pub fn touch(&self, graph: &Graph) {
        graph.touch(self.id())
    }

    /// The current target.
    pub fn target(&self, graph: &Graph) -> Cell<T> {
        match graph.alias_target(self.id()) {
            Some(target) => Cell::from_id(target),
            None => unreachable!("alias handle on a non-alias cell"),
        }
    }

    /// The first non-alias cell behind this alias.
    pub fn resolve(&self, graph: &Graph) -> Cell<T> {
        Cell::from_id(graph.resolve_alias(self.id()))
    }
}

/// A settable cell that can mirror a source cell.
///
/// Array slots and array aggregates are properties too.
pub struct Property<T>(Cell<T>);

handle!(Property);

impl<T: PartialEq + 'static> Property<T> {
    /// Store `value`.
    ///
    /// A connected property is disconnected first. On an array aggregate the
    /// value is distributed to the slots right away.
    pub fn set(&self, graph: &Graph, value: T) {
        graph.assign(self.id(), value)
    }
}

impl<T> Property<T> {
    /// Mirror `source` until disconnected. Aliases in between are followed
    /// live until [`finalize_connection`](Property::finalize_connection).
    pub fn connect(&self, graph: &Graph, source: impl Into<Cell<T>>) -> Result<(), GraphError> {
        graph.connect(self.id(), source.into().id())
    }

    /// Stop mirroring, keeping the last value seen from the source.
    pub fn disconnect(&self, graph: &Graph) {
        graph.disconnect(self.id())
    }

    /// Bind directly to the concrete cell behind the current source's alias
    /// chain, so later retargeting of those aliases is not followed.
    ///
    /// # Panics
    ///
    /// Panics if the property is not connected.
    pub fn finalize_connection(&self, graph: &Graph) {
        graph.finalize_connection(self.id())
    }

    /// The connection state.
    pub fn connection(&self, graph: &Graph) -> Connection {
        graph.connection(self.id())
    }

    /// Returns true while mirroring a source.
    pub fn is_connected(&self, graph: &Graph) -> bool {
        self.connection(graph).is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immutable_is_fixed() {
        let graph = Graph::new();
        let c = graph.immutable("text".to_string());
        assert_eq!(c.get(&graph), "text");
        assert_eq!(c.version_serial(&graph), Serial::NULL);
        assert!(!c.is_stale(&graph));
        assert!(!c.is_mutable(&graph));
        assert_eq!(c.with(&graph, String::len), 4);
    }

    #[test]
    fn test_handle_conversions() {
        let graph = Graph::new();
        let v = graph.volatile(1);
        let cell: Cell<i32> = v.into();
        assert_eq!(cell, v.cell());
        assert_eq!(cell.kind(&graph), CellKind::Volatile);
        assert_eq!(format!("{:?}", v), format!("Volatile({})", v.id().index()));
    }

    #[test]
    fn test_touch_advances_without_change() {
        let graph = Graph::new();
        let v = graph.volatile(1);
        let before = v.version_serial(&graph);
        v.touch(&graph);
        assert!(v.version_serial(&graph) > before);
        assert_eq!(v.get(&graph), 1);
    }
}
