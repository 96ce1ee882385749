//! Array aggregator/distributor cells.
//!
//! An [`ArrayCell`] keeps N slot properties and one aggregate property
//! consistent in both directions: a slot change is folded into the aggregate
//! with the aggregate function, and an aggregate change (a direct `set` or a
//! change of the cell it is connected to) is split back into the slots with
//! the distribute function. Whichever side changed last wins, so a slot
//! connected to a source is disconnected when the aggregate is distributed.
//!
//! # Invariant
//! Neither function may read the array it belongs to. Doing so panics.

use std::rc::Rc;

use crate::graph::downcast;
use crate::node::{AggregateFn, ArrayState, DistributeFn, Kind, PropertyState, SameFn, Value};
use crate::serial::Stamp;
use crate::{Cell, CellId, Connection, Graph, GraphError, Property};

/// Handle to an array aggregator/distributor cell.
///
/// Clone is cheap as the slot list is shared.
#[derive(Clone)]
pub struct ArrayCell<T> {
    aggregate: Property<T>,
    slots: Rc<[CellId]>,
}

impl<T> ArrayCell<T> {
    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the array has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The aggregate cell.
    pub fn aggregate(&self) -> Property<T> {
        self.aggregate
    }

    /// The slot at `index`.
    pub fn slot(&self, index: usize) -> Result<Property<T>, GraphError> {
        self.slots
            .get(index)
            .map(|id| Property::from_id(*id))
            .ok_or(GraphError::SlotOutOfRange {
                index,
                len: self.slots.len(),
            })
    }

    /// All slots in index order.
    pub fn slots(&self) -> impl Iterator<Item = Property<T>> + '_ {
        self.slots.iter().map(|id| Property::from_id(*id))
    }
}

impl<T: Clone + 'static> ArrayCell<T> {
    /// The current aggregate value.
    pub fn get(&self, graph: &Graph) -> T {
        self.aggregate.get(graph)
    }

    /// The current slot values in index order.
    pub fn values(&self, graph: &Graph) -> Vec<T> {
        self.slots().map(|slot| slot.get(graph)).collect()
    }
}

impl<T> std::fmt::Debug for ArrayCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayCell")
            .field("aggregate", &self.aggregate)
            .field("slots", &self.slots)
            .finish()
    }
}

impl<T> From<ArrayCell<T>> for Cell<T> {
    fn from(array: ArrayCell<T>) -> Cell<T> {
        array.aggregate.cell()
    }
}

/// Integer-like values that can be summed and split evenly.
pub trait Split: Sized {
    /// Sum of `parts`.
    fn total(parts: &[Self]) -> Self;

    /// Split into `parts` values whose sum is `self`. The first slots take
    /// one extra unit each until the remainder is used up.
    fn split_even(&self, parts: usize) -> Vec<Self>;
}

macro_rules! split_unsigned {
    ($($t:ty),*) => {$(
        impl Split for $t {
            fn total(parts: &[Self]) -> Self {
                parts.iter().sum()
            }

            fn split_even(&self, parts: usize) -> Vec<Self> {
                if parts == 0 {
                    return Vec::new();
                }
                let Ok(count) = <$t>::try_from(parts) else {
                    // More slots than units: one unit each for the first slots.
                    let units = *self as usize;
                    return (0..parts).map(|i| if i < units { 1 } else { 0 }).collect();
                };
                let base = *self / count;
                let extra = (*self % count) as usize;
                (0..parts).map(|i| base + if i < extra { 1 } else { 0 }).collect()
            }
        }
    )*};
}

macro_rules! split_signed {
    ($($t:ty),*) => {$(
        impl Split for $t {
            fn total(parts: &[Self]) -> Self {
                parts.iter().sum()
            }

            fn split_even(&self, parts: usize) -> Vec<Self> {
                if parts == 0 {
                    return Vec::new();
                }
                let Ok(count) = <$t>::try_from(parts) else {
                    let units = self.unsigned_abs() as usize;
                    let unit = self.signum();
                    return (0..parts).map(|i| if i < units { unit } else { 0 }).collect();
                };
                let base = *self / count;
                let rest = *self % count;
                let extra = rest.unsigned_abs() as usize;
                (0..parts).map(|i| base + if i < extra { rest.signum() } else { 0 }).collect()
            }
        }
    )*};
}

split_unsigned!(u8, u16, u32, u64, usize);
split_signed!(i8, i16, i32, i64, isize);

/// Split `total` evenly over `parts` slots.
///
/// # Examples
///
/// ```
/// # use cell_scope::even_split;
/// assert_eq!(even_split(&7, 3), vec![3, 2, 2]);
/// assert_eq!(even_split(&-7, 3), vec![-3, -2, -2]);
/// ```
pub fn even_split<T: Split>(total: &T, parts: usize) -> Vec<T> {
    total.split_even(parts)
}

impl Graph {
    /// Create an array cell with `size` slots, each starting at `default`.
    ///
    /// The aggregate starts at `aggregate` applied to the defaults.
    /// `distribute(value, size)` must return exactly `size` parts.
    pub fn array<T, A, D>(&self, size: usize, default: T, aggregate: A, distribute: D) -> ArrayCell<T>
    where
        T: Clone + PartialEq + 'static,
        A: Fn(&[T]) -> T + 'static,
        D: Fn(&T, usize) -> Vec<T> + 'static,
    {
        let initial = aggregate(&vec![default.clone(); size]);
        let aggregate: AggregateFn = Rc::new(move |values: &[Value]| {
            let values: Vec<T> = values.iter().map(downcast::<T>).collect();
            Rc::new(aggregate(&values)) as Value
        });
        let distribute: DistributeFn = Rc::new(move |value: &Value, parts: usize| {
            distribute(&downcast::<T>(value), parts)
                .into_iter()
                .map(|part| Rc::new(part) as Value)
                .collect()
        });
        let same: SameFn =
            Rc::new(|a: &Value, b: &Value| a.downcast_ref::<T>() == b.downcast_ref::<T>());

        let stamp = self.clock().stamp();
        let id = self.insert(
            Some(Rc::new(initial)),
            stamp,
            Kind::Array(Box::new(ArrayState {
                slots: Rc::from(Vec::new()),
                connection: Connection::Unconnected,
                aggregate,
                distribute,
                same,
                synced: stamp.revision,
                busy: false,
            })),
        );
        let slots: Rc<[CellId]> = (0..size)
            .map(|_| {
                let stamp = self.clock().stamp();
                self.insert(
                    Some(Rc::new(default.clone())),
                    stamp,
                    Kind::Property(PropertyState {
                        connection: Connection::Unconnected,
                        seen: stamp.revision,
                        owner: Some(id),
                    }),
                )
            })
            .collect();
        let synced = self.clock().revision();
        self.with_node_mut(id, |node| {
            if let Kind::Array(array) = &mut node.kind {
                array.slots = slots.clone();
                array.synced = synced;
            }
        });
        ArrayCell {
            aggregate: Property::from_id(id),
            slots,
        }
    }

    /// Create an array cell that sums its slots and splits the aggregate
    /// evenly, first slots taking the remainder.
    pub fn int_array<T>(&self, size: usize, default: T) -> ArrayCell<T>
    where
        T: Split + Clone + PartialEq + 'static,
    {
        self.array(size, default, T::total, even_split)
    }

    /// Make aggregate and slots of array `id` consistent again.
    pub(crate) fn sync_array(&self, id: CellId) {
        let (slots, synced, busy) = self.with_node(id, |node| match &node.kind {
            Kind::Array(array) => (array.slots.clone(), array.synced, array.busy),
            _ => unreachable!("sync_array on a non-array cell"),
        });
        assert!(
            !busy,
            "{id:?} re-entered from its own aggregate or distribute function"
        );
        let head = self.own_stamp(id);
        let parts = slots
            .iter()
            .fold(Stamp::ZERO, |acc, slot| acc.max(self.own_stamp(*slot)));

        if head.revision > synced && head.revision >= parts.revision {
            self.distribute(id, &slots);
        } else if parts.revision > synced {
            self.collect(id, &slots);
        }
    }

    fn distribute(&self, id: CellId, slots: &[CellId]) {
        let (source, distribute, same) = self.with_node(id, |node| match &node.kind {
            Kind::Array(array) => (
                array.connection.source(),
                array.distribute.clone(),
                array.same.clone(),
            ),
            _ => unreachable!("distribute on a non-array cell"),
        });
        let value = match source {
            Some(source) => self.refresh(source),
            None => self.stored_value(id),
        };

        let busy = self.enter_busy(id);
        let parts = distribute(&value, slots.len());
        drop(busy);
        assert_eq!(
            parts.len(),
            slots.len(),
            "distribute function of {id:?} returned the wrong number of parts"
        );

        self.grouped_update(|| {
            for (slot, part) in slots.iter().zip(parts) {
                self.write_part(*slot, part, &same);
            }
            if source.is_some() {
                self.write_if_changed(id, value, &same);
            }
        });
        self.mark_synced(id);
        self.tracer().on_distribute(id);
    }

    fn collect(&self, id: CellId, slots: &[CellId]) {
        let values: Vec<Value> = slots
            .iter()
            .map(|slot| match self.connection(*slot).source() {
                Some(source) => self.refresh(source),
                None => self.stored_value(*slot),
            })
            .collect();
        let (aggregate, same) = self.with_node(id, |node| match &node.kind {
            Kind::Array(array) => (array.aggregate.clone(), array.same.clone()),
            _ => unreachable!("collect on a non-array cell"),
        });

        let busy = self.enter_busy(id);
        let value = aggregate(&values);
        drop(busy);

        self.write_if_changed(id, value, &same);
        self.mark_synced(id);
        self.tracer().on_aggregate(id);
    }

    /// Store a distributed part in `slot`. A connected slot is cut loose
    /// from its source, as a direct `set` would do.
    fn write_part(&self, slot: CellId, part: Value, same: &SameFn) {
        if !self.connection(slot).is_connected() {
            self.write_if_changed(slot, part, same);
            return;
        }
        let stamp = self.clock().stamp();
        self.with_node_mut(slot, |node| {
            if let Some(connection) = node.kind.connection_mut() {
                *connection = Connection::Unconnected;
            }
            node.value = Some(part);
            node.stamp = stamp;
        });
        self.tracer().on_connection(slot, None);
        self.tracer().on_value_changed(slot, stamp.serial);
    }

    fn mark_synced(&self, id: CellId) {
        let revision = self.clock().revision();
        self.with_node_mut(id, |node| {
            if let Kind::Array(array) = &mut node.kind {
                array.synced = revision;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        assert_eq!(even_split(&0u32, 3), vec![0, 0, 0]);
        assert_eq!(even_split(&5usize, 3), vec![2, 2, 1]);
        assert_eq!(even_split(&6i64, 3), vec![2, 2, 2]);
        assert_eq!(even_split(&-4i32, 3), vec![-2, -1, -1]);
        assert!(even_split(&5i32, 0).is_empty());
        assert_eq!(i32::total(&[1, 2, 3]), 6);
    }

    #[test]
    fn test_even_split_with_more_slots_than_the_type_counts() {
        let parts = even_split(&5u8, 256);
        assert_eq!(parts.len(), 256);
        assert_eq!(&parts[..6], &[1, 1, 1, 1, 1, 0]);
        assert_eq!(parts.iter().map(|p| u32::from(*p)).sum::<u32>(), 5);

        let parts = even_split(&-3i8, 200);
        assert_eq!(&parts[..4], &[-1, -1, -1, 0]);
        assert_eq!(parts.iter().map(|p| i32::from(*p)).sum::<i32>(), -3);

        let parts = even_split(&i8::MIN, 128);
        assert!(parts.iter().all(|p| *p == -1));

        let parts = even_split(&7u16, 70_000);
        assert_eq!(parts.iter().filter(|p| **p == 1).count(), 7);
    }

    #[test]
    fn test_wide_u8_array_distributes() {
        let graph = Graph::new();
        let array = graph.int_array(256, 0u8);
        array.aggregate().set(&graph, 5);
        let values = array.values(&graph);
        assert_eq!(values.iter().filter(|v| **v == 1).count(), 5);
        assert_eq!(array.get(&graph), 5);
    }

    #[test]
    fn test_initial_aggregate() {
        let graph = Graph::new();
        let array = graph.int_array(3, 2);
        assert_eq!(array.get(&graph), 6);
        assert_eq!(array.values(&graph), vec![2, 2, 2]);
        assert!(!array.aggregate().is_stale(&graph));
    }

    #[test]
    fn test_slot_bounds() {
        let graph = Graph::new();
        let array = graph.int_array(2, 0);
        assert!(array.slot(1).is_ok());
        assert_eq!(
            array.slot(2),
            Err(GraphError::SlotOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn test_connecting_slot_to_aggregate_is_rejected() {
        let graph = Graph::new();
        let array = graph.int_array(2, 0);
        let slot = array.slot(0).unwrap();
        assert!(matches!(
            slot.connect(&graph, array.aggregate()),
            Err(GraphError::CellCycle { .. })
        ));
        assert!(matches!(
            array.aggregate().connect(&graph, slot),
            Err(GraphError::CellCycle { .. })
        ));
    }
}
