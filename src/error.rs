//! Error types for graph construction and scope finalization.

use crate::{CellId, KeyId, ScopeSet};

/// Structural errors reported by the graph and the scope manager.
///
/// These are raised at construction or registration time. Reading a cell
/// never fails; misuse of the cell protocol panics instead (see the
/// `# Panics` sections of the individual operations).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The scope set mixes ancestor and descendant directions, or selects no
    /// scope at all.
    #[error("invalid scope set {set:?}: {reason}")]
    InvalidScopeSet {
        /// The rejected set.
        set: ScopeSet,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Declarations depend on each other in a cycle.
    ///
    /// The `path` lists declaration names forming the cycle.
    #[error("declaration dependency cycle: {}", path.join(" -> "))]
    DependencyCycle {
        /// Declaration names forming the cycle.
        path: Vec<String>,
    },

    /// Slot index past the end of an array cell.
    #[error("slot index {index} out of range for array cell with {len} slots")]
    SlotOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of slots.
        len: usize,
    },

    /// Retargeting or connecting would make a cell read itself.
    #[error("pointing {cell:?} at {target:?} would make it depend on itself")]
    CellCycle {
        /// The alias or property being rewired.
        cell: CellId,
        /// The rejected target.
        target: CellId,
    },

    /// The declaration does not belong to this manager.
    #[error("unknown declaration {key:?}")]
    UnknownKey {
        /// The unknown declaration.
        key: KeyId,
    },
}
