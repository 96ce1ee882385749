//! Version serials and the clock that hands them out.
//!
//! Two counters live here. [`Serial`] is the user-visible version of a cell
//! and collapses to one shared value inside a grouped transaction. The
//! revision counter is internal: it advances on every write, grouped or not,
//! and is what freshness checks compare against.
//!
//! # Invariant
//! Outside a group, every call to [`Clock::next_serial`] returns a value
//! strictly greater than any serial returned before it.

use std::cell::Cell as StdCell;

/// Revision counter type - advances by one on every write to the graph.
pub type RevisionCounter = u64;

/// Serial is the version number of a cell. Note that this does not increase one by one for a given cell.
///
/// # Examples
///
/// ```
/// # use cell_scope::Serial;
/// assert!(Serial::NULL < Serial(1));
/// assert_eq!(Serial(3).max(Serial(7)), Serial(7));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Serial(pub u64);

impl Serial {
    /// Serial of immutable cells. Never handed out by a [`Clock`].
    pub const NULL: Serial = Serial(0);

    /// Returns true for the serial of immutable cells.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Change stamp used by the engine: the revision a change happened at and the
/// serial it was published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Stamp {
    pub revision: RevisionCounter,
    pub serial: Serial,
}

impl Stamp {
    pub const ZERO: Stamp = Stamp {
        revision: 0,
        serial: Serial::NULL,
    };

    #[inline]
    pub fn max(self, other: Stamp) -> Stamp {
        Stamp {
            revision: self.revision.max(other.revision),
            serial: self.serial.max(other.serial),
        }
    }
}

/// The version clock.
///
/// Hands out monotonically increasing serials and supports grouped
/// transactions, during which every serial request returns the serial frozen
/// at the start of the outermost group.
#[derive(Debug, Default)]
pub struct Clock {
    serial: StdCell<u64>,
    revision: StdCell<RevisionCounter>,
    depth: StdCell<u32>,
    frozen: StdCell<u64>,
}

impl Clock {
    /// Create a new clock. The first serial handed out is `Serial(1)`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a serial for a new change.
    ///
    /// Inside a grouped transaction this is the group's shared serial.
    pub fn next_serial(&self) -> Serial {
        if self.depth.get() > 0 {
            Serial(self.frozen.get())
        } else {
            Serial(self.advance())
        }
    }

    /// Returns the latest serial without advancing the clock.
    pub fn current_serial(&self) -> Serial {
        if self.depth.get() > 0 {
            Serial(self.frozen.get())
        } else {
            Serial(self.serial.get())
        }
    }

    /// Returns true while a grouped transaction is running.
    pub fn is_grouped(&self) -> bool {
        self.depth.get() > 0
    }

    /// Run `f` as one grouped transaction.
    pub fn grouped_update(&self, f: impl FnOnce()) {
        self.grouped_compute(f)
    }

    /// Run `f` as one grouped transaction and return its result.
    ///
    /// Nested calls join the outermost group.
    pub fn grouped_compute<R>(&self, f: impl FnOnce() -> R) -> R {
        let _group = self.enter_group();
        f()
    }

    /// The current value of the internal revision counter.
    pub fn revision(&self) -> RevisionCounter {
        self.revision.get()
    }

    pub(crate) fn bump_revision(&self) -> RevisionCounter {
        let next = self.revision.get() + 1;
        self.revision.set(next);
        next
    }

    /// A stamp for a write happening now.
    pub(crate) fn stamp(&self) -> Stamp {
        Stamp {
            serial: self.next_serial(),
            revision: self.bump_revision(),
        }
    }

    fn advance(&self) -> u64 {
        let next = self.serial.get() + 1;
        self.serial.set(next);
        next
    }

    fn enter_group(&self) -> GroupGuard<'_> {
        if self.depth.get() == 0 {
            let frozen = self.advance();
            self.frozen.set(frozen);
        }
        self.depth.set(self.depth.get() + 1);
        GroupGuard { clock: self }
    }
}

/// Leaves the group on drop, so a panicking block does not leave the clock frozen.
struct GroupGuard<'a> {
    clock: &'a Clock,
}

impl Drop for GroupGuard<'_> {
    fn drop(&mut self) {
        self.clock.depth.set(self.clock.depth.get() - 1);
    }
}
