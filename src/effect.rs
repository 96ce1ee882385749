use std::cell::RefCell;
use std::rc::Rc;

use crate::node::{EffectFn, Rule};
use crate::{CellId, Graph, Serial};

/// A runnable attached to source cells.
///
/// The runnable runs once when the effect is created and once more for every
/// stale to fresh transition driven by [`Effect::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    id: CellId,
}

impl Graph {
    /// Create an effect over `sources` and run it once.
    ///
    /// # Example
    ///
    /// ```
    /// # use std::{cell::Cell, rc::Rc};
    /// # use cell_scope::Graph;
    /// let graph = Graph::new();
    /// let a = graph.volatile(1);
    /// let runs = Rc::new(Cell::new(0));
    /// let counter = runs.clone();
    /// let effect = graph.effect([a.id()], move |_| counter.set(counter.get() + 1));
    /// assert_eq!(runs.get(), 1);
    /// a.set(&graph, 2);
    /// assert!(effect.update(&graph));
    /// assert!(!effect.update(&graph));
    /// assert_eq!(runs.get(), 2);
    /// ```
    pub fn effect(
        &self,
        sources: impl IntoIterator<Item = CellId>,
        f: impl FnMut(&Graph) + 'static,
    ) -> Effect {
        let run: EffectFn = Rc::new(RefCell::new(f));
        Effect {
            id: self.insert_derived(sources.into_iter().collect(), Rule::Effect(run)),
        }
    }
}

impl Effect {
    /// The arena index of this effect.
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Rerun the runnable if any source changed since its last run.
    ///
    /// Returns true if it ran.
    pub fn update(&self, graph: &Graph) -> bool {
        if graph.is_stale(self.id) {
            graph.refresh(self.id);
            true
        } else {
            false
        }
    }

    /// Returns true if a source changed since the last run.
    pub fn is_stale(&self, graph: &Graph) -> bool {
        graph.is_stale(self.id)
    }

    /// Max source serial at the last run.
    pub fn version_serial(&self, graph: &Graph) -> Serial {
        graph.version_serial(self.id)
    }
}
