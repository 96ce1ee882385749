use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use crate::node::Value;
use crate::{Cell, CellId, DataManager, Graph, GraphError, ScopeSet};

/// KeyId identifies a declaration within its [`DataManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyId(pub(crate) usize);

/// Key is a typed handle to a declaration.
///
/// A declaration describes how the cell for each (scope, index) pair is
/// produced.
pub struct Key<T> {
    id: KeyId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub(crate) const fn from_id(id: KeyId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The untyped identifier.
    pub fn id(&self) -> KeyId {
        self.id
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Key<T> {}

impl<T> Hash for Key<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.id.0)
    }
}

impl<T> From<Key<T>> for KeyId {
    fn from(key: Key<T>) -> KeyId {
        key.id
    }
}

/// Values of the source declarations of a [`DataManager::dependent_key`].
pub struct KeyValues<'a> {
    graph: &'a Graph,
    cells: &'a [(KeyId, CellId)],
}

impl KeyValues<'_> {
    /// Value of the first cell collected for `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not a source of the declaration.
    pub fn get<T: Clone + 'static>(&self, key: Key<T>) -> T {
        match self.cells.iter().find(|(id, _)| *id == key.id) {
            Some((_, cell)) => Cell::<T>::from_id(*cell).get(self.graph),
            None => panic!("{key:?} is not a source of this declaration"),
        }
    }

    /// Values of every cell collected for `key`, in scope order.
    pub fn all<T: Clone + 'static>(&self, key: Key<T>) -> Vec<T> {
        self.cells
            .iter()
            .filter(|(id, _)| *id == key.id)
            .map(|(_, cell)| Cell::<T>::from_id(*cell).get(self.graph))
            .collect()
    }
}

/// Builds the cell of a derived declaration from its resolved input cells.
pub(crate) type BuildFn = Rc<dyn Fn(&Graph, &[(KeyId, CellId)]) -> CellId>;

#[derive(Clone)]
pub(crate) enum KeyRule {
    /// Explicit value or inherited from the nearest ancestor.
    Stored,
    /// Built from the same declaration in the parent scope.
    ParentComputed(BuildFn),
    /// Built from `sources` collected over `scopes`.
    Gather {
        sources: Rc<[KeyId]>,
        scopes: ScopeSet,
        build: BuildFn,
    },
}

pub(crate) struct Declaration {
    pub name: String,
    pub default: Value,
    pub default_cell: Option<CellId>,
    pub rule: KeyRule,
}

fn fold_build<T, F>(f: F) -> BuildFn
where
    T: Clone + 'static,
    F: Fn(&[T]) -> T + 'static,
{
    let f = Rc::new(f);
    Rc::new(move |graph: &Graph, inputs: &[(KeyId, CellId)]| {
        let cells: Vec<Cell<T>> = inputs.iter().map(|(_, id)| Cell::from_id(*id)).collect();
        let f = f.clone();
        graph.vector(&cells, move |values| f(values)).id()
    })
}

fn map_build<S, T, F>(f: F) -> BuildFn
where
    S: 'static,
    T: 'static,
    F: Fn(&S) -> T + 'static,
{
    let f = Rc::new(f);
    Rc::new(move |graph: &Graph, inputs: &[(KeyId, CellId)]| {
        let source = Cell::<S>::from_id(inputs[0].1);
        let f = f.clone();
        graph.map(source, move |value| f(value)).id()
    })
}

fn single_scope(scopes: ScopeSet, what: &'static str) -> Result<ScopeSet, GraphError> {
    let direction = scopes.difference(ScopeSet::INDICES);
    if direction == ScopeSet::SELF || direction == ScopeSet::PARENT {
        Ok(scopes)
    } else {
        Err(GraphError::InvalidScopeSet { set: scopes, reason: what })
    }
}

/// Declaration constructors.
impl DataManager {
    /// Declare a plain per-scope value.
    ///
    /// A scope without its own value inherits the nearest ancestor's; a
    /// root without a value reads `default`.
    pub fn stored_key<T: 'static>(&self, name: &str, default: T) -> Key<T> {
        Key::from_id(self.register_independent(name, Rc::new(default), KeyRule::Stored))
    }

    /// Declare a value computed by `f` from the same declaration's value in
    /// the parent scope, chaining through every depth of the tree.
    ///
    /// A root without an explicit value reads `default`.
    pub fn parent_computed_key<T, F>(&self, name: &str, default: T, f: F) -> Key<T>
    where
        T: 'static,
        F: Fn(&T) -> T + 'static,
    {
        let rule = KeyRule::ParentComputed(map_build(f));
        Key::from_id(self.register_independent(name, Rc::new(default), rule))
    }

    /// Declare a fold of `source` over the scopes selected by `scopes`.
    pub fn scope_aggregated_key<T, F>(
        &self,
        name: &str,
        default: T,
        source: Key<T>,
        scopes: ScopeSet,
        f: F,
    ) -> Result<Key<T>, GraphError>
    where
        T: Clone + 'static,
        F: Fn(&[T]) -> T + 'static,
    {
        self.vector_key(name, default, &[source], scopes, f)
    }

    /// Declare a fold of several declarations at the same scope and index.
    ///
    /// # Example
    ///
    /// ```
    /// # use cell_scope::DataManager;
    /// let manager = DataManager::new();
    /// let width = manager.stored_key("WIDTH", 0);
    /// let length = manager.stored_key("LENGTH", 0);
    /// let perimeter = manager
    ///     .dependency_aggregated_key("PERIMETER", 0, &[width, length], |v| v.iter().sum::<i32>() * 2)
    ///     .unwrap();
    /// let room = manager.create_scope("room");
    /// room.set(width, 0, 3).unwrap();
    /// room.set(length, 0, 4).unwrap();
    /// assert_eq!(room.data_point(perimeter, 0).get(manager.graph()), 14);
    /// ```
    pub fn dependency_aggregated_key<T, F>(
        &self,
        name: &str,
        default: T,
        sources: &[Key<T>],
        f: F,
    ) -> Result<Key<T>, GraphError>
    where
        T: Clone + 'static,
        F: Fn(&[T]) -> T + 'static,
    {
        self.vector_key(name, default, sources, ScopeSet::SELF, f)
    }

    /// Declare a fold of several declarations over the scopes selected by
    /// `scopes`. Values are ordered by scope, then by source declaration.
    pub fn vector_key<T, F>(
        &self,
        name: &str,
        default: T,
        sources: &[Key<T>],
        scopes: ScopeSet,
        f: F,
    ) -> Result<Key<T>, GraphError>
    where
        T: Clone + 'static,
        F: Fn(&[T]) -> T + 'static,
    {
        let scopes = scopes.validate()?;
        let sources: Rc<[KeyId]> = sources.iter().map(Key::id).collect();
        let rule = KeyRule::Gather {
            sources: sources.clone(),
            scopes,
            build: fold_build(f),
        };
        self.register(name, Rc::new(default), rule, &sources)
            .map(Key::from_id)
    }

    /// Declare `f` applied to `source` read at this scope (`SELF`) or at
    /// the parent scope (`PARENT`).
    pub fn transformed_key<S, T, F>(
        &self,
        name: &str,
        default: T,
        source: Key<S>,
        scopes: ScopeSet,
        f: F,
    ) -> Result<Key<T>, GraphError>
    where
        S: 'static,
        T: 'static,
        F: Fn(&S) -> T + 'static,
    {
        let scopes = single_scope(scopes, "transformed declarations read SELF or PARENT")?
            .difference(ScopeSet::INDICES);
        let rule = KeyRule::Gather {
            sources: Rc::new([source.id()]),
            scopes,
            build: map_build(f),
        };
        self.register(name, Rc::new(default), rule, &[source.id()])
            .map(Key::from_id)
    }

    /// Declare a value computed from declarations of different types.
    ///
    /// # Example
    ///
    /// ```
    /// # use cell_scope::{DataManager, ScopeSet};
    /// let manager = DataManager::new();
    /// let label = manager.stored_key("LABEL", String::new());
    /// let pad = manager.stored_key("PAD", 0usize);
    /// let width = manager
    ///     .dependent_key("WIDTH", 0usize, &[label.id(), pad.id()], ScopeSet::SELF, move |v| {
    ///         v.get(label).len() + v.get(pad)
    ///     })
    ///     .unwrap();
    /// let cell = manager.create_scope("cell");
    /// cell.set(label, 0, "name".to_string()).unwrap();
    /// cell.set(pad, 0, 2).unwrap();
    /// assert_eq!(cell.data_point(width, 0).get(manager.graph()), 6);
    /// ```
    pub fn dependent_key<T, F>(
        &self,
        name: &str,
        default: T,
        sources: &[KeyId],
        scopes: ScopeSet,
        f: F,
    ) -> Result<Key<T>, GraphError>
    where
        T: 'static,
        F: Fn(&KeyValues<'_>) -> T + 'static,
    {
        let scopes = single_scope(scopes, "dependent declarations read SELF or PARENT")?;
        let f = Rc::new(f);
        let build: BuildFn = Rc::new(move |graph: &Graph, inputs: &[(KeyId, CellId)]| {
            let inputs: Rc<[(KeyId, CellId)]> = inputs.into();
            let ids: Vec<CellId> = inputs.iter().map(|(_, id)| *id).collect();
            let f = f.clone();
            graph
                .dependent(ids, move |graph| {
                    f(&KeyValues {
                        graph,
                        cells: &inputs,
                    })
                })
                .id()
        });
        let rule = KeyRule::Gather {
            sources: sources.into(),
            scopes,
            build,
        };
        self.register(name, Rc::new(default), rule, sources)
            .map(Key::from_id)
    }

    /// Declare the value of whichever source cell, over `sources` and the
    /// scopes selected by `scopes`, changed most recently.
    pub fn latest_key<T: 'static>(
        &self,
        name: &str,
        default: T,
        sources: &[Key<T>],
        scopes: ScopeSet,
    ) -> Result<Key<T>, GraphError> {
        let scopes = scopes.validate()?;
        let sources: Rc<[KeyId]> = sources.iter().map(Key::id).collect();
        let build: BuildFn = Rc::new(|graph: &Graph, inputs: &[(KeyId, CellId)]| {
            let cells: Vec<Cell<T>> = inputs.iter().map(|(_, id)| Cell::from_id(*id)).collect();
            graph.latest(&cells).id()
        });
        let rule = KeyRule::Gather {
            sources: sources.clone(),
            scopes,
            build,
        };
        self.register(name, Rc::new(default), rule, &sources)
            .map(Key::from_id)
    }
}
