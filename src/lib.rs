#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod array;
mod cell;
mod dependency;
mod effect;
mod error;
mod graph;
mod key;
mod node;
mod scope;
mod scope_set;
mod serial;
mod tracer;

pub use array::{even_split, ArrayCell, Split};
pub use cell::{Alias, Cell, Property, Volatile};
pub use dependency::DependencyGraph;
pub use effect::Effect;
pub use error::GraphError;
pub use graph::{Graph, GraphBuilder};
pub use key::{Key, KeyId, KeyValues};
pub use node::{CellId, CellKind, Connection};
pub use scope::{DataManager, ResolutionState, Scope, ScopeId};
pub use scope_set::ScopeSet;
pub use serial::{Clock, RevisionCounter, Serial};
pub use tracer::{NoopTracer, Tracer};
