//! Dependency ordering between synchronized tables
//!
//! The foreign-key graph (child -> parent) is a DAG, checked at setup.
//! Saves are submitted parents first so the remote never sees a child
//! before its parent; deletes go children first.

mod topological;

pub use topological::TopologicalOrder;
