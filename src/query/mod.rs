//! Query layer - structural predicates and adjacency traversal

pub mod predicate;
pub mod traversal;

pub use predicate::{Clause, CompiledCondition, Condition, Joiner, Predicate, SearchMode};
pub use traversal::{Traversal, TraversalEngine, TraversalOutcome, Visit};
