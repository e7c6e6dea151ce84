//! Client selection trees and the query plans built from them.
//!
//! A request enters as a [`FieldSelection`]; the [`StructureBuilder`] walks it
//! against the schema and yields a [`QueryPlan`] that the SQL compiler and the
//! hydrator both read.

pub mod args;
pub mod builder;
pub mod node;
pub mod selection;

pub use args::{Comparator, Direction, JoinKind, NodeArgs, Operand, OrderBy, WhereMode, WhereTree};
pub use builder::StructureBuilder;
pub use node::{Aggregate, AggregateFn, NodeColumn, PaginationDescriptor, QueryNode, QueryPlan};
pub use selection::FieldSelection;
