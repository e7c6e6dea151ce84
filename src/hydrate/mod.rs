//! Result hydration: flat rows back into nested objects.

pub mod coercion;
pub mod definition;
pub mod hydrator;
pub mod paginate;

pub use coercion::{TypeHandler, TypeHandlerRegistry};
pub use definition::{HydrationDefinition, HydrationField, HydrationNode};
pub use hydrator::Hydrator;
pub use paginate::paginate;
