//! # Lifegraph
//!
//! Compiles nested graph queries into one SQL statement per request and
//! hydrates the flat, join-multiplied rows back into nested objects.
//!
//! A request flows through [`query::StructureBuilder`] (selection tree to
//! query plan), [`sql::select::SelectCompiler`] (plan to SQL), an
//! [`executor::QueryExecutor`] (SQL to rows) and [`hydrate::Hydrator`] (rows
//! to objects). [`GraphResolver`] wires these together with the response
//! cache, access-token check, date formatting and mutation hooks.
//!
//! ```
//! use std::sync::Arc;
//! use lifegraph::{
//!     ColumnDescriptor, ConnectionSettings, FieldSelection, GraphResolver, GraphResult,
//!     QueryExecutor, RequestContext, Row, SchemaMetadata, SqlDialect, StaticSchemaProvider,
//!     TableKey,
//! };
//! use serde_json::json;
//!
//! struct OneUser;
//!
//! impl QueryExecutor for OneUser {
//!     fn execute_query(&self, _sql: &str) -> GraphResult<Vec<Row>> {
//!         Ok(vec![vec![json!(1), json!("Ada")]])
//!     }
//! }
//!
//! let mut schema = SchemaMetadata::new();
//! schema.add_table(
//!     TableKey::new("users"),
//!     vec![
//!         ColumnDescriptor::new("id", "integer").primary_key(),
//!         ColumnDescriptor::new("name", "text"),
//!     ],
//! );
//!
//! let resolver = GraphResolver::builder()
//!     .schema_provider(Arc::new(StaticSchemaProvider::new().with_schema("main", schema)))
//!     .connection(ConnectionSettings::new("main", SqlDialect::Postgres), Arc::new(OneUser))
//!     .build()?;
//!
//! let users = resolver.resolve_query(
//!     "main",
//!     &FieldSelection::new("users").fields(["name"]),
//!     &RequestContext::new(),
//! )?;
//! assert_eq!(users, json!([{ "name": "Ada" }]));
//! # Ok::<(), lifegraph::GraphError>(())
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod format;
pub mod hooks;
pub mod hydrate;
pub mod metrics;
pub mod query;
pub mod resolver;
pub mod schema;
pub mod sql;

#[cfg(test)]
mod test_fixtures;

pub use auth::{StaticTokenVerifier, TokenVerifier};
pub use cache::{CacheMode, CacheProvider, MemoryCache, RedisCache, ResponseCache};
pub use config::{CacheSettings, ConnectionSettings, EngineConfig};
pub use error::{GraphError, GraphResult};
pub use executor::{QueryExecutor, Row};
#[cfg(feature = "postgres")]
pub use executor::PostgresExecutor;
pub use format::{ChronoDateFormatter, DateFormatter};
pub use hooks::HookRegistry;
pub use hydrate::{Hydrator, TypeHandlerRegistry};
pub use query::{FieldSelection, StructureBuilder, WhereMode};
pub use resolver::{GraphResolver, GraphResolverBuilder, RequestContext};
pub use schema::{
    Cardinality, ColumnDescriptor, ProcedureDescriptor, ProcedureParameter, RelationDescriptor,
    SchemaMetadata, SchemaProvider, StaticSchemaProvider, TableDescriptor, TableKey,
};
pub use sql::mutation::{MutationAction, MutationRequest};
pub use sql::SqlDialect;
