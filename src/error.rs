//! Error type shared by every stage of the query pipeline.
//!
//! Every fatal condition raised while building, compiling, executing or
//! hydrating a request is a [`GraphError`]. Errors propagate with `?` up to the
//! resolver entry point; no partial result is returned once one is raised.
//!
//! Lenient-skip conditions (an entity name with no matching column descriptor)
//! are deliberately *not* errors; they are logged and the reference is omitted.

use std::fmt;

/// Error type for graph query compilation, execution and hydration
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// A required collaborator is missing (e.g. no executor for a connection)
    Configuration(String),
    /// Access token missing or rejected
    Authorization(String),
    /// The client query has an invalid shape (bad pagination placement, aggregate arguments...)
    QueryShape(String),
    /// Refused before building SQL: unconditional update/delete, empty insert payload
    MutationSafety(String),
    /// Schema metadata problem (unknown table, table without identity columns)
    Schema(String),
    /// Statement builder rejected the statement
    Compile(String),
    /// Execution provider failure
    Execution(String),
    /// A type handler with the same name is already registered
    DuplicateTypeHandler(String),
    /// Cache provider failure
    Cache(String),
    /// A lifecycle hook rejected the call
    Hook(String),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Configuration(s) => write!(f, "Configuration error: {s}"),
            GraphError::Authorization(s) => write!(f, "Access denied: {s}"),
            GraphError::QueryShape(s) => write!(f, "Invalid query: {s}"),
            GraphError::MutationSafety(s) => write!(f, "Mutation refused: {s}"),
            GraphError::Schema(s) => write!(f, "Schema error: {s}"),
            GraphError::Compile(s) => write!(f, "Compile error: {s}"),
            GraphError::Execution(s) => write!(f, "Execution error: {s}"),
            GraphError::DuplicateTypeHandler(name) => {
                write!(f, "Type handler already registered: {name}")
            }
            GraphError::Cache(s) => write!(f, "Cache error: {s}"),
            GraphError::Hook(s) => write!(f, "Hook error: {s}"),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::QueryShape(format!("malformed argument: {err}"))
    }
}

impl From<config::ConfigError> for GraphError {
    fn from(err: config::ConfigError) -> Self {
        GraphError::Configuration(err.to_string())
    }
}

/// Result alias used throughout the crate
pub type GraphResult<T> = Result<T, GraphError>;
