//! Client selection trees.
//!
//! A [`FieldSelection`] is the opaque, already-parsed request shape handed to
//! the structure builder: a field name, an optional response alias, a JSON
//! object of arguments and nested selections. It can be built in code, read
//! from JSON, or (with the `graphql` feature) taken straight from an
//! async-graphql resolver context.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(feature = "graphql")]
use crate::error::{GraphError, GraphResult};

/// One selected field and everything nested under it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSelection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub selections: Vec<FieldSelection>,
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Select a nested field
    pub fn select(mut self, child: FieldSelection) -> Self {
        self.selections.push(child);
        self
    }

    /// Select several scalar fields by name
    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selections
            .extend(names.into_iter().map(|n| FieldSelection::new(n)));
        self
    }

    /// Key the field is written under in the response
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name).filter(|v| !v.is_null())
    }

    pub fn has_selections(&self) -> bool {
        !self.selections.is_empty()
    }

    /// Convert an async-graphql selection (e.g. `ctx.field()`) into a selection tree
    ///
    /// # Errors
    ///
    /// Returns `GraphError::QueryShape` when an argument cannot be resolved or
    /// converted to JSON.
    #[cfg(feature = "graphql")]
    pub fn from_graphql(field: async_graphql::SelectionField<'_>) -> GraphResult<Self> {
        let mut arguments = Map::new();
        let resolved = field
            .arguments()
            .map_err(|e| GraphError::QueryShape(e.message))?;
        for (name, value) in resolved {
            let json = value
                .into_json()
                .map_err(|e| GraphError::QueryShape(format!("argument {name}: {e}")))?;
            arguments.insert(name.to_string(), json);
        }
        let selections = field
            .selection_set()
            .map(FieldSelection::from_graphql)
            .collect::<GraphResult<Vec<_>>>()?;
        Ok(Self {
            name: field.name().to_string(),
            alias: field.alias().map(str::to_string),
            arguments,
            selections,
        })
    }
}
