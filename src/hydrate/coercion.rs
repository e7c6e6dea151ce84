//! Type coercion handlers applied to scalar values during hydration.
//!
//! Handlers are keyed by entity type name. `NUMBER` and `BOOLEAN` are
//! registered by [`TypeHandlerRegistry::with_defaults`]; applications add
//! their own with [`TypeHandlerRegistry::register`]. A value whose type has no
//! handler passes through unchanged.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::error::{GraphError, GraphResult};
use crate::schema::naming::{BOOLEAN, NUMBER};

pub type TypeHandler = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Clone, Default)]
pub struct TypeHandlerRegistry {
    handlers: HashMap<String, TypeHandler>,
}

impl fmt::Debug for TypeHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("TypeHandlerRegistry")
            .field("handlers", &names)
            .finish()
    }
}

impl TypeHandlerRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `NUMBER` and `BOOLEAN` handlers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .handlers
            .insert(NUMBER.to_string(), Arc::new(coerce_number));
        registry
            .handlers
            .insert(BOOLEAN.to_string(), Arc::new(coerce_boolean));
        registry
    }

    /// Register a handler for `type_name`
    ///
    /// # Errors
    ///
    /// Returns `GraphError::DuplicateTypeHandler` when the name is taken.
    pub fn register<F>(&mut self, type_name: impl Into<String>, handler: F) -> GraphResult<()>
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self.handlers.contains_key(&type_name) {
            return Err(GraphError::DuplicateTypeHandler(type_name));
        }
        self.handlers.insert(type_name, Arc::new(handler));
        Ok(())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.handlers.contains_key(type_name)
    }

    /// Coerce a non-null value; null stays null
    pub fn coerce(&self, type_name: &str, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match self.handlers.get(type_name) {
            Some(handler) => handler(value),
            None => value.clone(),
        }
    }
}

/// Numeric strings (NUMERIC columns, text-affinity drivers) become JSON numbers
fn coerce_number(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Value::Number(i.into());
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map_or_else(|| value.clone(), Value::Number)
        }
        Value::Bool(b) => Value::Number(u8::from(*b).into()),
        other => other.clone(),
    }
}

/// `0`/`1`, `"t"`/`"f"`, `"true"`/`"false"`, `"yes"`/`"no"` become booleans
fn coerce_boolean(value: &Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) => Value::Bool(f != 0.0),
            None => value.clone(),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "1" | "y" | "yes" | "on" => Value::Bool(true),
            "f" | "false" | "0" | "n" | "no" | "off" => Value::Bool(false),
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_coercion() {
        let registry = TypeHandlerRegistry::with_defaults();
        assert_eq!(registry.coerce(NUMBER, &json!("42")), json!(42));
        assert_eq!(registry.coerce(NUMBER, &json!("2.5")), json!(2.5));
        assert_eq!(registry.coerce(NUMBER, &json!(7)), json!(7));
        assert_eq!(registry.coerce(NUMBER, &json!("n/a")), json!("n/a"));
        assert_eq!(registry.coerce(NUMBER, &Value::Null), Value::Null);
    }

    #[test]
    fn test_boolean_coercion() {
        let registry = TypeHandlerRegistry::with_defaults();
        assert_eq!(registry.coerce(BOOLEAN, &json!(1)), json!(true));
        assert_eq!(registry.coerce(BOOLEAN, &json!(0)), json!(false));
        assert_eq!(registry.coerce(BOOLEAN, &json!("t")), json!(true));
        assert_eq!(registry.coerce(BOOLEAN, &json!("f")), json!(false));
        assert_eq!(registry.coerce(BOOLEAN, &json!(true)), json!(true));
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let registry = TypeHandlerRegistry::with_defaults();
        assert_eq!(registry.coerce("STRING", &json!(5)), json!(5));
    }

    #[test]
    fn test_custom_handler_and_duplicate() {
        let mut registry = TypeHandlerRegistry::with_defaults();
        registry
            .register("UPPER", |v: &Value| match v.as_str() {
                Some(s) => Value::String(s.to_uppercase()),
                None => v.clone(),
            })
            .unwrap();
        assert_eq!(registry.coerce("UPPER", &json!("abc")), json!("ABC"));

        let err = registry.register(NUMBER, |v: &Value| v.clone()).unwrap_err();
        assert_eq!(err, GraphError::DuplicateTypeHandler(NUMBER.to_string()));
    }
}
