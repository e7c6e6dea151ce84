//! Entity naming and type derivation for schema metadata.
//!
//! Database identifiers are snake_case (sometimes kebab-case); the names a
//! client sees are camelCase. Within one table the derived names must be
//! unique, so collisions are resolved by suffixing `_1`, `_2`, ... in column
//! order.

use std::collections::HashSet;

/// Entity type names understood by the hydrator's coercion registry
pub const NUMBER: &str = "NUMBER";
pub const BOOLEAN: &str = "BOOLEAN";
pub const STRING: &str = "STRING";
pub const DATE: &str = "DATE";
pub const JSON: &str = "JSON";

/// Convert a database identifier to camelCase
///
/// `dept_id` → `deptId`, `order-items` → `orderItems`, `ID` → `id`.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '_' || ch == '-' || ch == ' ' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else if out.is_empty() {
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    // All-caps identifiers (e.g. `ID`, `SKU`) read better fully lowered.
    if name.chars().all(|c| !c.is_lowercase()) {
        return out.to_lowercase();
    }
    out
}

/// Convert a database identifier to PascalCase
pub fn to_pascal_case(name: &str) -> String {
    let camel = to_camel_case(name);
    let mut chars = camel.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Naive English singularization used for to-one relation names
pub fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }
    for suffix in ["sses", "xes", "ches", "shes"] {
        if name.ends_with(suffix) {
            return name[..name.len() - 2].to_string();
        }
    }
    if name.ends_with('s') && !name.ends_with("ss") && name.len() > 1 {
        return name[..name.len() - 1].to_string();
    }
    name.to_string()
}

/// Map a database type name to the entity type used for coercion
pub fn entity_type_for(database_type: &str) -> &'static str {
    let lower = database_type.to_lowercase();
    let base = lower.split('(').next().unwrap_or("").trim();
    match base {
        "int" | "int2" | "int4" | "int8" | "integer" | "smallint" | "bigint" | "tinyint"
        | "mediumint" | "serial" | "smallserial" | "bigserial" | "numeric" | "decimal"
        | "real" | "float" | "float4" | "float8" | "double" | "double precision" | "money" => {
            NUMBER
        }
        "bool" | "boolean" | "bit" => BOOLEAN,
        "date" | "time" | "timetz" | "timestamp" | "timestamptz" | "datetime"
        | "timestamp with time zone" | "timestamp without time zone" => DATE,
        "json" | "jsonb" => JSON,
        _ => STRING,
    }
}

/// Make every name unique by suffixing `_1`, `_2`, ... to later duplicates
pub fn resolve_collisions(names: &mut [String]) {
    let mut seen: HashSet<String> = HashSet::new();
    for name in names.iter_mut() {
        if seen.insert(name.clone()) {
            continue;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{name}_{n}");
            if seen.insert(candidate.clone()) {
                *name = candidate;
                break;
            }
            n += 1;
        }
    }
}
