//! Normalized query arguments.
//!
//! Raw JSON arguments from a [`FieldSelection`](super::selection::FieldSelection)
//! are parsed once, during structure building, into the typed forms below.
//! Malformed arguments are query-shape errors naming the offending argument;
//! unknown *columns* are not checked here (they are resolved, and possibly
//! dropped, by the SQL compiler).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GraphError, GraphResult};

/// Where a relation's filter predicates are placed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhereMode {
    /// Outer WHERE: parents without a matching child are dropped
    #[default]
    Global,
    /// Join ON clause: only narrows which children attach
    Specific,
}

impl FromStr for WhereMode {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(WhereMode::Global),
            "specific" => Ok(WhereMode::Specific),
            other => Err(GraphError::QueryShape(format!(
                "join.whereMode must be 'global' or 'specific', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    LeftOuter,
    Right,
    RightOuter,
    FullOuter,
    Cross,
}

impl FromStr for JoinKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "inner" => JoinKind::Inner,
            "left" => JoinKind::Left,
            "leftOuter" => JoinKind::LeftOuter,
            "right" => JoinKind::Right,
            "rightOuter" => JoinKind::RightOuter,
            "fullOuter" => JoinKind::FullOuter,
            "cross" => JoinKind::Cross,
            other => {
                return Err(GraphError::QueryShape(format!(
                    "unknown join.type '{other}'"
                )))
            }
        })
    }
}

/// Client overrides from the `join` argument
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinArgs {
    pub kind: Option<JoinKind>,
    pub where_mode: Option<WhereMode>,
    /// Parent-side entity column to join from instead of the relation's own
    pub from: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    NotEq,
    Like,
    NotLike,
    Gt,
    Gte,
    Lt,
    Lte,
    NotGt,
    NotGte,
    NotLt,
    NotLte,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Exists,
    NotExists,
    Between,
    NotBetween,
}

impl Comparator {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => Comparator::Eq,
            "notEq" => Comparator::NotEq,
            "like" => Comparator::Like,
            "notLike" => Comparator::NotLike,
            "gt" => Comparator::Gt,
            "gte" => Comparator::Gte,
            "lt" => Comparator::Lt,
            "lte" => Comparator::Lte,
            "notGt" => Comparator::NotGt,
            "notGte" => Comparator::NotGte,
            "notLt" => Comparator::NotLt,
            "notLte" => Comparator::NotLte,
            "in" => Comparator::In,
            "notIn" => Comparator::NotIn,
            "isNull" => Comparator::IsNull,
            "isNotNull" => Comparator::IsNotNull,
            "exists" => Comparator::Exists,
            "notExists" => Comparator::NotExists,
            "between" => Comparator::Between,
            "notBetween" => Comparator::NotBetween,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Comparator::Eq => "eq",
            Comparator::NotEq => "notEq",
            Comparator::Like => "like",
            Comparator::NotLike => "notLike",
            Comparator::Gt => "gt",
            Comparator::Gte => "gte",
            Comparator::Lt => "lt",
            Comparator::Lte => "lte",
            Comparator::NotGt => "notGt",
            Comparator::NotGte => "notGte",
            Comparator::NotLt => "notLt",
            Comparator::NotLte => "notLte",
            Comparator::In => "in",
            Comparator::NotIn => "notIn",
            Comparator::IsNull => "isNull",
            Comparator::IsNotNull => "isNotNull",
            Comparator::Exists => "exists",
            Comparator::NotExists => "notExists",
            Comparator::Between => "between",
            Comparator::NotBetween => "notBetween",
        }
    }

    /// Comparators that take a subquery instead of a column
    pub fn is_subquery(self) -> bool {
        matches!(self, Comparator::Exists | Comparator::NotExists)
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    /// `{raw: <expr>}`, injected verbatim
    Raw(String),
}

impl Operand {
    fn parse(value: &Value) -> Self {
        if let Value::Object(map) = value {
            if map.len() == 1 {
                if let Some(raw) = map.get("raw") {
                    return match raw {
                        Value::String(s) => Operand::Raw(s.clone()),
                        other => Operand::Raw(other.to_string()),
                    };
                }
            }
        }
        Operand::Value(value.clone())
    }
}

/// Recursive predicate tree parsed from a `where` or `having` argument
#[derive(Debug, Clone, PartialEq)]
pub enum WhereTree {
    And(Vec<WhereTree>),
    Or(Vec<WhereTree>),
    Compare {
        column: String,
        comparator: Comparator,
        operand: Operand,
    },
    /// Top-level `{raw: <expr>}` predicate
    Raw(String),
}

impl WhereTree {
    /// Parse a predicate tree; `null` and `{}` mean "no predicate"
    pub fn parse(value: &Value) -> GraphResult<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Object(map) if map.is_empty() => Ok(None),
            Value::Object(map) => Self::parse_object(map).map(Some),
            Value::Array(items) => {
                let children = Self::parse_list(items)?;
                Ok((!children.is_empty()).then_some(WhereTree::And(children)))
            }
            other => Err(GraphError::QueryShape(format!(
                "where must be an object, got {other}"
            ))),
        }
    }

    fn parse_list(items: &[Value]) -> GraphResult<Vec<WhereTree>> {
        let mut children = Vec::with_capacity(items.len());
        for item in items {
            if let Some(tree) = Self::parse(item)? {
                children.push(tree);
            }
        }
        Ok(children)
    }

    fn parse_branch(key: &str, value: &Value) -> GraphResult<Vec<WhereTree>> {
        match value {
            Value::Array(items) => Self::parse_list(items),
            Value::Object(_) => Ok(Self::parse(value)?.into_iter().collect()),
            other => Err(GraphError::QueryShape(format!(
                "'{key}' expects a list of predicates, got {other}"
            ))),
        }
    }

    fn parse_object(map: &Map<String, Value>) -> GraphResult<Self> {
        let mut entries = Vec::new();
        for (key, value) in map {
            match key.as_str() {
                "and" => entries.push(WhereTree::And(Self::parse_branch(key, value)?)),
                "or" => entries.push(WhereTree::Or(Self::parse_branch(key, value)?)),
                "raw" => entries.push(WhereTree::Raw(match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })),
                column => match value {
                    Value::Object(comparisons) => {
                        for (name, operand) in comparisons {
                            let comparator = Comparator::parse(name).ok_or_else(|| {
                                GraphError::QueryShape(format!(
                                    "unknown comparator '{name}' on '{column}'"
                                ))
                            })?;
                            entries.push(WhereTree::Compare {
                                column: column.to_string(),
                                comparator,
                                operand: Operand::parse(operand),
                            });
                        }
                    }
                    // `{name: "A"}` is shorthand for `{name: {eq: "A"}}`
                    scalar => entries.push(WhereTree::Compare {
                        column: column.to_string(),
                        comparator: Comparator::Eq,
                        operand: Operand::Value(scalar.clone()),
                    }),
                },
            }
        }
        Ok(if entries.len() == 1 {
            entries.remove(0)
        } else {
            WhereTree::And(entries)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "asc"),
            Direction::Desc => write!(f, "desc"),
        }
    }
}

fn parse_direction(value: &Value) -> GraphResult<Direction> {
    match value.as_str().map(str::to_ascii_lowercase).as_deref() {
        None | Some("asc") => Ok(Direction::Asc),
        Some("desc") => Ok(Direction::Desc),
        Some(other) => Err(GraphError::QueryShape(format!(
            "orderBy direction must be 'asc' or 'desc', got '{other}'"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    /// Accepts `[{column, direction}]`, a single `{column, direction}`, a map
    /// form `{name: "desc"}` or a bare column name.
    pub fn parse_list(value: &Value) -> GraphResult<Vec<OrderBy>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(Self::parse_list(item)?);
                }
                Ok(out)
            }
            Value::String(column) => Ok(vec![OrderBy {
                column: column.clone(),
                direction: Direction::Asc,
            }]),
            Value::Object(map) if map.contains_key("column") => {
                let column = map
                    .get("column")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GraphError::QueryShape("orderBy.column must be a string".into()))?;
                let direction = parse_direction(map.get("direction").unwrap_or(&Value::Null))?;
                Ok(vec![OrderBy {
                    column: column.to_string(),
                    direction,
                }])
            }
            Value::Object(map) => map
                .iter()
                .map(|(column, direction)| {
                    Ok(OrderBy {
                        column: column.clone(),
                        direction: parse_direction(direction)?,
                    })
                })
                .collect(),
            other => Err(GraphError::QueryShape(format!(
                "orderBy must be a list of {{column, direction}}, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupBy {
    pub columns: Vec<String>,
    pub having: Option<WhereTree>,
}

impl GroupBy {
    /// Accepts `{columns: [...], having}` or a bare list of columns
    pub fn parse(value: &Value) -> GraphResult<Option<GroupBy>> {
        match value {
            Value::Null => Ok(None),
            Value::Array(_) | Value::String(_) => Ok(Some(GroupBy {
                columns: string_list("groupBy", value)?,
                having: None,
            })),
            Value::Object(map) => {
                let columns = match map.get("columns") {
                    Some(v) => string_list("groupBy.columns", v)?,
                    None => Vec::new(),
                };
                let having = match map.get("having") {
                    Some(v) => WhereTree::parse(v)?,
                    None => None,
                };
                Ok(Some(GroupBy { columns, having }))
            }
            other => Err(GraphError::QueryShape(format!(
                "groupBy must be an object, got {other}"
            ))),
        }
    }
}

fn string_list(name: &str, value: &Value) -> GraphResult<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| GraphError::QueryShape(format!("{name} entries must be strings")))
            })
            .collect(),
        other => Err(GraphError::QueryShape(format!(
            "{name} must be a list of strings, got {other}"
        ))),
    }
}

/// Read a non-negative integer argument; numeric strings are accepted
pub fn parse_count(name: &str, value: &Value) -> GraphResult<Option<u64>> {
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| GraphError::QueryShape(format!("{name} must be a non-negative integer, got {value}")))
}

/// Read a page number; pages start at 1
pub fn parse_page(name: &str, value: &Value) -> GraphResult<Option<u64>> {
    match parse_count(name, value)? {
        Some(0) => Err(GraphError::QueryShape(format!("{name} must be at least 1"))),
        other => Ok(other),
    }
}

/// Everything except pagination, which depends on nesting level
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeArgs {
    pub where_tree: Option<WhereTree>,
    pub order_by: Vec<OrderBy>,
    pub group_by: Option<GroupBy>,
    pub join: JoinArgs,
}

impl NodeArgs {
    pub fn parse(arguments: &Map<String, Value>) -> GraphResult<Self> {
        let mut args = NodeArgs::default();
        if let Some(value) = arguments.get("where") {
            args.where_tree = WhereTree::parse(value)?;
        }
        if let Some(value) = arguments.get("orderBy") {
            args.order_by = OrderBy::parse_list(value)?;
        }
        if let Some(value) = arguments.get("groupBy") {
            args.group_by = GroupBy::parse(value)?;
        }
        if let Some(Value::Object(join)) = arguments.get("join") {
            if let Some(kind) = join.get("type").and_then(Value::as_str) {
                args.join.kind = Some(kind.parse()?);
            }
            if let Some(mode) = join.get("whereMode").and_then(Value::as_str) {
                args.join.where_mode = Some(mode.parse()?);
            }
            args.join.from = join.get("from").and_then(Value::as_str).map(str::to_string);
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compare(column: &str, comparator: Comparator, value: Value) -> WhereTree {
        WhereTree::Compare {
            column: column.to_string(),
            comparator,
            operand: Operand::Value(value),
        }
    }

    #[test]
    fn test_where_single_leaf() {
        let tree = WhereTree::parse(&json!({ "age": { "gte": 18 } })).unwrap().unwrap();
        assert_eq!(tree, compare("age", Comparator::Gte, json!(18)));
    }

    #[test]
    fn test_where_nested_and_or() {
        let tree = WhereTree::parse(&json!({
            "or": [
                { "name": { "like": "A%" } },
                { "and": [ { "age": { "gt": 1 } }, { "age": { "lt": 5 } } ] }
            ]
        }))
        .unwrap()
        .unwrap();
        assert_eq!(
            tree,
            WhereTree::Or(vec![
                compare("name", Comparator::Like, json!("A%")),
                WhereTree::And(vec![
                    compare("age", Comparator::Gt, json!(1)),
                    compare("age", Comparator::Lt, json!(5)),
                ]),
            ])
        );
    }

    #[test]
    fn test_where_raw_operand_and_shorthand() {
        let tree = WhereTree::parse(&json!({
            "id": { "in": { "raw": "(SELECT 1)" } },
            "name": "A"
        }))
        .unwrap()
        .unwrap();
        let WhereTree::And(entries) = tree else {
            panic!("expected an AND of two entries");
        };
        assert!(entries.contains(&WhereTree::Compare {
            column: "id".into(),
            comparator: Comparator::In,
            operand: Operand::Raw("(SELECT 1)".into()),
        }));
        assert!(entries.contains(&compare("name", Comparator::Eq, json!("A"))));
    }

    #[test]
    fn test_where_empty_is_none() {
        assert_eq!(WhereTree::parse(&json!({})).unwrap(), None);
        assert_eq!(WhereTree::parse(&Value::Null).unwrap(), None);
    }

    #[test]
    fn test_where_unknown_comparator_names_it() {
        let err = WhereTree::parse(&json!({ "age": { "almost": 3 } })).unwrap_err();
        assert!(matches!(err, GraphError::QueryShape(ref m) if m.contains("almost")));
    }

    #[test]
    fn test_order_by_forms() {
        let list = OrderBy::parse_list(&json!([
            { "column": "name", "direction": "DESC" },
            "id"
        ]))
        .unwrap();
        assert_eq!(list[0].direction, Direction::Desc);
        assert_eq!(list[1].column, "id");
        assert_eq!(list[1].direction, Direction::Asc);

        let map = OrderBy::parse_list(&json!({ "age": "desc" })).unwrap();
        assert_eq!(map, vec![OrderBy { column: "age".into(), direction: Direction::Desc }]);

        assert!(OrderBy::parse_list(&json!({ "column": "a", "direction": "up" })).is_err());
    }

    #[test]
    fn test_group_by_with_having() {
        let group = GroupBy::parse(&json!({
            "columns": ["deptId"],
            "having": { "count": { "gt": 1 } }
        }))
        .unwrap()
        .unwrap();
        assert_eq!(group.columns, vec!["deptId"]);
        assert_eq!(group.having, Some(compare("count", Comparator::Gt, json!(1))));
    }

    #[test]
    fn test_pagination_numbers() {
        assert_eq!(parse_count("limit", &json!(5)).unwrap(), Some(5));
        assert_eq!(parse_count("limit", &json!("7")).unwrap(), Some(7));
        assert!(parse_count("limit", &json!(-1)).is_err());
        assert!(parse_page("page", &json!(0)).is_err());
        assert_eq!(parse_page("page", &Value::Null).unwrap(), None);
    }

    #[test]
    fn test_node_args_join() {
        let args = NodeArgs::parse(
            json!({ "join": { "type": "inner", "whereMode": "specific" } })
                .as_object()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(args.join.kind, Some(JoinKind::Inner));
        assert_eq!(args.join.where_mode, Some(WhereMode::Specific));

        let err = NodeArgs::parse(json!({ "join": { "type": "sideways" } }).as_object().unwrap());
        assert!(err.is_err());
    }
}
