//! The intermediate query structure shared by the SQL compiler and the hydrator.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::GraphError;
use crate::query::args::{JoinKind, NodeArgs, WhereMode};
use crate::schema::{Cardinality, RelationDescriptor, TableKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Min,
    Max,
    Sum,
    Avg,
}

impl AggregateFn {
    pub fn sql_name(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
        }
    }
}

impl FromStr for AggregateFn {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(AggregateFn::Count),
            "min" => Ok(AggregateFn::Min),
            "max" => Ok(AggregateFn::Max),
            "sum" => Ok(AggregateFn::Sum),
            "avg" => Ok(AggregateFn::Avg),
            other => Err(GraphError::QueryShape(format!("unknown aggregate '{other}'"))),
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql_name().to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateTarget {
    /// `COUNT(*)`
    All,
    /// Database column name
    Column(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub function: AggregateFn,
    pub distinct: bool,
    pub target: AggregateTarget,
}

/// One selected output column of a node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeColumn {
    /// Entity name (or aggregate function name)
    pub name: String,
    /// Key in the hydrated object
    pub alias: String,
    /// Database column name; empty for aggregates over `*`
    pub db_name: String,
    pub entity_type: String,
    pub is_identity: bool,
    /// Selected only for hydration; never written to the output
    pub hidden: bool,
    pub as_list: bool,
    pub default: Option<Value>,
    pub aggregate: Option<Aggregate>,
}

/// One nesting level of a client query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryNode {
    /// Field name in the selection (relation name below the root)
    pub field_name: String,
    /// Key the node is written under in its parent object
    pub response_key: String,
    /// Resolved table, independent of any field alias
    pub table_key: TableKey,
    pub table_alias: String,
    pub cardinality: Cardinality,
    /// How this node joins to its parent; `None` for the root
    pub relation: Option<RelationDescriptor>,
    pub join_kind: JoinKind,
    pub where_mode: WhereMode,
    pub columns: Vec<NodeColumn>,
    pub args: NodeArgs,
    pub children: Vec<QueryNode>,
    /// Dotted response-key path from the root, e.g. `department.users`
    pub path: String,
}

impl QueryNode {
    pub fn child(&self, response_key: &str) -> Option<&QueryNode> {
        self.children.iter().find(|c| c.response_key == response_key)
    }

    pub fn aggregate_columns(&self) -> impl Iterator<Item = &NodeColumn> {
        self.columns.iter().filter(|c| c.aggregate.is_some())
    }
}

/// Post-hydration slice for one nested relation path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationDescriptor {
    pub key: String,
    pub table_name: String,
    pub page: u64,
    pub limit: u64,
}

impl PaginationDescriptor {
    /// Half-open index range `[(page-1)*limit, page*limit)`
    pub fn range(&self) -> (usize, usize) {
        let start = (self.page.saturating_sub(1)).saturating_mul(self.limit);
        let end = start.saturating_add(self.limit);
        (
            usize::try_from(start).unwrap_or(usize::MAX),
            usize::try_from(end).unwrap_or(usize::MAX),
        )
    }
}

/// Output of the structure builder for one request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub root: QueryNode,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub pagination: Vec<PaginationDescriptor>,
    pub aggregate: bool,
}
