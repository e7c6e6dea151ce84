//! Hydration definitions: which output column (`f<n>`) lands in which field
//! of which object, and which columns form each level's identity.

use serde_json::Value;

use crate::query::node::{QueryNode, QueryPlan};
use crate::schema::Cardinality;

#[derive(Debug, Clone, PartialEq)]
pub struct HydrationField {
    /// Index into the result row
    pub position: usize,
    pub key: String,
    pub entity_type: String,
    pub is_identity: bool,
    pub hidden: bool,
    pub as_list: bool,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HydrationNode {
    /// Dense index, used for per-level identity caches
    pub id: usize,
    pub key: String,
    pub cardinality: Cardinality,
    pub fields: Vec<HydrationField>,
    pub children: Vec<HydrationNode>,
}

impl HydrationNode {
    pub fn identity(&self) -> impl Iterator<Item = &HydrationField> {
        self.fields.iter().filter(|f| f.is_identity)
    }

    /// Levels without identity columns (aggregates, flat row sets) key objects by row index
    pub fn keyed_by_row(&self) -> bool {
        !self.fields.iter().any(|f| f.is_identity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HydrationDefinition {
    pub root: HydrationNode,
    pub node_count: usize,
    pub column_count: usize,
}

impl HydrationDefinition {
    /// Assign output positions depth-first: a node's columns, then its children
    pub fn from_plan(plan: &QueryPlan) -> Self {
        let mut next_node = 0;
        let mut next_position = 0;
        let root = Self::walk(&plan.root, &mut next_node, &mut next_position);
        Self {
            root,
            node_count: next_node,
            column_count: next_position,
        }
    }

    fn walk(node: &QueryNode, next_node: &mut usize, next_position: &mut usize) -> HydrationNode {
        let id = *next_node;
        *next_node += 1;
        let fields = node
            .columns
            .iter()
            .map(|column| {
                let position = *next_position;
                *next_position += 1;
                HydrationField {
                    position,
                    key: column.alias.clone(),
                    entity_type: column.entity_type.clone(),
                    is_identity: column.is_identity,
                    hidden: column.hidden,
                    as_list: column.as_list,
                    default: column.default.clone(),
                }
            })
            .collect();
        let children = node
            .children
            .iter()
            .map(|child| Self::walk(child, next_node, next_position))
            .collect();
        HydrationNode {
            id,
            key: node.response_key.clone(),
            cardinality: node.cardinality,
            fields,
            children,
        }
    }

    /// Single-level definition over `(key, entity type)` columns, one object per row
    pub fn flat<I, K, T>(key: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<String>,
    {
        let fields: Vec<HydrationField> = columns
            .into_iter()
            .enumerate()
            .map(|(position, (key, entity_type))| HydrationField {
                position,
                key: key.into(),
                entity_type: entity_type.into(),
                is_identity: false,
                hidden: false,
                as_list: false,
                default: None,
            })
            .collect();
        let column_count = fields.len();
        Self {
            root: HydrationNode {
                id: 0,
                key: key.to_string(),
                cardinality: Cardinality::Many,
                fields,
                children: Vec::new(),
            },
            node_count: 1,
            column_count,
        }
    }
}
