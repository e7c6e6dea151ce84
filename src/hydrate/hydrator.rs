//! Result Hydrator.
//!
//! Rebuilds the nested object graph from flat, join-flattened rows. Objects
//! live in an arena and refer to each other by index; every hydration level
//! keeps a cache from composite identity key to arena index, so a parent that
//! a join repeats across rows is materialized once and every distinct child
//! is attached to it once.
//!
//! A hydrator is single-use: [`Hydrator::hydrate`] consumes it.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::error::{GraphError, GraphResult};
use crate::executor::Row;
use crate::format::DateFormatter;
use crate::hydrate::coercion::TypeHandlerRegistry;
use crate::hydrate::definition::{HydrationDefinition, HydrationField, HydrationNode};
use crate::schema::naming::DATE;
use crate::schema::Cardinality;

type EntityId = usize;

#[derive(Debug)]
enum Slot {
    One(Option<EntityId>),
    Many(Vec<EntityId>),
}

#[derive(Debug)]
struct Entity {
    node: usize,
    fields: Map<String, Value>,
    relations: Vec<Slot>,
}

pub struct Hydrator<'d> {
    definition: &'d HydrationDefinition,
    handlers: &'d TypeHandlerRegistry,
    dates: Option<&'d dyn DateFormatter>,
    nodes: Vec<&'d HydrationNode>,
    arena: Vec<Entity>,
    caches: Vec<HashMap<String, EntityId>>,
    links: HashSet<(usize, EntityId, EntityId)>,
    roots: Vec<EntityId>,
}

impl<'d> Hydrator<'d> {
    pub fn new(definition: &'d HydrationDefinition, handlers: &'d TypeHandlerRegistry) -> Self {
        let mut nodes = Vec::with_capacity(definition.node_count);
        index_nodes(&definition.root, &mut nodes);
        nodes.sort_by_key(|n| n.id);
        Self {
            definition,
            handlers,
            dates: None,
            caches: vec![HashMap::new(); nodes.len()],
            nodes,
            arena: Vec::new(),
            links: HashSet::new(),
            roots: Vec::new(),
        }
    }

    pub fn with_date_formatter(mut self, dates: &'d dyn DateFormatter) -> Self {
        self.dates = Some(dates);
        self
    }

    /// Hydrate `rows` into an array (or, for a to-one root, an object or null)
    ///
    /// `None` means the provider returned nothing at all and yields `null`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Execution` when a row is narrower than the
    /// statement's select list.
    pub fn hydrate(mut self, rows: Option<&[Row]>) -> GraphResult<Value> {
        let Some(rows) = rows else {
            return Ok(Value::Null);
        };
        let definition = self.definition;
        let root = &definition.root;
        for (index, row) in rows.iter().enumerate() {
            if row.len() < definition.column_count {
                return Err(GraphError::Execution(format!(
                    "row {index} has {} columns, expected {}",
                    row.len(),
                    definition.column_count
                )));
            }
            self.visit(root, row, index, None);
        }
        self.format_dates();

        Ok(match root.cardinality {
            Cardinality::Many => Value::Array(
                self.roots
                    .iter()
                    .map(|id| self.materialize(*id))
                    .collect(),
            ),
            Cardinality::One => self
                .roots
                .first()
                .map_or(Value::Null, |id| self.materialize(*id)),
        })
    }

    fn visit(
        &mut self,
        node: &'d HydrationNode,
        row: &Row,
        row_index: usize,
        parent: Option<(EntityId, usize)>,
    ) {
        let Some(key) = identity_key(node, row, row_index) else {
            // No identity: this branch is absent for this row
            return;
        };

        let entity = match self.caches[node.id].get(&key).copied() {
            Some(existing) => {
                self.append_list_values(existing, node, row);
                existing
            }
            None => {
                let created = self.create(node, row);
                self.caches[node.id].insert(key, created);
                if parent.is_none() {
                    self.roots.push(created);
                }
                created
            }
        };

        if let Some((parent_id, slot)) = parent {
            if self.links.insert((node.id, parent_id, entity)) {
                match &mut self.arena[parent_id].relations[slot] {
                    Slot::One(target) => *target = Some(entity),
                    Slot::Many(items) => items.push(entity),
                }
            }
        }

        for (slot, child) in node.children.iter().enumerate() {
            self.visit(child, row, row_index, Some((entity, slot)));
        }
    }

    fn create(&mut self, node: &HydrationNode, row: &Row) -> EntityId {
        let mut fields = Map::new();
        for field in node.fields.iter().filter(|f| !f.hidden) {
            let value = self.field_value(field, row);
            let value = if field.as_list {
                Value::Array(if value.is_null() { Vec::new() } else { vec![value] })
            } else {
                value
            };
            fields.insert(field.key.clone(), value);
        }
        let relations = node
            .children
            .iter()
            .map(|child| match child.cardinality {
                Cardinality::One => Slot::One(None),
                Cardinality::Many => Slot::Many(Vec::new()),
            })
            .collect();
        self.arena.push(Entity {
            node: node.id,
            fields,
            relations,
        });
        self.arena.len() - 1
    }

    /// Collect array-valued scalars across fan-out rows, once per distinct value
    fn append_list_values(&mut self, entity: EntityId, node: &HydrationNode, row: &Row) {
        for field in node.fields.iter().filter(|f| f.as_list && !f.hidden) {
            let value = self.field_value(field, row);
            if value.is_null() {
                continue;
            }
            if let Some(Value::Array(items)) = self.arena[entity].fields.get_mut(&field.key) {
                if !items.contains(&value) {
                    items.push(value);
                }
            }
        }
    }

    fn field_value(&self, field: &HydrationField, row: &Row) -> Value {
        match &row[field.position] {
            Value::Null => field.default.clone().unwrap_or(Value::Null),
            value => self.handlers.coerce(&field.entity_type, value),
        }
    }

    fn format_dates(&mut self) {
        let Some(dates) = self.dates else {
            return;
        };
        for entity in &mut self.arena {
            let node = self.nodes[entity.node];
            for field in node.fields.iter().filter(|f| f.entity_type == DATE && !f.hidden) {
                if let Some(value) = entity.fields.get_mut(&field.key) {
                    format_in_place(dates, value);
                }
            }
        }
    }

    fn materialize(&self, id: EntityId) -> Value {
        let entity = &self.arena[id];
        let node = self.nodes[entity.node];
        let mut object = entity.fields.clone();
        for (child, slot) in node.children.iter().zip(&entity.relations) {
            let value = match slot {
                Slot::One(target) => target.map_or(Value::Null, |t| self.materialize(t)),
                Slot::Many(items) => Value::Array(items.iter().map(|t| self.materialize(*t)).collect()),
            };
            object.insert(child.key.clone(), value);
        }
        Value::Object(object)
    }
}

fn index_nodes<'d>(node: &'d HydrationNode, out: &mut Vec<&'d HydrationNode>) {
    out.push(node);
    for child in &node.children {
        index_nodes(child, out);
    }
}

/// Composite identity key for `node` in `row`; `None` when an identity value
/// is null and has no default
fn identity_key(node: &HydrationNode, row: &Row, row_index: usize) -> Option<String> {
    if node.keyed_by_row() {
        return Some(format!("#{row_index}"));
    }
    let mut parts = Vec::new();
    for field in node.identity() {
        let value = match &row[field.position] {
            Value::Null => field.default.clone()?,
            value => value.clone(),
        };
        parts.push(value.to_string());
    }
    Some(parts.join("|"))
}

fn format_in_place(dates: &dyn DateFormatter, value: &mut Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                format_in_place(dates, item);
            }
        }
        Value::Null => {}
        other => {
            if let Some(formatted) = dates.format(other) {
                *other = Value::String(formatted);
            }
        }
    }
}
