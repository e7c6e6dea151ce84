//! Query Structure Builder.
//!
//! Walks a [`FieldSelection`] tree against the schema metadata and produces a
//! [`QueryPlan`]: one [`QueryNode`] per table level with a deterministic alias
//! (`t0`, `t1`, ... in depth-first selection order), identity columns first,
//! classified columns and parsed arguments.
//!
//! All per-request state (the alias counter and the pagination descriptors)
//! lives in a [`BuildContext`] created inside each `build_*` call and threaded
//! through the recursion, so one builder can serve concurrent requests.

use serde_json::Value;

use crate::error::{GraphError, GraphResult};
use crate::query::args::{parse_count, parse_page, JoinKind, NodeArgs, WhereMode};
use crate::query::node::{
    Aggregate, AggregateFn, AggregateTarget, NodeColumn, PaginationDescriptor, QueryNode,
    QueryPlan,
};
use crate::query::selection::FieldSelection;
use crate::schema::naming;
use crate::schema::{
    Cardinality, ColumnDescriptor, RelationDescriptor, SchemaMetadata, TableDescriptor, TableKey,
};

const TYPENAME: &str = "__typename";

/// Mutable state for one build
#[derive(Debug, Default)]
pub struct BuildContext {
    next_table: usize,
    pagination: Vec<PaginationDescriptor>,
}

impl BuildContext {
    /// Create table aliases using this function so they get a unique index
    fn make_table_alias(&mut self) -> String {
        let alias = format!("t{}", self.next_table);
        self.next_table += 1;
        alias
    }

    /// Create or update the descriptor for `key`. Without a limit there is
    /// nothing to slice, so a lone page argument is ignored.
    fn record_pagination(&mut self, key: &str, table_name: &str, page: Option<u64>, limit: Option<u64>) {
        if let Some(existing) = self.pagination.iter_mut().find(|d| d.key == key) {
            if let Some(page) = page {
                existing.page = page;
            }
            if let Some(limit) = limit {
                existing.limit = limit;
            }
            return;
        }
        if let Some(limit) = limit {
            self.pagination.push(PaginationDescriptor {
                key: key.to_string(),
                table_name: table_name.to_string(),
                page: page.unwrap_or(1),
                limit,
            });
        }
    }
}

pub struct StructureBuilder<'s> {
    schema: &'s SchemaMetadata,
    row_cap: u64,
    where_mode: WhereMode,
}

impl<'s> StructureBuilder<'s> {
    pub fn new(schema: &'s SchemaMetadata, row_cap: u64) -> Self {
        Self {
            schema,
            row_cap,
            where_mode: WhereMode::Global,
        }
    }

    /// Where mode for relations that don't set `join.whereMode`
    pub fn with_where_mode(mut self, where_mode: WhereMode) -> Self {
        self.where_mode = where_mode;
        self
    }

    /// Build the plan for a nested object query rooted at `root`
    ///
    /// # Errors
    ///
    /// `GraphError::Schema` for unknown tables or tables without a primary key;
    /// `GraphError::QueryShape` for misplaced pagination or malformed arguments.
    pub fn build_query(
        &self,
        root: &TableKey,
        selection: &FieldSelection,
        cardinality: Cardinality,
    ) -> GraphResult<QueryPlan> {
        let mut ctx = BuildContext::default();
        let table = self.schema.require_table(root)?;
        let (limit, offset) = self.root_pagination(selection)?;

        let mut node = QueryNode {
            field_name: selection.name.clone(),
            response_key: selection.response_key().to_string(),
            table_key: root.clone(),
            table_alias: ctx.make_table_alias(),
            cardinality,
            relation: None,
            join_kind: JoinKind::Inner,
            where_mode: self.where_mode,
            columns: identity_columns(table)?,
            args: NodeArgs::parse(&selection.arguments)?,
            children: Vec::new(),
            path: String::new(),
        };
        self.populate(&mut ctx, table, &mut node, selection)?;

        Ok(QueryPlan {
            root: node,
            limit,
            offset,
            pagination: ctx.pagination,
            aggregate: false,
        })
    }

    /// Build the plan for an aggregate query over `root`
    ///
    /// Aggregate fields (`count`, `min`, `max`, `sum`, `avg`) become aggregate
    /// projections; plain scalar fields become grouping columns. No identity
    /// columns are injected: every result row is its own object.
    pub fn build_aggregate(&self, root: &TableKey, selection: &FieldSelection) -> GraphResult<QueryPlan> {
        let mut ctx = BuildContext::default();
        let table = self.schema.require_table(root)?;
        let (limit, offset) = self.root_pagination(selection)?;

        let mut node = QueryNode {
            field_name: selection.name.clone(),
            response_key: selection.response_key().to_string(),
            table_key: root.clone(),
            table_alias: ctx.make_table_alias(),
            cardinality: Cardinality::Many,
            relation: None,
            join_kind: JoinKind::Inner,
            where_mode: self.where_mode,
            columns: Vec::new(),
            args: NodeArgs::parse(&selection.arguments)?,
            children: Vec::new(),
            path: String::new(),
        };

        for field in &selection.selections {
            if field.name == TYPENAME {
                continue;
            }
            if field.has_selections() {
                return Err(GraphError::QueryShape(format!(
                    "relation '{}' cannot be selected in an aggregate query",
                    field.name
                )));
            }
            if let Ok(function) = field.name.parse::<AggregateFn>() {
                if let Some(column) = aggregate_column(table, function, field)? {
                    node.columns.push(column);
                }
                continue;
            }
            match table.column_by_entity(&field.name) {
                Some(column) => add_scalar(&mut node, column, field),
                None => log::warn!("dropping unknown field {} on {}", field.name, table.key),
            }
        }

        Ok(QueryPlan {
            root: node,
            limit,
            offset,
            pagination: ctx.pagination,
            aggregate: true,
        })
    }

    /// Root `limit/page` (or `dbLimit/dbPage`) become SQL LIMIT/OFFSET, capped by the row cap
    fn root_pagination(&self, selection: &FieldSelection) -> GraphResult<(Option<u64>, Option<u64>)> {
        for name in ["objLimit", "objPage"] {
            if selection.argument(name).is_some() {
                return Err(GraphError::QueryShape(format!(
                    "{name} is only allowed on nested relations, found on root '{}'",
                    selection.name
                )));
            }
        }
        let limit = match selection.argument("dbLimit").or_else(|| selection.argument("limit")) {
            Some(v) => parse_count("limit", v)?,
            None => None,
        };
        let page = match selection.argument("dbPage").or_else(|| selection.argument("page")) {
            Some(v) => parse_page("page", v)?,
            None => None,
        };

        let limit = limit.map_or(self.row_cap, |l| l.min(self.row_cap));
        let offset = page
            .filter(|p| *p > 1)
            .map(|p| (p - 1).saturating_mul(limit));
        Ok((Some(limit), offset))
    }

    /// Nested `limit/page` (or `objLimit/objPage`) are recorded for post-hydration slicing
    fn nested_pagination(
        &self,
        ctx: &mut BuildContext,
        field: &FieldSelection,
        path: &str,
        table: &TableDescriptor,
    ) -> GraphResult<()> {
        for name in ["dbLimit", "dbPage"] {
            if field.argument(name).is_some() {
                return Err(GraphError::QueryShape(format!(
                    "{name} is only allowed on the root field, found on '{path}'"
                )));
            }
        }
        let limit = match field.argument("objLimit").or_else(|| field.argument("limit")) {
            Some(v) => parse_count("objLimit", v)?,
            None => None,
        };
        let page = match field.argument("objPage").or_else(|| field.argument("page")) {
            Some(v) => parse_page("objPage", v)?,
            None => None,
        };
        if limit.is_some() || page.is_some() {
            ctx.record_pagination(path, &table.key.table, page, limit);
        }
        Ok(())
    }

    fn populate(
        &self,
        ctx: &mut BuildContext,
        table: &TableDescriptor,
        node: &mut QueryNode,
        selection: &FieldSelection,
    ) -> GraphResult<()> {
        for field in &selection.selections {
            if field.name == TYPENAME {
                continue;
            }
            if field.has_selections() {
                let Some(relation) = table.relation(&field.name) else {
                    log::warn!("dropping unknown relation {} on {}", field.name, table.key);
                    continue;
                };
                if node.child(field.response_key()).is_some() {
                    log::warn!("duplicate selection {} on {}", field.response_key(), table.key);
                    continue;
                }
                let child = self.build_child(ctx, node, table, relation, field)?;
                node.children.push(child);
                continue;
            }
            match table.column_by_entity(&field.name) {
                Some(column) => add_scalar(node, column, field),
                None => log::warn!("dropping unknown field {} on {}", field.name, table.key),
            }
        }
        Ok(())
    }

    fn build_child(
        &self,
        ctx: &mut BuildContext,
        parent: &QueryNode,
        parent_table: &TableDescriptor,
        relation: &RelationDescriptor,
        field: &FieldSelection,
    ) -> GraphResult<QueryNode> {
        let target = self.schema.require_table(&relation.target)?;
        let response_key = field.response_key().to_string();
        let path = if parent.path.is_empty() {
            response_key.clone()
        } else {
            format!("{}.{}", parent.path, response_key)
        };
        self.nested_pagination(ctx, field, &path, target)?;

        let args = NodeArgs::parse(&field.arguments)?;
        let mut relation = relation.clone();
        if let Some(from) = &args.join.from {
            match parent_table.column_by_entity(from) {
                Some(column) => relation.local_column = column.database_name.clone(),
                None => log::warn!("ignoring join.from '{}' on {}: unknown column", from, path),
            }
        }
        let where_mode = args.join.where_mode.unwrap_or(self.where_mode);
        let join_kind = args
            .join
            .kind
            .unwrap_or_else(|| default_join_kind(&relation, where_mode));

        let mut node = QueryNode {
            field_name: field.name.clone(),
            response_key,
            table_key: relation.target.clone(),
            table_alias: ctx.make_table_alias(),
            cardinality: relation.cardinality,
            relation: Some(relation),
            join_kind,
            where_mode,
            columns: identity_columns(target)?,
            args,
            children: Vec::new(),
            path,
        };
        self.populate(ctx, target, &mut node, field)?;
        Ok(node)
    }
}

/// A to-one relation through a required foreign key always has a match,
/// unless a specific-mode filter in the ON clause can reject it
fn default_join_kind(relation: &RelationDescriptor, where_mode: WhereMode) -> JoinKind {
    if where_mode == WhereMode::Global
        && relation.cardinality == Cardinality::One
        && relation.owns_foreign_key
        && !relation.nullable
    {
        JoinKind::Inner
    } else {
        JoinKind::Left
    }
}

/// Primary key columns, hidden until the client selects them
fn identity_columns(table: &TableDescriptor) -> GraphResult<Vec<NodeColumn>> {
    let identity = table.identity_columns();
    if identity.is_empty() {
        return Err(GraphError::Schema(format!(
            "table {} has no primary key; nested results cannot be hydrated",
            table.key
        )));
    }
    Ok(identity
        .into_iter()
        .map(|c| NodeColumn {
            name: c.entity_name.clone(),
            alias: c.entity_name.clone(),
            db_name: c.database_name.clone(),
            entity_type: c.entity_type.clone(),
            is_identity: true,
            hidden: true,
            as_list: false,
            default: None,
            aggregate: None,
        })
        .collect())
}

fn add_scalar(node: &mut QueryNode, column: &ColumnDescriptor, field: &FieldSelection) {
    let alias = field.response_key();
    let default = field.argument("default").cloned();
    if node.columns.iter().any(|c| !c.hidden && c.alias == alias) {
        return;
    }
    if column.is_primary_key {
        if let Some(existing) = node
            .columns
            .iter_mut()
            .find(|c| c.is_identity && c.hidden && c.db_name == column.database_name)
        {
            existing.hidden = false;
            existing.alias = alias.to_string();
            existing.default = default;
            return;
        }
    }
    node.columns.push(NodeColumn {
        name: column.entity_name.clone(),
        alias: alias.to_string(),
        db_name: column.database_name.clone(),
        entity_type: column.entity_type.clone(),
        is_identity: false,
        hidden: false,
        as_list: field.argument("asList").and_then(Value::as_bool).unwrap_or(false),
        default,
        aggregate: None,
    });
}

/// Resolve `count(column: "id", distinct: true)` style fields
///
/// Exactly one target argument is allowed besides `distinct` and `default`;
/// only `count` may omit it (meaning `*`). An unknown target column is
/// dropped like any other unresolvable reference.
fn aggregate_column(
    table: &TableDescriptor,
    function: AggregateFn,
    field: &FieldSelection,
) -> GraphResult<Option<NodeColumn>> {
    let distinct = field.argument("distinct").and_then(Value::as_bool).unwrap_or(false);
    let targets: Vec<(&String, &Value)> = field
        .arguments
        .iter()
        .filter(|(name, value)| name.as_str() != "distinct" && name.as_str() != "default" && !value.is_null())
        .collect();
    if targets.len() > 1 {
        let names: Vec<&str> = targets.iter().map(|(n, _)| n.as_str()).collect();
        return Err(GraphError::QueryShape(format!(
            "{function} takes exactly one column argument, got {}",
            names.join(", ")
        )));
    }

    let (target, entity_type) = match targets.first() {
        None if function == AggregateFn::Count => (AggregateTarget::All, naming::NUMBER.to_string()),
        None => {
            return Err(GraphError::QueryShape(format!(
                "{function} requires a column argument"
            )))
        }
        Some((name, value)) => {
            let column_name = value.as_str().ok_or_else(|| {
                GraphError::QueryShape(format!("{function} argument '{name}' must name a column"))
            })?;
            if column_name == "*" {
                if function != AggregateFn::Count {
                    return Err(GraphError::QueryShape(format!(
                        "{function} argument '{name}' cannot be '*'"
                    )));
                }
                (AggregateTarget::All, naming::NUMBER.to_string())
            } else {
                let Some(column) = table.column_by_entity(column_name) else {
                    log::warn!("dropping {function} over unknown column {} on {}", column_name, table.key);
                    return Ok(None);
                };
                let entity_type = match function {
                    AggregateFn::Min | AggregateFn::Max => column.entity_type.clone(),
                    _ => naming::NUMBER.to_string(),
                };
                (AggregateTarget::Column(column.database_name.clone()), entity_type)
            }
        }
    };
    if distinct && target == AggregateTarget::All {
        return Err(GraphError::QueryShape(format!(
            "{function}(*) cannot be distinct"
        )));
    }

    let db_name = match &target {
        AggregateTarget::All => String::new(),
        AggregateTarget::Column(name) => name.clone(),
    };
    Ok(Some(NodeColumn {
        name: function.to_string(),
        alias: field.response_key().to_string(),
        db_name,
        entity_type,
        is_identity: false,
        hidden: false,
        as_list: false,
        default: field.argument("default").cloned(),
        aggregate: Some(Aggregate {
            function,
            distinct,
            target,
        }),
    }))
}
