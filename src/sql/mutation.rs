//! Insert / Update / Delete compilers.
//!
//! Single-table statements that reuse the entity-name resolution and the
//! predicate compiler of the SELECT path. Every statement returns the affected
//! rows (`RETURNING`), hydrated as flat objects.
//!
//! Safety checks run before any SQL is assembled: an insert needs at least
//! one row, an update needs a payload, and updates and deletes need a `where`
//! that still has a predicate after unknown columns are dropped.

use sea_query::{Expr, Query, ReturningClause};
use serde_json::{Map, Value};

use crate::error::{GraphError, GraphResult};
use crate::hydrate::definition::HydrationDefinition;
use crate::query::args::WhereTree;
use crate::query::selection::FieldSelection;
use crate::schema::{ColumnDescriptor, SchemaMetadata, TableDescriptor, TableKey};
use crate::sql::predicate::{compile_tree, PredicateScope};
use crate::sql::{iden, render, table_ref, value_expr, SqlDialect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationAction {
    Insert,
    Update,
    Delete,
}

/// Arguments of one write, as seen (and possibly rewritten) by lifecycle hooks
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub action: MutationAction,
    pub table: TableKey,
    /// Insert payload, keyed by entity name
    pub rows: Vec<Map<String, Value>>,
    /// Update payload, keyed by entity name
    pub set: Map<String, Value>,
    /// Predicate tree in the same shape as a query's `where`
    pub filter: Option<Value>,
    /// Entity names to return; empty returns every column
    pub returning: Vec<String>,
}

impl MutationRequest {
    pub fn insert(table: TableKey, rows: Vec<Map<String, Value>>) -> Self {
        Self {
            action: MutationAction::Insert,
            table,
            rows,
            set: Map::new(),
            filter: None,
            returning: Vec::new(),
        }
    }

    pub fn update(table: TableKey, set: Map<String, Value>, filter: Value) -> Self {
        Self {
            action: MutationAction::Update,
            table,
            rows: Vec::new(),
            set,
            filter: Some(filter),
            returning: Vec::new(),
        }
    }

    pub fn delete(table: TableKey, filter: Value) -> Self {
        Self {
            action: MutationAction::Delete,
            table,
            rows: Vec::new(),
            set: Map::new(),
            filter: Some(filter),
            returning: Vec::new(),
        }
    }

    /// Read `data` (rows or update payload) and `where` from a mutation field;
    /// its scalar sub-selections choose the returned columns.
    pub fn from_selection(
        action: MutationAction,
        table: TableKey,
        selection: &FieldSelection,
    ) -> GraphResult<Self> {
        let data = selection.argument("data");
        let rows = match (action, data) {
            (MutationAction::Insert, Some(Value::Array(items))) => items
                .iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row.clone()),
                    other => Err(GraphError::QueryShape(format!(
                        "insert rows must be objects, got {other}"
                    ))),
                })
                .collect::<GraphResult<Vec<_>>>()?,
            (MutationAction::Insert, Some(Value::Object(row))) => vec![row.clone()],
            (MutationAction::Insert, Some(other)) => {
                return Err(GraphError::QueryShape(format!(
                    "data must be a list of rows, got {other}"
                )))
            }
            _ => Vec::new(),
        };
        let set = match (action, data) {
            (MutationAction::Update, Some(Value::Object(set))) => set.clone(),
            (MutationAction::Update, Some(other)) => {
                return Err(GraphError::QueryShape(format!(
                    "data must be an object, got {other}"
                )))
            }
            _ => Map::new(),
        };
        let returning = selection
            .selections
            .iter()
            .filter(|s| !s.has_selections() && s.name != "__typename")
            .map(|s| s.name.clone())
            .collect();
        Ok(Self {
            action,
            table,
            rows,
            set,
            filter: selection.argument("where").cloned(),
            returning,
        })
    }
}

/// Write statement plus the flat definition for its returned rows
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMutation {
    pub sql: String,
    pub hydration: HydrationDefinition,
}

pub struct MutationCompiler<'s> {
    schema: &'s SchemaMetadata,
    dialect: SqlDialect,
}

impl<'s> MutationCompiler<'s> {
    pub fn new(schema: &'s SchemaMetadata, dialect: SqlDialect) -> Self {
        Self { schema, dialect }
    }

    /// # Errors
    ///
    /// `GraphError::MutationSafety` for an empty insert payload, an empty
    /// update payload or a missing `where`; `GraphError::Schema` for unknown tables.
    pub fn compile(&self, request: &MutationRequest) -> GraphResult<CompiledMutation> {
        let table = self.schema.require_table(&request.table)?;
        let sql = match request.action {
            MutationAction::Insert => self.compile_insert(table, request)?,
            MutationAction::Update => self.compile_update(table, request)?,
            MutationAction::Delete => self.compile_delete(table, request)?,
        };
        log::debug!("compiled {:?} on {}: {}", request.action, table.key, sql);

        let returned = returned_columns(table, &request.returning);
        let hydration = HydrationDefinition::flat(
            &table.entity_name,
            returned
                .iter()
                .map(|c| (c.entity_name.clone(), c.entity_type.clone())),
        );
        Ok(CompiledMutation { sql, hydration })
    }

    fn compile_insert(&self, table: &TableDescriptor, request: &MutationRequest) -> GraphResult<String> {
        if request.rows.is_empty() {
            return Err(GraphError::MutationSafety(format!(
                "insert into {} needs at least one row",
                table.key
            )));
        }

        // Columns in first-seen order across all rows
        let mut columns: Vec<&ColumnDescriptor> = Vec::new();
        for row in &request.rows {
            for key in row.keys() {
                match table.column_by_entity(key) {
                    Some(column) => {
                        if !columns.iter().any(|c| c.database_name == column.database_name) {
                            columns.push(column);
                        }
                    }
                    None => log::warn!("dropping unknown insert column {} on {}", key, table.key),
                }
            }
        }
        if columns.is_empty() {
            return Err(GraphError::MutationSafety(format!(
                "insert into {} has no known columns",
                table.key
            )));
        }

        let mut insert = Query::insert();
        insert
            .into_table(table_ref(&table.key))
            .columns(columns.iter().map(|c| iden(&c.database_name)));
        for row in &request.rows {
            let values: Vec<Expr> = columns
                .iter()
                .map(|c| match row.get(&c.entity_name) {
                    Some(value) => value_expr(value),
                    None => self.missing_value(),
                })
                .collect();
            insert
                .values(values)
                .map_err(|e| GraphError::Compile(format!("{e:?}")))?;
        }
        insert.returning(returning_clause(table, &request.returning));
        Ok(render(&insert, self.dialect))
    }

    fn compile_update(&self, table: &TableDescriptor, request: &MutationRequest) -> GraphResult<String> {
        let condition = self.require_filter(table, request, "update")?;
        let assignments: Vec<(&ColumnDescriptor, &Value)> = request
            .set
            .iter()
            .filter_map(|(key, value)| match table.column_by_entity(key) {
                Some(column) => Some((column, value)),
                None => {
                    log::warn!("dropping unknown update column {} on {}", key, table.key);
                    None
                }
            })
            .collect();
        if assignments.is_empty() {
            return Err(GraphError::MutationSafety(format!(
                "update of {} has an empty payload",
                table.key
            )));
        }

        let mut update = Query::update();
        update.table(table_ref(&table.key));
        for (column, value) in assignments {
            update.value(iden(&column.database_name), value_expr(value));
        }
        update
            .cond_where(condition)
            .returning(returning_clause(table, &request.returning));
        Ok(render(&update, self.dialect))
    }

    fn compile_delete(&self, table: &TableDescriptor, request: &MutationRequest) -> GraphResult<String> {
        let condition = self.require_filter(table, request, "delete")?;
        let mut delete = Query::delete();
        delete
            .from_table(table_ref(&table.key))
            .cond_where(condition)
            .returning(returning_clause(table, &request.returning));
        Ok(render(&delete, self.dialect))
    }

    /// Unconditional updates and deletes are too destructive to run
    fn require_filter(
        &self,
        table: &TableDescriptor,
        request: &MutationRequest,
        verb: &str,
    ) -> GraphResult<sea_query::Condition> {
        let refused = || {
            GraphError::MutationSafety(format!(
                "{verb} of {} without a where clause is refused",
                table.key
            ))
        };
        let tree = match &request.filter {
            Some(value) => WhereTree::parse(value)?.ok_or_else(refused)?,
            None => return Err(refused()),
        };
        compile_tree(&tree, &PredicateScope::filter(table, None))?.ok_or_else(refused)
    }

    fn missing_value(&self) -> Expr {
        match self.dialect {
            SqlDialect::Postgres => Expr::cust("DEFAULT"),
            // SQLite has no DEFAULT keyword inside VALUES
            SqlDialect::Sqlite => Expr::cust("NULL"),
        }
    }
}

fn returned_columns<'t>(table: &'t TableDescriptor, names: &[String]) -> Vec<&'t ColumnDescriptor> {
    let selected: Vec<&ColumnDescriptor> = names
        .iter()
        .filter_map(|name| table.column_by_entity(name))
        .collect();
    if selected.is_empty() {
        table.columns.iter().collect()
    } else {
        selected
    }
}

fn returning_clause(table: &TableDescriptor, names: &[String]) -> ReturningClause {
    Query::returning().columns(
        returned_columns(table, names)
            .into_iter()
            .map(|c| iden(&c.database_name)),
    )
}
