//! Schema metadata consumed by the compiler and hydrator.
//!
//! The metadata is produced once per connection by a [`SchemaProvider`] and is
//! read-only afterwards: the structure builder resolves entity names to
//! database names through it, the SQL compiler resolves predicate columns, and
//! the mutation compilers map payload keys.
//!
//! # Example
//!
//! ```
//! use lifegraph::schema::{ColumnDescriptor, SchemaMetadata, TableKey};
//!
//! let mut schema = SchemaMetadata::new();
//! schema.add_table(
//!     TableKey::new("departments"),
//!     vec![
//!         ColumnDescriptor::new("id", "integer").primary_key(),
//!         ColumnDescriptor::new("name", "text"),
//!     ],
//! );
//! schema.add_table(
//!     TableKey::new("users"),
//!     vec![
//!         ColumnDescriptor::new("id", "integer").primary_key(),
//!         ColumnDescriptor::new("name", "text"),
//!         ColumnDescriptor::new("dept_id", "integer").foreign_key(TableKey::new("departments"), "id"),
//!     ],
//! );
//! schema.derive_relations();
//!
//! let users = schema.table(&TableKey::new("users")).unwrap();
//! assert!(users.relation("department").is_some());
//! ```

pub mod naming;

use crate::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Schema-qualified table identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey {
    pub schema: Option<String>,
    pub table: String,
}

impl TableKey {
    /// Table in the connection's default schema
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
        }
    }

    /// Table in an explicit schema
    pub fn with_schema(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

/// One database column
///
/// Within a table, exactly the columns flagged `is_primary_key` form the
/// table's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub database_name: String,
    pub entity_name: String,
    pub database_type: String,
    pub entity_type: String,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub foreign_key_table: Option<TableKey>,
    pub foreign_key_column: Option<String>,
    pub is_nullable: bool,
    pub is_identity: bool,
}

impl ColumnDescriptor {
    /// Create a descriptor, deriving entity name and entity type from the database ones
    pub fn new(database_name: impl Into<String>, database_type: impl Into<String>) -> Self {
        let database_name = database_name.into();
        let database_type = database_type.into();
        Self {
            entity_name: naming::to_camel_case(&database_name),
            entity_type: naming::entity_type_for(&database_type).to_string(),
            database_name,
            database_type,
            is_primary_key: false,
            is_foreign_key: false,
            foreign_key_table: None,
            foreign_key_column: None,
            is_nullable: false,
            is_identity: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn foreign_key(mut self, table: TableKey, column: impl Into<String>) -> Self {
        self.is_foreign_key = true;
        self.foreign_key_table = Some(table);
        self.foreign_key_column = Some(column.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    /// Database-generated value (serial / identity column)
    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    /// Override the derived entity type (e.g. a custom coercion handler name)
    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = entity_type.into();
        self
    }

    /// Override the derived entity name
    pub fn entity_name(mut self, entity_name: impl Into<String>) -> Self {
        self.entity_name = entity_name.into();
        self
    }
}

/// Relation cardinality as seen from the owning (parent) level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

/// A navigable relation from one table to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Client-facing field name
    pub name: String,
    pub target: TableKey,
    pub cardinality: Cardinality,
    /// Column on the parent table (database name)
    pub local_column: String,
    /// Column on the target table (database name)
    pub remote_column: String,
    /// Parent holds the foreign key ("to-one via foreign key")
    pub owns_foreign_key: bool,
    /// The foreign key column accepts NULL
    pub nullable: bool,
}

/// All metadata for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub key: TableKey,
    pub entity_name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub relations: Vec<RelationDescriptor>,
}

impl TableDescriptor {
    /// Look up a column by its client-facing name
    pub fn column_by_entity(&self, entity_name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.entity_name == entity_name)
    }

    /// Look up a column by its database name
    pub fn column_by_database(&self, database_name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.database_name == database_name)
    }

    /// Primary-key columns in declaration order
    pub fn identity_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.name == name)
    }

    fn name_taken(&self, name: &str) -> bool {
        self.column_by_entity(name).is_some() || self.relation(name).is_some()
    }
}

/// Stored procedure parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureParameter {
    pub name: String,
    pub database_type: String,
}

/// Stored procedure callable through `resolve_procedure`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureDescriptor {
    pub key: TableKey,
    pub entity_name: String,
    pub parameters: Vec<ProcedureParameter>,
    /// Names given to the result columns, in row order
    pub result_columns: Vec<String>,
}

/// Schema metadata for one connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    tables: BTreeMap<TableKey, TableDescriptor>,
    procedures: BTreeMap<String, ProcedureDescriptor>,
}

impl SchemaMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build metadata from the flat `(table, column)` form a catalog reader produces
    pub fn from_columns<I>(columns: I) -> Self
    where
        I: IntoIterator<Item = (TableKey, ColumnDescriptor)>,
    {
        let mut grouped: BTreeMap<TableKey, Vec<ColumnDescriptor>> = BTreeMap::new();
        for (key, column) in columns {
            grouped.entry(key).or_default().push(column);
        }
        let mut schema = Self::new();
        for (key, columns) in grouped {
            schema.add_table(key, columns);
        }
        schema.derive_relations();
        schema
    }

    /// Register a table; entity-name collisions among its columns are resolved here
    pub fn add_table(&mut self, key: TableKey, mut columns: Vec<ColumnDescriptor>) {
        let mut names: Vec<String> = columns.iter().map(|c| c.entity_name.clone()).collect();
        naming::resolve_collisions(&mut names);
        for (column, name) in columns.iter_mut().zip(names) {
            column.entity_name = name;
        }
        let descriptor = TableDescriptor {
            entity_name: naming::to_camel_case(&key.table),
            key: key.clone(),
            columns,
            relations: Vec::new(),
        };
        self.tables.insert(key, descriptor);
    }

    /// Register an explicitly named relation on `table`
    pub fn add_relation(&mut self, table: &TableKey, relation: RelationDescriptor) -> GraphResult<()> {
        let descriptor = self
            .tables
            .get_mut(table)
            .ok_or_else(|| GraphError::Schema(format!("unknown table {table}")))?;
        if descriptor.name_taken(&relation.name) {
            return Err(GraphError::Schema(format!(
                "field {} already exists on {}",
                relation.name, table
            )));
        }
        descriptor.relations.push(relation);
        Ok(())
    }

    pub fn add_procedure(&mut self, procedure: ProcedureDescriptor) {
        self.procedures.insert(procedure.entity_name.clone(), procedure);
    }

    /// Derive to-one and to-many relations from foreign-key flags
    ///
    /// A foreign key on `users.dept_id → departments.id` yields `department`
    /// (to-one) on `users` and `users` (to-many) on `departments`. Name
    /// collisions fall back to the FK column (`dept`) and `usersByDeptId`.
    pub fn derive_relations(&mut self) {
        let mut pending: Vec<(TableKey, RelationDescriptor, String)> = Vec::new();

        for table in self.tables.values() {
            for column in table.columns.iter().filter(|c| c.is_foreign_key) {
                let (Some(target_key), Some(target_column)) =
                    (&column.foreign_key_table, &column.foreign_key_column)
                else {
                    continue;
                };
                let Some(target) = self.tables.get(target_key) else {
                    log::warn!(
                        "foreign key {}.{} references unknown table {}",
                        table.key,
                        column.database_name,
                        target_key
                    );
                    continue;
                };

                let stripped = column
                    .database_name
                    .strip_suffix("_id")
                    .or_else(|| column.database_name.strip_suffix("Id"))
                    .unwrap_or(&column.database_name);

                pending.push((
                    table.key.clone(),
                    RelationDescriptor {
                        name: naming::singularize(&target.entity_name),
                        target: target_key.clone(),
                        cardinality: Cardinality::One,
                        local_column: column.database_name.clone(),
                        remote_column: target_column.clone(),
                        owns_foreign_key: true,
                        nullable: column.is_nullable,
                    },
                    naming::to_camel_case(stripped),
                ));
                pending.push((
                    target_key.clone(),
                    RelationDescriptor {
                        name: table.entity_name.clone(),
                        target: table.key.clone(),
                        cardinality: Cardinality::Many,
                        local_column: target_column.clone(),
                        remote_column: column.database_name.clone(),
                        owns_foreign_key: false,
                        nullable: column.is_nullable,
                    },
                    format!(
                        "{}By{}",
                        table.entity_name,
                        naming::to_pascal_case(&column.database_name)
                    ),
                ));
            }
        }

        for (key, mut relation, fallback) in pending {
            let Some(table) = self.tables.get_mut(&key) else {
                continue;
            };
            let duplicate = table.relations.iter().any(|r| {
                r.target == relation.target
                    && r.local_column == relation.local_column
                    && r.remote_column == relation.remote_column
            });
            if duplicate {
                continue;
            }
            if table.name_taken(&relation.name) {
                relation.name = fallback;
            }
            if table.name_taken(&relation.name) {
                log::warn!(
                    "cannot derive relation {} on {}: name already taken",
                    relation.name,
                    key
                );
                continue;
            }
            table.relations.push(relation);
        }
    }

    pub fn table(&self, key: &TableKey) -> Option<&TableDescriptor> {
        self.tables.get(key)
    }

    /// Look up a table, failing with a schema error when it is unknown
    pub fn require_table(&self, key: &TableKey) -> GraphResult<&TableDescriptor> {
        self.tables
            .get(key)
            .ok_or_else(|| GraphError::Schema(format!("unknown table {key}")))
    }

    pub fn table_by_entity(&self, entity_name: &str) -> Option<&TableDescriptor> {
        self.tables.values().find(|t| t.entity_name == entity_name)
    }

    pub fn procedure(&self, entity_name: &str) -> Option<&ProcedureDescriptor> {
        self.procedures.get(entity_name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.values()
    }
}

/// Supplies schema metadata per connection
pub trait SchemaProvider: Send + Sync {
    /// Return the metadata for `connection_id`
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Configuration` when the connection is unknown.
    fn get_schema(&self, connection_id: &str) -> GraphResult<Arc<SchemaMetadata>>;
}

/// Schema provider over metadata retrieved ahead of time
#[derive(Debug, Default, Clone)]
pub struct StaticSchemaProvider {
    schemas: HashMap<String, Arc<SchemaMetadata>>,
}

impl StaticSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, connection_id: impl Into<String>, schema: SchemaMetadata) -> Self {
        self.insert(connection_id, schema);
        self
    }

    pub fn insert(&mut self, connection_id: impl Into<String>, schema: SchemaMetadata) {
        self.schemas.insert(connection_id.into(), Arc::new(schema));
    }
}

impl SchemaProvider for StaticSchemaProvider {
    fn get_schema(&self, connection_id: &str) -> GraphResult<Arc<SchemaMetadata>> {
        self.schemas.get(connection_id).cloned().ok_or_else(|| {
            GraphError::Configuration(format!(
                "no schema metadata for connection '{connection_id}'"
            ))
        })
    }
}
