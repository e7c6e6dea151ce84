//! Shared schema fixture for unit tests.

use crate::schema::{ColumnDescriptor, SchemaMetadata, TableKey};

/// `departments`, `users` (FK `dept_id`), `tasks` (nullable FK `owner_id`)
/// and `event_log`, which has no primary key.
pub fn sample_schema() -> SchemaMetadata {
    let mut schema = SchemaMetadata::new();
    schema.add_table(
        TableKey::new("departments"),
        vec![
            ColumnDescriptor::new("id", "integer").primary_key(),
            ColumnDescriptor::new("name", "text"),
            ColumnDescriptor::new("budget", "numeric").nullable(),
        ],
    );
    schema.add_table(
        TableKey::new("users"),
        vec![
            ColumnDescriptor::new("id", "integer").primary_key().identity(),
            ColumnDescriptor::new("name", "text"),
            ColumnDescriptor::new("age", "integer").nullable(),
            ColumnDescriptor::new("active", "boolean"),
            ColumnDescriptor::new("dept_id", "integer")
                .foreign_key(TableKey::new("departments"), "id"),
            ColumnDescriptor::new("created_at", "timestamp").nullable(),
        ],
    );
    schema.add_table(
        TableKey::new("tasks"),
        vec![
            ColumnDescriptor::new("id", "integer").primary_key(),
            ColumnDescriptor::new("title", "text"),
            ColumnDescriptor::new("owner_id", "integer")
                .foreign_key(TableKey::new("users"), "id")
                .nullable(),
        ],
    );
    schema.add_table(
        TableKey::new("event_log"),
        vec![ColumnDescriptor::new("message", "text")],
    );
    schema.derive_relations();
    schema
}
