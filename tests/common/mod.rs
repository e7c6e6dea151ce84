//! Shared fixtures: an in-memory SQLite database behind the `QueryExecutor`
//! seam, and schema metadata describing it.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use lifegraph::{
    ColumnDescriptor, ConnectionSettings, GraphError, GraphResolver, GraphResult, QueryExecutor,
    Row, SchemaMetadata, SqlDialect, StaticSchemaProvider, TableKey,
};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Number, Value};

pub const CONNECTION: &str = "main";

/// Executes compiled statements against one SQLite connection and records them
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
    statements: Mutex<Vec<String>>,
}

impl SqliteExecutor {
    pub fn open(ddl: &str) -> Arc<Self> {
        let conn = Connection::open_in_memory().expect("open in-memory sqlite");
        conn.execute_batch(ddl).expect("seed database");
        Arc::new(Self {
            conn: Mutex::new(conn),
            statements: Mutex::new(Vec::new()),
        })
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn last_statement(&self) -> String {
        self.statements.lock().unwrap().last().cloned().unwrap_or_default()
    }

    /// Run a verification query outside the recorded statements
    pub fn scalar(&self, sql: &str) -> i64 {
        self.conn
            .lock()
            .unwrap()
            .query_row(sql, [], |row| row.get(0))
            .expect("scalar query")
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl QueryExecutor for SqliteExecutor {
    fn execute_query(&self, sql: &str) -> GraphResult<Vec<Row>> {
        self.statements.lock().unwrap().push(sql.to_string());
        let conn = self.conn.lock().unwrap();
        let mut statement = conn
            .prepare(sql)
            .map_err(|e| GraphError::Execution(format!("{e}: {sql}")))?;
        let width = statement.column_count();
        let rows = statement
            .query_map([], |row| {
                (0..width)
                    .map(|idx| row.get_ref(idx).map(to_json))
                    .collect::<rusqlite::Result<Row>>()
            })
            .map_err(|e| GraphError::Execution(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<Row>>>()
            .map_err(|e| GraphError::Execution(e.to_string()))
    }
}

pub const DDL: &str = "
    CREATE TABLE departments (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        age INTEGER,
        active BOOLEAN NOT NULL DEFAULT 1,
        dept_id INTEGER NOT NULL REFERENCES departments(id),
        created_at TEXT
    );
    CREATE TABLE tasks (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        owner_id INTEGER REFERENCES users(id)
    );
    INSERT INTO departments (id, name) VALUES (10, 'X'), (20, 'Y');
    INSERT INTO users (id, name, age, active, dept_id, created_at) VALUES
        (1, 'A', 5, 1, 10, '2024-03-01 10:00:00'),
        (2, 'B', 10, 0, 10, NULL),
        (3, 'C', 11, 1, 20, '2024-03-02 08:30:00');
    INSERT INTO tasks (id, title, owner_id) VALUES
        (100, 'write', 1),
        (101, 'review', 1),
        (102, 'ship', 1),
        (103, 'plan', 3);
";

pub fn schema() -> SchemaMetadata {
    let mut schema = SchemaMetadata::new();
    schema.add_table(
        TableKey::new("departments"),
        vec![
            ColumnDescriptor::new("id", "integer").primary_key().identity(),
            ColumnDescriptor::new("name", "text"),
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
            ColumnDescriptor::new("id", "integer").primary_key().identity(),
            ColumnDescriptor::new("title", "text"),
            ColumnDescriptor::new("owner_id", "integer")
                .foreign_key(TableKey::new("users"), "id")
                .nullable(),
        ],
    );
    schema.derive_relations();
    schema
}

pub fn settings() -> ConnectionSettings {
    ConnectionSettings::new(CONNECTION, SqlDialect::Sqlite)
}

/// Resolver over a freshly seeded database
pub fn setup() -> (GraphResolver, Arc<SqliteExecutor>) {
    let executor = SqliteExecutor::open(DDL);
    let resolver = GraphResolver::builder()
        .schema_provider(Arc::new(StaticSchemaProvider::new().with_schema(CONNECTION, schema())))
        .connection(settings(), executor.clone())
        .build()
        .expect("resolver");
    (resolver, executor)
}
