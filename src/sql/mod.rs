//! SQL compilation on top of sea-query.
//!
//! Statements are assembled with sea-query builders and rendered to SQL text
//! with values inlined: the text is both the execution input and the cache
//! key input, so it has to be self-contained.

pub mod mutation;
pub mod predicate;
pub mod select;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sea_query::{
    DynIden, Expr, IntoTableRef, PostgresQueryBuilder, QueryStatementWriter, SqliteQueryBuilder,
    TableRef,
};

use crate::query::node::{Aggregate, AggregateTarget};
use crate::schema::{ProcedureDescriptor, TableKey};

/// Which sea-query backend renders the SQL text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Postgres,
    Sqlite,
}

/// Owned identifier from a runtime name
pub(crate) fn iden(name: &str) -> DynIden {
    DynIden::from(name.to_string())
}

pub(crate) fn table_ref(key: &TableKey) -> TableRef {
    match &key.schema {
        Some(schema) => (iden(schema), iden(&key.table)).into_table_ref(),
        None => iden(&key.table).into_table_ref(),
    }
}

/// Column reference, qualified by table alias when one is given
pub(crate) fn column_expr(alias: Option<&str>, column: &str) -> Expr {
    match alias {
        Some(alias) => Expr::col((iden(alias), iden(column))),
        None => Expr::col(iden(column)),
    }
}

/// Output column name for a select-list position
pub fn output_name(position: usize) -> String {
    format!("f{position}")
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `SUM(DISTINCT "t0"."age")`, `COUNT(*)`
pub(crate) fn aggregate_sql(alias: Option<&str>, aggregate: &Aggregate) -> String {
    let target = match &aggregate.target {
        AggregateTarget::All => "*".to_string(),
        AggregateTarget::Column(column) => match alias {
            Some(alias) => format!("{}.{}", quote_ident(alias), quote_ident(column)),
            None => quote_ident(column),
        },
    };
    format!(
        "{}({}{})",
        aggregate.function.sql_name(),
        if aggregate.distinct { "DISTINCT " } else { "" },
        target
    )
}

/// Bound value for a JSON scalar; arrays and objects become JSON values
pub(crate) fn value_expr(value: &Value) -> Expr {
    match value {
        Value::Null => Expr::cust("NULL"),
        Value::Bool(b) => Expr::val(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Expr::val(i)
            } else if let Some(u) = n.as_u64() {
                Expr::val(u)
            } else {
                Expr::val(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => Expr::val(s.clone()),
        Value::Array(_) | Value::Object(_) => Expr::val(value.clone()),
    }
}

pub(crate) fn render<S: QueryStatementWriter>(statement: &S, dialect: SqlDialect) -> String {
    match dialect {
        SqlDialect::Postgres => statement.to_string(PostgresQueryBuilder),
        SqlDialect::Sqlite => statement.to_string(SqliteQueryBuilder),
    }
}

/// Render a JSON value as an inline SQL literal
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        // Escape single quotes by doubling them (SQL standard)
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Array(_) | Value::Object(_) => format!("'{}'", value.to_string().replace('\'', "''")),
    }
}

/// `SELECT * FROM "schema"."proc"(arg, ...)`
pub fn procedure_call_sql(procedure: &ProcedureDescriptor, args: &[Value]) -> String {
    let name = match &procedure.key.schema {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&procedure.key.table)),
        None => quote_ident(&procedure.key.table),
    };
    let args: Vec<String> = args.iter().map(sql_literal).collect();
    format!("SELECT * FROM {}({})", name, args.join(", "))
}
