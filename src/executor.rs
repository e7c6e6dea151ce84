//! Execution provider seam.
//!
//! The resolver never talks to a database driver directly. It hands compiled
//! SQL text to a [`QueryExecutor`] registered for the connection and gets back
//! rows of JSON scalars in select-list order.

use std::time::Instant;

use serde_json::Value;

use crate::error::GraphResult;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
use crate::schema::ProcedureDescriptor;
use crate::sql::procedure_call_sql;

/// One result row, values in select-list order
pub type Row = Vec<Value>;

/// Trait for executing compiled statements
///
/// Implementations must be safe to share between concurrent requests; the
/// resolver holds them behind `Arc<dyn QueryExecutor>`.
///
/// # Examples
///
/// ```
/// use lifegraph::executor::{QueryExecutor, Row};
/// use lifegraph::GraphResult;
/// use serde_json::json;
///
/// struct Fixed;
///
/// impl QueryExecutor for Fixed {
///     fn execute_query(&self, _sql: &str) -> GraphResult<Vec<Row>> {
///         Ok(vec![vec![json!(1), json!("A")]])
///     }
/// }
///
/// let rows = Fixed.execute_query("SELECT 1").unwrap();
/// assert_eq!(rows.len(), 1);
/// ```
pub trait QueryExecutor: Send + Sync {
    /// Execute `sql` and return its row set
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Execution` if the driver fails.
    fn execute_query(&self, sql: &str) -> GraphResult<Vec<Row>>;

    /// Call a stored procedure; by default `SELECT * FROM proc(args)`
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Execution` if the driver fails.
    fn execute_procedure(&self, procedure: &ProcedureDescriptor, args: &[Value]) -> GraphResult<Vec<Row>> {
        self.execute_query(&procedure_call_sql(procedure, args))
    }
}

/// Run `sql` on `executor` inside an execute span, recording duration and errors
pub(crate) fn execute_instrumented(executor: &dyn QueryExecutor, sql: &str) -> GraphResult<Vec<Row>> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_query_span(sql).entered();

    let start = Instant::now();
    let result = executor.execute_query(sql);
    let duration = start.elapsed();
    log::debug!("executed in {duration:?}");

    #[cfg(feature = "metrics")]
    {
        METRICS.record_query(duration);
        if result.is_err() {
            METRICS.record_query_error();
        }
    }

    result
}

#[cfg(feature = "postgres")]
pub use self::postgres::PostgresExecutor;

#[cfg(feature = "postgres")]
mod postgres {
    use may_postgres::types::Type;
    use may_postgres::{Client, Row as PgRow};
    use rust_decimal::Decimal;
    use serde_json::{Number, Value};

    use super::{QueryExecutor, Row};
    use crate::error::{GraphError, GraphResult};

    /// Executor over a `may_postgres` client
    ///
    /// Compiled statements carry their values inline, so no parameters are bound.
    pub struct PostgresExecutor {
        client: Client,
    }

    impl PostgresExecutor {
        pub fn new(client: Client) -> Self {
            Self { client }
        }

        /// # Errors
        ///
        /// Returns `GraphError::Configuration` if the connection cannot be opened.
        pub fn connect(url: &str) -> GraphResult<Self> {
            let client = may_postgres::connect(url)
                .map_err(|e| GraphError::Configuration(format!("failed to connect: {e}")))?;
            Ok(Self::new(client))
        }

        pub fn client(&self) -> &Client {
            &self.client
        }
    }

    impl QueryExecutor for PostgresExecutor {
        fn execute_query(&self, sql: &str) -> GraphResult<Vec<Row>> {
            let rows = self
                .client
                .query(sql, &[])
                .map_err(|e| GraphError::Execution(e.to_string()))?;
            rows.iter().map(convert_row).collect()
        }
    }

    fn convert_row(row: &PgRow) -> GraphResult<Row> {
        (0..row.columns().len())
            .map(|idx| convert_value(row, idx))
            .collect()
    }

    fn decode<'a, T>(row: &'a PgRow, idx: usize) -> GraphResult<Option<T>>
    where
        T: may_postgres::types::FromSql<'a>,
    {
        row.try_get::<usize, Option<T>>(idx)
            .map_err(|e| GraphError::Execution(format!("column {idx}: {e}")))
    }

    fn convert_value(row: &PgRow, idx: usize) -> GraphResult<Value> {
        let ty = row.columns()[idx].type_();
        let value = match *ty {
            Type::BOOL => decode::<bool>(row, idx)?.map(Value::Bool),
            Type::INT2 => decode::<i16>(row, idx)?.map(Value::from),
            Type::INT4 => decode::<i32>(row, idx)?.map(Value::from),
            Type::INT8 => decode::<i64>(row, idx)?.map(Value::from),
            Type::FLOAT4 => decode::<f32>(row, idx)?.and_then(|v| Number::from_f64(f64::from(v)).map(Value::Number)),
            Type::FLOAT8 => decode::<f64>(row, idx)?.and_then(|v| Number::from_f64(v).map(Value::Number)),
            // Kept as text so precision survives; the NUMBER handler converts it
            Type::NUMERIC => decode::<Decimal>(row, idx)?.map(|v| Value::String(v.to_string())),
            Type::JSON | Type::JSONB => decode::<Value>(row, idx)?,
            Type::UUID => decode::<uuid::Uuid>(row, idx)?.map(|v| Value::String(v.to_string())),
            Type::TIMESTAMP => decode::<chrono::NaiveDateTime>(row, idx)?
                .map(|v| Value::String(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())),
            Type::TIMESTAMPTZ => decode::<chrono::DateTime<chrono::Utc>>(row, idx)?
                .map(|v| Value::String(v.to_rfc3339())),
            Type::DATE => decode::<chrono::NaiveDate>(row, idx)?.map(|v| Value::String(v.to_string())),
            _ => decode::<String>(row, idx)?.map(Value::String),
        };
        Ok(value.unwrap_or(Value::Null))
    }
}
