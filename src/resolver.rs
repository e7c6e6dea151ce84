//! Request entry points.
//!
//! A [`GraphResolver`] owns the collaborators (schema provider, one executor
//! per connection, response cache, token verifier, date formatter, type
//! handlers, mutation hooks) and runs each request through the pipeline:
//!
//! authorize → connection → schema → build plan → compile → cache check →
//! execute → hydrate → paginate → cache store.
//!
//! Builders, compilers and hydrators are constructed per call, so a resolver
//! can be shared between threads without locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::auth::{authorize, TokenVerifier};
use crate::cache::{CacheContext, CacheMode, CacheProvider, ResponseCache};
use crate::config::{ConnectionSettings, EngineConfig};
use crate::error::{GraphError, GraphResult};
use crate::executor::{execute_instrumented, QueryExecutor, Row};
use crate::format::{ChronoDateFormatter, DateFormatter};
use crate::hooks::HookRegistry;
use crate::hydrate::{paginate, HydrationDefinition, Hydrator, TypeHandlerRegistry};
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
use crate::query::args::WhereMode;
use crate::query::builder::StructureBuilder;
use crate::query::node::QueryPlan;
use crate::query::selection::FieldSelection;
use crate::schema::naming::STRING;
use crate::schema::{Cardinality, SchemaMetadata, SchemaProvider, TableKey};
use crate::sql::mutation::{MutationAction, MutationCompiler, MutationRequest};
use crate::sql::select::{CompiledStatement, SelectCompiler};

/// Per-request options, usually read from request headers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub access: Option<String>,
    pub cache: CacheMode,
    pub cache_seconds: Option<u64>,
    /// Overrides the resolver's default where mode for relations without `join.whereMode`
    pub where_mode: Option<WhereMode>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access(mut self, token: impl Into<String>) -> Self {
        self.access = Some(token.into());
        self
    }

    pub fn with_cache(mut self, mode: CacheMode, seconds: Option<u64>) -> Self {
        self.cache = mode;
        self.cache_seconds = seconds;
        self
    }

    pub fn with_where_mode(mut self, where_mode: WhereMode) -> Self {
        self.where_mode = Some(where_mode);
        self
    }

    /// Read `authorization` (`Bearer` prefix optional) or `access`, `cache`,
    /// `cache-seconds` and `where-mode`; names are case-insensitive and
    /// unparseable values are ignored
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut ctx = Self::new();
        for (name, value) in headers {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "authorization" => {
                    let token = value
                        .strip_prefix("Bearer ")
                        .or_else(|| value.strip_prefix("bearer "))
                        .unwrap_or(value);
                    ctx.access = Some(token.trim().to_string());
                }
                "access" => ctx.access = Some(value.to_string()),
                "cache" => ctx.cache = value.parse().unwrap_or_default(),
                "cache-seconds" | "cacheseconds" => ctx.cache_seconds = value.parse().ok(),
                "where-mode" | "wheremode" => match value.parse() {
                    Ok(mode) => ctx.where_mode = Some(mode),
                    Err(e) => log::warn!("ignoring where-mode header: {e}"),
                },
                _ => {}
            }
        }
        ctx
    }
}

struct Connection {
    settings: ConnectionSettings,
    executor: Arc<dyn QueryExecutor>,
}

/// Compiled query with everything needed to finish the request
struct Prepared {
    plan: QueryPlan,
    statement: CompiledStatement,
}

pub struct GraphResolver {
    schemas: Arc<dyn SchemaProvider>,
    connections: HashMap<String, Connection>,
    cache: Option<ResponseCache>,
    tokens: Option<Arc<dyn TokenVerifier>>,
    dates: Arc<dyn DateFormatter>,
    handlers: TypeHandlerRegistry,
    hooks: HookRegistry,
    default_where_mode: WhereMode,
}

impl fmt::Debug for GraphResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut connections: Vec<&String> = self.connections.keys().collect();
        connections.sort();
        f.debug_struct("GraphResolver")
            .field("connections", &connections)
            .field("cache", &self.cache)
            .field("auth", &self.tokens.is_some())
            .field("handlers", &self.handlers)
            .field("hooks", &self.hooks)
            .field("default_where_mode", &self.default_where_mode)
            .finish_non_exhaustive()
    }
}

impl GraphResolver {
    pub fn builder() -> GraphResolverBuilder {
        GraphResolverBuilder::default()
    }

    /// Nested query returning an array of objects
    ///
    /// The selection's name is the root table's entity name (or its database name).
    ///
    /// # Errors
    ///
    /// Any [`GraphError`] raised along the pipeline; no partial result is returned.
    pub fn resolve_query(&self, connection_id: &str, selection: &FieldSelection, ctx: &RequestContext) -> GraphResult<Value> {
        self.run_select(connection_id, selection, ctx, |builder, root| {
            builder.build_query(root, selection, Cardinality::Many)
        })
    }

    /// Nested query returning the first object, or null
    ///
    /// # Errors
    ///
    /// Same as [`GraphResolver::resolve_query`].
    pub fn resolve_one(&self, connection_id: &str, selection: &FieldSelection, ctx: &RequestContext) -> GraphResult<Value> {
        self.run_select(connection_id, selection, ctx, |builder, root| {
            builder.build_query(root, selection, Cardinality::One)
        })
    }

    /// Aggregate query (`count`, `min`, `max`, `sum`, `avg` plus grouping columns)
    ///
    /// # Errors
    ///
    /// Same as [`GraphResolver::resolve_query`].
    pub fn resolve_aggregate(&self, connection_id: &str, selection: &FieldSelection, ctx: &RequestContext) -> GraphResult<Value> {
        self.run_select(connection_id, selection, ctx, |builder, root| {
            builder.build_aggregate(root, selection)
        })
    }

    /// Compile a nested query without executing it
    ///
    /// # Errors
    ///
    /// Configuration, schema and query-shape errors.
    pub fn compile_query(&self, connection_id: &str, selection: &FieldSelection, ctx: &RequestContext) -> GraphResult<CompiledStatement> {
        authorize(self.tokens.as_deref(), ctx.access.as_deref())?;
        let connection = self.connection(connection_id)?;
        let schema = self.schemas.get_schema(connection_id)?;
        let prepared = self.prepare(connection, &schema, selection, ctx, |builder, root| {
            builder.build_query(root, selection, Cardinality::Many)
        })?;
        Ok(prepared.statement)
    }

    /// # Errors
    ///
    /// `GraphError::MutationSafety` for an empty payload, plus the errors of
    /// [`GraphResolver::resolve_mutation`].
    pub fn resolve_insert(&self, connection_id: &str, selection: &FieldSelection, ctx: &RequestContext) -> GraphResult<Value> {
        self.resolve_from_selection(MutationAction::Insert, connection_id, selection, ctx)
    }

    /// # Errors
    ///
    /// `GraphError::MutationSafety` without a `where` or a payload, plus the
    /// errors of [`GraphResolver::resolve_mutation`].
    pub fn resolve_update(&self, connection_id: &str, selection: &FieldSelection, ctx: &RequestContext) -> GraphResult<Value> {
        self.resolve_from_selection(MutationAction::Update, connection_id, selection, ctx)
    }

    /// # Errors
    ///
    /// `GraphError::MutationSafety` without a `where`, plus the errors of
    /// [`GraphResolver::resolve_mutation`].
    pub fn resolve_delete(&self, connection_id: &str, selection: &FieldSelection, ctx: &RequestContext) -> GraphResult<Value> {
        self.resolve_from_selection(MutationAction::Delete, connection_id, selection, ctx)
    }

    fn resolve_from_selection(
        &self,
        action: MutationAction,
        connection_id: &str,
        selection: &FieldSelection,
        ctx: &RequestContext,
    ) -> GraphResult<Value> {
        authorize(self.tokens.as_deref(), ctx.access.as_deref())?;
        self.connection(connection_id)?;
        let schema = self.schemas.get_schema(connection_id)?;
        let table = root_table(&schema, &selection.name)?;
        let request = MutationRequest::from_selection(action, table, selection)?;
        self.resolve_mutation(connection_id, request, ctx)
    }

    /// Run a write through the hook chain, returning the affected rows
    ///
    /// # Errors
    ///
    /// Authorization, configuration and schema errors, mutation-safety errors
    /// raised before any SQL is built, hook errors and execution errors.
    pub fn resolve_mutation(&self, connection_id: &str, request: MutationRequest, ctx: &RequestContext) -> GraphResult<Value> {
        authorize(self.tokens.as_deref(), ctx.access.as_deref())?;
        let connection = self.connection(connection_id)?;
        let schema = self.schemas.get_schema(connection_id)?;

        self.hooks.run(request, |request| {
            let compiled = {
                #[cfg(feature = "tracing")]
                let _span = tracing_helpers::compile_span(connection_id, &request.table.table).entered();
                MutationCompiler::new(&schema, connection.settings.dialect).compile(request)?
            };
            let rows = execute_instrumented(connection.executor.as_ref(), &compiled.sql)?;
            self.hydrate(&compiled.hydration, &rows)
        })
    }

    /// Call a stored procedure and key its rows by the declared result columns
    ///
    /// # Errors
    ///
    /// `GraphError::Schema` for an unknown procedure, plus the authorization,
    /// configuration and execution errors of the other entry points.
    pub fn resolve_procedure(&self, connection_id: &str, name: &str, args: &[Value], ctx: &RequestContext) -> GraphResult<Value> {
        authorize(self.tokens.as_deref(), ctx.access.as_deref())?;
        let connection = self.connection(connection_id)?;
        let schema = self.schemas.get_schema(connection_id)?;
        let procedure = schema
            .procedure(name)
            .ok_or_else(|| GraphError::Schema(format!("unknown procedure {name}")))?;
        if args.len() != procedure.parameters.len() {
            return Err(GraphError::QueryShape(format!(
                "procedure {name} takes {} arguments, got {}",
                procedure.parameters.len(),
                args.len()
            )));
        }

        let rows = {
            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::execute_query_span(&procedure.key.to_string()).entered();
            connection.executor.execute_procedure(procedure, args)?
        };
        let definition = HydrationDefinition::flat(
            &procedure.entity_name,
            procedure.result_columns.iter().map(|c| (c.clone(), STRING)),
        );
        self.hydrate(&definition, &rows)
    }

    fn run_select<F>(&self, connection_id: &str, selection: &FieldSelection, ctx: &RequestContext, build: F) -> GraphResult<Value>
    where
        F: FnOnce(&StructureBuilder<'_>, &TableKey) -> GraphResult<QueryPlan>,
    {
        authorize(self.tokens.as_deref(), ctx.access.as_deref())?;
        let connection = self.connection(connection_id)?;
        let schema = self.schemas.get_schema(connection_id)?;
        let Prepared { plan, mut statement } = self.prepare(connection, &schema, selection, ctx, build)?;

        // Single and list queries share SQL text, so the cache always holds the list
        let single = statement.hydration.root.cardinality == Cardinality::One;
        statement.hydration.root.cardinality = Cardinality::Many;

        let mut cache_ctx = CacheContext::new(ctx.cache, ctx.cache_seconds);
        if let Some(cache) = &self.cache {
            cache_ctx.update_cache_values(connection_id, &statement.sql, cache.default_ttl());
            if let Some(hit) = cache.check_cache(&mut cache_ctx) {
                return Ok(shape_root(hit, single));
            }
        }

        let rows = execute_instrumented(connection.executor.as_ref(), &statement.sql)?;
        let mut result = self.hydrate(&statement.hydration, &rows)?;
        paginate(&mut result, &plan.pagination);

        if let Some(cache) = &self.cache {
            cache.set_cache(&cache_ctx, &result);
        }
        Ok(shape_root(result, single))
    }

    fn prepare<F>(
        &self,
        connection: &Connection,
        schema: &SchemaMetadata,
        selection: &FieldSelection,
        ctx: &RequestContext,
        build: F,
    ) -> GraphResult<Prepared>
    where
        F: FnOnce(&StructureBuilder<'_>, &TableKey) -> GraphResult<QueryPlan>,
    {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::compile_span(&connection.settings.id, &selection.name).entered();

        let root = root_table(schema, &selection.name)?;
        let builder = StructureBuilder::new(schema, connection.settings.row_cap)
            .with_where_mode(ctx.where_mode.unwrap_or(self.default_where_mode));
        let plan = build(&builder, &root)?;
        let statement = SelectCompiler::new(schema, connection.settings.dialect).compile(&plan)?;
        Ok(Prepared { plan, statement })
    }

    fn hydrate(&self, definition: &HydrationDefinition, rows: &[Row]) -> GraphResult<Value> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::hydrate_span(rows.len()).entered();
        #[cfg(feature = "metrics")]
        METRICS.record_hydration(rows.len());

        Hydrator::new(definition, &self.handlers)
            .with_date_formatter(&*self.dates)
            .hydrate(Some(rows))
    }

    fn connection(&self, connection_id: &str) -> GraphResult<&Connection> {
        self.connections.get(connection_id).ok_or_else(|| {
            GraphError::Configuration(format!(
                "no database provider registered for connection '{connection_id}'"
            ))
        })
    }
}

/// First object (or null) for a single-object root, the list otherwise
fn shape_root(result: Value, single: bool) -> Value {
    if !single {
        return result;
    }
    match result {
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        other => other,
    }
}

/// Resolve a root field name: entity name first, then database table name
fn root_table(schema: &SchemaMetadata, name: &str) -> GraphResult<TableKey> {
    if let Some(table) = schema.table_by_entity(name) {
        return Ok(table.key.clone());
    }
    let key = TableKey::new(name);
    schema.require_table(&key)?;
    Ok(key)
}

#[derive(Default)]
pub struct GraphResolverBuilder {
    schemas: Option<Arc<dyn SchemaProvider>>,
    connections: Vec<(Option<ConnectionSettings>, String, Arc<dyn QueryExecutor>)>,
    cache: Option<ResponseCache>,
    cache_provider: Option<Arc<dyn CacheProvider>>,
    tokens: Option<Arc<dyn TokenVerifier>>,
    dates: Option<Arc<dyn DateFormatter>>,
    handlers: Option<TypeHandlerRegistry>,
    hooks: HookRegistry,
    config: Option<EngineConfig>,
}

impl GraphResolverBuilder {
    pub fn schema_provider(mut self, provider: Arc<dyn SchemaProvider>) -> Self {
        self.schemas = Some(provider);
        self
    }

    /// Register an executor with explicit settings
    pub fn connection(mut self, settings: ConnectionSettings, executor: Arc<dyn QueryExecutor>) -> Self {
        let id = settings.id.clone();
        self.connections.push((Some(settings), id, executor));
        self
    }

    /// Register an executor whose settings come from the engine config
    pub fn executor(mut self, connection_id: impl Into<String>, executor: Arc<dyn QueryExecutor>) -> Self {
        self.connections.push((None, connection_id.into(), executor));
        self
    }

    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Cache through `provider`; the default TTL comes from the engine config
    pub fn cache_provider(mut self, provider: Arc<dyn CacheProvider>) -> Self {
        self.cache_provider = Some(provider);
        self
    }

    pub fn token_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.tokens = Some(verifier);
        self
    }

    pub fn date_formatter(mut self, formatter: Arc<dyn DateFormatter>) -> Self {
        self.dates = Some(formatter);
        self
    }

    pub fn type_handlers(mut self, handlers: TypeHandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Connection settings, cache TTL, date pattern and default where mode
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// # Errors
    ///
    /// Returns `GraphError::Configuration` without a schema provider or when a
    /// connection id is registered twice.
    pub fn build(self) -> GraphResult<GraphResolver> {
        let schemas = self
            .schemas
            .ok_or_else(|| GraphError::Configuration("no schema provider configured".to_string()))?;
        let config = self.config.unwrap_or_default();

        let mut connections = HashMap::new();
        for (settings, id, executor) in self.connections {
            let settings = settings
                .or_else(|| config.connection(&id).cloned())
                .unwrap_or_else(|| ConnectionSettings::new(id.clone(), Default::default()));
            if connections
                .insert(id.clone(), Connection { settings, executor })
                .is_some()
            {
                return Err(GraphError::Configuration(format!(
                    "connection '{id}' registered twice"
                )));
            }
        }

        let dates = self
            .dates
            .unwrap_or_else(|| Arc::new(ChronoDateFormatter::new(config.date_format.clone())));

        let ttl = config.cache.default_ttl_seconds;
        let cache = self
            .cache
            .or_else(|| self.cache_provider.map(|provider| ResponseCache::new(provider, ttl)));

        Ok(GraphResolver {
            schemas,
            connections,
            cache,
            tokens: self.tokens,
            dates,
            handlers: self.handlers.unwrap_or_else(TypeHandlerRegistry::with_defaults),
            hooks: self.hooks,
            default_where_mode: config.default_where_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenVerifier;
    use crate::cache::MemoryCache;
    use crate::schema::StaticSchemaProvider;
    use crate::sql::SqlDialect;
    use crate::test_fixtures::sample_schema;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns canned rows and records every statement
    struct Canned {
        rows: Vec<Row>,
        statements: Mutex<Vec<String>>,
    }

    impl Canned {
        fn new(rows: Value) -> Arc<Self> {
            Arc::new(Self {
                rows: serde_json::from_value(rows).unwrap(),
                statements: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.statements.lock().unwrap().len()
        }
    }

    impl QueryExecutor for Canned {
        fn execute_query(&self, sql: &str) -> GraphResult<Vec<Row>> {
            self.statements.lock().unwrap().push(sql.to_string());
            Ok(self.rows.clone())
        }
    }

    fn resolver(executor: Arc<Canned>) -> GraphResolver {
        GraphResolver::builder()
            .schema_provider(Arc::new(StaticSchemaProvider::new().with_schema("main", sample_schema())))
            .connection(ConnectionSettings::new("main", SqlDialect::Postgres), executor)
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_context_from_headers() {
        let ctx = RequestContext::from_headers([
            ("Authorization", "Bearer abc"),
            ("Cache", "cache"),
            ("Cache-Seconds", "30"),
            ("Where-Mode", "specific"),
            ("X-Other", "ignored"),
        ]);
        assert_eq!(
            ctx,
            RequestContext::new()
                .with_access("abc")
                .with_cache(CacheMode::Cache, Some(30))
                .with_where_mode(WhereMode::Specific)
        );

        let ctx = RequestContext::from_headers([("cache", "nonsense"), ("where-mode", "sideways")]);
        assert_eq!(ctx.cache, CacheMode::None);
        assert_eq!(ctx.where_mode, None);
    }

    #[test]
    fn test_resolve_query_hydrates_canned_rows() {
        let executor = Canned::new(json!([[1, "A"], [2, "B"]]));
        let resolver = resolver(executor.clone());
        let selection = FieldSelection::new("users").fields(["name"]);
        let result = resolver
            .resolve_query("main", &selection, &RequestContext::new())
            .unwrap();
        assert_eq!(result, json!([{ "name": "A" }, { "name": "B" }]));
        assert_eq!(
            executor.statements.lock().unwrap()[0],
            r#"SELECT "t0"."id" AS "f0", "t0"."name" AS "f1" FROM "users" AS "t0" LIMIT 100000"#
        );
    }

    #[test]
    fn test_resolve_one() {
        let resolver = resolver(Canned::new(json!([[1, "A"]])));
        let selection = FieldSelection::new("users").fields(["name"]);
        let result = resolver.resolve_one("main", &selection, &RequestContext::new()).unwrap();
        assert_eq!(result, json!({ "name": "A" }));
    }

    #[test]
    fn test_unknown_connection_is_configuration_error() {
        let resolver = resolver(Canned::new(json!([])));
        let err = resolver
            .resolve_query("other", &FieldSelection::new("users"), &RequestContext::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }

    #[test]
    fn test_unknown_root_is_schema_error() {
        let resolver = resolver(Canned::new(json!([])));
        let err = resolver
            .resolve_query("main", &FieldSelection::new("ghosts"), &RequestContext::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::Schema(_)));
    }

    #[test]
    fn test_auth_checked_before_anything_else() {
        let executor = Canned::new(json!([]));
        let resolver = GraphResolver::builder()
            .schema_provider(Arc::new(StaticSchemaProvider::new()))
            .token_verifier(Arc::new(StaticTokenVerifier::new(["t"])))
            .build()
            .unwrap();
        // Unknown connection too, but authorization wins
        let err = resolver
            .resolve_query("main", &FieldSelection::new("users"), &RequestContext::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::Authorization(_)));
        assert_eq!(executor.count(), 0);
    }

    #[test]
    fn test_cache_serves_second_request() {
        let executor = Canned::new(json!([[1, "A"]]));
        let resolver = GraphResolver::builder()
            .schema_provider(Arc::new(StaticSchemaProvider::new().with_schema("main", sample_schema())))
            .connection(ConnectionSettings::new("main", SqlDialect::Postgres), executor.clone())
            .cache_provider(Arc::new(MemoryCache::new()))
            .build()
            .unwrap();
        let selection = FieldSelection::new("users").fields(["name"]);
        let ctx = RequestContext::new().with_cache(CacheMode::Cache, None);

        let first = resolver.resolve_query("main", &selection, &ctx).unwrap();
        let second = resolver.resolve_query("main", &selection, &ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(executor.count(), 1);

        let refresh = RequestContext::new().with_cache(CacheMode::Refresh, None);
        resolver.resolve_query("main", &selection, &refresh).unwrap();
        assert_eq!(executor.count(), 2);
    }

    #[test]
    fn test_cached_single_and_list_keep_their_shapes() {
        let executor = Canned::new(json!([[1, "A"], [2, "B"]]));
        let resolver = GraphResolver::builder()
            .schema_provider(Arc::new(StaticSchemaProvider::new().with_schema("main", sample_schema())))
            .connection(ConnectionSettings::new("main", SqlDialect::Postgres), executor.clone())
            .cache_provider(Arc::new(MemoryCache::new()))
            .build()
            .unwrap();
        let selection = FieldSelection::new("users").fields(["name"]);
        let ctx = RequestContext::new().with_cache(CacheMode::Cache, None);

        let one = resolver.resolve_one("main", &selection, &ctx).unwrap();
        assert_eq!(one, json!({ "name": "A" }));
        let many = resolver.resolve_query("main", &selection, &ctx).unwrap();
        assert_eq!(many, json!([{ "name": "A" }, { "name": "B" }]));
        let one_again = resolver.resolve_one("main", &selection, &ctx).unwrap();
        assert_eq!(one_again, json!({ "name": "A" }));
        assert_eq!(executor.count(), 1);
    }

    #[test]
    fn test_nested_pagination_applied() {
        let executor = Canned::new(json!([
            [10, "X", 1, "A"],
            [10, "X", 2, "B"],
            [10, "X", 3, "C"]
        ]));
        let resolver = resolver(executor);
        let selection = FieldSelection::new("departments")
            .fields(["name"])
            .select(FieldSelection::new("users").arg("objLimit", json!(2)).fields(["name"]));
        let result = resolver.resolve_query("main", &selection, &RequestContext::new()).unwrap();
        assert_eq!(
            result,
            json!([{ "name": "X", "users": [ { "name": "A" }, { "name": "B" } ] }])
        );
    }

    #[test]
    fn test_delete_without_where_issues_no_sql() {
        let executor = Canned::new(json!([]));
        let resolver = resolver(executor.clone());
        let err = resolver
            .resolve_delete("main", &FieldSelection::new("users"), &RequestContext::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::MutationSafety(_)));
        assert_eq!(executor.count(), 0);
    }

    #[test]
    fn test_resolve_procedure() {
        use crate::schema::{ProcedureDescriptor, ProcedureParameter, TableKey};

        let mut schema = sample_schema();
        schema.add_procedure(ProcedureDescriptor {
            key: TableKey::with_schema("public", "top_users"),
            entity_name: "topUsers".into(),
            parameters: vec![ProcedureParameter {
                name: "min_age".into(),
                database_type: "integer".into(),
            }],
            result_columns: vec!["id".into(), "name".into()],
        });
        let executor = Canned::new(json!([[1, "A"], [3, "C"]]));
        let resolver = GraphResolver::builder()
            .schema_provider(Arc::new(StaticSchemaProvider::new().with_schema("main", schema)))
            .connection(ConnectionSettings::new("main", SqlDialect::Postgres), executor.clone())
            .build()
            .unwrap();

        let result = resolver
            .resolve_procedure("main", "topUsers", &[json!(5)], &RequestContext::new())
            .unwrap();
        assert_eq!(result, json!([{ "id": 1, "name": "A" }, { "id": 3, "name": "C" }]));
        assert_eq!(
            executor.statements.lock().unwrap()[0],
            r#"SELECT * FROM "public"."top_users"(5)"#
        );

        let err = resolver
            .resolve_procedure("main", "topUsers", &[], &RequestContext::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::QueryShape(_)));
        let err = resolver
            .resolve_procedure("main", "nope", &[], &RequestContext::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::Schema(_)));
        assert_eq!(executor.count(), 1);
    }

    #[test]
    fn test_build_requires_schema_provider() {
        let err = GraphResolver::builder().build().unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }

    #[test]
    fn test_duplicate_connection_rejected() {
        let executor = Canned::new(json!([]));
        let err = GraphResolver::builder()
            .schema_provider(Arc::new(StaticSchemaProvider::new()))
            .connection(ConnectionSettings::new("main", SqlDialect::Postgres), executor.clone())
            .executor("main", executor)
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }
}
