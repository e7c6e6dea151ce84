//! End-to-end query tests: compile, execute against SQLite, hydrate, paginate.

mod common;

use std::sync::Arc;

use common::{setup, CONNECTION};
use lifegraph::cache::cache_key;
use lifegraph::{
    CacheMode, FieldSelection, GraphError, GraphResolver, MemoryCache, RequestContext,
    StaticSchemaProvider, StaticTokenVerifier, WhereMode,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn run(resolver: &GraphResolver, selection: &FieldSelection) -> Value {
    resolver
        .resolve_query(CONNECTION, selection, &RequestContext::new())
        .expect("query")
}

fn names(result: &Value) -> Vec<&str> {
    result
        .as_array()
        .expect("array result")
        .iter()
        .filter_map(|row| row["name"].as_str())
        .collect()
}

// ============================================================================
// Round trip and scenario
// ============================================================================

#[test]
fn test_round_trip_all_columns() {
    let (resolver, _) = setup();
    let selection = FieldSelection::new("users")
        .arg("orderBy", json!("id"))
        .fields(["id", "name", "age", "active", "deptId", "createdAt"]);
    let result = run(&resolver, &selection);
    assert_eq!(
        result,
        json!([
            { "id": 1, "name": "A", "age": 5, "active": true, "deptId": 10, "createdAt": "2024-03-01T10:00:00.000Z" },
            { "id": 2, "name": "B", "age": 10, "active": false, "deptId": 10, "createdAt": null },
            { "id": 3, "name": "C", "age": 11, "active": true, "deptId": 20, "createdAt": "2024-03-02T08:30:00.000Z" }
        ])
    );
}

#[test]
fn test_users_with_department_scenario() {
    let (resolver, executor) = setup();
    let selection = FieldSelection::new("users")
        .arg("where", json!({ "deptId": 10 }))
        .arg("orderBy", json!([{ "column": "id", "direction": "asc" }]))
        .fields(["id", "name"])
        .select(FieldSelection::new("department").fields(["id", "name"]));
    let result = run(&resolver, &selection);
    assert_eq!(
        result,
        json!([
            { "id": 1, "name": "A", "department": { "id": 10, "name": "X" } },
            { "id": 2, "name": "B", "department": { "id": 10, "name": "X" } }
        ])
    );
    assert_eq!(executor.statements().len(), 1);
    assert!(executor.last_statement().contains("INNER JOIN"));
}

#[test]
fn test_join_fan_out_dedup() {
    let (resolver, _) = setup();
    let selection = FieldSelection::new("users")
        .arg("where", json!({ "id": 1 }))
        .fields(["name"])
        .select(
            FieldSelection::new("tasks")
                .arg("orderBy", json!("id"))
                .fields(["title"]),
        );
    let result = run(&resolver, &selection);
    assert_eq!(
        result,
        json!([{
            "name": "A",
            "tasks": [ { "title": "write" }, { "title": "review" }, { "title": "ship" } ]
        }])
    );
}

#[test]
fn test_two_levels_deep() {
    let (resolver, _) = setup();
    let selection = FieldSelection::new("departments")
        .arg("orderBy", json!("id"))
        .fields(["name"])
        .select(
            FieldSelection::new("users")
                .arg("orderBy", json!("id"))
                .fields(["name"])
                .select(FieldSelection::new("tasks").arg("orderBy", json!("id")).fields(["title"])),
        );
    let result = run(&resolver, &selection);
    assert_eq!(
        result,
        json!([
            { "name": "X", "users": [
                { "name": "A", "tasks": [ { "title": "write" }, { "title": "review" }, { "title": "ship" } ] },
                { "name": "B", "tasks": [] }
            ] },
            { "name": "Y", "users": [
                { "name": "C", "tasks": [ { "title": "plan" } ] }
            ] }
        ])
    );
}

#[test]
fn test_resolve_one_returns_object_or_null() {
    let (resolver, _) = setup();
    let found = FieldSelection::new("users")
        .arg("where", json!({ "name": "B" }))
        .fields(["id"]);
    assert_eq!(
        resolver.resolve_one(CONNECTION, &found, &RequestContext::new()).unwrap(),
        json!({ "id": 2 })
    );
    let missing = FieldSelection::new("users")
        .arg("where", json!({ "name": "nobody" }))
        .fields(["id"]);
    assert_eq!(
        resolver.resolve_one(CONNECTION, &missing, &RequestContext::new()).unwrap(),
        Value::Null
    );
}

// ============================================================================
// Where modes
// ============================================================================

fn user_a_with_missing_task(where_mode: Option<&str>) -> FieldSelection {
    let mut tasks = FieldSelection::new("tasks")
        .arg("where", json!({ "title": "nothing" }))
        .fields(["title"]);
    if let Some(mode) = where_mode {
        tasks = tasks.arg("join", json!({ "whereMode": mode }));
    }
    FieldSelection::new("users")
        .arg("where", json!({ "id": 1 }))
        .fields(["name"])
        .select(tasks)
}

#[test]
fn test_global_where_mode_drops_parent() {
    let (resolver, _) = setup();
    assert_eq!(run(&resolver, &user_a_with_missing_task(Some("global"))), json!([]));
    // Global is the default
    assert_eq!(run(&resolver, &user_a_with_missing_task(None)), json!([]));
}

#[test]
fn test_specific_where_mode_keeps_parent() {
    let (resolver, _) = setup();
    assert_eq!(
        run(&resolver, &user_a_with_missing_task(Some("specific"))),
        json!([{ "name": "A", "tasks": [] }])
    );
}

#[test]
fn test_specific_where_mode_on_to_one_keeps_parent() {
    let (resolver, executor) = setup();
    let selection = FieldSelection::new("users")
        .arg("where", json!({ "id": 1 }))
        .fields(["name"])
        .select(
            FieldSelection::new("department")
                .arg("where", json!({ "name": "nope" }))
                .arg("join", json!({ "whereMode": "specific" }))
                .fields(["name"]),
        );
    assert_eq!(run(&resolver, &selection), json!([{ "name": "A", "department": null }]));
    assert!(executor.last_statement().contains(r#"LEFT JOIN "departments""#));
}

#[test]
fn test_request_default_where_mode() {
    let (resolver, _) = setup();
    let ctx = RequestContext::new().with_where_mode(WhereMode::Specific);
    let result = resolver
        .resolve_query(CONNECTION, &user_a_with_missing_task(None), &ctx)
        .unwrap();
    assert_eq!(result, json!([{ "name": "A", "tasks": [] }]));
}

// ============================================================================
// Pagination
// ============================================================================

#[test]
fn test_sub_object_pagination_is_post_hoc() {
    let (resolver, executor) = setup();
    let page = |page: u64| {
        FieldSelection::new("users")
            .arg("where", json!({ "id": 1 }))
            .fields(["name"])
            .select(
                FieldSelection::new("tasks")
                    .arg("orderBy", json!("id"))
                    .arg("objLimit", json!(2))
                    .arg("objPage", json!(page))
                    .fields(["title"]),
            )
    };

    assert_eq!(
        run(&resolver, &page(1)),
        json!([{ "name": "A", "tasks": [ { "title": "write" }, { "title": "review" } ] }])
    );
    let sql = executor.last_statement();
    assert!(sql.ends_with("LIMIT 100000"), "{sql}");

    assert_eq!(
        run(&resolver, &page(2)),
        json!([{ "name": "A", "tasks": [ { "title": "ship" } ] }])
    );
}

#[test]
fn test_root_limit_and_page() {
    let (resolver, executor) = setup();
    let selection = FieldSelection::new("users")
        .arg("orderBy", json!("id"))
        .arg("limit", json!(2))
        .arg("page", json!(2))
        .fields(["name"]);
    assert_eq!(names(&run(&resolver, &selection)), vec!["C"]);
    assert!(executor.last_statement().ends_with("LIMIT 2 OFFSET 2"));
}

#[test]
fn test_pagination_arguments_in_wrong_place() {
    let (resolver, executor) = setup();
    let root = FieldSelection::new("users").arg("objLimit", json!(1)).fields(["name"]);
    let err = resolver
        .resolve_query(CONNECTION, &root, &RequestContext::new())
        .unwrap_err();
    assert!(matches!(err, GraphError::QueryShape(msg) if msg.contains("objLimit")));

    let nested = FieldSelection::new("users")
        .fields(["name"])
        .select(FieldSelection::new("tasks").arg("dbLimit", json!(1)).fields(["title"]));
    let err = resolver
        .resolve_query(CONNECTION, &nested, &RequestContext::new())
        .unwrap_err();
    assert!(matches!(err, GraphError::QueryShape(msg) if msg.contains("dbLimit")));
    assert!(executor.statements().is_empty());
}

// ============================================================================
// Comparators
// ============================================================================

fn filtered(where_arg: Value) -> (Vec<String>, String) {
    let (resolver, executor) = setup();
    let selection = FieldSelection::new("users")
        .arg("where", where_arg)
        .arg("orderBy", json!("id"))
        .fields(["name"]);
    let result = run(&resolver, &selection);
    let names = names(&result).into_iter().map(str::to_string).collect();
    (names, executor.last_statement())
}

#[test]
fn test_comparator_table() {
    let cases: Vec<(Value, &str, Vec<&str>)> = vec![
        (json!({ "name": { "eq": "A" } }), r#""t0"."name" = 'A'"#, vec!["A"]),
        (json!({ "name": { "notEq": "A" } }), r#""t0"."name" <> 'A'"#, vec!["B", "C"]),
        (json!({ "name": { "like": "A%" } }), "LIKE 'A%'", vec!["A"]),
        (json!({ "name": { "notLike": "A%" } }), "NOT LIKE 'A%'", vec!["B", "C"]),
        (json!({ "age": { "gt": 5 } }), r#""t0"."age" > 5"#, vec!["B", "C"]),
        (json!({ "age": { "gte": 10 } }), r#""t0"."age" >= 10"#, vec!["B", "C"]),
        (json!({ "age": { "lt": 10 } }), r#""t0"."age" < 10"#, vec!["A"]),
        (json!({ "age": { "lte": 10 } }), r#""t0"."age" <= 10"#, vec!["A", "B"]),
        (json!({ "age": { "notGt": 5 } }), r#""t0"."age" <= 5"#, vec!["A"]),
        (json!({ "age": { "notGte": 10 } }), r#""t0"."age" < 10"#, vec!["A"]),
        (json!({ "age": { "notLt": 10 } }), r#""t0"."age" >= 10"#, vec!["B", "C"]),
        (json!({ "age": { "notLte": 10 } }), r#""t0"."age" > 10"#, vec!["C"]),
        (json!({ "id": { "in": [1, 3] } }), r#""t0"."id" IN (1, 3)"#, vec!["A", "C"]),
        (json!({ "id": { "notIn": [1, 3] } }), r#""t0"."id" NOT IN (1, 3)"#, vec!["B"]),
        (json!({ "createdAt": { "isNull": true } }), "IS NULL", vec!["B"]),
        (json!({ "createdAt": { "isNotNull": true } }), "IS NOT NULL", vec!["A", "C"]),
        (
            json!({ "id": { "exists": { "raw": "SELECT 1 FROM tasks WHERE tasks.owner_id = t0.id" } } }),
            "EXISTS (SELECT 1 FROM tasks",
            vec!["A", "C"],
        ),
        (
            json!({ "id": { "notExists": { "raw": "SELECT 1 FROM tasks WHERE tasks.owner_id = t0.id" } } }),
            "NOT EXISTS (SELECT 1 FROM tasks",
            vec!["B"],
        ),
        (json!({ "age": { "between": [5, 10] } }), "BETWEEN 5 AND 10", vec!["A", "B"]),
        (json!({ "age": { "notBetween": [5, 10] } }), "NOT BETWEEN 5 AND 10", vec!["C"]),
    ];
    for (where_arg, operator, expected) in cases {
        let (names, sql) = filtered(where_arg.clone());
        assert!(sql.contains(operator), "{where_arg} should compile to {operator}: {sql}");
        assert_eq!(names, expected, "{where_arg}");
    }
}

#[test]
fn test_between_boundary() {
    // 10 is inside, 11 is outside
    let (names, _) = filtered(json!({ "age": { "between": [5, 10] } }));
    assert!(names.contains(&"B".to_string()));
    assert!(!names.contains(&"C".to_string()));
}

#[test]
fn test_and_or_raw_and_empty_in() {
    let (names, _) = filtered(json!({
        "or": [ { "name": "A" }, { "and": [ { "age": { "gt": 10 } }, { "active": true } ] } ]
    }));
    assert_eq!(names, vec!["A", "C"]);

    let (names, _) = filtered(json!({ "age": { "gt": { "raw": "9" } } }));
    assert_eq!(names, vec!["B", "C"]);

    let (names, _) = filtered(json!({ "id": { "in": [] } }));
    assert!(names.is_empty());
}

#[test]
fn test_unknown_filter_column_is_skipped() {
    let (names, sql) = filtered(json!({ "nickname": "A" }));
    assert_eq!(names, vec!["A", "B", "C"]);
    assert!(!sql.contains("WHERE"), "{sql}");
}

// ============================================================================
// Aggregates
// ============================================================================

#[test]
fn test_aggregate_grouped_with_having() {
    let (resolver, _) = setup();
    let selection = FieldSelection::new("users")
        .arg("orderBy", json!("deptId"))
        .arg("groupBy", json!({ "having": { "total": { "gte": 1 } } }))
        .select(FieldSelection::new("count").alias("total"))
        .select(FieldSelection::new("max").arg("column", json!("age")).alias("oldest"))
        .fields(["deptId"]);
    let result = resolver
        .resolve_aggregate(CONNECTION, &selection, &RequestContext::new())
        .unwrap();
    assert_eq!(
        result,
        json!([
            { "total": 2, "oldest": 10, "deptId": 10 },
            { "total": 1, "oldest": 11, "deptId": 20 }
        ])
    );
}

#[test]
fn test_aggregate_argument_errors() {
    let (resolver, _) = setup();
    let too_many = FieldSelection::new("users").select(
        FieldSelection::new("sum")
            .arg("column", json!("age"))
            .arg("other", json!("id")),
    );
    assert!(matches!(
        resolver.resolve_aggregate(CONNECTION, &too_many, &RequestContext::new()),
        Err(GraphError::QueryShape(_))
    ));
    let missing = FieldSelection::new("users").select(FieldSelection::new("avg"));
    assert!(matches!(
        resolver.resolve_aggregate(CONNECTION, &missing, &RequestContext::new()),
        Err(GraphError::QueryShape(_))
    ));
}

#[test]
fn test_sum_distinct_is_a_sum() {
    let (resolver, _) = setup();
    let selection = FieldSelection::new("users").select(
        FieldSelection::new("sum")
            .arg("column", json!("deptId"))
            .arg("distinct", json!(true)),
    );
    let result = resolver
        .resolve_aggregate(CONNECTION, &selection, &RequestContext::new())
        .unwrap();
    assert_eq!(result, json!([{ "sum": 30 }]));
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_cache_key_follows_sql_text() {
    let (resolver, _) = setup();
    let ctx = RequestContext::new();
    let shorthand = FieldSelection::new("users")
        .arg("where", json!({ "name": "A" }))
        .fields(["name"]);
    let explicit = FieldSelection::new("users")
        .arg("where", json!({ "name": { "eq": "A" } }))
        .fields(["name"]);
    let a = resolver.compile_query(CONNECTION, &shorthand, &ctx).unwrap();
    let b = resolver.compile_query(CONNECTION, &explicit, &ctx).unwrap();
    assert_eq!(a.sql, b.sql);
    assert_eq!(cache_key(CONNECTION, &a.sql), cache_key(CONNECTION, &b.sql));

    let name_first = FieldSelection::new("users").fields(["name", "age"]);
    let age_first = FieldSelection::new("users").fields(["age", "name"]);
    let c = resolver.compile_query(CONNECTION, &name_first, &ctx).unwrap();
    let d = resolver.compile_query(CONNECTION, &age_first, &ctx).unwrap();
    assert_ne!(c.sql, d.sql);
    assert_ne!(cache_key(CONNECTION, &c.sql), cache_key(CONNECTION, &d.sql));
}

#[test]
fn test_cached_response_skips_execution() {
    let executor = common::SqliteExecutor::open(common::DDL);
    let resolver = GraphResolver::builder()
        .schema_provider(Arc::new(StaticSchemaProvider::new().with_schema(CONNECTION, common::schema())))
        .connection(common::settings(), executor.clone())
        .cache_provider(Arc::new(MemoryCache::new()))
        .build()
        .unwrap();
    let selection = FieldSelection::new("users").arg("orderBy", json!("id")).fields(["name"]);
    let cached = RequestContext::new().with_cache(CacheMode::Cache, Some(60));

    let first = resolver.resolve_query(CONNECTION, &selection, &cached).unwrap();
    let second = resolver.resolve_query(CONNECTION, &selection, &cached).unwrap();
    assert_eq!(first, second);
    assert_eq!(executor.statements().len(), 1);

    let uncached = RequestContext::new();
    resolver.resolve_query(CONNECTION, &selection, &uncached).unwrap();
    assert_eq!(executor.statements().len(), 2);
}

// ============================================================================
// Auth
// ============================================================================

#[test]
fn test_access_token_required_when_verifier_configured() {
    let executor = common::SqliteExecutor::open(common::DDL);
    let resolver = GraphResolver::builder()
        .schema_provider(Arc::new(StaticSchemaProvider::new().with_schema(CONNECTION, common::schema())))
        .connection(common::settings(), executor.clone())
        .token_verifier(Arc::new(StaticTokenVerifier::new(["letmein"])))
        .build()
        .unwrap();
    let selection = FieldSelection::new("users").fields(["name"]);

    let err = resolver
        .resolve_query(CONNECTION, &selection, &RequestContext::new())
        .unwrap_err();
    assert!(matches!(err, GraphError::Authorization(_)));
    let err = resolver
        .resolve_query(CONNECTION, &selection, &RequestContext::new().with_access("wrong"))
        .unwrap_err();
    assert!(matches!(err, GraphError::Authorization(_)));
    assert!(executor.statements().is_empty());

    let ctx = RequestContext::from_headers([("Authorization", "Bearer letmein")]);
    assert_eq!(resolver.resolve_query(CONNECTION, &selection, &ctx).unwrap().as_array().map(Vec::len), Some(3));
}
