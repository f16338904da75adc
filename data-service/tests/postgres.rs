//! End-to-end scenarios against a real PostgreSQL instance.
//!
//! Ignored by default. Run with
//! `TEST_PG_HOST=... TEST_PG_USER=... TEST_PG_PASSWORD=... cargo test -- --ignored`
//! (`TEST_PG_PORT` defaults to 5432, `TEST_PG_DATABASE` to `postgres`).
//! Each test works in tables with a unique suffix and drops them afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::request::ConditionInput;
use common::models::ConnectionParams;
use data_service::operation::{Operation, Outcome};
use data_service::package_registry::PackageRegistry;
use data_service::service::{GatewayService, GatewayServiceTrait};

#[derive(Default)]
struct CountingRegistry {
    lookups: AtomicUsize,
}

#[async_trait]
impl PackageRegistry for CountingRegistry {
    async fn resolve_latest_version(&self, package: &str) -> AppResult<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match package {
            p if p.starts_with("left_pad") => Ok("1.3.0".to_string()),
            other => Err(AppError::ExternalLookupError(other.to_string())),
        }
    }
}

fn params() -> ConnectionParams {
    let var = |key: &str| std::env::var(key).ok();
    ConnectionParams {
        host: var("TEST_PG_HOST"),
        port: var("TEST_PG_PORT").and_then(|p| p.parse().ok()),
        database: var("TEST_PG_DATABASE").or_else(|| Some("postgres".to_string())),
        user: var("TEST_PG_USER"),
        password: var("TEST_PG_PASSWORD"),
        timeout_ms: None,
    }
}

fn gateway() -> (GatewayService, Arc<CountingRegistry>) {
    let registry = Arc::new(CountingRegistry::default());
    (
        GatewayService::new(AppConfig::default(), registry.clone()),
        registry,
    )
}

fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, suffix())
}

fn suffix() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    format!("{}_{}", std::process::id(), nanos)
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

async fn run(service: &GatewayService, operation: Operation) -> AppResult<Outcome> {
    service.execute(params(), operation).await
}

async fn drop_quietly(service: &GatewayService, table: &str) {
    let _ = run(service, Operation::DropTable { table: table.to_string() }).await;
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn create_insert_select_by_text_condition() {
    let (service, _) = gateway();
    let table = unique("users");

    let create = Operation::create_table(
        Some(table.clone()),
        Some(object(json!({"id": "INTEGER", "name": "TEXT"}))),
    )
    .unwrap();
    run(&service, create.clone()).await.unwrap();
    // repeated creation leaves the table untouched
    run(&service, create).await.unwrap();

    let insert = Operation::insert_row(Some(table.clone()), Some(object(json!({"id": 1, "name": "x"})))).unwrap();
    assert_eq!(
        run(&service, insert).await.unwrap(),
        Outcome::Written { rows_affected: 1 }
    );

    let select = Operation::select_rows(Some(table.clone()), Some(&ConditionInput::Text("id = 1".into()))).unwrap();
    match run(&service, select).await.unwrap() {
        Outcome::Rows(rows) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(Value::Object(rows[0].clone()), json!({"id": 1, "name": "x"}));
            let keys: Vec<_> = rows[0].keys().cloned().collect();
            assert_eq!(keys, vec!["id", "name"]);
        }
        other => panic!("unexpected {:?}", other),
    }

    let exists = Operation::table_exists(Some(table.clone())).unwrap();
    assert_eq!(run(&service, exists).await.unwrap(), Outcome::Exists(true));

    drop_quietly(&service, &table).await;
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn update_delete_and_column_selection() {
    let (service, _) = gateway();
    let table = unique("items");

    run(
        &service,
        Operation::create_table(
            Some(table.clone()),
            Some(object(json!({"id": "INTEGER", "name": "VARCHAR(40)", "note": "TEXT"}))),
        )
        .unwrap(),
    )
    .await
    .unwrap();
    for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
        let row = object(json!({"id": id, "name": name, "note": null}));
        run(&service, Operation::insert_row(Some(table.clone()), Some(row)).unwrap())
            .await
            .unwrap();
    }

    let update = Operation::update_row(
        Some(table.clone()),
        Some(object(json!({"name": "bee"}))),
        Some(&ConditionInput::Fields(object(json!({"id": 2})))),
    )
    .unwrap();
    assert_eq!(
        run(&service, update).await.unwrap(),
        Outcome::Written { rows_affected: 1 }
    );

    let columns = Operation::select_columns(
        Some(table.clone()),
        Some(vec!["name".into(), "id".into()]),
        Some(&ConditionInput::Text("id >= 2 AND note IS NULL".into())),
    )
    .unwrap();
    match run(&service, columns).await.unwrap() {
        Outcome::Rows(rows) => {
            assert_eq!(rows.len(), 2);
            let keys: Vec<_> = rows[0].keys().cloned().collect();
            assert_eq!(keys, vec!["name", "id"]);
            assert!(rows.iter().any(|r| r["name"] == json!("bee")));
        }
        other => panic!("unexpected {:?}", other),
    }

    let delete = Operation::delete_row(Some(table.clone()), Some(&ConditionInput::Text("name = 'a'".into()))).unwrap();
    assert_eq!(
        run(&service, delete).await.unwrap(),
        Outcome::Written { rows_affected: 1 }
    );

    drop_quietly(&service, &table).await;
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn missing_table_is_schema_error() {
    let (service, _) = gateway();
    let table = unique("ghost");

    let err = run(&service, Operation::select_rows(Some(table.clone()), None).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SchemaError(_)), "got {:?}", err);

    let err = run(&service, Operation::drop_table(Some(table)).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SchemaError(_)), "got {:?}", err);
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn wrong_password_is_connection_error() {
    let (service, _) = gateway();
    let mut bad = params();
    bad.password = Some("definitely-not-the-password".into());
    let err = service
        .execute(bad, Operation::GetDependencies)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConnectionError(_)), "got {:?}", err);
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn dev_key_is_stable_per_username() {
    let (service, _) = gateway();
    let username = unique("alice");

    let op = Operation::get_or_create_dev_key(Some(username.clone())).unwrap();
    let first = run(&service, op.clone()).await.unwrap();
    let second = run(&service, op).await.unwrap();
    assert_eq!(first, second);
    match first {
        Outcome::DevKey(key) => assert!((100_000..=999_999).contains(&key)),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn concurrent_first_requests_share_one_dev_key() {
    let (service, _) = gateway();
    let service = Arc::new(service);
    let username = unique("bob");
    // registry tables and indexes in place before the race
    service.bootstrap(params()).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            let username = username.clone();
            tokio::spawn(async move {
                let op = Operation::get_or_create_dev_key(Some(username)).unwrap();
                service.execute(params(), op).await
            })
        })
        .collect();

    let mut keys = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Outcome::DevKey(key) => keys.push(key),
            other => panic!("unexpected {:?}", other),
        }
    }
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), 1, "callers saw different keys: {:?}", keys);

    let select = Operation::select_rows(
        Some("devs".into()),
        Some(&ConditionInput::Fields(object(json!({"username": username})))),
    )
    .unwrap();
    match run(&service, select).await.unwrap() {
        Outcome::Rows(rows) => assert_eq!(rows.len(), 1),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn add_dependency_looks_up_once() {
    let (service, registry) = gateway();
    let package = unique("left_pad");

    let op = Operation::add_dependency(Some(package.clone())).unwrap();
    match run(&service, op.clone()).await.unwrap() {
        Outcome::Dependency { entry, created } => {
            assert!(created);
            assert_eq!(entry.name, package);
            assert_eq!(entry.version, "1.3.0");
        }
        other => panic!("unexpected {:?}", other),
    }
    match run(&service, op).await.unwrap() {
        Outcome::Dependency { entry, created } => {
            assert!(!created);
            assert_eq!(entry.version, "1.3.0");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(registry.lookups.load(Ordering::SeqCst), 1);

    match run(&service, Operation::GetDependencies).await.unwrap() {
        Outcome::Dependencies(entries) => {
            assert_eq!(entries.iter().filter(|e| e.name == package).count(), 1)
        }
        other => panic!("unexpected {:?}", other),
    }

    let cleanup = Operation::delete_row(
        Some("dependencies".into()),
        Some(&ConditionInput::Fields(object(json!({"name": package})))),
    )
    .unwrap();
    run(&service, cleanup).await.unwrap();
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn unknown_package_is_not_recorded() {
    let (service, _) = gateway();
    let package = unique("no_such_package");

    let err = run(&service, Operation::add_dependency(Some(package.clone())).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ExternalLookupError(_)));

    match run(&service, Operation::GetDependencies).await.unwrap() {
        Outcome::Dependencies(entries) => assert!(entries.iter().all(|e| e.name != package)),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn bootstrap_prepares_registries() {
    let (service, _) = gateway();
    let first = service.bootstrap(params()).await.unwrap();
    let second = service.bootstrap(params()).await.unwrap();
    assert!(!second.dependencies_created);
    assert_eq!(first.dev_key, second.dev_key);
    assert!(second.message().ends_with("Dependencies exist"));
}

async fn connect_directly() -> PgConnection {
    let p = params();
    let options = PgConnectOptions::new()
        .host(p.host.as_deref().unwrap())
        .port(p.port.unwrap_or(5432))
        .database(p.database.as_deref().unwrap())
        .username(p.user.as_deref().unwrap())
        .password(p.password.as_deref().unwrap_or_default());
    PgConnection::connect_with(&options).await.unwrap()
}

async fn execute_all(conn: &mut PgConnection, statements: &[String]) {
    for sql in statements {
        sqlx::query(sql).execute(&mut *conn).await.unwrap();
    }
}

async fn only_row(service: &GatewayService, operation: Operation) -> Map<String, Value> {
    match run(service, operation).await.unwrap() {
        Outcome::Rows(mut rows) => {
            assert_eq!(rows.len(), 1, "rows: {:?}", rows);
            rows.remove(0)
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn string_values_reach_typed_columns() {
    let (service, _) = gateway();
    let table = unique("typed");
    let reference = "1b4e28ba-2fa1-11d2-883f-0016d3cca427";

    run(
        &service,
        Operation::create_table(
            Some(table.clone()),
            Some(object(json!({
                "id": "INTEGER",
                "born": "DATE",
                "ref": "UUID",
                "price": "NUMERIC(10,2)",
                "seen": "TIMESTAMP"
            }))),
        )
        .unwrap(),
    )
    .await
    .unwrap();

    let row = object(json!({
        "id": "4",
        "born": "2024-01-02",
        "ref": reference,
        "price": "12.50",
        "seen": "2024-01-02 03:04:05"
    }));
    assert_eq!(
        run(&service, Operation::insert_row(Some(table.clone()), Some(row)).unwrap())
            .await
            .unwrap(),
        Outcome::Written { rows_affected: 1 }
    );

    let by_text = Operation::select_rows(
        Some(table.clone()),
        Some(&ConditionInput::Text("born = '2024-01-02'".into())),
    )
    .unwrap();
    let record = only_row(&service, by_text).await;
    assert_eq!(
        Value::Object(record),
        json!({
            "id": 4,
            "born": "2024-01-02",
            "ref": reference,
            "price": "12.50",
            "seen": "2024-01-02T03:04:05"
        })
    );

    let by_mapping = Operation::select_columns(
        Some(table.clone()),
        Some(vec!["price".into()]),
        Some(&ConditionInput::Fields(object(json!({"ref": reference, "id": "4"})))),
    )
    .unwrap();
    assert_eq!(only_row(&service, by_mapping).await["price"], json!("12.50"));

    let update = Operation::update_row(
        Some(table.clone()),
        Some(object(json!({"price": "13.00", "seen": "2025-06-07 08:09:10"}))),
        Some(&ConditionInput::Fields(object(json!({"born": "2024-01-02"})))),
    )
    .unwrap();
    assert_eq!(
        run(&service, update).await.unwrap(),
        Outcome::Written { rows_affected: 1 }
    );

    let delete = Operation::delete_row(
        Some(table.clone()),
        Some(&ConditionInput::Text("price = '13.00' AND seen > '2025-01-01'".into())),
    )
    .unwrap();
    assert_eq!(
        run(&service, delete).await.unwrap(),
        Outcome::Written { rows_affected: 1 }
    );

    drop_quietly(&service, &table).await;
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn malformed_string_for_typed_column_is_execution_error() {
    let (service, _) = gateway();
    let table = unique("typed_bad");
    run(
        &service,
        Operation::create_table(Some(table.clone()), Some(object(json!({"born": "DATE"})))).unwrap(),
    )
    .await
    .unwrap();

    let row = object(json!({"born": "not a date"}));
    let err = run(&service, Operation::insert_row(Some(table.clone()), Some(row)).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ExecutionError(_)), "got {:?}", err);

    drop_quietly(&service, &table).await;
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn extended_column_types_are_decoded() {
    let (service, _) = gateway();
    let table = unique("extended");
    let mood = unique("mood");
    let mut conn = connect_directly().await;
    execute_all(
        &mut conn,
        &[
            format!("CREATE TYPE {} AS ENUM ('happy', 'sad')", mood),
            format!(
                "CREATE TABLE {} (m {}, tags TEXT[], counts INT4[], span INTERVAL, addr INET, net CIDR, at TIMETZ, gap INTERVAL)",
                table, mood
            ),
            format!(
                "INSERT INTO {} VALUES ('sad', ARRAY['a', NULL, 'c'], ARRAY[1, 2], INTERVAL '1 day 2 hours', \
                 '192.168.1.7/24', '10.0.0.0/8', '12:30:00+02', NULL)",
                table
            ),
        ],
    )
    .await;

    let record = only_row(&service, Operation::select_rows(Some(table.clone()), None).unwrap()).await;
    assert_eq!(
        Value::Object(record),
        json!({
            "m": "sad",
            "tags": ["a", null, "c"],
            "counts": [1, 2],
            "span": "P1DT2H",
            "addr": "192.168.1.7/24",
            "net": "10.0.0.0/8",
            "at": "12:30:00+02:00",
            "gap": null
        })
    );

    // enum values given as strings are cast on the way in
    let insert = Operation::insert_row(Some(table.clone()), Some(object(json!({"m": "happy"})))).unwrap();
    run(&service, insert).await.unwrap();
    let happy = Operation::select_columns(
        Some(table.clone()),
        Some(vec!["m".into()]),
        Some(&ConditionInput::Fields(object(json!({"m": "happy"})))),
    )
    .unwrap();
    assert_eq!(only_row(&service, happy).await["m"], json!("happy"));

    drop_quietly(&service, &table).await;
    execute_all(&mut conn, &[format!("DROP TYPE {}", mood)]).await;
    conn.close().await.unwrap();
}

#[tokio::test]
#[ignore = "needs PostgreSQL (TEST_PG_*)"]
async fn undecodable_column_is_reported_not_nulled() {
    let (service, _) = gateway();
    let table = unique("points");
    let mut conn = connect_directly().await;
    execute_all(
        &mut conn,
        &[
            format!("CREATE TABLE {} (id INT4, p POINT)", table),
            format!("INSERT INTO {} VALUES (1, '(1,2)'), (2, NULL)", table),
        ],
    )
    .await;

    let err = run(&service, Operation::select_rows(Some(table.clone()), None).unwrap())
        .await
        .unwrap_err();
    match err {
        AppError::ExecutionError(message) => assert!(message.contains("column p"), "{}", message),
        other => panic!("unexpected {:?}", other),
    }

    // a NULL in the same column still maps to null
    let null_only = Operation::select_rows(
        Some(table.clone()),
        Some(&ConditionInput::Text("p IS NULL".into())),
    )
    .unwrap();
    assert_eq!(only_row(&service, null_only).await["p"], Value::Null);

    drop_quietly(&service, &table).await;
    conn.close().await.unwrap();
}
