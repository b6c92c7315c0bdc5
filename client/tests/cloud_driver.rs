//! CloudDriver against an in-process stand-in for the hosted REST gateway.
//! The stand-in understands the subset of the query language the driver
//! sends: `eq.`/`gt.` filters, `select`, `limit` and exact counts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use palpites_client::storage::CloudCredentials;
use palpites_client::{CloudDriver, CredentialSource, GuessStorage, StorageError, Timeouts};
use serde_json::{json, Map, Value};
use shared::{Gender, GuessInput, GuessStats};

const ANON_KEY: &str = "test-anon-key";

#[derive(Default)]
struct Table {
    rows: Vec<Value>,
    next_id: i64,
}

type SharedTable = Arc<Mutex<Table>>;

fn authorized(headers: &HeaderMap) -> bool {
    let bearer = format!("Bearer {ANON_KEY}");
    headers.get("apikey").is_some_and(|v| v == ANON_KEY)
        && headers
            .get(header::AUTHORIZATION)
            .is_some_and(|v| v == bearer.as_str())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(row: &Value, params: &HashMap<String, String>) -> bool {
    params.iter().all(|(column, condition)| match column.as_str() {
        "select" | "order" | "limit" => true,
        column => match condition.split_once('.') {
            Some(("eq", expected)) => cell_text(&row[column]) == expected,
            Some(("gt", bound)) => row[column]
                .as_i64()
                .zip(bound.parse::<i64>().ok())
                .is_some_and(|(value, bound)| value > bound),
            _ => false,
        },
    })
}

fn project(row: &Value, select: Option<&String>) -> Value {
    match select.map(String::as_str) {
        None | Some("*") => row.clone(),
        Some(columns) => Value::Object(
            columns
                .split(',')
                .map(|c| (c.to_string(), row[c].clone()))
                .collect::<Map<String, Value>>(),
        ),
    }
}

/// GET and HEAD: newest id first, with the exact count in `Content-Range`
async fn read_rows(
    State(table): State<SharedTable>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let table = table.lock().unwrap();
    let mut rows: Vec<&Value> = table.rows.iter().filter(|r| matches(r, &params)).collect();
    rows.sort_by_key(|r| std::cmp::Reverse(r["id"].as_i64()));
    let total = rows.len();
    if let Some(limit) = params.get("limit").and_then(|l| l.parse().ok()) {
        rows.truncate(limit);
    }

    let range = if rows.is_empty() {
        format!("*/{total}")
    } else {
        format!("0-{}/{total}", rows.len() - 1)
    };
    let body: Vec<Value> = rows.iter().map(|r| project(r, params.get("select"))).collect();
    (StatusCode::OK, [(header::CONTENT_RANGE, range)], Json(body)).into_response()
}

async fn insert_rows(
    State(table): State<SharedTable>,
    headers: HeaderMap,
    Json(new_rows): Json<Vec<Value>>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut table = table.lock().unwrap();
    let mut inserted = Vec::new();
    for mut row in new_rows {
        table.next_id += 1;
        row["id"] = json!(table.next_id);
        table.rows.push(row.clone());
        inserted.push(row);
    }

    if headers.get("prefer").is_some_and(|v| v == "return=representation") {
        (StatusCode::CREATED, Json(inserted)).into_response()
    } else {
        StatusCode::CREATED.into_response()
    }
}

async fn delete_rows(
    State(table): State<SharedTable>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    // The gateway refuses deletes without a filter
    if params.is_empty() {
        return StatusCode::BAD_REQUEST;
    }
    table.lock().unwrap().rows.retain(|r| !matches(r, &params));
    StatusCode::NO_CONTENT
}

async fn spawn_gateway() -> String {
    let app = Router::new()
        .route(
            "/rest/v1/palpites",
            get(read_rows).post(insert_rows).delete(delete_rows),
        )
        .with_state(SharedTable::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn driver_for(url: &str, anon_key: &str) -> CloudDriver {
    let source = CredentialSource::ready(CloudCredentials::new(url, anon_key));
    CloudDriver::new(source, Timeouts::default())
}

fn guess(name: &str, gender: Gender) -> GuessInput {
    GuessInput {
        name: name.to_string(),
        gender,
        suggested_name: None,
        message: "oi".to_string(),
        guess_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
    }
}

#[tokio::test]
async fn created_guess_is_listed_unchanged() {
    let driver = driver_for(&spawn_gateway().await, ANON_KEY);
    let mut input = guess("Ana", Gender::Girl);
    input.suggested_name = Some("Helena".to_string());

    let created = driver.create(&input).await.unwrap();
    let records = driver.list_all().await.unwrap();

    assert!(!created.is_winner);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, created.id);
    assert_eq!(records[0].input(), input);
    assert!(!records[0].is_winner);
}

#[tokio::test]
async fn tenth_sequential_guess_wins() {
    let driver = driver_for(&spawn_gateway().await, ANON_KEY);

    for i in 1..=12 {
        let created = driver
            .create(&guess(&format!("Convidado {i}"), Gender::Boy))
            .await
            .unwrap();
        assert_eq!(created.is_winner, i == 10, "guess #{i}");
    }

    let winner = driver.get_winner().await.unwrap().unwrap();
    assert_eq!(winner.name, "Convidado 10");
    assert!(winner.is_winner);

    let stats = driver.aggregate().await.unwrap();
    assert_eq!(stats.total, 12);
    assert_eq!(stats.winner_name.as_deref(), Some("Convidado 10"));

    let flagged = driver.list_all().await.unwrap().into_iter().filter(|r| r.is_winner).count();
    assert_eq!(flagged, 1);
}

#[tokio::test]
async fn aggregate_matches_the_list() {
    let driver = driver_for(&spawn_gateway().await, ANON_KEY);
    for (name, gender) in [("Ana", Gender::Girl), ("Bia", Gender::Girl), ("Caio", Gender::Boy)] {
        driver.create(&guess(name, gender)).await.unwrap();
    }

    let stats = driver.aggregate().await.unwrap();
    let records = driver.list_all().await.unwrap();

    assert_eq!(stats, GuessStats::tally(&records));
    assert_eq!(stats.total, stats.girl_count + stats.boy_count);
    assert_eq!((stats.girl_count, stats.boy_count), (2, 1));
    let names: Vec<_> = records.into_iter().map(|r| r.name).collect();
    assert_eq!(names, ["Caio", "Bia", "Ana"]);
}

#[tokio::test]
async fn clear_resets_every_figure() {
    let driver = driver_for(&spawn_gateway().await, ANON_KEY);
    for i in 1..=10 {
        driver.create(&guess(&format!("G{i}"), Gender::Girl)).await.unwrap();
    }
    assert!(driver.get_winner().await.unwrap().is_some());

    driver.clear_all().await.unwrap();

    assert!(driver.list_all().await.unwrap().is_empty());
    assert_eq!(driver.aggregate().await.unwrap(), GuessStats::default());
    assert_eq!(driver.get_winner().await.unwrap(), None);

    let created = driver.create(&guess("Depois", Gender::Boy)).await.unwrap();
    assert!(!created.is_winner);
}

#[tokio::test]
async fn rejected_key_fails_reads_and_pings() {
    let url = spawn_gateway().await;
    let driver = driver_for(&url, "another-anon-key");

    assert!(matches!(driver.list_all().await, Err(StorageError::Read(_))));
    assert!(matches!(driver.ping().await, Err(StorageError::Connection(_))));
    assert!(driver_for(&url, ANON_KEY).ping().await.is_ok());
}
