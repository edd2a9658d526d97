//! `RestStore` against an in-process server speaking the Upstash REST protocol.

use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use devtrack_core::models::CacheStatus;
use devtrack_server::cache::{pattern, CacheClient, CacheError, CacheStore, MemoryStore, RestStore};
use serde_json::{json, Value};

const TOKEN: &str = "test-token";

#[derive(Clone, Default)]
struct Upstash {
    data: Arc<MemoryStore>,
    /// Number of keys in each DEL command received
    del_sizes: Arc<Mutex<Vec<usize>>>,
}

impl Upstash {
    fn del_sizes(&self) -> Vec<usize> {
        self.del_sizes.lock().unwrap().clone()
    }
}

fn reply(result: Value) -> Response {
    Json(json!({ "result": result })).into_response()
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn command(State(stub): State<Upstash>, headers: HeaderMap, Json(args): Json<Vec<String>>) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {}", TOKEN).as_str());
    if !authorized {
        return error(StatusCode::UNAUTHORIZED, "WRONGPASS invalid token");
    }

    let Some((name, rest)) = args.split_first() else {
        return error(StatusCode::BAD_REQUEST, "ERR empty command");
    };
    match (name.to_ascii_uppercase().as_str(), rest) {
        ("GET", [key]) => reply(stub.data.get(key).await.unwrap().map_or(Value::Null, Value::from)),
        ("SET", [key, value, ex, ttl]) if ex.eq_ignore_ascii_case("EX") => {
            let ttl: u64 = ttl.parse().unwrap();
            stub.data.set_with_ttl(key, value, ttl).await.unwrap();
            reply(json!("OK"))
        }
        ("DEL", keys) if !keys.is_empty() => {
            stub.del_sizes.lock().unwrap().push(keys.len());
            let mut removed = 0;
            for key in keys {
                removed += stub.data.delete(key).await.unwrap();
            }
            reply(json!(removed))
        }
        ("KEYS", [glob]) => {
            let keys: Vec<String> = stub
                .data
                .keys()
                .into_iter()
                .filter(|k| pattern::matches(glob, k))
                .collect();
            reply(json!(keys))
        }
        _ => error(StatusCode::BAD_REQUEST, "ERR unknown command"),
    }
}

async fn spawn_upstash() -> (Upstash, String) {
    let stub = Upstash::default();
    let app = Router::new().route("/", post(command)).with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (stub, format!("http://{}", addr))
}

#[tokio::test]
async fn pattern_delete_sends_bounded_del_batches() {
    let (stub, url) = spawn_upstash().await;
    let store = RestStore::new(&url, TOKEN).unwrap();

    for i in 0..250 {
        store
            .set_with_ttl(&format!("skills:t{}:user42", i), "[]", 300)
            .await
            .unwrap();
    }
    for i in 0..10 {
        store
            .set_with_ttl(&format!("skills:t{}:user421", i), "[]", 300)
            .await
            .unwrap();
    }

    let removed = store.delete_pattern("skills:*:user42").await.unwrap();
    assert_eq!(removed, 250);
    assert_eq!(stub.del_sizes(), vec![100, 100, 50]);

    let left = stub.data.keys();
    assert_eq!(left.len(), 10);
    assert!(left.iter().all(|k| k.ends_with(":user421")));
}

#[tokio::test]
async fn pattern_delete_with_no_matches_sends_no_del() {
    let (stub, url) = spawn_upstash().await;
    let store = RestStore::new(&url, TOKEN).unwrap();
    store.set_with_ttl("projects:user1", "[]", 300).await.unwrap();

    assert_eq!(store.delete_pattern("skills:*").await.unwrap(), 0);
    assert!(stub.del_sizes().is_empty());
}

#[tokio::test]
async fn get_set_delete_round_trip() {
    let (_stub, url) = spawn_upstash().await;
    let store = RestStore::new(&url, TOKEN).unwrap();

    assert_eq!(store.get("dashboard:user1").await.unwrap(), None);
    store.set_with_ttl("dashboard:user1", r#"{"a":1}"#, 300).await.unwrap();
    assert_eq!(
        store.get("dashboard:user1").await.unwrap().as_deref(),
        Some(r#"{"a":1}"#)
    );
    assert_eq!(store.delete("dashboard:user1").await.unwrap(), 1);
    assert_eq!(store.delete("dashboard:user1").await.unwrap(), 0);
}

#[tokio::test]
async fn wrong_token_surfaces_backend_error() {
    let (_stub, url) = spawn_upstash().await;
    let store = RestStore::new(&url, "nope").unwrap();
    match store.get("k").await {
        Err(CacheError::Backend(message)) => assert!(message.contains("WRONGPASS")),
        other => panic!("unexpected reply {:?}", other),
    }
}

#[tokio::test]
async fn cache_client_reports_rest_backend_healthy() {
    let (stub, url) = spawn_upstash().await;
    let client = CacheClient::with_store(Arc::new(RestStore::new(&url, TOKEN).unwrap()));

    let health = client.health().await;
    assert_eq!(health.status, CacheStatus::Connected);
    assert_eq!(health.backend.as_deref(), Some("rest"));
    assert!(stub.data.keys().is_empty());
}
