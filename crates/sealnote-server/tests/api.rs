use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tower::ServiceExt;

use sealnote_server::crypto::{self, Algorithm};
use sealnote_server::service::NoteService;
use sealnote_server::store::{ManualClock, MemoryStore, SecretStore};
use sealnote_server::{router, AppState};

fn make_app() -> (Router, ManualClock) {
    let (app, clock, _store) = make_app_with_store();
    (app, clock)
}

fn make_app_with_store() -> (Router, ManualClock, MemoryStore) {
    let clock = ManualClock::starting_at(1_700_000_000);
    let store = MemoryStore::with_clock(100, Arc::new(clock.clone()));
    let state = AppState {
        notes: NoteService::new(Arc::new(store.clone())),
    };
    let app = router(state, None).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))));
    (app, clock, store)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_note(body: String) -> Request<Body> {
    Request::post("/api/notes")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn fetch_note(id: &str) -> Request<Body> {
    Request::get(format!("/api/notes/{id}"))
        .header("user-agent", "integration/1.0")
        .header("x-forwarded-for", "198.51.100.4")
        .body(Body::empty())
        .unwrap()
}

async fn create(app: &Router, content: &str, hours: u64) -> String {
    let body = json!({
        "content": content,
        "expiresIn": hours,
        "isPasswordProtected": false,
        "algorithm": "AES-256",
    });
    let (status, json) = send(app, post_note(body.to_string())).await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _clock) = make_app();
    let req = Request::get("/health").body(Body::empty()).unwrap();
    let (status, json) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn create_retrieve_decrypt_then_not_found() {
    let (app, _clock) = make_app();
    let sealed = crypto::encrypt("hello", Algorithm::Aes256, None).unwrap();
    let id = create(&app, &sealed.ciphertext, 24).await;
    assert_eq!(id.len(), 32);

    let (status, json) = send(&app, fetch_note(&id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["algorithm"], "AES-256");
    assert_eq!(json["isPasswordProtected"], false);
    assert_eq!(json["accessLog"][0]["ipAddress"], "198.51.100.4");
    assert_eq!(json["accessLog"][0]["userAgent"], "integration/1.0");
    assert_eq!(json["accessLog"][0]["timestamp"], 1_700_000_000);

    let content = json["content"].as_str().unwrap();
    let plain = crypto::decrypt(content, sealed.key.as_str(), Algorithm::Aes256, None).unwrap();
    assert_eq!(plain, "hello");

    let (status, json) = send(&app, fetch_note(&id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());
    assert!(json.get("content").is_none());
}

#[tokio::test]
async fn expired_note_is_gone() {
    let (app, clock) = make_app();
    let id = create(&app, "blob", 24).await;
    clock.advance(Duration::from_secs(25 * 3600));

    let (status, json) = send(&app, fetch_note(&id)).await;
    assert_eq!(status, StatusCode::GONE);
    assert!(json.get("content").is_none());

    let (status, _) = send(&app, fetch_note(&id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expired_note_is_gone_after_sweep() {
    let (app, clock, store) = make_app_with_store();
    let id = create(&app, "blob", 24).await;
    clock.advance(Duration::from_secs(25 * 3600));
    assert_eq!(store.sweep().unwrap(), 1);

    let (status, _) = send(&app, fetch_note(&id)).await;
    assert_eq!(status, StatusCode::GONE);

    let (status, _) = send(&app, fetch_note(&id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_fetches_succeed_once() {
    let (app, _clock) = make_app();
    let id = create(&app, "blob", 72).await;

    let mut set = JoinSet::new();
    for _ in 0..24 {
        let app = app.clone();
        let id = id.clone();
        set.spawn(async move { send(&app, fetch_note(&id)).await.0 });
    }

    let mut ok = 0;
    let mut not_found = 0;
    while let Some(status) = set.join_next().await {
        match status.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::NOT_FOUND => not_found += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(not_found, 23);
}

#[tokio::test]
async fn invalid_create_payloads_are_bad_requests() {
    let (app, _clock) = make_app();

    let cases = [
        json!({"expiresIn": 24, "algorithm": "AES-256"}).to_string(),
        json!({"content": "blob", "expiresIn": 24, "algorithm": "ROT13"}).to_string(),
        json!({"content": "blob", "expiresIn": 12, "algorithm": "AES-256"}).to_string(),
        json!({"content": "blob", "expiresIn": "soon"}).to_string(),
        "{not json".to_string(),
    ];
    for body in cases {
        let (status, json) = send(&app, post_note(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
        assert!(json["error"].is_string());
    }
}

#[tokio::test]
async fn unknown_and_malformed_ids_are_not_found() {
    let (app, _clock) = make_app();
    let (status, _) = send(&app, fetch_note(&"0".repeat(32))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, fetch_note("nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn recipient_email_is_not_echoed() {
    let (app, _clock) = make_app();
    let body = json!({
        "content": "blob",
        "expiresIn": 72,
        "isPasswordProtected": true,
        "algorithm": "RSA-2048",
        "recipientEmail": "someone@example.com",
    });
    let (status, json) = send(&app, post_note(body.to_string())).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = json["id"].as_str().unwrap().to_owned();

    let (status, json) = send(&app, fetch_note(&id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["algorithm"], "RSA-2048");
    assert_eq!(json["isPasswordProtected"], true);
    assert!(!json.to_string().contains("someone@example.com"));
}

#[tokio::test]
async fn full_store_is_unavailable() {
    let store = MemoryStore::new(1);
    let state = AppState {
        notes: NoteService::new(Arc::new(store)),
    };
    let app = router(state, None);

    let _ = create(&app, "first", 24).await;
    let body = json!({"content": "second", "expiresIn": 24}).to_string();
    let (status, _) = send(&app, post_note(body)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
