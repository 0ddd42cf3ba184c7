mod common;

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use mm_domain::config::{Config, SchedulingConfig};
use mm_gateway::api;
use mm_gateway::state::AppState;
use mm_providers::ProviderRegistry;

use common::{group_message, harness, private_message, text_reply, Harness};

fn app_state(h: &Harness, config: Config) -> AppState {
    AppState {
        config: Arc::new(config),
        config_path: PathBuf::from("config.toml"),
        store: h.store.clone(),
        llm: Arc::new(ProviderRegistry::from_providers(Vec::new(), Default::default())),
        sessions: h.sessions.clone(),
        engine: h.engine.clone(),
        platform: h.platform.clone(),
        telegram: None,
        shutdown_tx: Arc::new(tokio::sync::Notify::new()),
    }
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_inbound(body: &impl serde::Serialize) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/inbound")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness(vec![], SchedulingConfig::default());
    let app = api::router().with_state(app_state(&h, Config::default()));

    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["telegram"], false);
}

#[tokio::test]
async fn inbound_runs_the_engine_and_sessions_list_it() {
    let h = harness(vec![Ok(text_reply("pong"))], SchedulingConfig::default());
    let state = app_state(&h, Config::default());

    let resp = api::router()
        .with_state(state.clone())
        .oneshot(post_inbound(&private_message(30, "ping")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "replied");
    assert_eq!(h.platform.texts(), vec!["pong".to_string()]);

    let resp = api::router()
        .with_state(state.clone())
        .oneshot(post_inbound(&group_message(31, 2, "just chatting")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "batched");
    assert_eq!(body["count"], 1);

    let resp = api::router()
        .with_state(state)
        .oneshot(Request::get("/v1/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["sessions"][0]["chat_id"], 30);
    assert_eq!(body["sessions"][1]["pending_batch"], 1);
}

#[tokio::test]
async fn inbound_rejects_empty_text_and_blocked_chats() {
    let h = harness(vec![], SchedulingConfig::default());
    let mut config = Config::default();
    config.telegram.allowed_chats = vec![1];
    let state = app_state(&h, config);

    let resp = api::router()
        .with_state(state.clone())
        .oneshot(post_inbound(&private_message(1, "   ")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = api::router()
        .with_state(state)
        .oneshot(post_inbound(&private_message(2, "let me in")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(h.provider.calls(), 0);
}
