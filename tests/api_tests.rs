use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use parlor::clients::{ChatTurn, GenerationClient, GenerationError};
use parlor::config::Config;
use std::sync::Arc;
use tower::ServiceExt;

/// Demo API key seeded by migration (must match m20260815_initial.rs)
const DEMO_API_KEY: &str = "parlor_demo_api_key_please_regenerate";

struct CannedReply;

#[async_trait::async_trait]
impl GenerationClient for CannedReply {
    async fn generate(&self, _history: &[ChatTurn]) -> Result<String, GenerationError> {
        Ok("canned reply".to_string())
    }
}

async fn spawn_app() -> Router {
    spawn_app_with(|_| {}).await
}

async fn spawn_app_with(tweak: impl FnOnce(&mut Config)) -> Router {
    let db_path = std::env::temp_dir().join(format!("parlor-api-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    tweak(&mut config);

    let state = parlor::api::create_app_state_with_client(config, Arc::new(CannedReply), None)
        .await
        .expect("Failed to create app state");
    parlor::api::router(state)
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("X-Api-Key", key);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, api_key: Option<&str>, body: &serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("X-Api-Key", key);
    }
    builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_auth_endpoints() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(get("/api/chatrooms", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get("/api/chatrooms", Some("wrong-key")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get("/api/chatrooms", Some(DEMO_API_KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Health endpoint is public.
    let response = app.clone().oneshot(get("/api/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_mobile_login_flow() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/request-code",
            None,
            &serde_json::json!({ "mobile_number": "+15551230001" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let code = body["data"]["code"]
        .as_str()
        .expect("default config exposes codes")
        .to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/verify-code",
            None,
            &serde_json::json!({
                "mobile_number": "+15551230001",
                "code": code,
                "name": "Flow Test",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["is_new_user"], true);
    let api_key = body["data"]["api_key"].as_str().unwrap().to_string();

    // The freshly minted key works for protected routes.
    let response = app
        .clone()
        .oneshot(get("/api/auth/me", Some(&api_key)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["mobile_number"], "+15551230001");
    assert_eq!(body["data"]["subscription_tier"], "basic");

    // The same code cannot be replayed.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/verify-code",
            None,
            &serde_json::json!({
                "mobile_number": "+15551230001",
                "code": "999999",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_chatroom_crud() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/chatrooms",
            Some(DEMO_API_KEY),
            &serde_json::json!({ "title": "My Room", "description": "first" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    let room_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["title"], "My Room");
    assert_eq!(body["data"]["message_count"], 0);

    let response = app
        .clone()
        .oneshot(get("/api/chatrooms", Some(DEMO_API_KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(get(
            &format!("/api/chatrooms/{room_id}"),
            Some(DEMO_API_KEY),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 0);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/chatrooms/{room_id}"))
                .header("X-Api-Key", DEMO_API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get(
            &format!("/api/chatrooms/{room_id}"),
            Some(DEMO_API_KEY),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blank_title_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/chatrooms",
            Some(DEMO_API_KEY),
            &serde_json::json!({ "title": "   " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_send_message_produces_a_reply() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/chatrooms",
            Some(DEMO_API_KEY),
            &serde_json::json!({ "title": "Replies" }),
        ))
        .await
        .unwrap();
    let room_id = json_body(response).await["data"]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/chatrooms/{room_id}/messages"),
            Some(DEMO_API_KEY),
            &serde_json::json!({ "content": "hello there" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], "queued");
    assert!(!body["data"]["task_id"].as_str().unwrap().is_empty());

    // The reply is generated asynchronously; poll the detail view.
    let mut messages = serde_json::Value::Null;
    for _ in 0..50 {
        let response = app
            .clone()
            .oneshot(get(
                &format!("/api/chatrooms/{room_id}"),
                Some(DEMO_API_KEY),
            ))
            .await
            .unwrap();
        let body = json_body(response).await;
        messages = body["data"]["messages"].clone();
        if messages.as_array().unwrap().len() == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 2, "expected an assistant reply to appear");
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "hello there");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "canned reply");
    assert!(messages[1]["task_id"].is_string());
}

#[tokio::test]
async fn test_quota_exhaustion_returns_429() {
    let app = spawn_app_with(|config| {
        config.quota.basic_daily_limit = 2;
    })
    .await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/chatrooms",
            Some(DEMO_API_KEY),
            &serde_json::json!({ "title": "Quota" }),
        ))
        .await
        .unwrap();
    let room_id = json_body(response).await["data"]["id"].as_i64().unwrap();

    for content in ["one", "two"] {
        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/api/chatrooms/{room_id}/messages"),
                Some(DEMO_API_KEY),
                &serde_json::json!({ "content": content }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/chatrooms/{room_id}/messages"),
            Some(DEMO_API_KEY),
            &serde_json::json!({ "content": "three" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let body = json_body(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_chatrooms_are_isolated_between_users() {
    let app = spawn_app().await;

    // Second account via the login flow.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/request-code",
            None,
            &serde_json::json!({ "mobile_number": "+15551230002" }),
        ))
        .await
        .unwrap();
    let code = json_body(response).await["data"]["code"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/verify-code",
            None,
            &serde_json::json!({ "mobile_number": "+15551230002", "code": code }),
        ))
        .await
        .unwrap();
    let other_key = json_body(response).await["data"]["api_key"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/chatrooms",
            Some(DEMO_API_KEY),
            &serde_json::json!({ "title": "Private" }),
        ))
        .await
        .unwrap();
    let room_id = json_body(response).await["data"]["id"].as_i64().unwrap();

    // The other user sees an empty list and cannot touch the room.
    let response = app
        .clone()
        .oneshot(get("/api/chatrooms", Some(&other_key)))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/chatrooms/{room_id}"), Some(&other_key)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/chatrooms/{room_id}/messages"),
            Some(&other_key),
            &serde_json::json!({ "content": "let me in" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_system_status_and_logs() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(get("/api/system/status", Some(DEMO_API_KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["database_ok"], true);
    assert!(body["data"]["version"].is_string());

    let response = app
        .clone()
        .oneshot(get("/api/system/logs?limit=10", Some(DEMO_API_KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_key_regeneration_revokes_the_old_key() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/api-key/regenerate",
            Some(DEMO_API_KEY),
            &serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let new_key = json_body(response).await["data"]["api_key"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(new_key, DEMO_API_KEY);

    let response = app
        .clone()
        .oneshot(get("/api/chatrooms", Some(DEMO_API_KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get("/api/chatrooms", Some(&new_key)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
