use axum::{
    Json, Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::ChatroomCache;
use crate::clients::{GenerationClient, HttpGenerationClient};
use crate::config::Config;
use crate::db::Store;
use crate::domain::events::NotificationEvent;
use crate::queue::{TaskQueue, spawn_workers};
use crate::services::{
    AuthService, ChatService, ContextAssembler, GenerationPipeline, LogService, QuotaTracker,
    SeaOrmAuthService, SeaOrmChatService,
};

pub mod auth;
mod chatrooms;
mod error;
pub mod events;
mod observability;
mod system;
mod types;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

pub struct AppState {
    pub config: Config,

    pub store: Store,

    pub event_bus: tokio::sync::broadcast::Sender<NotificationEvent>,

    pub chat_service: Arc<dyn ChatService>,

    pub auth_service: Arc<dyn AuthService>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let client = Arc::new(HttpGenerationClient::new(
        &config.generation.endpoint,
        &config.generation.api_key,
        &config.generation.model,
        Duration::from_secs(config.generation.timeout_seconds),
    )?);

    create_app_state_with_client(config, client, prometheus_handle).await
}

/// Same as [`create_app_state_from_config`] but with an injected generation
/// client, so tests can script the upstream.
pub async fn create_app_state_with_client(
    config: Config,
    client: Arc<dyn GenerationClient>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let (event_bus, _) = tokio::sync::broadcast::channel(config.general.event_bus_buffer_size);

    let cache = ChatroomCache::new(Duration::from_secs(config.cache.chatroom_ttl_seconds));

    let (queue, queue_rx) = TaskQueue::new(config.generation.queue_capacity);

    let pipeline = Arc::new(GenerationPipeline::new(
        store.clone(),
        client,
        ContextAssembler::new(store.clone(), config.generation.max_context_messages),
        cache.clone(),
        config.generation.fallback_reply.clone(),
        event_bus.clone(),
    ));
    spawn_workers(config.generation.workers, queue_rx, pipeline);

    let quota = QuotaTracker::new(store.clone(), &config.quota);

    let chat_service = Arc::new(SeaOrmChatService::new(
        store.clone(),
        cache,
        quota,
        queue,
        event_bus.clone(),
    ));

    let auth_service = Arc::new(SeaOrmAuthService::new(store.clone(), &config.auth));

    Arc::new(LogService::new(store.clone(), event_bus.clone())).start_listener();

    Ok(Arc::new(AppState {
        config,
        store,
        event_bus,
        chat_service,
        auth_service,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config.server.cors_allowed_origins.clone();

    let protected_routes = create_protected_router(state.clone());

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/auth/request-code", post(auth::request_code))
        .route("/auth/verify-code", post(auth::verify_code))
        .route("/health", get(health))
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/me", get(auth::get_current_user))
        .route("/auth/api-key/regenerate", post(auth::regenerate_api_key))
        .route("/chatrooms", get(chatrooms::list_chatrooms))
        .route("/chatrooms", post(chatrooms::create_chatroom))
        .route("/chatrooms/{id}", get(chatrooms::get_chatroom))
        .route("/chatrooms/{id}", delete(chatrooms::remove_chatroom))
        .route("/chatrooms/{id}/messages", post(chatrooms::send_message))
        .route("/system/status", get(system::get_status))
        .route("/system/logs", get(system::get_logs))
        .route("/metrics", get(observability::get_metrics))
        .merge(events::router())
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

async fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("ok"))
}
