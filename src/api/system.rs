use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::api::types::{LogDto, SystemStatus};

/// GET /system/status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SystemStatus>>, ApiError> {
    let database_ok = state.store.ping().await.is_ok();

    Ok(Json(ApiResponse::success(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        database_ok,
        scheduler_enabled: state.config.scheduler.enabled,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<u64>,
}

/// GET /system/logs
/// Most recent system log rows, newest first.
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<ApiResponse<Vec<LogDto>>>, ApiError> {
    let limit = query.limit.unwrap_or(100).min(1000);

    let logs = state
        .store
        .recent_system_logs(limit)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .into_iter()
        .map(|log| LogDto {
            id: log.id,
            event_type: log.event_type,
            level: log.level,
            message: log.message,
            details: log.details,
            created_at: log.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::success(logs)))
}
