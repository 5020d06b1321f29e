use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use chrono::Utc;
use prefsync_core::util::token_fingerprint;
use prefsync_core::{SessionStore, SyncError, SyncService};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    sync: SyncService,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            sync: SyncService::new(store, config.sync_options()),
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/sync/update", update_route())
        .route("/v1/sync/update", update_route())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

fn update_route() -> MethodRouter<AppState> {
    post(update_preferences).fallback(method_not_allowed)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    store: &'static str,
    session_ttl_secs: u64,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        store: state.sync.backend(),
        session_ttl_secs: state.config.session_ttl.as_secs(),
    })
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// Raw body of an update; every field is checked by hand so bad input is a 400.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    sync_token: Option<Value>,
    device_token: Option<Value>,
    preferences: Option<Value>,
}

#[derive(Debug)]
struct ValidUpdate {
    sync_token: String,
    device_token: String,
    preferences: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    success: bool,
    last_updated: i64,
    preference_count: usize,
}

async fn update_preferences(
    State(state): State<AppState>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<UpdateResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected sync update body");
        AppError::bad_request("Invalid JSON body")
    })?;
    let update = validate(request)?;

    let session = token_fingerprint(&update.sync_token);
    let device = token_fingerprint(&update.device_token);
    let outcome = state
        .sync
        .update_preferences(&update.sync_token, &update.preferences)
        .await
        .map_err(|error| {
            match &error {
                SyncError::SessionNotFound => {
                    tracing::info!(session, device, "Sync session not found or expired");
                }
                SyncError::Conflict { attempts } => {
                    tracing::warn!(session, device, attempts, "Sync update lost every write race");
                }
                SyncError::Store(_) => {}
            }
            AppError::from(error)
        })?;

    tracing::info!(
        endpoint = "sync_update",
        session,
        device,
        preference_count = outcome.preference_count,
        last_updated = outcome.last_updated,
        "Merged device preferences"
    );
    Ok(Json(UpdateResponse {
        success: true,
        last_updated: outcome.last_updated,
        preference_count: outcome.preference_count,
    }))
}

fn validate(request: UpdateRequest) -> Result<ValidUpdate, AppError> {
    let sync_token = present_text(request.sync_token);
    let device_token = present_text(request.device_token);
    let preferences = request.preferences.filter(Value::is_object);

    match (sync_token, device_token, preferences) {
        (Some(sync_token), Some(device_token), Some(preferences)) => Ok(ValidUpdate {
            sync_token,
            device_token,
            preferences,
        }),
        _ => {
            tracing::debug!("Rejected sync update with missing fields");
            Err(AppError::bad_request("Missing required fields"))
        }
    }
}

fn present_text(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text),
        _ => None,
    }
}
