//! HTTP list API over the Keep lists.
//!
//! Reads are served from an in-memory [`ListSnapshot`]. Every mutation is
//! staged on the [`NoteSource`], pushed with a refresh, and followed by a
//! snapshot rebuild. A background task refreshes the snapshot periodically.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use listsync_core::contract::{ContractError, NoteSource};
use listsync_core::snapshot::{clear_lists, find_item, find_list, load_snapshot, ListSnapshot};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

/// Period of the background snapshot refresh.
pub const REFRESH_PERIOD: Duration = Duration::from_secs(3 * 60);

pub struct AppState {
    pub source: Arc<dyn NoteSource>,
    pub snapshot: RwLock<ListSnapshot>,
    /// Lists emptied by `POST /clear`.
    pub sync_list_names: Vec<String>,
}

impl AppState {
    pub fn new(
        source: Arc<dyn NoteSource>,
        snapshot: ListSnapshot,
        sync_list_names: Vec<String>,
    ) -> Self {
        Self {
            source,
            snapshot: RwLock::new(snapshot),
            sync_list_names,
        }
    }

    /// Push staged changes, re-read the source and replace the snapshot.
    pub async fn rebuild(&self) -> Result<(), ContractError> {
        let snapshot = load_snapshot(self.source.as_ref()).await?;
        *self.snapshot.write().await = snapshot;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError::new(message)))
}

/// Log a service failure and turn it into a 500 with a fixed public message.
fn internal(context: &'static str, message: &'static str) -> impl FnOnce(ContractError) -> (StatusCode, Json<ApiError>) {
    move |e| {
        error!(error = %e, "{context}");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/lists", get(get_lists))
        .route("/list/{name}", get(get_list))
        .route("/clear", post(clear))
        .route("/list/{name}/item", post(add_item))
        .route("/list/{name}/item/{text}/check", put(check_item))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// `GET /lists`
async fn get_lists(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.snapshot.read().await.clone())
}

/// `GET /list/{name}`: exact title match against the snapshot.
async fn get_list(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let snapshot = state.snapshot.read().await;
    match snapshot.get(&name) {
        Some(items) => Ok(Json(json!({ name: items }))),
        None => Err(api_error(StatusCode::NOT_FOUND, "List not found")),
    }
}

/// `POST /clear`
async fn clear(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    if state.sync_list_names.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "No lists defined in SYNC_LIST_NAMES environment variable",
        ));
    }
    let on_error = || internal("Error clearing Google Keep lists", "Failed to clear lists");

    clear_lists(state.source.as_ref(), &state.sync_list_names)
        .await
        .map_err(on_error())?;
    state.rebuild().await.map_err(on_error())?;

    info!(lists = ?state.sync_list_names, "Cleared all items in SYNC_LIST_NAMES from Google Keep");
    Ok(Json(json!({
        "message": format!("Cleared all items in lists: {}", state.sync_list_names.join(", "))
    })))
}

/// `POST /list/{name}/item` with body `{"text": "..."}`
async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let Some(text) = body.get("text").and_then(Value::as_str) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Missing 'text' field in request body",
        ));
    };
    let text = text.trim();
    if text.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Item text cannot be empty"));
    }
    let on_error = || internal("Error adding item to list", "Failed to add item");

    let lists = state.source.lists().await.map_err(on_error())?;
    let Some(list) = find_list(&lists, &name) else {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("List '{name}' not found"),
        ));
    };
    state
        .source
        .add_item(&list.id, text)
        .await
        .map_err(on_error())?;
    state.rebuild().await.map_err(on_error())?;

    info!(list = %name, item = %text, "Added item to list");
    Ok(Json(json!({
        "message": format!("Added item '{text}' to list '{name}'")
    })))
}

/// `PUT /list/{name}/item/{text}/check`
async fn check_item(
    State(state): State<Arc<AppState>>,
    Path((name, text)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let on_error = || internal("Error checking item in list", "Failed to check item");

    let lists = state.source.lists().await.map_err(on_error())?;
    let Some(list) = find_list(&lists, &name) else {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("List '{name}' not found"),
        ));
    };
    let Some(item) = find_item(list, &text) else {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Item '{text}' not found in list '{name}'"),
        ));
    };
    state
        .source
        .check_item(&item.id)
        .await
        .map_err(on_error())?;
    state.rebuild().await.map_err(on_error())?;

    info!(list = %name, item = %text, "Marked item as checked");
    Ok(Json(json!({
        "message": format!("Marked item '{text}' as checked in list '{name}'")
    })))
}

/// Rebuild the snapshot, keeping the previous one if the source fails.
pub async fn refresh_snapshot(state: &AppState) -> bool {
    match state.rebuild().await {
        Ok(()) => {
            let lists = state.snapshot.read().await.len();
            info!(lists, "Refreshed lists from Google Keep");
            true
        }
        Err(e) => {
            error!(error = %e, "Error refreshing Google Keep lists");
            false
        }
    }
}

/// Refresh the snapshot every `period`, starting one period from now. Runs until dropped.
pub async fn refresh_periodically(state: Arc<AppState>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(period_secs = period.as_secs(), "Scheduled list refresh");
    loop {
        ticker.tick().await;
        refresh_snapshot(&state).await;
    }
}
