//! HTTP surface: ingestion, windowed averages, health and settings.

pub mod error;
pub mod temperature;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::routing::{MethodRouter, get, post};
use log::error;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

use crate::api::error::{ApiError, handle_panic};
use crate::config::Config;
use crate::db::store::ReadingStore;
use crate::models::reading::{HealthResponse, SettingsResponse};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ReadingStore>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<dyn ReadingStore>) -> Self {
        Self { config, store }
    }
}

pub fn router(state: AppState) -> Router {
    let ingest = || with_405(post(temperature::add_temperature));

    Router::new()
        .route("/health", with_405(get(health_check)))
        .route("/settings", with_405(get(get_settings)))
        .route("/v1/temperature", ingest())
        .route("/v1/temperature/", ingest())
        .route("/v1/temperature/average", with_405(get(temperature::fetch_average_temperature)))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

fn with_405(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(method_not_allowed)
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Service is healthy".to_string(),
    })
}

pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    Json(SettingsResponse {
        app_name: state.config.app_name.clone(),
        debug: state.config.debug,
    })
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    error!("HTTP Exception: Not Found - Path: {} {}", method, uri);
    ApiError::http(StatusCode::NOT_FOUND, "Not Found")
}

async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    error!("HTTP Exception: Method Not Allowed - Path: {} {}", method, uri);
    ApiError::http(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}
