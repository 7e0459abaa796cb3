/// HTTP surface: `GET /` shows the persisted state, `GET /run` runs a check
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use log::{error, info};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::error::CheckError;
use crate::runner::Checker;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    checker: Checker,
    // Runs must not overlap
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(checker: Checker) -> Self {
        Self {
            checker,
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}

type ApiResponse = (StatusCode, Json<Value>);

fn error_response(status: StatusCode, message: String) -> ApiResponse {
    (status, Json(json!({ "error": message })))
}

fn ok_response<T: Serialize>(body: &T) -> ApiResponse {
    match serde_json::to_value(body) {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn current_state(State(state): State<AppState>) -> ApiResponse {
    match state.checker.snapshot().await {
        Ok(snapshot) => ok_response(&snapshot),
        Err(e) => {
            error!("Failed to read state: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn run_check(State(state): State<AppState>) -> ApiResponse {
    let _guard = state.run_lock.lock().await;

    match state.checker.run().await {
        Ok(report) => ok_response(&report),
        Err(e @ CheckError::FleetResultUnavailable) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e) => {
            error!("Run failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(current_state))
        .route("/run", get(run_check))
        .with_state(state)
}

pub async fn serve(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Program terminated by user. Exiting gracefully.");
            }
        })
        .await
}
