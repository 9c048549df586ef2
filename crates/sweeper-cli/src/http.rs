//! HTTP trigger surface: `/monitor` runs one pass per request.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sweeper_core::{SweepError, Sweeper};
use tokio::net::TcpListener;
use tracing::info;

/// Body returned when a pass fails.
///
/// `{"error":{"kind":"claim_failure","message":"claim failed: ..."}}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: &'static str,
    pub message: String,
}

impl From<&SweepError> for ErrorBody {
    fn from(err: &SweepError) -> Self {
        Self {
            error: ErrorDetail {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }
}

fn status_for(err: &SweepError) -> StatusCode {
    match err {
        SweepError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SweepError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        SweepError::ScanFailure(_) | SweepError::ClaimFailure(_) => StatusCode::BAD_GATEWAY,
    }
}

pub fn router(sweeper: Arc<Sweeper>) -> Router {
    Router::new()
        .route("/monitor", get(monitor).post(monitor))
        .with_state(sweeper)
}

/// Request bodies are ignored.
async fn monitor(State(sweeper): State<Arc<Sweeper>>) -> Response {
    match sweeper.run_pass().await {
        Ok(result) => Json(result).into_response(),
        Err(err) => (status_for(&err), Json(ErrorBody::from(&err))).into_response(),
    }
}

pub async fn serve(sweeper: Arc<Sweeper>, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening for /monitor triggers");
    axum::serve(listener, router(sweeper))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
