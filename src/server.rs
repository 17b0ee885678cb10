//! HTTP entry point.
//!
//! Endpoints:
//! - `POST /`: heartbeat, answers `Hit the broker`
//! - `POST /handle`: decode an action-tagged request and dispatch it
//! - `POST /log-grpc`: write the request's log payload over gRPC
//! - `GET /ping`: liveness
//!
//! Successful dispatches answer `202 Accepted`; failures answer with the
//! status of their [`BrokerError`] and a failure envelope.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{HeaderName, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::envelope::JsonResponse;
use crate::error::{BrokerError, Result};
use crate::payload::{LogTransport, RequestPayload};

/// Shared state for axum handlers.
type AppState = Arc<Dispatcher>;

/// Start the entry point on the configured address.
///
/// When the port is 0, the OS assigns an ephemeral port. The actual bound
/// address is always logged.
pub async fn serve(
    dispatcher: Arc<Dispatcher>,
    config: &ServerConfig,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(dispatcher, config.body_limit_bytes);
    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    info!(addr = %listener.local_addr()?, "broker listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(dispatcher: Arc<Dispatcher>, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .expose_headers([LINK])
        .max_age(Duration::from_secs(300));

    Router::new()
        .route("/", post(broker))
        .route("/handle", post(handle_submission))
        .route("/log-grpc", post(log_via_grpc))
        .route("/ping", get(ping))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

// ============================================================================
// Handlers
// ============================================================================

async fn ping() -> StatusCode {
    StatusCode::OK
}

async fn broker() -> (StatusCode, Json<JsonResponse>) {
    (StatusCode::OK, Json(JsonResponse::success("Hit the broker")))
}

async fn handle_submission(State(dispatcher): State<AppState>, body: Bytes) -> Response {
    let outcome = match RequestPayload::decode(&body) {
        Ok(payload) => dispatcher.handle(payload).await,
        Err(e) => Err(e),
    };
    accepted(outcome)
}

async fn log_via_grpc(State(dispatcher): State<AppState>, body: Bytes) -> Response {
    let outcome = async {
        let entry = RequestPayload::decode(&body)?
            .log
            .ok_or(BrokerError::MissingPayload("log"))?;
        dispatcher.log_via(LogTransport::Grpc, &entry).await
    }
    .await;
    accepted(outcome)
}

fn accepted(outcome: Result<JsonResponse>) -> Response {
    match outcome {
        Ok(envelope) => (StatusCode::ACCEPTED, Json(envelope)).into_response(),
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(error = %self, status = %status, "Request failed");
        } else {
            info!(error = %self, status = %status, "Request rejected");
        }
        (status, Json(self.to_envelope())).into_response()
    }
}
