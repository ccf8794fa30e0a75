use crate::service::{QueryRequest, RetrievalService, ServiceError};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ragdex_retriever::storage::{IndexError, VectorIndex};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Routes for the query service.
pub fn router<I: VectorIndex + 'static>(service: Arc<RetrievalService<I>>) -> Router {
    Router::new()
        .route("/query", post(query::<I>))
        .route("/healthz", get(healthz::<I>))
        .with_state(service)
}

async fn query<I: VectorIndex + 'static>(
    State(service): State<Arc<RetrievalService<I>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if let Err(e) = service.authorize(authorization) {
        warn!("Rejected query without valid credentials");
        return e.into_response();
    }

    let request: QueryRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return malformed_body(&e),
    };

    match service.query(request).await {
        Ok(results) => Json(results).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn healthz<I: VectorIndex + 'static>(
    State(service): State<Arc<RetrievalService<I>>>,
) -> Json<Value> {
    let index = service.index().snapshot();
    Json(json!({
        "status": "ok",
        "entries": index.len(),
        "model": index.manifest().model,
    }))
}

/// Syntax errors are 400; well-formed JSON of the wrong shape is 422.
fn malformed_body(err: &serde_json::Error) -> Response {
    let status = if err.is_data() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::BAD_REQUEST
    };
    error_body(status, format!("invalid request body: {err}"))
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            ServiceError::Unauthorized => {
                let mut response = error_body(StatusCode::UNAUTHORIZED, "unauthorized");
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ServiceError::InvalidArgument { message } => {
                error_body(StatusCode::BAD_REQUEST, message)
            }
            ServiceError::InvalidInput { message } => {
                error_body(StatusCode::UNPROCESSABLE_ENTITY, message)
            }
            ServiceError::Provider {
                retriable: true,
                message,
            } => {
                warn!("Embedding provider unavailable: {message}");
                error_body(StatusCode::SERVICE_UNAVAILABLE, "embedding provider unavailable")
            }
            ServiceError::Provider {
                retriable: false,
                message,
            } => {
                error!("Embedding provider failed: {message}");
                error_body(StatusCode::BAD_GATEWAY, "embedding provider failed")
            }
            ServiceError::Index(IndexError::InvalidArgument { message }) => {
                error_body(StatusCode::BAD_REQUEST, message)
            }
            ServiceError::Index(e) => {
                error!("Index query failed: {e}");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "index error")
            }
        }
    }
}

/// Reload the index from `location` on every `SIGHUP`.
///
/// An index built with a different model than the serving provider is
/// refused and the current index kept.
#[cfg(unix)]
pub async fn reload_on_hangup<I: VectorIndex + 'static>(
    service: Arc<RetrievalService<I>>,
    location: PathBuf,
) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = signal(SignalKind::hangup())?;
    while hangups.recv().await.is_some() {
        info!("SIGHUP received, reloading {}", location.display());
        let shared = Arc::clone(service.index());
        let expected = service.provider().model_name().to_string();
        let location = location.clone();
        match tokio::task::spawn_blocking(move || shared.reload(&location, &expected)).await {
            Ok(Ok(index)) => info!("Swapped in reloaded index with {} entries", index.len()),
            Ok(Err(e)) => warn!("Reload failed, keeping current index: {e}"),
            Err(e) => warn!("Reload task failed, keeping current index: {e}"),
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn reload_on_hangup<I: VectorIndex + 'static>(
    _service: Arc<RetrievalService<I>>,
    _location: PathBuf,
) -> std::io::Result<()> {
    std::future::pending::<std::io::Result<()>>().await
}
