//! HTTP routes serving a catalog to `HttpGateway` clients.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::remote::{FileGateway, RemoteError, RemoteGateway};

/// Application state shared across handlers
#[derive(Clone)]
pub struct ServerState {
    source: Arc<dyn RemoteGateway>,
    api_key: Option<Arc<str>>,
}

impl ServerState {
    /// Serves whatever `source` returns; requests need `api_key` as a bearer token when set.
    pub fn new(source: Arc<dyn RemoteGateway>, api_key: Option<String>) -> Self {
        Self {
            source,
            api_key: api_key.map(Arc::from),
        }
    }

    /// Serves a published snapshot file, re-read on every request.
    pub fn from_snapshot(path: PathBuf, api_key: Option<String>) -> Self {
        Self::new(Arc::new(FileGateway::new(path)), api_key)
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

fn error_response(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error,
            message: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for RemoteError {
    fn into_response(self) -> Response {
        tracing::warn!("Catalog source failed: {}", self);
        match self {
            RemoteError::Decoding(_) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "corrupt_catalog", self.to_string())
            }
            RemoteError::Network(_) | RemoteError::Timeout(_) => error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "catalog_unavailable",
                self.to_string(),
            ),
        }
    }
}

/// Builds the router: `/health` is public, catalog routes honor the API key.
pub fn router(state: ServerState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let catalog_routes = Router::new()
        .route("/categories", get(all_categories))
        .route("/categories/meta", get(category_metadata))
        .route("/categories/{id}", get(category))
        .route("/categories/{id}/groups/meta", get(group_metadata))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(catalog_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Rejects catalog requests without the configured bearer key.
async fn auth_middleware(State(state): State<ServerState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(key) if key == expected => next.run(request).await,
        Some(_) => error_response(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key"),
        None => error_response(
            StatusCode::UNAUTHORIZED,
            "missing_auth",
            "Authorization header with Bearer scheme required",
        ),
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn all_categories(State(state): State<ServerState>) -> Result<Response, RemoteError> {
    let categories = state.source.fetch_all_categories().await?;
    tracing::debug!("Serving {} categories", categories.len());
    Ok(Json(categories).into_response())
}

async fn category_metadata(State(state): State<ServerState>) -> Result<Response, RemoteError> {
    Ok(Json(state.source.fetch_category_metadata().await?).into_response())
}

async fn category(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Response, RemoteError> {
    match state.source.fetch_category(&id).await? {
        Some(category) => Ok(Json(category).into_response()),
        None => Ok(error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Unknown category {}", id),
        )),
    }
}

async fn group_metadata(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Response, RemoteError> {
    Ok(Json(state.source.fetch_group_metadata(&id).await?).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Catalog, Category};
    use crate::remote::MemoryGateway;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    fn app(api_key: Option<&str>) -> Router {
        let gateway = MemoryGateway::new(Catalog::new(vec![Category::new("m1", "Letters")]));
        router(ServerState::new(
            Arc::new(gateway),
            api_key.map(str::to_string),
        ))
    }

    async fn status_of(app: Router, uri: &str, key: Option<&str>) -> StatusCode {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        assert_eq!(status_of(app(Some("k")), "/health", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_catalog_routes_require_key_when_configured() {
        assert_eq!(
            status_of(app(Some("k")), "/categories", None).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(app(Some("k")), "/categories", Some("wrong")).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(app(Some("k")), "/categories", Some("k")).await,
            StatusCode::OK
        );
        assert_eq!(status_of(app(None), "/categories/meta", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_category_is_404() {
        assert_eq!(
            status_of(app(None), "/categories/nope", None).await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(app(None), "/categories/m1", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_source_failure_is_503() {
        let gateway = MemoryGateway::default();
        gateway.set_offline(true);
        let app = router(ServerState::new(Arc::new(gateway), None));
        assert_eq!(
            status_of(app, "/categories/meta", None).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
