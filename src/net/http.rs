mod auth;
mod chests;
mod error;
mod extract;
mod items;
mod logs;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::Registry;
use crate::error::{AppResult, DomainError, InfraError};

#[derive(Clone)]
struct HttpAppCtx {
    registry: Arc<Registry>,
}

/// Every API route, mounted both at `/` and under `/api`.
pub fn router(registry: Arc<Registry>) -> Router {
    let cors = cors_layer(registry.config.cors_origin.as_deref());

    let api = Router::new()
        .merge(chests::routes())
        .merge(items::routes())
        .merge(logs::routes())
        .merge(auth::routes());

    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(api_health))
        .nest("/api", api.clone())
        .merge(api)
        .fallback(not_found)
        .with_state(HttpAppCtx { registry })
        .layer(cors)
}

/// Run the HTTP API server
pub async fn serve(addr: std::net::SocketAddr, registry: Arc<Registry>) -> AppResult<()> {
    let app = router(registry);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(InfraError::from)?;
    axum::serve(listener, app).await.map_err(InfraError::from)?;
    Ok(())
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    match origin {
        Some(origin) => match HeaderValue::from_str(origin) {
            Ok(v) => layer.allow_origin(v),
            Err(_) => {
                tracing::warn!(origin, "invalid CORS origin, allowing any");
                layer.allow_origin(Any)
            }
        },
        None => layer.allow_origin(Any),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn api_health() -> Json<Value> {
    Json(json!({ "ok": true, "api": true }))
}

async fn not_found() -> DomainError {
    DomainError::NotFound("route".into())
}
