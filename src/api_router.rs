//! Central API router: merges the resource routers, exposes the health
//! probe and applies the CORS policy shared by every response.

use axum::http::{header, HeaderName, Method};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::shared::models::ApiReply;
use crate::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
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
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static("x-subdomain"),
        ])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(crate::newsletter::configure())
                .merge(crate::support::configure())
                .route("/health", get(health)),
        )
        .layer(cors)
}

async fn health() -> ApiReply {
    ApiReply::ok_message(
        "Support API is running",
        Some(json!({
            "timestamp": Utc::now(),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
