//! Router-level tests that exercise the HTTP surface without a
//! database: envelope shapes, validation rejections, the auth gate and
//! the CORS policy. Storage-backed paths are covered by the unit tests
//! on the pure scoping/stamping helpers.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use supportdesk::api_router::configure_api_routes;
use supportdesk::config::{AppConfig, AuthConfig, DatabaseConfig, ServerConfig};
use supportdesk::notifier::LogNotifier;
use supportdesk::shared::state::AppState;

fn test_app() -> Router {
    // Lazy pool: never connects unless a handler actually asks for a
    // connection, which none of the paths under test do.
    let manager = ConnectionManager::<PgConnection>::new("postgres://localhost:1/unused");
    let pool = Pool::builder().build_unchecked(manager);
    let state = Arc::new(AppState {
        conn: pool,
        config: AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                username: "unused".to_string(),
                password: "".to_string(),
                server: "localhost".to_string(),
                port: 1,
                database: "unused".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: "test-secret".to_string(),
            },
            smtp: None,
        },
        notifier: Arc::new(LogNotifier),
    });
    configure_api_routes().with_state(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_returns_the_liveness_envelope() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Support API is running");
    assert!(body["data"]["timestamp"].is_string());
    assert!(body["data"]["version"].is_string());
}

#[tokio::test]
async fn gated_routes_require_a_bearer_token() {
    for (method, uri) in [
        (Method::GET, "/api/newsletter"),
        (Method::GET, "/api/support"),
        (Method::GET, "/api/support/statistics"),
        (Method::GET, "/api/support/TKT-ABCD1234"),
        (Method::DELETE, "/api/support/TKT-ABCD1234"),
    ] {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method(method.clone())
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "{} {} should be auth-gated",
            method,
            uri
        );
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Authentication required");
    }
}

#[tokio::test]
async fn garbage_bearer_tokens_are_rejected() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/api/support/statistics")
                .header("authorization", "Bearer not.a.jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ticket_create_rejects_an_invalid_payload_field_by_field() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/support")
                .header("content-type", "application/json")
                .header("x-subdomain", "acme")
                .body(Body::from(r#"{"type": "spam", "email": "not-an-email"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Validation failed");
    assert_eq!(body["errors"]["type"][0], "The selected type is invalid.");
    assert_eq!(
        body["errors"]["email"][0],
        "The email field must be a valid email address."
    );
    assert_eq!(body["errors"]["name"][0], "The name field is required.");
    assert_eq!(body["errors"]["subject"][0], "The subject field is required.");
    assert_eq!(body["errors"]["message"][0], "The message field is required.");
}

#[tokio::test]
async fn contact_rejects_too_many_attachments() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/support/contact")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{
                        "name": "Jane",
                        "email": "jane@example.com",
                        "subject": "Hi",
                        "message": "Hello",
                        "attachments": ["1", "2", "3", "4", "5", "6"]
                    }"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(
        body["errors"]["attachments"][0],
        "The attachments field must not have more than 5 items."
    );
}

#[tokio::test]
async fn subscribe_requires_an_email() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/newsletter")
                .header("content-type", "application/json")
                .header("x-subdomain", "acme")
                .body(Body::from(r#"{"name": "Test User"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["message"], "Validation failed");
    assert_eq!(body["errors"]["email"][0], "The email field is required.");
}

#[tokio::test]
async fn preflight_carries_the_cors_policy() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/newsletter")
                .header("origin", "https://acme.example.com")
                .header("access-control-request-method", "POST")
                .header("access-control-request-headers", "content-type,x-subdomain")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    let methods = headers
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("POST"));
    assert!(methods.contains("DELETE"));
    assert_eq!(headers.get("access-control-max-age").unwrap(), "3600");
}

#[tokio::test]
async fn simple_responses_allow_any_origin() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header("origin", "https://acme.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}
