//! Bearer-token gate for the management endpoints.
//!
//! The identity provider issuing tokens is an external collaborator;
//! this module only verifies an HS256 JWT against the configured
//! secret. Handlers opt in by taking an [`AuthClaims`] argument.

use crate::shared::models::ApiResponse;
use crate::shared::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AuthClaims(pub TokenClaims);

impl FromRequestParts<Arc<AppState>> for AuthClaims {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Err(unauthorized());
        };
        let key = DecodingKey::from_secret(state.config.auth.jwt_secret.as_bytes());
        match decode::<TokenClaims>(token, &key, &Validation::new(Algorithm::HS256)) {
            Ok(data) => Ok(AuthClaims(data.claims)),
            Err(err) => {
                debug!("rejected bearer token: {}", err);
                Err(unauthorized())
            }
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::failure("Authentication required")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/support");
        if let Some(value) = value {
            builder = builder.header("authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_requires_prefix() {
        let parts = parts_with_auth(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&parts), Some("abc.def.ghi"));

        let parts = parts_with_auth(Some("Token abc"));
        assert_eq!(bearer_token(&parts), None);

        let parts = parts_with_auth(None);
        assert_eq!(bearer_token(&parts), None);
    }

    #[test]
    fn claims_round_trip_through_hs256() {
        let claims = TokenClaims {
            sub: "admin@example.com".to_string(),
            exp: (chrono::Utc::now().timestamp()) + 3600,
            iat: None,
        };
        let secret = b"test-secret";
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap();
        let decoded = decode::<TokenClaims>(
            &token,
            &DecodingKey::from_secret(secret),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, "admin@example.com");

        let rejected = decode::<TokenClaims>(
            &token,
            &DecodingKey::from_secret(b"other-secret"),
            &Validation::new(Algorithm::HS256),
        );
        assert!(rejected.is_err());
    }
}
