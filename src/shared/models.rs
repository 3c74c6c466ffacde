use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Uniform JSON envelope carried by every response.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl ApiResponse {
    pub fn success(message: Option<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message,
            data,
            errors: None,
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: Some(message.to_string()),
            data: None,
            errors: None,
        }
    }
}

/// An envelope paired with its HTTP status.
#[derive(Debug)]
pub struct ApiReply {
    pub status: StatusCode,
    pub body: ApiResponse,
}

impl ApiReply {
    pub fn ok(data: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: ApiResponse::success(None, Some(data)),
        }
    }

    pub fn ok_message(message: &str, data: Option<Value>) -> Self {
        Self {
            status: StatusCode::OK,
            body: ApiResponse::success(Some(message.to_string()), data),
        }
    }

    pub fn created(message: &str, data: Value) -> Self {
        Self {
            status: StatusCode::CREATED,
            body: ApiResponse::success(Some(message.to_string()), Some(data)),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ApiResponse::failure(message),
        }
    }

    /// 422 with a field -> messages error map.
    pub fn validation_failed(errors: Value) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ApiResponse {
                success: false,
                message: Some("Validation failed".to_string()),
                data: None,
                errors: Some(errors),
            },
        }
    }

    /// 422 with a bare message and no error map.
    pub fn unprocessable(message: &str) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ApiResponse::failure(message),
        }
    }
}

impl IntoResponse for ApiReply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("request failed: {}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::failure("Internal server error")),
        )
            .into_response()
    }
}

/// One page of rows plus the aggregate pagination metadata.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: i64,
    pub per_page: i64,
    pub total: i64,
    pub last_page: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, current_page: i64, per_page: i64, total: i64) -> Self {
        let last_page = ((total + per_page - 1) / per_page).max(1);
        Self {
            data,
            current_page,
            per_page,
            total,
            last_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_skips_absent_fields() {
        let body = ApiResponse::success(None, Some(json!({"id": 1})));
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value, json!({"success": true, "data": {"id": 1}}));
    }

    #[test]
    fn failure_envelope_has_message_only() {
        let value = serde_json::to_value(ApiResponse::failure("Support ticket not found.")).unwrap();
        assert_eq!(
            value,
            json!({"success": false, "message": "Support ticket not found."})
        );
    }

    #[test]
    fn validation_reply_carries_error_map() {
        let reply = ApiReply::validation_failed(json!({"email": ["The email field is required."]}));
        assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
        let value = serde_json::to_value(&reply.body).unwrap();
        assert_eq!(value["message"], "Validation failed");
        assert_eq!(value["errors"]["email"][0], "The email field is required.");
    }

    #[test]
    fn page_math() {
        let page = Page::new(vec![1, 2, 3], 1, 50, 3);
        assert_eq!(page.last_page, 1);
        let page = Page::new(Vec::<i32>::new(), 1, 50, 0);
        assert_eq!(page.last_page, 1);
        let page = Page::new(vec![0; 15], 2, 15, 31);
        assert_eq!(page.last_page, 3);
        assert_eq!(page.current_page, 2);
    }
}
