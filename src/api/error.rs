use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use serde::Serialize;
use std::any::Any;
use std::fmt::Display;
use thiserror::Error;
use uuid::Uuid;

use crate::models::reading::FieldError;

pub const GENERIC_FAILURE: &str = "An unexpected error occurred. Please try again later.";

/// Everything a handler can fail with, already mapped to the client-facing shape.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request validation failed ({} error(s))", .0.len())]
    Validation(Vec<FieldError>),
    #[error("Database error occurred.")]
    Storage,
    #[error("An unexpected error occurred. Reference ID: {incident_id}")]
    Unexpected { incident_id: Uuid },
    #[error("{detail}")]
    Http { status: StatusCode, detail: String },
}

impl ApiError {
    pub fn http(status: StatusCode, detail: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            detail: detail.into(),
        }
    }

    /// Log `cause` under a fresh incident id; only the id reaches the client.
    pub fn unexpected(cause: impl Display) -> Self {
        let incident_id = Uuid::new_v4();
        error!("Incident {}: Unexpected error: {}", incident_id, cause);
        ApiError::Unexpected { incident_id }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Storage | ApiError::Unexpected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Http { status, .. } => *status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: u16,
}

#[derive(Debug, Serialize)]
struct ValidationBody {
    detail: Vec<FieldError>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(detail) => (status, Json(ValidationBody { detail })).into_response(),
            other => error_response(status, other.to_string()),
        }
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    let body = ErrorBody {
        error,
        code: status.as_u16(),
    };
    (status, Json(body)).into_response()
}

/// Last line of defence for panics escaping a handler.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let cause = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!("Unexpected error: handler panicked: {}", cause);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn storage_error_shape() {
        let response = ApiError::Storage.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Database error occurred.", "code": 500})
        );
    }

    #[tokio::test]
    async fn unexpected_error_carries_reference_id() {
        let err = ApiError::unexpected("disk on fire");
        let ApiError::Unexpected { incident_id } = &err else {
            panic!("expected an unexpected error");
        };
        let expected = format!("An unexpected error occurred. Reference ID: {incident_id}");
        let body = body_json(err.into_response()).await;
        assert_eq!(body["error"], expected);
        assert_eq!(body["code"], 500);
        assert!(!body["error"].as_str().unwrap().contains("disk on fire"));
    }

    #[tokio::test]
    async fn validation_error_lists_fields() {
        let err = ApiError::Validation(vec![FieldError::body("temperature", "too hot", "out_of_range")]);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await,
            json!({"detail": [{"loc": ["body", "temperature"], "msg": "too hot", "type": "out_of_range"}]})
        );
    }

    #[tokio::test]
    async fn panics_become_generic_500() {
        let response = handle_panic(Box::new("index out of bounds"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({"error": GENERIC_FAILURE, "code": 500}));
    }
}
