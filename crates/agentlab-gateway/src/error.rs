//! HTTP error mapping
//!
//! Every handler error becomes `{"detail": "..."}` with a status derived from
//! the core error kind. Infrastructure faults are logged and reported as a
//! generic 500; their text never reaches the client.

use agentlab_core::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

#[derive(Debug)]
pub struct ApiError(pub Error);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::AgentNotFound(_) | Error::ExperimentNotFound(_) | Error::UserNotFound => {
                StatusCode::NOT_FOUND
            }
            Error::NotReady { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::InvalidTransition { .. }
            | Error::Storage(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };
        let mut response = (status, Json(serde_json::json!({ "detail": detail }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}
