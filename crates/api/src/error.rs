use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Index(#[from] index::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Index(index::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Index(index::Error::UnsupportedFormat { .. }) => StatusCode::BAD_REQUEST,
            Self::Index(index::Error::InvalidConfig(_)) => StatusCode::BAD_REQUEST,
            Self::Index(index::Error::EmptyExtraction { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Index(index::Error::CollaboratorUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), %message, error = ?self, "Server error");
        } else {
            tracing::debug!(status = status.as_u16(), %message, "Client error");
        }

        let body = Json(json!({
            "error": {
                "status": status.as_u16(),
                "message": message,
            }
        }));
        (status, body).into_response()
    }
}
