use axum::{
    Json,
    extract::rejection::BytesRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::payload::PayloadError;

pub enum HttpError {
    BadRequest(String),
    PayloadTooLarge(String),
    MethodNotAllowed,
    InternalServerError {
        source: anyhow::Error,
        request_id: Option<String>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl HttpError {
    pub fn internal(source: impl Into<anyhow::Error>, request_id: Option<String>) -> Self {
        Self::InternalServerError {
            source: source.into(),
            request_id,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            HttpError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            HttpError::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            HttpError::BadRequest(message) | HttpError::PayloadTooLarge(message) => {
                tracing::debug!(%status, %message, "rejected request");
                (
                    status,
                    Json(ErrorBody {
                        error: message,
                        request_id: None,
                    }),
                )
                    .into_response()
            }
            HttpError::MethodNotAllowed => (
                status,
                [(header::ALLOW, HeaderValue::from_static("POST, OPTIONS"))],
                Json(ErrorBody {
                    error: "Use POST".to_string(),
                    request_id: None,
                }),
            )
                .into_response(),
            HttpError::InternalServerError { source, request_id } => {
                tracing::error!(request_id = ?request_id, "Internal Server Error: {:#}", source);

                (
                    status,
                    Json(ErrorBody {
                        error: "PDF generation failed".to_string(),
                        request_id,
                    }),
                )
                    .into_response()
            }
        }
    }
}

impl From<PayloadError> for HttpError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::MissingContent | PayloadError::Malformed(_) => {
                Self::BadRequest(err.to_string())
            }
            PayloadError::TooLarge { .. } => Self::PayloadTooLarge("Payload too large".to_string()),
        }
    }
}

impl From<BytesRejection> for HttpError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge("Payload too large".to_string())
        } else {
            Self::BadRequest(rejection.body_text())
        }
    }
}
