use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::mcp::rpc::{json_rpc_error, INTERNAL_ERROR};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {message}")]
    Unauthorized {
        code: &'static str,
        message: &'static str,
    },
    #[error("internal error: {message}")]
    Internal { code: &'static str, message: String },
}

/// Body shared by every 401, whatever the cause.
#[derive(Debug, Serialize)]
pub struct UnauthorizedResponse {
    pub error: &'static str,
}

impl AppError {
    pub fn unauthorized(code: &'static str, message: &'static str) -> Self {
        Self::Unauthorized { code, message }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("json serialization failed: {err}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized { code, message } => {
                tracing::debug!(code, reason = message, "rejecting unauthenticated request");
                (
                    StatusCode::UNAUTHORIZED,
                    Json(UnauthorizedResponse {
                        error: "Unauthorized",
                    }),
                )
                    .into_response()
            }
            Self::Internal { code, message } => {
                tracing::error!(code, error = %message, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json_rpc_error(None, INTERNAL_ERROR, "Internal server error")),
                )
                    .into_response()
            }
        }
    }
}
