//! Stateless HTTP transport
//!
//! One [`TransportSession`] serves exactly one HTTP request. No session id is
//! issued, so every request carries its own [`McpServer`]. Dropping the session,
//! either after the response is built or because the client went away and the
//! handler future was cancelled, releases the server with it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::debug;

use crate::errors::AppError;
use crate::mcp::rpc::{json_rpc_error, INVALID_REQUEST, PARSE_ERROR};
use crate::mcp::server::McpServer;

#[derive(Debug)]
pub enum TransportReply {
    /// A single response or a batch of responses.
    Json(Value),
    /// Only notifications were received.
    Accepted,
    /// The body could not be decoded as JSON.
    ParseError(Value),
}

impl IntoResponse for TransportReply {
    fn into_response(self) -> Response {
        match self {
            Self::Json(body) => (StatusCode::OK, Json(body)).into_response(),
            Self::Accepted => StatusCode::ACCEPTED.into_response(),
            Self::ParseError(body) => (StatusCode::BAD_REQUEST, Json(body)).into_response(),
        }
    }
}

pub struct TransportSession {
    server: McpServer,
}

impl TransportSession {
    pub fn connect(server: McpServer) -> Self {
        Self { server }
    }

    pub async fn handle_request(&self, body: &[u8]) -> Result<TransportReply, AppError> {
        let payload: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(_) => {
                return Ok(TransportReply::ParseError(json_rpc_error(
                    None,
                    PARSE_ERROR,
                    "Parse error",
                )))
            }
        };

        let Value::Array(batch) = payload else {
            return Ok(match self.server.handle_message(payload).await? {
                Some(response) => TransportReply::Json(response),
                None => TransportReply::Accepted,
            });
        };

        if batch.is_empty() {
            return Ok(TransportReply::Json(Value::Array(vec![json_rpc_error(
                None,
                INVALID_REQUEST,
                "Invalid Request",
            )])));
        }

        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) = self.server.handle_message(item).await? {
                responses.push(response);
            }
        }

        if responses.is_empty() {
            return Ok(TransportReply::Accepted);
        }

        Ok(TransportReply::Json(Value::Array(responses)))
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        debug!("request closed");
    }
}
