//! Axum HTTP handlers for the web server
//!
//! Provides the Model Context Protocol endpoint and the OAuth discovery document.

use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use futures::FutureExt;
use serde::Serialize;

use crate::domain::metadata::AuthorizationServerMetadata;
use crate::errors::AppError;
use crate::identity::IdentityClaims;
use crate::mcp::rpc::{json_rpc_error, SERVER_ERROR};
use crate::mcp::server::McpServer;
use crate::mcp::transport::TransportSession;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn authorization_server_metadata(
    State(state): State<AppState>,
) -> Json<AuthorizationServerMetadata> {
    Json(state.metadata.as_ref().clone())
}

/// Serves one MCP request with a server and transport that live only as long
/// as this call.
pub async fn mcp_endpoint(
    State(state): State<AppState>,
    Extension(claims): Extension<Arc<IdentityClaims>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let server = McpServer::new(claims, state.tool_definitions.clone());
    let session = TransportSession::connect(server);

    guard_mcp_failure(async move { Ok(session.handle_request(&body).await?.into_response()) })
        .await
}

/// Runs MCP work so that a panic surfaces as the same 500 JSON-RPC error as an
/// `AppError::Internal`.
pub async fn guard_mcp_failure<F>(work: F) -> Result<Response, AppError>
where
    F: Future<Output = Result<Response, AppError>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(AppError::internal("mcp request handler panicked")),
    }
}

/// Stateless mode has neither a server-sent event stream nor a session to delete.
pub async fn mcp_method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json_rpc_error(None, SERVER_ERROR, "Method not allowed.")),
    )
        .into_response()
}
