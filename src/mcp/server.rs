//! Per-request Model Context Protocol server
//!
//! A fresh [`McpServer`] is built for every HTTP request and bound to that
//! request's identity. Nothing here is shared between requests except the
//! immutable tool definitions, so concurrent requests can never observe each
//! other's ids or claims.

use std::sync::Arc;

use rust_mcp_sdk::schema::{
    CallToolRequest, Implementation, InitializeRequest, InitializeResult, JsonrpcMessage,
    JsonrpcRequest, ListToolsRequest, ListToolsResult, PingRequest, ProtocolVersion,
    ServerCapabilities, ServerCapabilitiesTools, Tool,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::domain::tools::handle_tools_call;
use crate::errors::AppError;
use crate::identity::IdentityClaims;
use crate::mcp::rpc::{
    is_json_rpc_error, json_rpc_error, json_rpc_result, request_id_to_value, to_result_value,
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
};

/// Newest first; the head doubles as the fallback offer.
pub fn supported_protocol_versions() -> [ProtocolVersion; 3] {
    [
        ProtocolVersion::V2025_06_18,
        ProtocolVersion::V2025_03_26,
        ProtocolVersion::V2024_11_05,
    ]
}

pub struct McpServer {
    claims: Arc<IdentityClaims>,
    tools: Arc<[Tool]>,
}

impl McpServer {
    pub fn new(claims: Arc<IdentityClaims>, tools: Arc<[Tool]>) -> Self {
        Self { claims, tools }
    }

    /// Handles one decoded JSON-RPC message. Notifications yield `None`.
    pub async fn handle_message(&self, payload: Value) -> Result<Option<Value>, AppError> {
        if !payload.is_object() {
            return Ok(Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request")));
        }

        let request_id = payload.get("id").cloned();
        let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(_) => return Ok(Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request"))),
        };

        match parsed {
            JsonrpcMessage::Request(request) => {
                let id = request_id_to_value(request.id.clone());
                if request.method.trim().is_empty() {
                    return Ok(Some(json_rpc_error(Some(id), INVALID_REQUEST, "Invalid Request")));
                }
                if !request_shape_is_valid(&request)? {
                    return Ok(Some(json_rpc_error(Some(id), INVALID_PARAMS, "Invalid params")));
                }

                let response = self
                    .handle_request(Some(id), &request.method, request.params.map(Value::Object))
                    .await?;
                Ok(Some(response))
            }
            JsonrpcMessage::Notification(notification) => {
                debug!(method = %notification.method, "mcp notification accepted");
                Ok(None)
            }
            JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => {
                Ok(Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request")))
            }
        }
    }

    async fn handle_request(
        &self,
        id: Option<Value>,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, AppError> {
        let tool_name = params
            .as_ref()
            .and_then(|params| params.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let response = match method {
            "initialize" => {
                let initialize_result = InitializeResult {
                    server_info: Implementation {
                        name: env!("CARGO_PKG_NAME").to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        title: None,
                        description: None,
                        icons: vec![],
                        website_url: None,
                    },
                    capabilities: ServerCapabilities {
                        tools: Some(ServerCapabilitiesTools {
                            list_changed: Some(false),
                        }),
                        ..Default::default()
                    },
                    protocol_version: negotiate_protocol_version(params.as_ref()),
                    instructions: None,
                    meta: None,
                };
                json_rpc_result(id, to_result_value(&initialize_result)?)
            }
            "ping" => json_rpc_result(id, json!({})),
            "tools/list" => json_rpc_result(
                id,
                to_result_value(&ListToolsResult {
                    meta: None,
                    next_cursor: None,
                    tools: self.tools.to_vec(),
                })?,
            ),
            "tools/call" => handle_tools_call(&self.claims, id, params).await?,
            _ => json_rpc_error(id, METHOD_NOT_FOUND, "Method not found"),
        };

        info!(
            method,
            tool = tool_name.as_deref().unwrap_or("-"),
            subject = self.claims.sub.as_deref().unwrap_or("-"),
            outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
            "mcp request handled"
        );

        Ok(response)
    }
}

fn request_shape_is_valid(request: &JsonrpcRequest) -> Result<bool, AppError> {
    let payload = serde_json::to_value(request)?;

    Ok(match request.method.as_str() {
        "tools/call" => serde_json::from_value::<CallToolRequest>(payload).is_ok(),
        "tools/list" => serde_json::from_value::<ListToolsRequest>(payload).is_ok(),
        "ping" => serde_json::from_value::<PingRequest>(payload).is_ok(),
        "initialize" => serde_json::from_value::<InitializeRequest>(payload).is_ok(),
        _ => true,
    })
}

/// Echoes the client's version when supported, otherwise offers the latest.
pub fn negotiate_protocol_version(params: Option<&Value>) -> String {
    let offered = params
        .and_then(|params| params.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim);

    let mut supported = supported_protocol_versions()
        .into_iter()
        .map(|version| version.to_string())
        .peekable();
    let latest = supported.peek().cloned().unwrap_or_default();

    supported
        .find(|version| Some(version.as_str()) == offered)
        .unwrap_or(latest)
}
