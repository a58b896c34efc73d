//! Tools exposed via Model Context Protocol
//!
//! `add` sums two numbers, `whoami` echoes the claims of the caller that the
//! per-request server was built for.

use rust_mcp_sdk::{
    macros,
    schema::{CallToolRequestParams, CallToolResult, ContentBlock, TextContent, Tool},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::identity::IdentityClaims;
use crate::mcp::rpc::{
    invalid_params, json_rpc_error, json_rpc_error_with_data, json_rpc_result, to_result_value,
    INVALID_PARAMS,
};

#[macros::mcp_tool(name = "add", description = "Add two numbers")]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct AddTool {
    pub a: f64,
    pub b: f64,
}

#[macros::mcp_tool(
    name = "whoami",
    description = "Describe the identity behind the current access token"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct WhoamiTool {}

/// Built once at startup and shared by every request.
pub fn build_tools_list() -> Vec<Tool> {
    vec![AddTool::tool(), WhoamiTool::tool()]
}

impl AddTool {
    pub fn call(&self) -> String {
        format_number(self.a + self.b)
    }
}

impl WhoamiTool {
    pub fn call(&self, claims: &IdentityClaims) -> Result<String, AppError> {
        Ok(format!("You are {}", serde_json::to_string_pretty(claims)?))
    }
}

/// Renders a number the way JavaScript's `String(n)` does: `5` rather than
/// `5.0`, and exponent notation outside `[1e-6, 1e21)`.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        let sign = if value.is_sign_negative() { "-" } else { "" };
        return format!("{sign}Infinity");
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let magnitude = value.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        // `{:e}` already picks the shortest round-trip digits; only the sign
        // of a positive exponent is missing.
        let formatted = format!("{value:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => formatted,
        };
    }

    value.to_string()
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: None,
    }
}

/// Argument errors are answered in-band, so the `Err` side is a ready JSON-RPC error.
fn parse_arguments<T: for<'de> Deserialize<'de>>(
    id: &Option<Value>,
    arguments: Option<serde_json::Map<String, Value>>,
) -> Result<T, Value> {
    serde_json::from_value(Value::Object(arguments.unwrap_or_default())).map_err(|_| {
        invalid_params(
            id.clone(),
            "invalid_arguments",
            "tool arguments do not match the input schema",
        )
    })
}

pub async fn handle_tools_call(
    claims: &IdentityClaims,
    id: Option<Value>,
    params: Option<Value>,
) -> Result<Value, AppError> {
    let Some(raw_params) = params else {
        return Ok(json_rpc_error(id, INVALID_PARAMS, "Invalid params"));
    };

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return Ok(json_rpc_error(id, INVALID_PARAMS, "Invalid params")),
    };

    let text = match tool_call.name.as_str() {
        "add" => match parse_arguments::<AddTool>(&id, tool_call.arguments) {
            Ok(tool) => tool.call(),
            Err(error) => return Ok(error),
        },
        "whoami" => WhoamiTool {}.call(claims)?,
        _ => {
            return Ok(json_rpc_error_with_data(
                id,
                INVALID_PARAMS,
                "Invalid params",
                Some(json!({
                    "code": "tool_not_found",
                    "message": "unknown tool name",
                    "details": {
                        "name": tool_call.name,
                    },
                })),
            ))
        }
    };

    Ok(json_rpc_result(id, to_result_value(&text_result(text))?))
}
