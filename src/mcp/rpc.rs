//! JSON-RPC envelopes and error codes
//!
//! Builds JSON-RPC result and error objects; tool argument failures are answered in-band.

use rust_mcp_sdk::schema::RequestId;
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::AppError;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const SERVER_ERROR: i32 = -32000;

pub fn is_json_rpc_error(value: &Value) -> bool {
    value.get("error").is_some()
}

pub fn invalid_params(id: Option<Value>, code: &str, message: &str) -> Value {
    json_rpc_error_with_data(
        id,
        INVALID_PARAMS,
        "Invalid params",
        Some(json!({
            "code": code,
            "message": message,
        })),
    )
}

pub fn json_rpc_error(id: Option<Value>, code: i32, message: &str) -> Value {
    json_rpc_error_with_data(id, code, message, None)
}

pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    let mut error = json!({
        "code": code,
        "message": message,
    });
    if let Some(data) = data {
        error["data"] = data;
    }

    json!({
        "jsonrpc": "2.0",
        "id": id.unwrap_or(Value::Null),
        "error": error,
    })
}

pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.unwrap_or(Value::Null),
        "result": result,
    })
}

/// Serializes a protocol result, surfacing failures as internal errors.
pub fn to_result_value<T: Serialize>(result: &T) -> Result<Value, AppError> {
    Ok(serde_json::to_value(result)?)
}

pub fn request_id_to_value(id: RequestId) -> Value {
    match id {
        RequestId::String(value) => Value::String(value),
        RequestId::Integer(value) => Value::Number(value.into()),
    }
}
