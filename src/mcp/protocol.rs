//! MCP protocol types and message handling for JSON-RPC 2.0 communication.

use serde::{Deserialize, Serialize};

/// JSON-RPC 2.0 request structure
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response structure
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 error structure
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// MCP tool definition for tool discovery
#[derive(Debug, Clone, Serialize)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// MCP resource definition for resource discovery
#[derive(Debug, Clone, Serialize)]
pub struct McpResource {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// MCP server information
#[derive(Debug, Clone, Serialize)]
pub struct McpServerInfo {
    pub name: String,
    pub version: String,
}

/// MCP initialization result
#[derive(Debug, Serialize)]
pub struct McpInitResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: serde_json::Value,
    #[serde(rename = "serverInfo")]
    pub server_info: McpServerInfo,
}

/// Tool execution request parameters
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Resource read request parameters
#[derive(Debug, Deserialize)]
pub struct ResourceReadParams {
    pub uri: String,
}

/// Tool execution result
#[derive(Debug, Serialize)]
pub struct ToolResult {
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

/// Content item in tool result
#[derive(Debug, Serialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ToolResult {
    /// A successful result carrying one JSON text payload.
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            content: vec![ContentItem {
                content_type: "text".to_string(),
                text: serde_json::to_string_pretty(value)
                    .unwrap_or_else(|_| value.to_string()),
            }],
            is_error: false,
        }
    }

    /// An error result with the dispatcher's `{errorType, message}` shape.
    pub fn error(error_type: &str, message: &str) -> Self {
        let payload = serde_json::json!({
            "errorType": error_type,
            "message": message,
        });
        Self {
            content: vec![ContentItem {
                content_type: "text".to_string(),
                text: payload.to_string(),
            }],
            is_error: true,
        }
    }
}

/// Factory methods for [`JsonRpcResponse`].
impl JsonRpcResponse {
    /// Create a successful response
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response
    pub fn error(id: Option<serde_json::Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

/// MCP error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // MCP-specific error codes
    pub const TOOL_NOT_FOUND: i32 = -32001;
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_rpc_success_has_result_and_no_error() {
        let payload = json!({"status": "ok"});
        let response = JsonRpcResponse::success(Some(json!(1)), payload.clone());

        assert_eq!(response.jsonrpc, "2.0");
        assert_eq!(response.id, Some(json!(1)));
        assert!(response.error.is_none());
        assert_eq!(response.result, Some(payload));
    }

    #[test]
    fn json_rpc_error_sets_error_payload() {
        let response =
            JsonRpcResponse::error(None, error_codes::METHOD_NOT_FOUND, "missing method".into());

        assert_eq!(response.jsonrpc, "2.0");
        assert!(response.result.is_none());
        assert!(response.id.is_none());

        let error = response.error.expect("error payload");
        assert_eq!(error.code, error_codes::METHOD_NOT_FOUND);
        assert_eq!(error.message, "missing method");
        assert!(error.data.is_none());
    }

    #[test]
    fn tool_result_error_shape() {
        let result = ToolResult::error("ValidationError", "bad target");
        assert!(result.is_error);
        let parsed: serde_json::Value =
            serde_json::from_str(&result.content[0].text).unwrap();
        assert_eq!(parsed["errorType"], "ValidationError");
        assert_eq!(parsed["message"], "bad target");
    }

    #[test]
    fn tool_result_json_pretty_prints() {
        let result = ToolResult::json(&json!({"a": 1}));
        assert!(!result.is_error);
        assert!(result.content[0].text.contains("\"a\": 1"));
    }
}
