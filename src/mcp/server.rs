//! MCP JSON-RPC 2.0 server over stdin/stdout.
//!
//! One newline-delimited JSON-RPC message per line; logging goes to
//! stderr so stdout stays a clean protocol channel. EOF on stdin ends
//! the serve loop.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};
use tracing::{debug, error, info};

use crate::core::engine::SessionEngine;
use crate::core::errors::Result;
use crate::mcp::protocol::{
    error_codes, JsonRpcRequest, JsonRpcResponse, McpInitResult, McpResource, McpServerInfo,
    ResourceReadParams, ToolCallParams,
};
use crate::mcp::schemas::tool_definitions;
use crate::mcp::tools::{execute_tool, ToolContext};
use crate::roles::RoleRegistry;

/// MCP server handling JSON-RPC 2.0 over stdio.
pub struct McpServer {
    server_info: McpServerInfo,
    context: ToolContext,
}

impl McpServer {
    /// Create a server around an engine.
    pub fn new(engine: Arc<SessionEngine>, version: &str) -> Self {
        Self {
            server_info: McpServerInfo {
                name: "elenchus".to_string(),
                version: version.to_string(),
            },
            context: ToolContext {
                engine,
                roles: Arc::new(RoleRegistry::new()),
            },
        }
    }

    /// Run the serve loop until stdin closes.
    pub async fn run(&self) -> Result<()> {
        info!("Starting MCP JSON-RPC 2.0 server on stdio");

        let stdin = tokio::io::stdin();
        let mut reader = AsyncBufReader::new(stdin);
        let mut stdout = tokio::io::stdout();
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("EOF on stdin; shutting down");
                    break;
                }
                Ok(_) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let response = self.handle_line(&line).await;
                    // Notifications (no id) receive no response.
                    if let Some(response) = response {
                        let serialized = serde_json::to_string(&response)?;
                        stdout.write_all(serialized.as_bytes()).await?;
                        stdout.write_all(b"\n").await?;
                        stdout.flush().await?;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Error reading stdin; shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handle one raw request line.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    None,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {e}"),
                ));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                error_codes::INVALID_REQUEST,
                "jsonrpc must be \"2.0\"".to_string(),
            ));
        }

        let is_notification = request.id.is_none();
        let response = self.dispatch(request).await;
        if is_notification {
            None
        } else {
            Some(response)
        }
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match request.method.as_str() {
            "initialize" => {
                let result = McpInitResult {
                    protocol_version: "2024-11-05".to_string(),
                    capabilities: json!({
                        "tools": {},
                        "resources": {},
                    }),
                    server_info: self.server_info.clone(),
                };
                match serde_json::to_value(result) {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(e) => JsonRpcResponse::error(
                        id,
                        error_codes::INTERNAL_ERROR,
                        e.to_string(),
                    ),
                }
            }
            "notifications/initialized" | "initialized" => {
                JsonRpcResponse::success(id, json!({}))
            }
            "tools/list" => {
                let tools = tool_definitions();
                JsonRpcResponse::success(id, json!({ "tools": tools }))
            }
            "tools/call" => {
                let params: ToolCallParams = match request
                    .params
                    .ok_or("missing params")
                    .and_then(|p| serde_json::from_value(p).map_err(|_| "invalid params"))
                {
                    Ok(params) => params,
                    Err(msg) => {
                        return JsonRpcResponse::error(
                            id,
                            error_codes::INVALID_PARAMS,
                            msg.to_string(),
                        );
                    }
                };

                let known = tool_definitions().iter().any(|t| t.name == params.name);
                if !known {
                    return JsonRpcResponse::error(
                        id,
                        error_codes::TOOL_NOT_FOUND,
                        format!("Unknown tool: {}", params.name),
                    );
                }

                let result = execute_tool(&self.context, &params.name, params.arguments).await;
                match serde_json::to_value(result) {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(e) => JsonRpcResponse::error(
                        id,
                        error_codes::INTERNAL_ERROR,
                        e.to_string(),
                    ),
                }
            }
            "resources/list" => {
                JsonRpcResponse::success(id, json!({ "resources": self.list_resources().await }))
            }
            "resources/read" => {
                let params: ResourceReadParams = match request
                    .params
                    .and_then(|p| serde_json::from_value(p).ok())
                {
                    Some(params) => params,
                    None => {
                        return JsonRpcResponse::error(
                            id,
                            error_codes::INVALID_PARAMS,
                            "uri required".to_string(),
                        );
                    }
                };
                match self.read_resource(&params.uri).await {
                    Ok(contents) => JsonRpcResponse::success(
                        id,
                        json!({
                            "contents": [{
                                "uri": params.uri,
                                "mimeType": "application/json",
                                "text": contents.to_string(),
                            }]
                        }),
                    ),
                    Err(message) => JsonRpcResponse::error(
                        id,
                        error_codes::RESOURCE_NOT_FOUND,
                        message,
                    ),
                }
            }
            other => JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {other}"),
            ),
        }
    }

    async fn list_resources(&self) -> Vec<McpResource> {
        let mut resources = Vec::new();
        for id in self.context.engine.session_ids().await {
            resources.push(McpResource {
                uri: format!("elenchus://sessions/{id}"),
                name: format!("Session {id}"),
                description: "Full session projection".to_string(),
                mime_type: "application/json".to_string(),
            });
            resources.push(McpResource {
                uri: format!("elenchus://sessions/{id}/convergence"),
                name: format!("Convergence for {id}"),
                description: "Current convergence snapshot".to_string(),
                mime_type: "application/json".to_string(),
            });
        }
        resources
    }

    /// Resolve an `elenchus://` URI to a JSON projection.
    async fn read_resource(&self, uri: &str) -> std::result::Result<Value, String> {
        let path = uri
            .strip_prefix("elenchus://sessions/")
            .ok_or_else(|| format!("Unsupported resource URI: {uri}"))?;
        let mut segments = path.splitn(3, '/');
        let session_id = segments.next().filter(|s| !s.is_empty()).ok_or_else(|| {
            format!("Missing session id in URI: {uri}")
        })?;

        let engine = &self.context.engine;
        let session = engine
            .get_session(session_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("Unknown session: {session_id}"))?;

        match (segments.next(), segments.next()) {
            (None, _) => serde_json::to_value(&session).map_err(|e| e.to_string()),
            (Some("issues"), None) => {
                serde_json::to_value(&session.issues).map_err(|e| e.to_string())
            }
            (Some("issues"), Some(issue_id)) => session
                .issue(issue_id)
                .map(|issue| serde_json::to_value(issue).map_err(|e| e.to_string()))
                .transpose()?
                .ok_or_else(|| format!("Unknown issue: {issue_id}")),
            (Some("rounds"), None) => {
                serde_json::to_value(&session.rounds).map_err(|e| e.to_string())
            }
            (Some("rounds"), Some(number)) => {
                let n: u32 = number
                    .parse()
                    .map_err(|_| format!("Invalid round number: {number}"))?;
                session
                    .rounds
                    .iter()
                    .find(|r| r.number == n)
                    .map(|round| serde_json::to_value(round).map_err(|e| e.to_string()))
                    .transpose()?
                    .ok_or_else(|| format!("Unknown round: {n}"))
            }
            (Some("convergence"), None) => engine
                .convergence(session_id)
                .await
                .map_err(|e| e.to_string())
                .and_then(|snapshot| serde_json::to_value(snapshot).map_err(|e| e.to_string())),
            _ => Err(format!("Unsupported resource URI: {uri}")),
        }
    }
}
