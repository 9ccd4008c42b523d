//! MCP (Model Context Protocol) client support.
//!
//! Tool servers speak JSON-RPC 2.0 over HTTP. A session is established with
//! an `initialize` exchange, after which `tools/list` enumerates the tools a
//! server offers and `tools/call` invokes one.
//!
//! Streamable-HTTP servers are free to answer a plain POST with an SSE-framed
//! body (`data: {...}` lines) instead of bare JSON. The transport accepts
//! both framings transparently.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SwitchboardError};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ─────────────────────────────────────────────────────────────────────────────
// Protocol Types
// ─────────────────────────────────────────────────────────────────────────────

/// JSON-RPC request structure
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: 0,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC notification: a request without an `id`, expecting no reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: None,
        }
    }
}

/// JSON-RPC response structure
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Tool definition as a server declares it in `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// `tools/list` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<McpToolDefinition>,
}

/// One content block of a `tools/call` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentItem {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType", default)]
        mime_type: Option<String>,
    },
    #[serde(rename = "resource")]
    Resource { resource: Value },
}

/// `tools/call` result payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Flatten the content blocks into one text payload. Non-text blocks
    /// collapse to placeholders so the transcript stays textual.
    pub fn render_text(&self) -> String {
        self.content
            .iter()
            .map(|item| match item {
                ContentItem::Text { text } => text.clone(),
                ContentItem::Image { .. } => "[image]".to_string(),
                ContentItem::Resource { .. } => "[resource]".to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// MCP server capabilities
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub resources: Option<Value>,
    #[serde(default)]
    pub prompts: Option<Value>,
}

/// `initialize` result payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP server info
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Transport layer for MCP communication.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and receive a response.
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Send a JSON-RPC notification; no response is expected.
    async fn notify(&self, notification: JsonRpcNotification) -> Result<()>;
}

#[async_trait]
impl McpTransport for Box<dyn McpTransport> {
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        (**self).send(request).await
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        (**self).notify(notification).await
    }
}

/// Extract a JSON-RPC response from an HTTP body that may be either bare
/// JSON or an SSE event stream. With SSE framing, `data:` lines are tried
/// in order until one parses as a response carrying a result or an error,
/// so interleaved server notifications are skipped.
pub fn parse_rpc_body(body: &str) -> Result<JsonRpcResponse> {
    let data_lines: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();

    if data_lines.is_empty() {
        return serde_json::from_str(body.trim())
            .map_err(|e| SwitchboardError::Rpc(format!("unparseable response body: {e}")));
    }

    for payload in &data_lines {
        if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(payload) {
            if response.result.is_some() || response.error.is_some() {
                return Ok(response);
            }
        }
    }

    Err(SwitchboardError::Rpc(
        "event stream carried no JSON-RPC response".to_string(),
    ))
}

/// Transport that talks to an MCP server over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    request_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            request_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, payload: &impl Serialize) -> Result<reqwest::Response> {
        self.client
            .post(&self.url)
            .header(
                reqwest::header::ACCEPT,
                "application/json, text/event-stream",
            )
            .json(payload)
            .send()
            .await
            .map_err(|e| SwitchboardError::Rpc(format!("HTTP request failed: {e}")))
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send(&self, mut request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        // Assign a unique request ID
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        request.id = id;

        let response = self.post(&request).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SwitchboardError::Rpc(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(SwitchboardError::Rpc(format!(
                "server answered {status}: {}",
                body.trim()
            )));
        }

        parse_rpc_body(&body)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        let response = self.post(&notification).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SwitchboardError::Rpc(format!(
                "notification rejected with {status}"
            )));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// MCP client bound to one server endpoint.
///
/// `initialize` must run once before `list_tools` or `call_tool`; after
/// that the client is shared immutably.
pub struct McpClient {
    transport: Box<dyn McpTransport>,
    initialized: bool,
    server_info: Option<ServerInfo>,
}

impl McpClient {
    pub fn new(transport: impl McpTransport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            initialized: false,
            server_info: None,
        }
    }

    /// Run the `initialize` handshake and announce readiness.
    pub async fn initialize(&mut self) -> Result<&ServerInfo> {
        if self.initialized {
            return self
                .server_info
                .as_ref()
                .ok_or_else(|| SwitchboardError::Rpc("server info not available".into()));
        }

        let request = JsonRpcRequest::new(
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
        );

        let response = self.transport.send(request).await?;
        if let Some(error) = response.error {
            return Err(SwitchboardError::Rpc(format!(
                "initialize failed: {}",
                error.message
            )));
        }

        let result: InitializeResult = serde_json::from_value(response.result.unwrap_or_default())
            .map_err(|e| SwitchboardError::Rpc(format!("bad initialize result: {e}")))?;

        self.server_info = Some(result.server_info);
        self.initialized = true;

        // Servers are expected to tolerate a missing initialized
        // notification, so a failure here is not fatal.
        let _ = self
            .transport
            .notify(JsonRpcNotification::new("notifications/initialized"))
            .await;

        self.server_info
            .as_ref()
            .ok_or_else(|| SwitchboardError::Rpc("server info not available".into()))
    }

    /// List the tools this server offers.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>> {
        self.ensure_initialized()?;

        let request = JsonRpcRequest::new("tools/list", None);
        let response = self.transport.send(request).await?;

        if let Some(error) = response.error {
            return Err(SwitchboardError::Rpc(format!(
                "tools/list failed: {}",
                error.message
            )));
        }

        let result: ListToolsResult = serde_json::from_value(response.result.unwrap_or_default())
            .map_err(|e| SwitchboardError::Rpc(format!("bad tools/list result: {e}")))?;

        Ok(result.tools)
    }

    /// Invoke one tool with already-validated arguments.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.ensure_initialized()?;

        let request = JsonRpcRequest::new(
            "tools/call",
            Some(serde_json::json!({
                "name": name,
                "arguments": arguments
            })),
        );

        let response = self.transport.send(request).await?;
        if let Some(error) = response.error {
            return Err(SwitchboardError::Rpc(format!(
                "tools/call failed: {}",
                error.message
            )));
        }

        serde_json::from_value(response.result.unwrap_or_default())
            .map_err(|e| SwitchboardError::Rpc(format!("bad tools/call result: {e}")))
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(SwitchboardError::Rpc(
                "session not initialized".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = JsonRpcRequest::new("tools/list", None);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_notification_has_no_id() {
        let notification = JsonRpcNotification::new("notifications/initialized");
        let json = serde_json::to_string(&notification).unwrap();
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn test_plain_json_body() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#;
        let response = parse_rpc_body(body).unwrap();
        assert_eq!(response.id, Some(1));
        assert!(response.result.is_some());
    }

    #[test]
    fn test_sse_framed_body() {
        let body = concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n",
            "\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{\"isError\":false,\"content\":[]}}\n",
        );
        let response = parse_rpc_body(body).unwrap();
        assert_eq!(response.id, Some(3));
        assert!(response.result.is_some());
    }

    #[test]
    fn test_sse_body_without_response_is_an_error() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n";
        assert!(parse_rpc_body(body).is_err());
    }

    #[test]
    fn test_tool_definition_deserialization() {
        let json = r#"{
            "name": "search_duckduckgo",
            "description": "Search the web",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string"}
                },
                "required": ["query"]
            }
        }"#;

        let tool: McpToolDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "search_duckduckgo");
        assert_eq!(tool.description.as_deref(), Some("Search the web"));
        assert!(tool.input_schema["properties"]["query"].is_object());
    }

    #[test]
    fn test_render_text_flattens_content() {
        let result = CallToolResult {
            content: vec![
                ContentItem::Text {
                    text: "first".into(),
                },
                ContentItem::Image {
                    data: "aGk=".into(),
                    mime_type: None,
                },
                ContentItem::Text {
                    text: "second".into(),
                },
            ],
            is_error: false,
        };
        assert_eq!(result.render_text(), "first\n[image]\nsecond");
    }

    #[test]
    fn test_error_results_deserialize() {
        let json = r#"{"content":[{"type":"text","text":"Invalid zodiac sign: Ophiuchus"}],"isError":true}"#;
        let result: CallToolResult = serde_json::from_str(json).unwrap();
        assert!(result.is_error);
        assert_eq!(result.render_text(), "Invalid zodiac sign: Ophiuchus");
    }
}
