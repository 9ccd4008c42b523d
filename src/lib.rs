//! An agentic query router: a language model decides whether to answer a
//! query directly or call tools hosted on remote MCP servers.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with a Groq-backed client.
//! - MCP discovery and invocation over HTTP (`McpClient`, `ToolRegistry`).
//! - A `QueryRouter` that loops between the model and tools until it can answer.

mod config;
mod error;
mod llm;
mod mcp;
mod memory;
mod message;
mod registry;
mod router;
mod schema;

#[cfg(feature = "server")]
pub mod server;

pub use config::{AppConfig, ModelConfig, RouterConfig, ServerConfig, ServerEndpoint};
pub use error::{Result, SwitchboardError};
pub use llm::{GroqClient, LanguageModel, ModelCompletion, StubModel, ToolBinding};
pub use mcp::{
    parse_rpc_body, CallToolResult, ContentItem, HttpTransport, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpClient, McpToolDefinition,
    McpTransport, ServerCapabilities, ServerInfo, PROTOCOL_VERSION,
};
pub use memory::ConversationState;
pub use message::{Message, ToolCall};
pub use registry::{ToolDescriptor, ToolRegistry, DEFAULT_TOOL_TIMEOUT};
pub use router::{LoopState, QueryOutcome, QueryRouter, DEFAULT_MAX_MODEL_TURNS};
pub use schema::{FieldKind, FieldSpec, InputSchema, HOROSCOPE_TYPES, ZODIAC_SIGNS};
