//! Tool registry: discovery of remote tools and schema-validated invocation.
//!
//! The registry is built once at startup by interrogating every configured
//! MCP server, and is read-only afterwards, so concurrent requests can share
//! one instance behind an `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::ServerEndpoint;
use crate::error::{Result, SwitchboardError};
use crate::llm::ToolBinding;
use crate::mcp::{HttpTransport, McpClient, McpToolDefinition, McpTransport};
use crate::schema::InputSchema;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// A remotely-hosted operation the model may request.
///
/// Immutable after discovery; `server` is the logical name of the endpoint
/// that owns the tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: InputSchema,
    pub server: String,
}

/// All tools discovered from the configured servers, keyed by name.
pub struct ToolRegistry {
    descriptors: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
    sessions: HashMap<String, Arc<McpClient>>,
    unreachable: Vec<SwitchboardError>,
    tool_timeout: Duration,
}

impl ToolRegistry {
    /// Discover tools from every configured endpoint over HTTP.
    ///
    /// A server that cannot be reached or interrogated contributes zero
    /// descriptors and is recorded in [`unreachable`](Self::unreachable);
    /// the other servers are still loaded.
    pub async fn discover(
        servers: &BTreeMap<String, ServerEndpoint>,
        tool_timeout: Duration,
    ) -> Self {
        let transports: Vec<(String, HttpTransport)> = servers
            .iter()
            .map(|(name, endpoint)| (name.clone(), HttpTransport::new(endpoint.url.clone())))
            .collect();
        Self::discover_with(transports, tool_timeout).await
    }

    /// Discovery over caller-supplied transports. Entries are interrogated
    /// in order, which decides the winner when two servers advertise the
    /// same tool name.
    pub async fn discover_with<T>(servers: Vec<(String, T)>, tool_timeout: Duration) -> Self
    where
        T: McpTransport + 'static,
    {
        let mut registry = Self {
            descriptors: Vec::new(),
            index: HashMap::new(),
            sessions: HashMap::new(),
            unreachable: Vec::new(),
            tool_timeout,
        };

        for (server, transport) in servers {
            let mut client = McpClient::new(transport);
            let definitions = match interrogate(&mut client, &server).await {
                Ok(definitions) => definitions,
                Err(err) => {
                    warn!(server = %server, error = %err, "tool server unreachable, skipping");
                    registry.unreachable.push(err);
                    continue;
                }
            };

            let mut added = 0usize;
            for definition in definitions {
                if registry.ingest(definition, &server) {
                    added += 1;
                }
            }
            registry.sessions.insert(server.clone(), Arc::new(client));
            info!(server = %server, tools = added, "discovered tools");
        }

        registry
    }

    /// Register one advertised tool. Returns false when the name collides
    /// with an earlier discovery; first-discovered wins and the loss is
    /// logged, never silent.
    fn ingest(&mut self, definition: McpToolDefinition, server: &str) -> bool {
        if let Some(&existing) = self.index.get(&definition.name) {
            warn!(
                tool = %definition.name,
                kept = %self.descriptors[existing].server,
                dropped = %server,
                "duplicate tool name, keeping first discovery"
            );
            return false;
        }

        let schema = InputSchema::from_declared(&definition.input_schema)
            .unwrap_or_else(|| InputSchema::synthesize_for(&definition.name));
        let description = definition
            .description
            .unwrap_or_else(|| format!("MCP tool: {}", definition.name));

        self.index
            .insert(definition.name.clone(), self.descriptors.len());
        self.descriptors.push(ToolDescriptor {
            name: definition.name,
            description,
            schema,
            server: server.to_string(),
        });
        true
    }

    /// Invoke a tool by name and return the normalized text result.
    ///
    /// Arguments are validated against the descriptor's schema before any
    /// network traffic, so a malformed call never reaches the server. The
    /// remote call runs under the registry's per-call timeout, and a result
    /// the server flags as an error surfaces as `RemoteExecution`.
    pub async fn invoke(&self, name: &str, arguments: &Value) -> Result<String> {
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| SwitchboardError::UnknownTool(name.to_string()))?;

        let normalized = descriptor.schema.validate(name, arguments)?;

        let session = self.sessions.get(&descriptor.server).ok_or_else(|| {
            SwitchboardError::Rpc(format!("no session for server `{}`", descriptor.server))
        })?;

        info!(tool = %name, server = %descriptor.server, "invoking tool");
        let result = tokio::time::timeout(self.tool_timeout, session.call_tool(name, normalized))
            .await
            .map_err(|_| SwitchboardError::Timeout {
                tool: name.to_string(),
                secs: self.tool_timeout.as_secs(),
            })??;

        if result.is_error {
            return Err(SwitchboardError::RemoteExecution {
                tool: name.to_string(),
                message: result.render_text(),
            });
        }

        Ok(result.render_text())
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// Descriptors in discovery order.
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Discovery failures recorded during load, one per unreachable server.
    pub fn unreachable(&self) -> &[SwitchboardError] {
        &self.unreachable
    }

    /// Render every tool as a binding the model can be offered.
    pub fn bindings(&self) -> Vec<ToolBinding> {
        self.descriptors
            .iter()
            .map(|d| ToolBinding {
                name: d.name.clone(),
                description: d.description.clone(),
                parameters: d.schema.to_json_schema(),
            })
            .collect()
    }
}

async fn interrogate(client: &mut McpClient, server: &str) -> Result<Vec<McpToolDefinition>> {
    client
        .initialize()
        .await
        .map_err(|err| SwitchboardError::Discovery {
            server: server.to_string(),
            reason: err.to_string(),
        })?;
    client
        .list_tools()
        .await
        .map_err(|err| SwitchboardError::Discovery {
            server: server.to_string(),
            reason: err.to_string(),
        })
}
