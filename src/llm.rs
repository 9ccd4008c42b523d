//! Language model abstraction and providers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::ModelConfig;
use crate::error::{Result, SwitchboardError};
use crate::message::{Message, ToolCall};

/// A tool offered to the model for one completion: name, description, and a
/// JSON Schema for its arguments. An empty binding slice means the model
/// cannot request tools on that turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolBinding {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Result of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelCompletion {
    /// A completion that answers in plain text and requests no tools.
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A completion that requests the given tool calls.
    pub fn request_tools(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls,
        }
    }
}

/// Minimal abstraction around a chat completion provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolBinding],
    ) -> Result<ModelCompletion>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> SwitchboardError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return SwitchboardError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    SwitchboardError::LanguageModel(format!("{provider} request failed with {status}: {body}"))
}

fn serialize_tool_arguments(args: &Value) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| args.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Groq Client (OpenAI-compatible API)
// ─────────────────────────────────────────────────────────────────────────────

/// Groq client - uses OpenAI-compatible API with Groq's endpoint.
/// Default model: llama-3.3-70b-versatile
#[derive(Clone)]
pub struct GroqClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl GroqClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("failed to build http client"),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key: api_key.into(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| SwitchboardError::LanguageModel("GROQ_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("GROQ_API_KEY").ok())
            .ok_or_else(|| {
                SwitchboardError::LanguageModel(
                    "missing Groq API key: set model.api_key or GROQ_API_KEY".into(),
                )
            })?;
        let mut client = Self::new(api_key);
        if !cfg.model.is_empty() {
            client = client.with_model(cfg.model.clone());
        }
        if let Some(base_url) = &cfg.base_url {
            client = client.with_base_url(base_url.clone());
        }
        Ok(client)
    }

    /// Build the chat completion payload. The `tools` and `tool_choice`
    /// fields are omitted entirely when no bindings are supplied, which is
    /// what makes a tool-free turn tool-free.
    fn chat_payload(&self, messages: &[Message], tools: &[ToolBinding]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": to_wire_messages(messages),
        });

        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters
                        }
                    })
                })
                .collect();
            body["tools"] = json!(wire_tools);
            body["tool_choice"] = json!("auto");
        }

        body
    }
}

/// Convert a transcript into OpenAI-shaped chat messages.
fn to_wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| match message {
            Message::Human { text } => json!({
                "role": "user",
                "content": text
            }),
            Message::Assistant { text, tool_calls } if tool_calls.is_empty() => json!({
                "role": "assistant",
                "content": text
            }),
            Message::Assistant { text, tool_calls } => {
                let calls: Vec<Value> = tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": serialize_tool_arguments(&call.arguments)
                            }
                        })
                    })
                    .collect();
                json!({
                    "role": "assistant",
                    "content": if text.is_empty() { Value::Null } else { Value::String(text.clone()) },
                    "tool_calls": calls
                })
            }
            Message::ToolResult { call_id, text, .. } => json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": text
            }),
        })
        .collect()
}

#[async_trait]
impl LanguageModel for GroqClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolBinding],
    ) -> Result<ModelCompletion> {
        let body = self.chat_payload(messages, tools);

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SwitchboardError::LanguageModel(format!("Groq request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "Groq"));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| SwitchboardError::LanguageModel(format!("Groq parse error: {e}")))?;

        let choice = &json["choices"][0]["message"];
        let text = choice["content"].as_str().map(String::from);

        let mut tool_calls = Vec::new();
        if let Some(calls) = choice["tool_calls"].as_array() {
            for call in calls {
                let name = call["function"]["name"].as_str().unwrap_or("").to_string();
                let args_str = call["function"]["arguments"].as_str().unwrap_or("{}");
                let args: Value = serde_json::from_str(args_str).unwrap_or(json!({}));
                let tool_call = match call["id"].as_str() {
                    Some(id) => ToolCall::with_id(id, name, args),
                    None => ToolCall::new(name, args),
                };
                tool_calls.push(tool_call);
            }
        }

        Ok(ModelCompletion { text, tool_calls })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stub model
// ─────────────────────────────────────────────────────────────────────────────

/// A deterministic model used for tests and demos.
///
/// Plays back a scripted sequence of completions; it records how many tool
/// bindings each call carried and the transcript it last saw, so a test can
/// assert which turns were tool-free and what context the final turn had.
pub struct StubModel {
    script: Mutex<VecDeque<ModelCompletion>>,
    bindings_seen: Mutex<Vec<usize>>,
    last_transcript: Mutex<Vec<Message>>,
}

impl StubModel {
    pub fn new(script: Vec<ModelCompletion>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            bindings_seen: Mutex::new(Vec::new()),
            last_transcript: Mutex::new(Vec::new()),
        })
    }

    /// Number of tool bindings supplied on each call, in call order.
    pub fn bindings_seen(&self) -> Vec<usize> {
        self.bindings_seen
            .lock()
            .expect("stub model poisoned")
            .clone()
    }

    /// The transcript supplied to the most recent call.
    pub fn last_transcript(&self) -> Vec<Message> {
        self.last_transcript
            .lock()
            .expect("stub model poisoned")
            .clone()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolBinding],
    ) -> Result<ModelCompletion> {
        self.bindings_seen
            .lock()
            .expect("stub model poisoned")
            .push(tools.len());
        *self.last_transcript.lock().expect("stub model poisoned") = messages.to_vec();
        self.script
            .lock()
            .expect("stub model poisoned")
            .pop_front()
            .ok_or_else(|| {
                SwitchboardError::LanguageModel("StubModel ran out of scripted turns".into())
            })
    }
}
