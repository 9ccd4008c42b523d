//! Transcript building blocks exchanged with the language model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A model-issued request to invoke one tool with JSON arguments.
///
/// The correlation `id` ties the eventual tool result back to this request.
/// Providers that omit ids get a generated one so the pairing always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }

    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One entry in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// The user's query.
    Human { text: String },
    /// A model turn: free text plus zero or more requested tool calls.
    Assistant {
        text: String,
        tool_calls: Vec<ToolCall>,
    },
    /// The outcome of one tool call, answering a prior assistant request.
    ToolResult {
        call_id: String,
        tool_name: String,
        text: String,
    },
}

impl Message {
    pub fn human(text: impl Into<String>) -> Self {
        Message::Human { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Message::Assistant {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            text: text.into(),
            tool_calls,
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Message::ToolResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            text: text.into(),
        }
    }

    /// The textual content of the message, whatever the variant.
    pub fn text(&self) -> &str {
        match self {
            Message::Human { text } => text,
            Message::Assistant { text, .. } => text,
            Message::ToolResult { text, .. } => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_call_ids_are_unique() {
        let a = ToolCall::new("search", json!({"query": "rust"}));
        let b = ToolCall::new("search", json!({"query": "rust"}));
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("call_"));
    }

    #[test]
    fn serializes_with_role_tag() {
        let msg = Message::human("hello");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "human");
        assert_eq!(value["text"], "hello");
    }
}
