use crate::error::{Result, SwitchboardError};
use crate::message::{Message, ToolCall};

/// In-memory transcript of one routed query.
///
/// Tracks the messages exchanged with the model, which tools the model
/// asked for, and which of those requests still await a result.
#[derive(Debug, Clone)]
pub struct ConversationState {
    messages: Vec<Message>,
    tools_called: Vec<String>,
}

impl ConversationState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::human(query)],
            tools_called: Vec::new(),
        }
    }

    /// Append an assistant turn. Every requested tool call is recorded in
    /// `tools_called` at request time, whether or not it later succeeds.
    pub fn push_assistant(&mut self, text: impl Into<String>, tool_calls: Vec<ToolCall>) {
        for call in &tool_calls {
            self.tools_called.push(call.name.clone());
        }
        self.messages
            .push(Message::assistant_with_calls(text, tool_calls));
    }

    /// Append the result of one tool call. The `call_id` must match a
    /// pending request; anything else leaves the transcript untouched.
    pub fn record_tool_result(
        &mut self,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<()> {
        let call_id = call_id.into();
        if !self.pending_calls().iter().any(|c| c.id == call_id) {
            return Err(SwitchboardError::Transcript(format!(
                "tool result does not answer any pending call (id `{call_id}`)"
            )));
        }
        self.messages
            .push(Message::tool_result(call_id, tool_name, text));
        Ok(())
    }

    /// Tool calls requested by the model that have no result yet, oldest first.
    pub fn pending_calls(&self) -> Vec<&ToolCall> {
        let answered: Vec<&str> = self
            .messages
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();

        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Assistant { tool_calls, .. } => Some(tool_calls.iter()),
                _ => None,
            })
            .flatten()
            .filter(|call| !answered.contains(&call.id.as_str()))
            .collect()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Names of every tool the model requested, in request order,
    /// duplicates preserved.
    pub fn tools_called(&self) -> &[String] {
        &self.tools_called
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_transcript_starts_with_the_query() {
        let state = ConversationState::new("what is rust?");
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].text(), "what is rust?");
        assert!(state.tools_called().is_empty());
    }

    #[test]
    fn requested_tools_are_recorded_with_duplicates() {
        let mut state = ConversationState::new("compare two searches");
        state.push_assistant(
            "",
            vec![
                ToolCall::new("search_duckduckgo", json!({"query": "a"})),
                ToolCall::new("search_duckduckgo", json!({"query": "b"})),
            ],
        );
        assert_eq!(
            state.tools_called(),
            &["search_duckduckgo", "search_duckduckgo"]
        );
        assert_eq!(state.pending_calls().len(), 2);
    }

    #[test]
    fn results_answer_pending_calls() {
        let mut state = ConversationState::new("horoscope please");
        let call = ToolCall::new("get_horoscope", json!({"zodiac_sign": "Leo"}));
        let id = call.id.clone();
        state.push_assistant("", vec![call]);

        state
            .record_tool_result(id.clone(), "get_horoscope", "a fine day")
            .unwrap();
        assert!(state.pending_calls().is_empty());

        // A second result for the same id has nothing left to answer.
        let err = state
            .record_tool_result(id, "get_horoscope", "again")
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::Transcript(_)));
    }

    #[test]
    fn results_for_unknown_ids_are_rejected() {
        let mut state = ConversationState::new("hello");
        let err = state
            .record_tool_result("call_missing", "search_duckduckgo", "noise")
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::Transcript(_)));
        assert!(state.messages().len() == 1);
    }
}
