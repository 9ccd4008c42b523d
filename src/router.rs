//! The control loop that alternates between the model and remote tools.
//!
//! One routed query walks an explicit state machine:
//!
//! ```text
//! AskModel ──(tool calls requested)──> InvokeTools ──> AskModel
//!     │
//!     └──(no tool calls, or turn budget spent)──> Fallback ──> Done
//! ```
//!
//! The fallback turn is issued without tool bindings, so the terminal model
//! turn structurally cannot request further tools. The turn budget bounds
//! the `AskModel ⇄ InvokeTools` cycle, which otherwise has no limit.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::llm::LanguageModel;
use crate::memory::ConversationState;
use crate::message::{Message, ToolCall};
use crate::registry::ToolRegistry;

pub const DEFAULT_MAX_MODEL_TURNS: usize = 6;

/// Phases of one routed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AskModel,
    InvokeTools,
    Fallback,
    Done,
}

/// Final product of the control loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    /// Text of the terminal assistant turn.
    pub answer: String,
    /// Every tool name the model requested, in request order, duplicates
    /// preserved. Requests that later failed still appear.
    pub tools_called: Vec<String>,
    /// True when the loop was cut short by the turn budget and the answer
    /// came from the forced fallback turn.
    pub budget_exhausted: bool,
}

/// Routes one query at a time through the model and the tool registry.
///
/// Holds no per-query state, so a single router can serve concurrent
/// requests; each call to [`route`](Self::route) owns its own transcript.
pub struct QueryRouter<M: LanguageModel> {
    model: Arc<M>,
    registry: Arc<ToolRegistry>,
    max_model_turns: usize,
}

impl<M: LanguageModel> QueryRouter<M> {
    pub fn new(model: Arc<M>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            registry,
            max_model_turns: DEFAULT_MAX_MODEL_TURNS,
        }
    }

    /// Cap on tool-bound model turns per query. The fallback turn is not
    /// counted; it always runs exactly once.
    pub fn with_max_model_turns(mut self, max_model_turns: usize) -> Self {
        self.max_model_turns = max_model_turns.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Drive one query to completion.
    ///
    /// Tool failures are folded into the transcript as result text for the
    /// model to react to; only model transport failures abort the request.
    pub async fn route(&self, query: impl Into<String>) -> Result<QueryOutcome> {
        let mut conversation = ConversationState::new(query);
        let bindings = self.registry.bindings();
        let mut tool_turns = 0usize;
        let mut budget_exhausted = false;
        let mut state = LoopState::AskModel;

        loop {
            state = match state {
                LoopState::AskModel => {
                    if tool_turns >= self.max_model_turns {
                        warn!(
                            max_model_turns = self.max_model_turns,
                            "turn budget exhausted, forcing a tool-free turn"
                        );
                        budget_exhausted = true;
                        LoopState::Fallback
                    } else {
                        tool_turns += 1;
                        info!(
                            turn = tool_turns,
                            messages = conversation.messages().len(),
                            "asking model"
                        );
                        let completion = self
                            .model
                            .complete(conversation.messages(), &bindings)
                            .await?;
                        let requested = completion.tool_calls.len();
                        conversation.push_assistant(
                            completion.text.unwrap_or_default(),
                            completion.tool_calls,
                        );
                        if requested == 0 {
                            LoopState::Fallback
                        } else {
                            info!(requested, "model requested tool calls");
                            LoopState::InvokeTools
                        }
                    }
                }
                LoopState::InvokeTools => {
                    let pending: Vec<ToolCall> = conversation
                        .pending_calls()
                        .into_iter()
                        .cloned()
                        .collect();
                    let outcomes =
                        join_all(pending.iter().map(|call| self.invoke_captured(call))).await;
                    for (call, outcome) in pending.iter().zip(outcomes) {
                        conversation.record_tool_result(
                            call.id.clone(),
                            call.name.clone(),
                            outcome?,
                        )?;
                    }
                    LoopState::AskModel
                }
                LoopState::Fallback => {
                    info!("issuing tool-free fallback turn");
                    let completion = self.model.complete(conversation.messages(), &[]).await?;
                    // No bindings were offered, so any tool request here is a
                    // provider bug; the text stands as the terminal answer.
                    conversation.push_assistant(
                        completion.text.unwrap_or_default(),
                        Vec::new(),
                    );
                    LoopState::Done
                }
                LoopState::Done => break,
            };
        }

        let answer = conversation
            .messages()
            .iter()
            .rev()
            .find_map(|message| match message {
                Message::Assistant { text, .. } => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_default();

        Ok(QueryOutcome {
            answer,
            tools_called: conversation.tools_called().to_vec(),
            budget_exhausted,
        })
    }

    /// Run one tool call, folding invocation failures into result text so
    /// the model sees them on its next turn.
    async fn invoke_captured(&self, call: &ToolCall) -> Result<String> {
        match self.registry.invoke(&call.name, &call.arguments).await {
            Ok(text) => Ok(text),
            Err(err) if err.is_invocation_error() => {
                warn!(tool = %call.name, error = %err, "tool call failed");
                Ok(err.to_string())
            }
            Err(err) => Err(err),
        }
    }
}
