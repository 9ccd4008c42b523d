use thiserror::Error;

pub type Result<T> = std::result::Result<T, SwitchboardError>;

#[derive(Debug, Error)]
pub enum SwitchboardError {
    /// A configured tool server could not be reached or interrogated during
    /// registry load. Recorded per server; the load itself still succeeds.
    #[error("discovery failed for server `{server}`: {reason}")]
    Discovery { server: String, reason: String },

    #[error("tool `{0}` is not registered")]
    UnknownTool(String),

    #[error("invalid arguments for tool `{tool}`: {reason}")]
    Validation { tool: String, reason: String },

    /// The tool server answered, but flagged the result as an error.
    #[error("tool `{tool}` reported: {message}")]
    RemoteExecution { tool: String, message: String },

    #[error("tool `{tool}` timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("language model error: {0}")]
    LanguageModel(String),

    /// Transport or JSON-RPC level failure talking to a tool server.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// A transcript invariant was violated, e.g. a tool result that does not
    /// answer a pending call.
    #[error("transcript error: {0}")]
    Transcript(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SwitchboardError {
    /// Whether the error belongs to a single tool invocation rather than the
    /// request as a whole. Invocation errors are folded into the transcript
    /// as tool-result text so the model can react; everything else aborts
    /// the request.
    pub fn is_invocation_error(&self) -> bool {
        matches!(
            self,
            SwitchboardError::UnknownTool(_)
                | SwitchboardError::Validation { .. }
                | SwitchboardError::RemoteExecution { .. }
                | SwitchboardError::Timeout { .. }
                | SwitchboardError::Rpc(_)
        )
    }
}
