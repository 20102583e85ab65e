use thiserror::Error;

/// Failure taxonomy shared by the orchestrator, the tools and the gateway.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("tool `{tool}` failed: {message}")]
    ToolExecution { tool: String, message: String },
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("reasoning engine unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("tool `{second}` requested after `{first}` in the same turn")]
    MultiHopRejected { first: String, second: String },
}

impl AgentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution { tool: tool.into(), message: message.into() }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(message.into())
    }

    /// Errors the orchestrator absorbs into a well-formed assistant reply.
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            Self::ToolExecution { .. } | Self::UnknownTool(_) | Self::MultiHopRejected { .. }
        )
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::ToolExecution { .. } => "tool_execution",
            Self::UnknownTool(_) => "unknown_tool",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::MultiHopRejected { .. } => "multi_hop_rejected",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The assistant is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl From<AgentError> for InterfaceError {
    fn from(value: AgentError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            AgentError::Validation(message) => Self::BadRequest { message, correlation_id },
            AgentError::UpstreamUnavailable(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            other @ (AgentError::ToolExecution { .. }
            | AgentError::UnknownTool(_)
            | AgentError::MultiHopRejected { .. }) => {
                Self::Internal { message: other.to_string(), correlation_id }
            }
        }
    }
}
