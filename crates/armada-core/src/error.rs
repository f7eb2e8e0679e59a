use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArmadaError {
    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Workflow errors
    #[error("Invalid workflow definition: {0}")]
    InvalidWorkflow(String),

    // Agent errors
    #[error("Agent invocation failed: {capability}: {message}")]
    AgentInvocation { capability: String, message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArmadaError {
    /// Shorthand for an invocation failure reported by a collaborator.
    pub fn invocation(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AgentInvocation {
            capability: capability.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArmadaError>;
