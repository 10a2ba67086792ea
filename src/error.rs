use std::process::ExitCode;

/// Errors that cause boss-relay to exit with a specific code.
#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("missing credential: {var} is not set")]
    MissingCredential { var: String },

    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("{tool} timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("{message}")]
    WithCode { code: u8, message: String },
}

impl ExitError {
    pub const fn new(code: u8, message: String) -> Self {
        Self::WithCode { code, message }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::MissingCredential { .. } => ExitCode::from(2),
            Self::ToolNotFound { .. } => ExitCode::from(3),
            Self::Timeout { .. } => ExitCode::from(5),
            Self::WithCode { code, .. } => ExitCode::from(*code),
        }
    }
}
