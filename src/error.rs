//! Error types shared by the engine client, the catalogs and the job pipeline.

/// Result type alias for pier operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to the container engine or managing jobs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No engine candidate produced a usable connection. Carries one diagnostic
    /// per candidate that was tried.
    #[error("no usable container engine:\n{0}")]
    Configuration(String),

    /// The engine answered but its version is too old or unparsable.
    #[error("unsupported engine version '{version}': {reason}")]
    Version { version: String, reason: String },

    /// The connection to the engine failed (socket, ping, timeout).
    #[error("engine transport error: {0}")]
    Transport(String),

    /// The engine understood the request and refused it.
    #[error("engine error: {message}")]
    Engine { status: Option<u16>, message: String },

    /// A service or job lookup missed.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The request is malformed (missing ports, bad build context, ...).
    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn engine(message: impl Into<String>) -> Self {
        Error::Engine {
            status: None,
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True when the failure is about reaching the engine rather than about
    /// what was asked of it. Callers use this to decide whether a reconnect
    /// could help.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Engine { status, .. } => *status == Some(404),
            _ => false,
        }
    }
}
