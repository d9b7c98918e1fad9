use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("{context}: http {status}")]
    Remote { status: u16, context: String },
    #[error("no daily note exists for the requested date")]
    NoteNotFound,
    #[error("Schedule state unavailable: {0}")]
    State(String),
}

impl InfraError {
    pub fn remote(status: u16, context: impl Into<String>) -> Self {
        Self::Remote {
            status,
            context: context.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            Self::NoteNotFound => Some(404),
            _ => None,
        }
    }
}
