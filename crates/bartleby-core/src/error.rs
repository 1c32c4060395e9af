use thiserror::Error;

/// Failure taxonomy shared by every layer of the core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced entity id does not resolve.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    /// Malformed or self-referential input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A duplicate link between a pair of cards.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Durable write or read failure. Never retried internally.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn card_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "card",
            id: id.to_string(),
        }
    }

    pub fn link_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "link",
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code for the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("malformed stored json: {err}"))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
