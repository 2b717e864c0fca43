use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Session already registered: {0}")]
    DuplicateSession(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid mode: {0}. Must be one of: plan, research, execute")]
    InvalidMode(String),

    #[error("Request too large")]
    RequestTooLarge,

    #[error("Invalid JSON: {0}")]
    InvalidRequest(#[from] serde_json::Error),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Channel(String),
}
