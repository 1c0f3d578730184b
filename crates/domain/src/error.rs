/// Shared error type used across all sessiongate crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("config: {0}")]
    Config(String),

    #[error("session with ID {0} already exists")]
    DuplicateSession(String),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("lifecycle hook: {0}")]
    Hook(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("browser: {0}")]
    Browser(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("URL {0} is not whitelisted")]
    UrlNotAllowed(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
