use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("session store: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("session store lock poisoned")]
    StoreLock,

    #[error("configuration: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing {0}")]
    Missing(&'static str),

    #[error("empty response from {0}")]
    EmptyResponse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
