use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoLensError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("A run is already in progress")]
    RunActive,

    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RepoLensError>;
