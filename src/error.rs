use thiserror::Error;

/// Failures from the external anomaly scorer. Always recovered inside the
/// evaluator as a zero severity contribution.
#[derive(Error, Debug)]
pub enum ScorerError {
    #[error("malformed scorer output: {0}")]
    Malformed(String),

    #[error("scorer inference failed: {0}")]
    Inference(String),
}

/// Root error type for the telemetry link.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Request payload could not be decoded.
    #[error("{0}")]
    Protocol(String),

    /// `latest`/`previous` read before any append.
    #[error("telemetry history is empty")]
    HistoryEmpty,

    /// Navigation or obstacle collaborator failed.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        LinkError::Protocol(e.to_string())
    }
}

pub type LinkResult<T> = Result<T, LinkError>;
