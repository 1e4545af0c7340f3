use chain_sol::SolError;
use thiserror::Error;

/// Errors surfaced by quadratic-funding workflows and queries.
#[derive(Debug, Error)]
pub enum QfError {
    #[error("account not found: {0}")]
    NotFound(String),

    #[error("decode mismatch: {0}")]
    DecodeMismatch(String),

    /// A client-side check failed before anything was submitted.
    #[error("precondition unmet: {step} required first ({detail})")]
    PreconditionUnmet { step: String, detail: String },

    /// The engine refused the batch. `message` is passed through verbatim.
    #[error("engine rejected transaction: {message}")]
    EngineRejection { message: String, logs: Vec<String> },

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, QfError>;

impl From<SolError> for QfError {
    fn from(e: SolError) -> Self {
        match e {
            SolError::InvalidAccountData(msg) => QfError::DecodeMismatch(msg),
            other => QfError::TransactionBuild(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for QfError {
    fn from(e: reqwest::Error) -> Self {
        QfError::TransportFailure(e.to_string())
    }
}

impl From<serde_json::Error> for QfError {
    fn from(e: serde_json::Error) -> Self {
        QfError::TransportFailure(format!("malformed response: {e}"))
    }
}
