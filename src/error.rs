use thiserror::Error;

/// Failure classes surfaced by the flow buttons and the inventory tool.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("No records selected")]
    NoSelection,

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Invalid record reference: {0}")]
    InvalidRecord(String),

    #[error("Configuration value not found: {0}")]
    ConfigNotFound(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("{0}")]
    Query(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("UI error: {0}")]
    Ui(String),
}

impl From<reqwest::Error> for FlowError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FlowError::Timeout
        } else {
            FlowError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        FlowError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
