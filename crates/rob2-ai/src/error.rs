use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("model call timed out after {0}s")]
    Timeout(u64),

    #[error("no JSON object found in model response")]
    NoJson,

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected response shape: {0}")]
    Shape(String),

    #[error("model call failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<LlmError> },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("invalid review standards file {path}: {source}")]
    Standards {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}
