use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown domain key: {0}")]
    UnknownDomain(String),

    #[error("unknown analysis type: {0}")]
    UnknownAnalysisType(String),
}
