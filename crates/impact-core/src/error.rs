use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImpactError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ImpactResult<T> = Result<T, ImpactError>;
