use thiserror::Error;

use datamask_engine::EngineError;

/// Errors raised while reading, anonymizing or writing a data source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("xml error: {0}")]
    Xml(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A field location that does not fit the source or cannot be parsed.
    #[error("invalid location: {0}")]
    InvalidLocation(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<datamask_core::Error> for SourceError {
    fn from(err: datamask_core::Error) -> Self {
        SourceError::InvalidLocation(err.to_string())
    }
}
