use thiserror::Error;

/// Core error type shared across datamask crates.
#[derive(Debug, Error)]
pub enum Error {
    /// A value could not be represented as a scalar.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),
    /// A rule specification is malformed.
    #[error("invalid rule: {0}")]
    InvalidRule(String),
}

/// Convenience alias for results returned by datamask crates.
pub type Result<T> = std::result::Result<T, Error>;
