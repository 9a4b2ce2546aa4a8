use thiserror::Error;

use crate::template::TemplateError;

/// Errors emitted by the substitution engine.
///
/// Only configuration mistakes surface here; per-value problems such as an
/// unknown generator name degrade to a placeholder instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("engine state lock poisoned")]
    StatePoisoned,
}
