use thiserror::Error;

/// Template failures. Both kinds are configuration mistakes and stop the run.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template syntax error at {line}:{column}: {message} (template: {template:?})")]
    Syntax {
        template: String,
        line: usize,
        column: usize,
        message: String,
    },
    #[error("template render error: {message} (template: {template:?})")]
    Render { template: String, message: String },
}
