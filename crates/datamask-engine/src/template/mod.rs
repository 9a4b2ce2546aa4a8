//! Minimal Jinja-style template language for substitution rules.
//!
//! Templates only see `value`, `row`, `env`, `gen` and the helpers listed in
//! [`helpers::HELPERS`]; there is no access to anything else in the host.

mod ast;
mod error;
mod eval;
pub mod helpers;
mod parser;

pub use ast::{Expr, Segment, Template};
pub use error::TemplateError;
pub use eval::{Bindings, GeneratorScope, render};
pub use parser::parse_template;
