//! Core contracts shared across datamask crates.
//!
//! This crate defines the scalar value model fed into the substitution
//! engine, the serialized rule format consumed from configuration, and small
//! helpers (errors, connection-string redaction) used by the adapters and CLI.

pub mod atomic;
pub mod error;
pub mod redaction;
pub mod rule;
pub mod value;

pub use error::{Error, Result};
pub use redaction::redact_connection_string;
pub use rule::{GeneratorSpec, RuleSpec, UNIQUE_PREFIX, split_unique};
pub use value::Scalar;

/// Prefix of the placeholder emitted for generator names missing from the registry.
pub const INVALID_GENERATOR_MARKER: &str = "INVALID_FAKER_METHOD";

/// Placeholder substituted when a rule names a generator the registry does not know.
pub fn invalid_generator_placeholder(name: &str) -> String {
    format!("{INVALID_GENERATOR_MARKER}({name})")
}
