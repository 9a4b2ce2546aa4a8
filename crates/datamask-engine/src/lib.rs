//! Value-substitution engine for datamask.
//!
//! Adapters hand this crate one scalar at a time together with a resolved
//! rule; the engine returns the substitute, keeping repeated originals mapped
//! to the same substitute through the [`ConsistencyCache`].

pub mod cache;
pub mod engine;
pub mod errors;
pub mod faker;
pub mod generators;
pub mod model;
pub mod params;
pub mod rule;
pub mod template;

pub use cache::ConsistencyCache;
pub use engine::SubstitutionEngine;
pub use errors::EngineError;
pub use faker::LocaleKey;
pub use generators::{GeneratorInfo, GeneratorRegistry};
pub use model::{EngineOptions, EngineStats, RenderContext};
pub use rule::{GeneratorRule, ResolvedRule};
pub use template::TemplateError;
