use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use datamask_core::Scalar;

use crate::faker::LocaleKey;

pub const DEFAULT_UNIQUE_MAX_ATTEMPTS: usize = 1000;

/// Options for the substitution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Locale used by text generators.
    pub locale: LocaleKey,
    /// Seed for the engine RNG; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Render template rules for empty-string originals instead of passing them through.
    pub render_templates_for_empty: bool,
    /// Fresh candidates drawn for a `unique/` rule before falling back to a suffix.
    pub unique_max_attempts: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            locale: LocaleKey::default(),
            seed: None,
            render_templates_for_empty: false,
            unique_max_attempts: DEFAULT_UNIQUE_MAX_ATTEMPTS,
        }
    }
}

/// Row or element context visible to template rules as `row`.
///
/// Adapters insert each substitute back under its field key, so later fields
/// of the same row observe earlier substitutions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderContext {
    pub row: BTreeMap<String, Scalar>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Scalar) {
        self.row.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.row.get(key)
    }
}

impl<K: Into<String>> FromIterator<(K, Scalar)> for RenderContext {
    fn from_iter<I: IntoIterator<Item = (K, Scalar)>>(iter: I) -> Self {
        Self {
            row: iter.into_iter().map(|(key, value)| (key.into(), value)).collect(),
        }
    }
}

/// Counters collected while anonymizing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub generator_usage: BTreeMap<String, u64>,
    pub template_renders: u64,
    pub invalid_generator_count: u64,
    pub passthrough_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl EngineStats {
    pub fn record_generator_usage(&mut self, id: &str) {
        *self.generator_usage.entry(id.to_string()).or_insert(0) += 1;
    }

    pub fn record_template_render(&mut self) {
        self.template_renders += 1;
    }

    pub fn record_invalid_generator(&mut self) {
        self.invalid_generator_count += 1;
    }

    pub fn record_passthrough(&mut self) {
        self.passthrough_count += 1;
    }
}
