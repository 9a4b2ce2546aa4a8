use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use datamask_core::{RuleSpec, Scalar, invalid_generator_placeholder, split_unique};

use crate::cache::ConsistencyCache;
use crate::errors::EngineError;
use crate::generators::{GeneratorContext, GeneratorRegistry};
use crate::model::{EngineOptions, EngineStats, RenderContext};
use crate::rule::{GeneratorRule, ResolvedRule, resolve_rule};
use crate::template::{Bindings, GeneratorScope, render};

/// Mutable engine state, guarded by a single lock so concurrent callers
/// serialize on cache lookups and generator draws.
struct EngineState {
    cache: ConsistencyCache,
    rng: ChaCha8Rng,
    stats: EngineStats,
    warned_generators: HashSet<String>,
}

/// Composition root of the substitution core.
///
/// Every adapter funnels values through [`SubstitutionEngine::anonymize_scalar`];
/// the engine knows nothing about files, documents or tables.
pub struct SubstitutionEngine {
    registry: GeneratorRegistry,
    options: EngineOptions,
    env: BTreeMap<String, Scalar>,
    state: Mutex<EngineState>,
}

impl SubstitutionEngine {
    pub fn new(options: EngineOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        let registry = GeneratorRegistry::new();
        let env = std::env::vars()
            .map(|(key, value)| (key, Scalar::Text(value)))
            .collect();
        debug!(
            locale = %options.locale,
            seeded = options.seed.is_some(),
            generators = registry.len(),
            "substitution engine ready"
        );
        Self {
            registry,
            options,
            env,
            state: Mutex::new(EngineState {
                cache: ConsistencyCache::new(),
                rng,
                stats: EngineStats::default(),
                warned_generators: HashSet::new(),
            }),
        }
    }

    /// Replace the environment visible to templates as `env`.
    pub fn with_env(mut self, env: BTreeMap<String, Scalar>) -> Self {
        self.env = env;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn registry(&self) -> &GeneratorRegistry {
        &self.registry
    }

    /// Validate params and compile templates once per configured field.
    pub fn resolve_rule(&self, spec: &RuleSpec) -> Result<ResolvedRule, EngineError> {
        resolve_rule(spec, &self.registry)
    }

    /// Substitute for one original value.
    pub fn anonymize_scalar(
        &self,
        value: &Scalar,
        rule: &ResolvedRule,
        context: &RenderContext,
    ) -> Result<Scalar, EngineError> {
        let mut state = self.lock()?;
        let mut evaluator = RuleEvaluator {
            registry: &self.registry,
            options: &self.options,
            env: &self.env,
            state: &mut *state,
        };
        evaluator.anonymize(value, rule, context)
    }

    /// Replace the cache with the one persisted at `path` and return its size.
    /// Missing or malformed files yield an empty cache.
    pub fn load_cache(&self, path: &Path) -> Result<usize, EngineError> {
        let cache = ConsistencyCache::load(path);
        let entries = cache.len();
        self.lock()?.cache = cache;
        Ok(entries)
    }

    /// Persist the cache. Returns `false` when writing failed; the failure is
    /// logged and the run can continue.
    pub fn save_cache(&self, path: &Path) -> Result<bool, EngineError> {
        let state = self.lock()?;
        match state.cache.save(path) {
            Ok(()) => {
                debug!(path = %path.display(), entries = state.cache.len(), "cache saved");
                Ok(true)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to save cache");
                Ok(false)
            }
        }
    }

    pub fn cache_len(&self) -> Result<usize, EngineError> {
        Ok(self.lock()?.cache.len())
    }

    pub fn cached(&self, generator: &str, original: &str) -> Result<Option<Scalar>, EngineError> {
        Ok(self.lock()?.cache.lookup(generator, original).cloned())
    }

    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        let state = self.lock()?;
        let mut stats = state.stats.clone();
        stats.cache_hits = state.cache.hits();
        stats.cache_misses = state.cache.misses();
        Ok(stats)
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>, EngineError> {
        self.state.lock().map_err(|_| EngineError::StatePoisoned)
    }
}

/// Interprets one rule against one original value, with the engine state
/// borrowed for the duration of the call.
struct RuleEvaluator<'a> {
    registry: &'a GeneratorRegistry,
    options: &'a EngineOptions,
    env: &'a BTreeMap<String, Scalar>,
    state: &'a mut EngineState,
}

impl RuleEvaluator<'_> {
    fn anonymize(
        &mut self,
        value: &Scalar,
        rule: &ResolvedRule,
        context: &RenderContext,
    ) -> Result<Scalar, EngineError> {
        if value.is_sentinel() {
            let render_empty = matches!(rule, ResolvedRule::Template(_))
                && self.options.render_templates_for_empty
                && !value.is_null();
            if !render_empty {
                self.state.stats.record_passthrough();
                return Ok(value.clone());
            }
        }

        match rule {
            ResolvedRule::Generator(rule) => self.generate_rule(rule, value),
            ResolvedRule::Template(template) => {
                self.state.stats.record_template_render();
                let bindings = Bindings {
                    value,
                    row: &context.row,
                    env: self.env,
                };
                render(template, bindings, self)
            }
        }
    }

    fn generate_rule(
        &mut self,
        rule: &GeneratorRule,
        value: &Scalar,
    ) -> Result<Scalar, EngineError> {
        let generator = match self.registry.get(&rule.name) {
            Some(generator) if rule.known => generator,
            _ => return Ok(self.invalid_generator(&rule.name)),
        };
        let Some(key) = value.cache_key() else {
            self.state.stats.record_passthrough();
            return Ok(Scalar::Null);
        };

        let ctx = GeneratorContext {
            locale: self.options.locale,
        };
        let params = rule.params.as_ref();
        let EngineState {
            cache, rng, stats, ..
        } = &mut *self.state;
        let substitute = if rule.unique {
            cache.get_or_create_unique(
                &rule.name,
                &key,
                self.options.unique_max_attempts,
                || generator.generate(&ctx, params, rng),
            )?
        } else {
            cache.get_or_create(&rule.name, &key, || generator.generate(&ctx, params, rng))?
        };
        stats.record_generator_usage(&rule.name);
        Ok(substitute)
    }

    fn invalid_generator(&mut self, name: &str) -> Scalar {
        self.state.stats.record_invalid_generator();
        if self.state.warned_generators.insert(name.to_string()) {
            warn!(generator = name, "unknown generator; emitting placeholder");
        }
        Scalar::Text(invalid_generator_placeholder(name))
    }
}

impl GeneratorScope for RuleEvaluator<'_> {
    fn generate(&mut self, generator: &str, value: &Scalar) -> Result<Scalar, EngineError> {
        if value.is_sentinel() {
            return Ok(value.clone());
        }
        let (name, unique) = split_unique(generator);
        let rule = GeneratorRule {
            name: name.to_string(),
            unique,
            params: None,
            known: self.registry.contains(name),
        };
        self.generate_rule(&rule, value)
    }
}
