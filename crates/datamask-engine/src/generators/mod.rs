use std::collections::{BTreeMap, HashMap};

use rand::RngCore;
use serde::Serialize;
use serde_json::Value;

use datamask_core::Scalar;

use crate::errors::EngineError;
use crate::faker::LocaleKey;
use crate::params::{ParamSpec, validate_params};

pub mod faker;
pub mod primitives;

/// Per-call inputs a generator may depend on besides its params.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorContext {
    pub locale: LocaleKey,
}

/// A named synthetic-value producer.
///
/// Generators are stateless; all randomness comes from the engine-owned RNG
/// passed into `generate`.
pub trait Generator: Send + Sync {
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn params(&self) -> &'static [ParamSpec] {
        &[]
    }

    /// Checked once when a rule is resolved, so bad params stop the run
    /// before any value is touched.
    fn validate(&self, params: Option<&Value>) -> Result<(), EngineError> {
        validate_params(params, self.params(), self.id()).map(|_| ())
    }

    fn generate(
        &self,
        ctx: &GeneratorContext,
        params: Option<&Value>,
        rng: &mut dyn RngCore,
    ) -> Result<Scalar, EngineError>;
}

/// Catalog row for a registered generator.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratorInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub aliases: Vec<&'static str>,
    pub params: Vec<ParamInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamInfo {
    pub key: &'static str,
    pub kind: &'static str,
    pub required: bool,
}

/// Closed dispatch table from generator name to implementation.
pub struct GeneratorRegistry {
    generators: HashMap<&'static str, Box<dyn Generator>>,
    aliases: HashMap<&'static str, &'static str>,
}

impl GeneratorRegistry {
    pub fn empty() -> Self {
        Self {
            generators: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Registry with the full built-in catalog.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        primitives::register(&mut registry);
        faker::register(&mut registry);
        registry
    }

    pub fn register_generator(&mut self, generator: Box<dyn Generator>) {
        self.generators.insert(generator.id(), generator);
    }

    pub fn register_alias(&mut self, alias: &'static str, target: &'static str) {
        self.aliases.insert(alias, target);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Generator> {
        let name = self.aliases.get(name).copied().unwrap_or(name);
        self.generators.get(name).map(|generator| generator.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Sorted catalog of generators with their aliases and parameter schemas.
    pub fn catalog(&self) -> Vec<GeneratorInfo> {
        let mut aliases_by_target: BTreeMap<&str, Vec<&'static str>> = BTreeMap::new();
        for (&alias, &target) in &self.aliases {
            aliases_by_target.entry(target).or_default().push(alias);
        }

        let mut catalog: Vec<GeneratorInfo> = self
            .generators
            .values()
            .map(|generator| {
                let mut aliases = aliases_by_target
                    .get(generator.id())
                    .cloned()
                    .unwrap_or_default();
                aliases.sort_unstable();
                GeneratorInfo {
                    name: generator.id(),
                    description: generator.description(),
                    aliases,
                    params: generator
                        .params()
                        .iter()
                        .map(|spec| ParamInfo {
                            key: spec.key,
                            kind: spec.kind.as_str(),
                            required: spec.required,
                        })
                        .collect(),
                }
            })
            .collect();
        catalog.sort_by(|a, b| a.name.cmp(b.name));
        catalog
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &[&str] = &[
        "number",
        "name",
        "first_name",
        "last_name",
        "prefix",
        "email",
        "free_email",
        "user_name",
        "ipv4",
        "domain_suffix",
        "phone_number",
        "cell_number",
        "zip",
        "postcode",
        "city",
        "street",
        "street_name",
        "street_address",
        "building_number",
        "state",
        "country",
        "country_code",
        "company",
        "industry",
        "job_title",
        "iban",
        "bic",
        "credit_card_number",
        "word",
        "sentence",
        "text",
        "date",
        "uuid4",
        "dummy",
    ];

    #[test]
    fn builtin_catalog_is_complete() {
        let registry = GeneratorRegistry::new();
        for name in CATALOG {
            assert!(registry.contains(name), "missing generator {name}");
        }
        assert!(!registry.contains("not_a_real_generator"));
    }

    #[test]
    fn aliases_resolve_to_targets() {
        let registry = GeneratorRegistry::new();
        assert_eq!(registry.get("zip").map(|g| g.id()), Some("postcode"));
        assert_eq!(
            registry.get("street").map(|g| g.id()),
            Some("street_address")
        );
    }

    #[test]
    fn catalog_is_sorted_and_lists_aliases() {
        let catalog = GeneratorRegistry::new().catalog();
        let names: Vec<_> = catalog.iter().map(|info| info.name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);

        let postcode = catalog
            .iter()
            .find(|info| info.name == "postcode")
            .expect("postcode listed");
        assert_eq!(postcode.aliases, vec!["zip"]);

        let number = catalog
            .iter()
            .find(|info| info.name == "number")
            .expect("number listed");
        assert_eq!(number.params.len(), 2);
    }
}
