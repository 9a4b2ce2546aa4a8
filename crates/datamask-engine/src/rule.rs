use serde_json::Value;

use datamask_core::{RuleSpec, split_unique};

use crate::errors::EngineError;
use crate::generators::GeneratorRegistry;
use crate::template::{Template, parse_template};

/// A rule compiled against a registry: params validated, templates parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedRule {
    Generator(GeneratorRule),
    Template(Template),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorRule {
    /// Generator type with any `unique/` prefix removed; also the cache bucket.
    pub name: String,
    pub unique: bool,
    pub params: Option<Value>,
    /// False when the registry has no generator by this name.
    pub known: bool,
}

impl ResolvedRule {
    /// Short label for logs and reports.
    pub fn label(&self) -> String {
        match self {
            ResolvedRule::Generator(rule) if rule.unique => format!("unique/{}", rule.name),
            ResolvedRule::Generator(rule) => rule.name.clone(),
            ResolvedRule::Template(_) => "template".to_string(),
        }
    }
}

/// Resolve a configured rule. A bare string is a generator name when the
/// registry knows it, a template when it contains `{{`, an unknown generator
/// when it looks like an identifier, and a literal template otherwise.
pub fn resolve_rule(
    spec: &RuleSpec,
    registry: &GeneratorRegistry,
) -> Result<ResolvedRule, EngineError> {
    match spec {
        RuleSpec::Name(name) => {
            let (base, unique) = split_unique(name);
            if registry.contains(base) {
                generator_rule(base, unique, None, registry)
            } else if name.contains("{{") {
                Ok(ResolvedRule::Template(parse_template(name)?))
            } else if is_generator_identifier(base) {
                generator_rule(base, unique, None, registry)
            } else {
                Ok(ResolvedRule::Template(parse_template(name)?))
            }
        }
        RuleSpec::Generator(spec) => {
            let (base, unique) = split_unique(&spec.kind);
            if base.is_empty() {
                return Err(EngineError::InvalidRule(
                    "generator type must not be empty".to_string(),
                ));
            }
            generator_rule(base, unique, spec.merged_params(), registry)
        }
        RuleSpec::Template(spec) => Ok(ResolvedRule::Template(parse_template(&spec.template)?)),
    }
}

fn generator_rule(
    name: &str,
    unique: bool,
    params: Option<Value>,
    registry: &GeneratorRegistry,
) -> Result<ResolvedRule, EngineError> {
    let known = match registry.get(name) {
        Some(generator) => {
            generator.validate(params.as_ref())?;
            true
        }
        None => false,
    };
    Ok(ResolvedRule::Generator(GeneratorRule {
        name: name.to_string(),
        unique,
        params,
        known,
    }))
}

fn is_generator_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve(spec: RuleSpec) -> Result<ResolvedRule, EngineError> {
        resolve_rule(&spec, &GeneratorRegistry::new())
    }

    #[test]
    fn known_name_is_generator() {
        let rule = resolve(RuleSpec::generator("unique/email")).unwrap();
        assert_eq!(
            rule,
            ResolvedRule::Generator(GeneratorRule {
                name: "email".to_string(),
                unique: true,
                params: None,
                known: true,
            })
        );
        assert_eq!(rule.label(), "unique/email");
    }

    #[test]
    fn markup_is_template() {
        let rule = resolve(RuleSpec::generator("{{ value }}@example.com")).unwrap();
        assert!(matches!(rule, ResolvedRule::Template(_)));
    }

    #[test]
    fn identifier_is_unknown_generator() {
        let rule = resolve(RuleSpec::generator("not_a_real_generator")).unwrap();
        assert!(matches!(
            rule,
            ResolvedRule::Generator(GeneratorRule { known: false, .. })
        ));
    }

    #[test]
    fn other_text_is_literal_template() {
        let rule = resolve(RuleSpec::generator("REDACTED VALUE")).unwrap();
        let ResolvedRule::Template(template) = rule else {
            panic!("expected template");
        };
        assert_eq!(template.source, "REDACTED VALUE");
    }

    #[test]
    fn params_are_validated() {
        let err = resolve(RuleSpec::generator_with_params(
            "number",
            json!({"min": 10, "max": 1}),
        ))
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRule(_)));

        let err = resolve(RuleSpec::generator_with_params(
            "number",
            json!({"step": 2}),
        ))
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRule(_)));
    }

    #[test]
    fn bad_template_is_fatal() {
        let err = resolve(RuleSpec::template("{{ value ")).unwrap_err();
        assert!(matches!(err, EngineError::Template(_)));
    }
}
