use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix requesting a substitute never issued before for the generator type.
pub const UNIQUE_PREFIX: &str = "unique/";

/// Rule as written in configuration; accepts a bare string or a structured object.
///
/// A bare string is either a generator name or a template. The engine decides
/// which by looking the name up in its registry first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSpec {
    Name(String),
    Generator(GeneratorSpec),
    Template(TemplateSpec),
}

/// Parameterized generator reference: `{ type = "number", params = { min = 0 } }`.
///
/// Parameters may also be given inline next to `type`
/// (`{ type = "number", min = 0, max = 10 }`); both forms are merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(flatten)]
    pub inline_params: Map<String, Value>,
}

/// Explicit template rule: `{ template = "{{ row['first'] }}@example.com" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSpec {
    pub template: String,
}

impl RuleSpec {
    pub fn generator(kind: impl Into<String>) -> Self {
        RuleSpec::Name(kind.into())
    }

    pub fn generator_with_params(kind: impl Into<String>, params: Value) -> Self {
        RuleSpec::Generator(GeneratorSpec {
            kind: kind.into(),
            params: Some(params),
            inline_params: Map::new(),
        })
    }

    pub fn template(template: impl Into<String>) -> Self {
        RuleSpec::Template(TemplateSpec {
            template: template.into(),
        })
    }
}

impl GeneratorSpec {
    /// Params merged from the `params` table and inline keys.
    /// Returns `None` when neither form carries anything.
    pub fn merged_params(&self) -> Option<Value> {
        let mut merged = match &self.params {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(other) => return Some(other.clone()),
        };
        for (key, value) in &self.inline_params {
            merged.entry(key.clone()).or_insert_with(|| value.clone());
        }
        if merged.is_empty() {
            None
        } else {
            Some(Value::Object(merged))
        }
    }
}

/// Split `unique/<type>` into `(type, true)`; other names map to `(name, false)`.
pub fn split_unique(name: &str) -> (&str, bool) {
    match name.strip_prefix(UNIQUE_PREFIX) {
        Some(stripped) => (stripped, true),
        None => (name, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Holder {
        rule: RuleSpec,
    }

    #[test]
    fn bare_string_is_name() {
        let holder: Holder = toml::from_str(r#"rule = "first_name""#).unwrap();
        assert_eq!(holder.rule, RuleSpec::generator("first_name"));
    }

    #[test]
    fn structured_generator_merges_inline_params() {
        let holder: Holder =
            toml::from_str(r#"rule = { type = "number", min = 5, params = { max = 9 } }"#)
                .unwrap();
        let RuleSpec::Generator(spec) = holder.rule else {
            panic!("expected generator spec");
        };
        assert_eq!(spec.kind, "number");
        assert_eq!(spec.merged_params(), Some(json!({"min": 5, "max": 9})));
    }

    #[test]
    fn template_object_is_template() {
        let holder: Holder = toml::from_str(r#"rule = { template = "{{ value }}" }"#).unwrap();
        assert_eq!(holder.rule, RuleSpec::template("{{ value }}"));
    }

    #[test]
    fn unique_prefix_is_split() {
        assert_eq!(split_unique("unique/email"), ("email", true));
        assert_eq!(split_unique("email"), ("email", false));
    }
}
