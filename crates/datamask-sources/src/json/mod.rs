//! JSON documents addressed by JSONPath.

mod path;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use tracing::debug;

use datamask_core::Scalar;
use datamask_engine::{RenderContext, SubstitutionEngine};

pub use path::{JsonPath, Step};

use crate::adapter::{FileOptions, SourceAdapter, SourceKind, SourceReport};
use crate::error::SourceError;
use crate::field::{FieldLocation, FieldSpec};

/// JSON file rewritten with every matched scalar substituted.
#[derive(Debug, Clone)]
pub struct JsonSource {
    pub path: PathBuf,
    pub files: FileOptions,
}

impl JsonSource {
    pub fn new(path: impl Into<PathBuf>, files: FileOptions) -> Self {
        Self {
            path: path.into(),
            files,
        }
    }

    fn run(
        &self,
        engine: &SubstitutionEngine,
        fields: &[FieldSpec],
    ) -> Result<SourceReport, SourceError> {
        let raw = self.files.read(&self.path)?;
        let mut document: Value = serde_json::from_str(&raw)?;

        let mut carry = RenderContext::new();
        let mut values = 0u64;
        for field in fields {
            let FieldLocation::JsonPath(path) = &field.location else {
                return Err(SourceError::InvalidLocation(format!(
                    "json source {} cannot address {}",
                    self.path.display(),
                    field.location
                )));
            };
            values += anonymize_document(engine, &mut document, path, field, &mut carry)?;
        }

        let target = self.files.write(&self.path, &to_pretty_bytes(&document)?)?;
        debug!(source = %self.path.display(), values, "json document written");
        Ok(SourceReport {
            source: self.path.display().to_string(),
            kind: SourceKind::Json,
            values_anonymized: values,
            output: Some(target.display().to_string()),
        })
    }
}

#[async_trait]
impl SourceAdapter for JsonSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Json
    }

    async fn anonymize(
        &self,
        engine: &SubstitutionEngine,
        fields: &[FieldSpec],
    ) -> Result<SourceReport, SourceError> {
        self.run(engine, fields)
    }
}

/// Substitute every scalar `path` matches in `document` and return how many
/// were replaced.
///
/// Templates see the scalar members of the match's parent object on top of
/// `carry`; the last substitute is kept in `carry` under the path text.
pub fn anonymize_document(
    engine: &SubstitutionEngine,
    document: &mut Value,
    path: &JsonPath,
    field: &FieldSpec,
    carry: &mut RenderContext,
) -> Result<u64, SourceError> {
    let mut count = 0;
    for steps in path.resolve(document) {
        let original = match path::get(document, &steps) {
            Some(Value::Null) | None => continue,
            Some(value) => match Scalar::from_json(value) {
                Ok(scalar) => scalar,
                Err(_) => continue,
            },
        };

        let mut context = carry.clone();
        let parent = steps
            .split_last()
            .and_then(|(_, parent)| path::get(document, parent));
        if let Some(Value::Object(parent)) = parent {
            for (key, member) in parent {
                if let Ok(scalar) = Scalar::from_json(member) {
                    context.insert(key.clone(), scalar);
                }
            }
        }

        let substitute = field.apply(engine, &original, &context)?;
        if let Some(slot) = path::get_mut(document, &steps) {
            *slot = substitute.to_json();
        }
        carry.insert(path.as_str(), substitute);
        count += 1;
    }
    Ok(count)
}

/// Pretty-print with a four-space indent and a trailing newline.
pub fn to_pretty_bytes(document: &Value) -> Result<Vec<u8>, SourceError> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    document.serialize(&mut serializer)?;
    out.push(b'\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use datamask_core::RuleSpec;
    use datamask_engine::EngineOptions;
    use serde_json::json;

    fn engine() -> SubstitutionEngine {
        SubstitutionEngine::new(EngineOptions {
            seed: Some(21),
            ..EngineOptions::default()
        })
    }

    fn field(engine: &SubstitutionEngine, path: &str, rule: RuleSpec) -> (JsonPath, FieldSpec) {
        let rule = engine.resolve_rule(&rule).unwrap();
        let location = FieldLocation::json_path(path).unwrap();
        let FieldLocation::JsonPath(compiled) = &location else {
            unreachable!()
        };
        (compiled.clone(), FieldSpec::new(location, rule))
    }

    #[test]
    fn nulls_and_structures_are_skipped() {
        let engine = engine();
        let mut doc = json!({"items": [null, {"a": 1}, "Ann", 7]});
        let (path, spec) = field(&engine, "$.items[*]", RuleSpec::generator("first_name"));
        let mut carry = RenderContext::new();
        let count = anonymize_document(&engine, &mut doc, &path, &spec, &mut carry).unwrap();
        assert_eq!(count, 2);
        assert_eq!(doc["items"][0], Value::Null);
        assert_eq!(doc["items"][1], json!({"a": 1}));
        assert_ne!(doc["items"][2], json!("Ann"));
    }

    #[test]
    fn template_sees_sibling_members() {
        let engine = engine();
        let mut doc = json!({"people": [
            {"first": "Ann", "email": "ann@corp"},
            {"first": "Bob", "email": "bob@corp"}
        ]});
        let (first_path, first) =
            field(&engine, "$.people[*].first", RuleSpec::generator("first_name"));
        let (email_path, email) = field(
            &engine,
            "$.people[*].email",
            RuleSpec::template("{{ row.first | lower }}@example.com"),
        );
        let mut carry = RenderContext::new();
        anonymize_document(&engine, &mut doc, &first_path, &first, &mut carry).unwrap();
        anonymize_document(&engine, &mut doc, &email_path, &email, &mut carry).unwrap();
        for person in doc["people"].as_array().unwrap() {
            let first = person["first"].as_str().unwrap().to_lowercase();
            assert_eq!(person["email"], json!(format!("{first}@example.com")));
        }
        assert!(carry.get("$.people[*].email").is_some());
    }

    #[test]
    fn numbers_stay_numbers() {
        let engine = engine();
        let mut doc = json!({"age": 41});
        let (path, spec) = field(
            &engine,
            "$.age",
            RuleSpec::generator_with_params("number", json!({"min": 18, "max": 18})),
        );
        let mut carry = RenderContext::new();
        anonymize_document(&engine, &mut doc, &path, &spec, &mut carry).unwrap();
        assert_eq!(doc, json!({"age": 18}));
    }

    #[test]
    fn pretty_output_uses_four_spaces() {
        let bytes = to_pretty_bytes(&json!({"a": [1]})).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\n    \"a\": [\n        1\n    ]\n}\n"
        );
    }
}
