use std::fmt;

use regex::Regex;
use tracing::warn;

use datamask_core::Scalar;
use datamask_engine::{RenderContext, ResolvedRule, SubstitutionEngine};

use crate::error::SourceError;
use crate::json::JsonPath;
use crate::xml::XPath;

/// Column addressed by name (needs a header line) or by 0-based index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl ColumnRef {
    /// All-digit strings address a column by position.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<usize>() {
            Ok(index) if !raw.is_empty() => ColumnRef::Index(index),
            _ => ColumnRef::Name(raw.to_string()),
        }
    }

    /// Key under which the column is visible as `row[...]` in templates.
    pub fn context_key(&self) -> String {
        match self {
            ColumnRef::Index(index) => format!("col_{index}"),
            ColumnRef::Name(name) => name.clone(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Index(index) => write!(f, "{index}"),
            ColumnRef::Name(name) => f.write_str(name),
        }
    }
}

/// Where a field lives inside its source. Paths are compiled up front.
#[derive(Debug, Clone)]
pub enum FieldLocation {
    Column(ColumnRef),
    JsonPath(JsonPath),
    XPath(XPath),
    /// A database column holding a JSON document.
    ColumnJson { column: String, path: JsonPath },
}

impl FieldLocation {
    pub fn column(raw: &str) -> Self {
        FieldLocation::Column(ColumnRef::parse(raw))
    }

    pub fn json_path(raw: &str) -> Result<Self, SourceError> {
        Ok(FieldLocation::JsonPath(JsonPath::parse(raw)?))
    }

    pub fn xpath(raw: &str) -> Result<Self, SourceError> {
        Ok(FieldLocation::XPath(XPath::parse(raw)?))
    }

    pub fn column_json(column: &str, raw: &str) -> Result<Self, SourceError> {
        Ok(FieldLocation::ColumnJson {
            column: column.trim().to_string(),
            path: JsonPath::parse(raw)?,
        })
    }
}

impl fmt::Display for FieldLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldLocation::Column(column) => write!(f, "column {column}"),
            FieldLocation::JsonPath(path) => write!(f, "jsonpath {path}"),
            FieldLocation::XPath(path) => write!(f, "xpath {path}"),
            FieldLocation::ColumnJson { column, path } => write!(f, "column {column} {path}"),
        }
    }
}

/// One configured field: location, compiled rule and optional regexp.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub location: FieldLocation,
    pub rule: ResolvedRule,
    pub regexp: Option<Regex>,
}

impl FieldSpec {
    pub fn new(location: FieldLocation, rule: ResolvedRule) -> Self {
        Self {
            location,
            rule,
            regexp: None,
        }
    }

    /// Restrict substitution to capture group 1 of `pattern`, matched at the
    /// start of the value.
    pub fn with_regexp(mut self, pattern: &str) -> Result<Self, SourceError> {
        let regexp = Regex::new(&format!(r"\A(?:{pattern})"))
            .map_err(|err| SourceError::InvalidLocation(format!("regexp {pattern:?}: {err}")))?;
        if regexp.captures_len() < 2 {
            return Err(SourceError::InvalidLocation(format!(
                "regexp {pattern:?} needs a capture group"
            )));
        }
        self.regexp = Some(regexp);
        Ok(self)
    }

    /// Substitute for `value`, splicing into the regexp group when one is set.
    pub fn apply(
        &self,
        engine: &SubstitutionEngine,
        value: &Scalar,
        context: &RenderContext,
    ) -> Result<Scalar, SourceError> {
        let (Some(regexp), Scalar::Text(text)) = (&self.regexp, value) else {
            return Ok(engine.anonymize_scalar(value, &self.rule, context)?);
        };
        let Some(group) = regexp.captures(text).and_then(|caps| caps.get(1)) else {
            warn!(value = %text, regexp = %regexp, "regexp does not match; value unchanged");
            return Ok(value.clone());
        };
        let substitute =
            engine.anonymize_scalar(&Scalar::text(group.as_str()), &self.rule, context)?;
        Ok(Scalar::Text(format!(
            "{}{}{}",
            &text[..group.start()],
            substitute,
            &text[group.end()..]
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datamask_core::RuleSpec;
    use datamask_engine::EngineOptions;

    fn engine() -> SubstitutionEngine {
        SubstitutionEngine::new(EngineOptions {
            seed: Some(9),
            ..EngineOptions::default()
        })
    }

    fn dummy_field(engine: &SubstitutionEngine) -> FieldSpec {
        let rule = engine
            .resolve_rule(&RuleSpec::generator_with_params(
                "dummy",
                serde_json::json!({"value": "XXX"}),
            ))
            .unwrap();
        FieldSpec::new(FieldLocation::column("0"), rule)
    }

    #[test]
    fn column_refs() {
        assert_eq!(ColumnRef::parse("3"), ColumnRef::Index(3));
        assert_eq!(ColumnRef::parse(" name "), ColumnRef::Name("name".into()));
        assert_eq!(ColumnRef::Index(2).context_key(), "col_2");
    }

    #[test]
    fn regexp_replaces_group_one_only() {
        let engine = engine();
        let field = dummy_field(&engine).with_regexp(r"ID-(\d+)-\w+").unwrap();
        let out = field
            .apply(&engine, &Scalar::text("ID-1234-abc"), &RenderContext::new())
            .unwrap();
        assert_eq!(out, Scalar::text("ID-XXX-abc"));
    }

    #[test]
    fn regexp_is_anchored_at_start() {
        let engine = engine();
        let field = dummy_field(&engine).with_regexp(r"(\d+)").unwrap();
        let out = field
            .apply(&engine, &Scalar::text("ab12"), &RenderContext::new())
            .unwrap();
        assert_eq!(out, Scalar::text("ab12"));
    }

    #[test]
    fn regexp_skipped_for_numbers() {
        let engine = engine();
        let field = dummy_field(&engine).with_regexp(r"(\d)").unwrap();
        let out = field
            .apply(&engine, &Scalar::Integer(5), &RenderContext::new())
            .unwrap();
        assert_eq!(out, Scalar::text("XXX"));
    }

    #[test]
    fn regexp_without_group_is_rejected() {
        let engine = engine();
        assert!(dummy_field(&engine).with_regexp(r"\d+").is_err());
        assert!(dummy_field(&engine).with_regexp(r"(").is_err());
    }
}
