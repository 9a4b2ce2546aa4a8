use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::errors::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    String,
    Date,
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::Int => "int",
            ParamKind::String => "string",
            ParamKind::Date => "date",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ParamSpec {
    pub key: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    pub const fn new(key: &'static str, kind: ParamKind, required: bool) -> Self {
        Self {
            key,
            kind,
            required,
        }
    }
}

pub struct ParamMap<'a> {
    map: Option<&'a Map<String, Value>>,
}

/// Check `params` against a generator's schema: every key must be declared
/// with a value of the declared kind, and required keys must be present.
pub fn validate_params<'a>(
    params: Option<&'a Value>,
    specs: &[ParamSpec],
    ctx: &str,
) -> Result<ParamMap<'a>, EngineError> {
    let map = match params {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            return Err(EngineError::InvalidRule(format!(
                "{ctx}: params must be an object"
            )));
        }
    };

    if let Some(map) = map {
        for (key, value) in map {
            let Some(spec) = specs.iter().find(|spec| spec.key == key.as_str()) else {
                return Err(EngineError::InvalidRule(format!(
                    "{ctx}: unknown param '{key}'"
                )));
            };
            validate_kind(ctx, key, spec.kind, value)?;
        }
    }

    for spec in specs {
        if spec.required && !map.is_some_and(|map| map.contains_key(spec.key)) {
            return Err(EngineError::InvalidRule(format!(
                "{ctx}: missing required param '{}'",
                spec.key
            )));
        }
    }

    Ok(ParamMap { map })
}

impl<'a> ParamMap<'a> {
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.map
            .and_then(|map| map.get(key))
            .and_then(|value| value.as_i64())
    }

    pub fn get_str(&self, key: &str) -> Option<&'a str> {
        self.map
            .and_then(|map| map.get(key))
            .and_then(|value| value.as_str())
    }

    pub fn get_date(&self, key: &str) -> Option<NaiveDate> {
        self.get_str(key).and_then(parse_date_value)
    }
}

fn validate_kind(ctx: &str, key: &str, kind: ParamKind, value: &Value) -> Result<(), EngineError> {
    let valid = match kind {
        ParamKind::Int => value.as_i64().is_some(),
        ParamKind::String => value.is_string(),
        ParamKind::Date => value.as_str().and_then(parse_date_value).is_some(),
    };

    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidRule(format!(
            "{ctx}: invalid value for param '{key}' (expected {})",
            kind.as_str()
        )))
    }
}

pub fn parse_date_value(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Resolve an inclusive `[min, max]` integer range, rejecting inverted bounds.
pub fn int_range(
    params: &ParamMap<'_>,
    ctx: &str,
    (min_key, max_key): (&str, &str),
    (default_min, default_max): (i64, i64),
) -> Result<(i64, i64), EngineError> {
    let min = params.get_i64(min_key).unwrap_or(default_min);
    let max = params.get_i64(max_key).unwrap_or(default_max);
    if min > max {
        return Err(EngineError::InvalidRule(format!(
            "{ctx}: {min_key} must be <= {max_key}"
        )));
    }
    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SPECS: &[ParamSpec] = &[
        ParamSpec::new("min", ParamKind::Int, false),
        ParamSpec::new("max", ParamKind::Int, false),
        ParamSpec::new("since", ParamKind::Date, false),
    ];

    #[test]
    fn rejects_unknown_keys() {
        let params = json!({"minimum": 1});
        let result = validate_params(Some(&params), SPECS, "number");
        assert!(matches!(result, Err(EngineError::InvalidRule(_))));
    }

    #[test]
    fn rejects_wrong_kinds() {
        let params = json!({"min": "one"});
        assert!(validate_params(Some(&params), SPECS, "number").is_err());
        let params = json!({"since": "yesterday"});
        assert!(validate_params(Some(&params), SPECS, "number").is_err());
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        let params = json!({"min": 10, "max": 1});
        let map = validate_params(Some(&params), SPECS, "number").unwrap();
        assert!(int_range(&map, "number", ("min", "max"), (0, 100)).is_err());
    }

    #[test]
    fn range_uses_defaults() {
        let map = validate_params(None, SPECS, "number").unwrap();
        assert_eq!(
            int_range(&map, "number", ("min", "max"), (0, 100)).unwrap(),
            (0, 100)
        );
    }
}
