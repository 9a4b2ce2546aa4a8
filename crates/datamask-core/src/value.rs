use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single scalar read from (or written to) a data source.
///
/// Structured values never reach the engine; adapters pick scalars out of
/// their documents and feed them in one at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Null and whitespace-only text are passed through untouched and never cached.
    pub fn is_sentinel(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Text(value) => value.trim().is_empty(),
            Scalar::Integer(_) | Scalar::Float(_) => false,
        }
    }

    /// String form used as the consistency-cache key. `Null` has none.
    pub fn cache_key(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Integer(value) => Some(value.to_string()),
            Scalar::Float(value) => Some(value.to_string()),
            Scalar::Text(value) => Some(value.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Text form inside rendered templates; null renders as `None`.
    pub fn render(&self) -> String {
        match self {
            Scalar::Null => "None".to_string(),
            other => other.to_string(),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Scalar::Null),
            serde_json::Value::Bool(flag) => Ok(Scalar::Text(flag.to_string())),
            serde_json::Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Ok(Scalar::Integer(int))
                } else if let Some(float) = number.as_f64() {
                    Ok(Scalar::Float(float))
                } else {
                    Err(Error::UnsupportedValue(number.to_string()))
                }
            }
            serde_json::Value::String(text) => Ok(Scalar::Text(text.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(
                Error::UnsupportedValue("structured json value is not a scalar".to_string()),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Null => serde_json::Value::Null,
            Scalar::Integer(value) => serde_json::Value::from(*value),
            Scalar::Float(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(value.to_string())),
            Scalar::Text(value) => serde_json::Value::String(value.clone()),
        }
    }
}

/// Writers emit null as an empty cell / empty text node.
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Integer(value) => write!(f, "{value}"),
            Scalar::Float(value) => write!(f, "{value}"),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whitespace_and_null_are_sentinels() {
        assert!(Scalar::Null.is_sentinel());
        assert!(Scalar::text("").is_sentinel());
        assert!(Scalar::text("   ").is_sentinel());
        assert!(!Scalar::text(" a ").is_sentinel());
        assert!(!Scalar::Integer(0).is_sentinel());
    }

    #[test]
    fn numbers_and_text_share_string_keys() {
        assert_eq!(Scalar::Integer(42).cache_key(), Some("42".to_string()));
        assert_eq!(Scalar::text("42").cache_key(), Some("42".to_string()));
        assert_eq!(Scalar::Null.cache_key(), None);
    }

    #[test]
    fn json_conversion_rejects_structures() {
        assert_eq!(Scalar::from_json(&json!(7)).unwrap(), Scalar::Integer(7));
        assert_eq!(Scalar::from_json(&json!(null)).unwrap(), Scalar::Null);
        assert!(Scalar::from_json(&json!({"a": 1})).is_err());
        assert!(Scalar::from_json(&json!([1])).is_err());
    }

    #[test]
    fn untagged_serde_keeps_kinds() {
        let values: Vec<Scalar> = serde_json::from_str(r#"[null, 3, 1.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Scalar::Null,
                Scalar::Integer(3),
                Scalar::Float(1.5),
                Scalar::text("x")
            ]
        );
    }
}
