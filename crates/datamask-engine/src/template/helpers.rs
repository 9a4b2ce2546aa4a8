//! Whitelisted helper functions, callable as `f(x)` or as filters `x | f`.

use datamask_core::Scalar;

pub const HELPERS: &[&str] = &[
    "str", "int", "float", "default", "upper", "lower", "trim", "unidecode", "length",
];

pub fn is_helper(name: &str) -> bool {
    HELPERS.contains(&name)
}

/// Apply a helper. Errors are plain messages; the caller attaches the template.
pub fn apply(name: &str, args: &[Scalar]) -> Result<Scalar, String> {
    match name {
        "str" => unary(name, args).map(|value| Scalar::Text(value.render())),
        "int" => unary(name, args).and_then(to_int),
        "float" => unary(name, args).and_then(to_float),
        "default" => match args {
            [value, fallback] => Ok(if value.is_null() {
                fallback.clone()
            } else {
                value.clone()
            }),
            _ => Err(arity(name, 2, args.len())),
        },
        "upper" => unary(name, args).map(|value| map_text(value, |text| text.to_uppercase())),
        "lower" => unary(name, args).map(|value| map_text(value, |text| text.to_lowercase())),
        "trim" => unary(name, args).map(|value| map_text(value, |text| text.trim().to_string())),
        "unidecode" => unary(name, args).map(|value| map_text(value, transliterate_umlauts)),
        "length" => unary(name, args).map(|value| match value {
            Scalar::Null => Scalar::Integer(0),
            other => Scalar::Integer(other.to_string().chars().count() as i64),
        }),
        _ => Err(format!("unknown helper '{name}'")),
    }
}

fn unary<'a>(name: &str, args: &'a [Scalar]) -> Result<&'a Scalar, String> {
    match args {
        [value] => Ok(value),
        _ => Err(arity(name, 1, args.len())),
    }
}

fn arity(name: &str, expected: usize, got: usize) -> String {
    format!("helper '{name}' expects {expected} argument(s), got {got}")
}

fn map_text(value: &Scalar, f: impl FnOnce(&str) -> String) -> Scalar {
    match value {
        Scalar::Null => Scalar::Null,
        other => Scalar::Text(f(&other.to_string())),
    }
}

fn to_int(value: &Scalar) -> Result<Scalar, String> {
    match value {
        Scalar::Integer(int) => Ok(Scalar::Integer(*int)),
        Scalar::Float(float) if float.is_finite() => Ok(Scalar::Integer(float.trunc() as i64)),
        Scalar::Text(text) => text
            .trim()
            .parse::<i64>()
            .map(Scalar::Integer)
            .map_err(|_| format!("cannot convert {text:?} to int")),
        other => Err(format!("cannot convert {} to int", other.render())),
    }
}

fn to_float(value: &Scalar) -> Result<Scalar, String> {
    match value {
        Scalar::Integer(int) => Ok(Scalar::Float(*int as f64)),
        Scalar::Float(float) => Ok(Scalar::Float(*float)),
        Scalar::Text(text) => text
            .trim()
            .parse::<f64>()
            .map(Scalar::Float)
            .map_err(|_| format!("cannot convert {text:?} to float")),
        Scalar::Null => Err("cannot convert None to float".to_string()),
    }
}

/// German umlaut and sharp-s transliteration.
pub fn transliterate_umlauts(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'Ä' => out.push_str("Ae"),
            'Ö' => out.push_str("Oe"),
            'Ü' => out.push_str("Ue"),
            'ß' => out.push_str("ss"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercions() {
        assert_eq!(
            apply("int", &[Scalar::text(" 12 ")]).unwrap(),
            Scalar::Integer(12)
        );
        assert_eq!(
            apply("int", &[Scalar::Float(3.9)]).unwrap(),
            Scalar::Integer(3)
        );
        assert!(apply("int", &[Scalar::text("abc")]).is_err());
        assert_eq!(
            apply("float", &[Scalar::Integer(2)]).unwrap(),
            Scalar::Float(2.0)
        );
        assert_eq!(
            apply("str", &[Scalar::Null]).unwrap(),
            Scalar::text("None")
        );
    }

    #[test]
    fn default_only_replaces_null() {
        let fallback = Scalar::text("x");
        assert_eq!(
            apply("default", &[Scalar::Null, fallback.clone()]).unwrap(),
            fallback
        );
        assert_eq!(
            apply("default", &[Scalar::text(""), fallback]).unwrap(),
            Scalar::text("")
        );
    }

    #[test]
    fn string_helpers() {
        assert_eq!(
            apply("upper", &[Scalar::text("abc")]).unwrap(),
            Scalar::text("ABC")
        );
        assert_eq!(
            apply("trim", &[Scalar::text("  a ")]).unwrap(),
            Scalar::text("a")
        );
        assert_eq!(apply("lower", &[Scalar::Null]).unwrap(), Scalar::Null);
        assert_eq!(
            apply("length", &[Scalar::text("äbc")]).unwrap(),
            Scalar::Integer(3)
        );
    }

    #[test]
    fn unidecode_transliterates() {
        assert_eq!(transliterate_umlauts("Müller Straße"), "Mueller Strasse");
        assert_eq!(transliterate_umlauts("ÄÖÜäöü"), "AeOeUeaeoeue");
    }

    #[test]
    fn arity_is_checked() {
        assert!(apply("upper", &[]).is_err());
        assert!(apply("default", &[Scalar::Null]).is_err());
        assert!(apply("nope", &[Scalar::Null]).is_err());
    }
}
