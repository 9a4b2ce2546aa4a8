use std::fmt;

use serde::{Deserialize, Serialize};

/// Locales the synthetic-data provider can generate for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocaleKey {
    #[default]
    #[serde(rename = "en_US")]
    EnUs,
    #[serde(rename = "pt_BR")]
    PtBr,
    #[serde(rename = "de_DE")]
    DeDe,
}

impl LocaleKey {
    pub const ALL: &'static [LocaleKey] = &[LocaleKey::EnUs, LocaleKey::PtBr, LocaleKey::DeDe];

    pub fn parse(value: &str) -> Option<Self> {
        match value.replace('-', "_").as_str() {
            "en_US" | "en" => Some(Self::EnUs),
            "pt_BR" | "pt" => Some(Self::PtBr),
            "de_DE" | "de" => Some(Self::DeDe),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnUs => "en_US",
            Self::PtBr => "pt_BR",
            Self::DeDe => "de_DE",
        }
    }
}

impl fmt::Display for LocaleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_both_separators_and_short_forms() {
        assert_eq!(LocaleKey::parse("de_DE"), Some(LocaleKey::DeDe));
        assert_eq!(LocaleKey::parse("de-DE"), Some(LocaleKey::DeDe));
        assert_eq!(LocaleKey::parse("de"), Some(LocaleKey::DeDe));
        assert_eq!(LocaleKey::parse("pt-BR"), Some(LocaleKey::PtBr));
        assert_eq!(LocaleKey::parse("fr_FR"), None);
        for &locale in LocaleKey::ALL {
            assert_eq!(LocaleKey::parse(locale.as_str()), Some(locale));
        }
    }
}
