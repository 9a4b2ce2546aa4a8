use fake::Fake;
use fake::faker::address::raw::{
    BuildingNumber, CityName, CountryCode, CountryName, PostCode, StateName, StreetName,
};
use fake::faker::company::raw::{CompanyName, Industry};
use fake::faker::creditcard::raw::CreditCardNumber;
use fake::faker::finance::raw::Bic;
use fake::faker::internet::raw::{DomainSuffix, FreeEmail, IPv4, SafeEmail, Username};
use fake::faker::job::raw::Title as JobTitle;
use fake::faker::lorem::raw::{Paragraph, Sentence, Word};
use fake::faker::name::raw::{FirstName, LastName, Name, Title as NameTitle};
use fake::faker::phone_number::raw::{CellNumber, PhoneNumber};
use fake::locales::{DE_DE, EN, PT_BR};
use rand::RngCore;

use crate::faker::locales::LocaleKey;

/// Text fakers the registry exposes, with the arguments the parameterized ones take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakerKind {
    Name,
    FirstName,
    LastName,
    NameTitle,
    SafeEmail,
    FreeEmail,
    Username,
    Ipv4,
    DomainSuffix,
    PhoneNumber,
    CellNumber,
    PostCode,
    CityName,
    StreetName,
    StreetAddress,
    BuildingNumber,
    StateName,
    CountryName,
    CountryCode,
    CompanyName,
    Industry,
    JobTitle,
    Bic,
    CreditCardNumber,
    Word,
    Sentence { min_words: usize, max_words: usize },
    Paragraph { min_sentences: usize, max_sentences: usize },
}

// Expands one faker call per supported locale; `fake` keys its data by locale type.
macro_rules! fake_in_locale {
    ($locale:expr, $rng:expr, $faker:ident $(, $arg:expr)*) => {
        match $locale {
            LocaleKey::EnUs => $faker(EN $(, $arg)*).fake_with_rng::<String, _>($rng),
            LocaleKey::PtBr => $faker(PT_BR $(, $arg)*).fake_with_rng::<String, _>($rng),
            LocaleKey::DeDe => $faker(DE_DE $(, $arg)*).fake_with_rng::<String, _>($rng),
        }
    };
}

pub struct FakeRsAdapter;

impl FakeRsAdapter {
    pub fn generate_text(kind: FakerKind, locale: LocaleKey, rng: &mut dyn RngCore) -> String {
        match kind {
            FakerKind::Name => fake_in_locale!(locale, rng, Name),
            FakerKind::FirstName => fake_in_locale!(locale, rng, FirstName),
            FakerKind::LastName => fake_in_locale!(locale, rng, LastName),
            FakerKind::NameTitle => fake_in_locale!(locale, rng, NameTitle),
            FakerKind::SafeEmail => fake_in_locale!(locale, rng, SafeEmail),
            FakerKind::FreeEmail => fake_in_locale!(locale, rng, FreeEmail),
            FakerKind::Username => fake_in_locale!(locale, rng, Username),
            FakerKind::Ipv4 => fake_in_locale!(locale, rng, IPv4),
            FakerKind::DomainSuffix => fake_in_locale!(locale, rng, DomainSuffix),
            FakerKind::PhoneNumber => fake_in_locale!(locale, rng, PhoneNumber),
            FakerKind::CellNumber => fake_in_locale!(locale, rng, CellNumber),
            FakerKind::PostCode => fake_in_locale!(locale, rng, PostCode),
            FakerKind::CityName => fake_in_locale!(locale, rng, CityName),
            FakerKind::StreetName => fake_in_locale!(locale, rng, StreetName),
            FakerKind::StreetAddress => {
                let street = fake_in_locale!(locale, rng, StreetName);
                let number = fake_in_locale!(locale, rng, BuildingNumber);
                format!("{street} {number}")
            }
            FakerKind::BuildingNumber => fake_in_locale!(locale, rng, BuildingNumber),
            FakerKind::StateName => fake_in_locale!(locale, rng, StateName),
            FakerKind::CountryName => fake_in_locale!(locale, rng, CountryName),
            FakerKind::CountryCode => fake_in_locale!(locale, rng, CountryCode),
            FakerKind::CompanyName => fake_in_locale!(locale, rng, CompanyName),
            FakerKind::Industry => fake_in_locale!(locale, rng, Industry),
            FakerKind::JobTitle => fake_in_locale!(locale, rng, JobTitle),
            FakerKind::Bic => fake_in_locale!(locale, rng, Bic),
            FakerKind::CreditCardNumber => fake_in_locale!(locale, rng, CreditCardNumber),
            FakerKind::Word => fake_in_locale!(locale, rng, Word),
            FakerKind::Sentence {
                min_words,
                max_words,
            } => fake_in_locale!(locale, rng, Sentence, min_words..max_words + 1),
            FakerKind::Paragraph {
                min_sentences,
                max_sentences,
            } => fake_in_locale!(locale, rng, Paragraph, min_sentences..max_sentences + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn same_seed_same_text() {
        let mut rng_a = ChaCha8Rng::seed_from_u64(7);
        let mut rng_b = ChaCha8Rng::seed_from_u64(7);
        let a = FakeRsAdapter::generate_text(FakerKind::FirstName, LocaleKey::EnUs, &mut rng_a);
        let b = FakeRsAdapter::generate_text(FakerKind::FirstName, LocaleKey::EnUs, &mut rng_b);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn every_locale_produces_text() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for &locale in LocaleKey::ALL {
            let value = FakeRsAdapter::generate_text(FakerKind::CityName, locale, &mut rng);
            assert!(!value.is_empty(), "empty city for {locale}");
        }
    }

    #[test]
    fn sentence_respects_word_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let kind = FakerKind::Sentence {
            min_words: 3,
            max_words: 3,
        };
        let sentence = FakeRsAdapter::generate_text(kind, LocaleKey::EnUs, &mut rng);
        assert_eq!(sentence.split_whitespace().count(), 3);
    }

    #[test]
    fn german_locale_is_seeded_like_the_others() {
        let mut rng_a = ChaCha8Rng::seed_from_u64(21);
        let mut rng_b = ChaCha8Rng::seed_from_u64(21);
        let a = FakeRsAdapter::generate_text(FakerKind::LastName, LocaleKey::DeDe, &mut rng_a);
        let b = FakeRsAdapter::generate_text(FakerKind::LastName, LocaleKey::DeDe, &mut rng_b);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }
}
