use rand::RngCore;
use serde_json::Value;

use datamask_core::Scalar;

use crate::errors::EngineError;
use crate::faker::{FakeRsAdapter, FakerKind};
use crate::generators::{Generator, GeneratorContext, GeneratorRegistry};
use crate::params::{ParamKind, ParamSpec, int_range, validate_params};

const FIXED_TEXT: &[(&str, FakerKind, &str)] = &[
    ("name", FakerKind::Name, "full person name"),
    ("first_name", FakerKind::FirstName, "given name"),
    ("last_name", FakerKind::LastName, "family name"),
    ("prefix", FakerKind::NameTitle, "name prefix such as Mr. or Dr."),
    ("email", FakerKind::SafeEmail, "email address on a reserved domain"),
    ("free_email", FakerKind::FreeEmail, "email address on a free-mail domain"),
    ("user_name", FakerKind::Username, "login name"),
    ("ipv4", FakerKind::Ipv4, "IPv4 address"),
    ("domain_suffix", FakerKind::DomainSuffix, "top-level domain suffix"),
    ("phone_number", FakerKind::PhoneNumber, "phone number"),
    ("cell_number", FakerKind::CellNumber, "mobile phone number"),
    ("postcode", FakerKind::PostCode, "postal code"),
    ("city", FakerKind::CityName, "city name"),
    ("street_name", FakerKind::StreetName, "street name"),
    ("street_address", FakerKind::StreetAddress, "street name and building number"),
    ("building_number", FakerKind::BuildingNumber, "building number"),
    ("state", FakerKind::StateName, "state or province"),
    ("country", FakerKind::CountryName, "country name"),
    ("country_code", FakerKind::CountryCode, "country code"),
    ("company", FakerKind::CompanyName, "company name"),
    ("industry", FakerKind::Industry, "industry"),
    ("job_title", FakerKind::JobTitle, "job title"),
    ("bic", FakerKind::Bic, "bank identifier code"),
    ("credit_card_number", FakerKind::CreditCardNumber, "credit card number"),
    ("word", FakerKind::Word, "single lorem word"),
];

const SENTENCE_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("min_words", ParamKind::Int, false),
    ParamSpec::new("max_words", ParamKind::Int, false),
];
const TEXT_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("min_sentences", ParamKind::Int, false),
    ParamSpec::new("max_sentences", ParamKind::Int, false),
];

pub fn register(registry: &mut GeneratorRegistry) {
    for &(id, kind, description) in FIXED_TEXT {
        registry.register_generator(Box::new(FakerTextGenerator {
            id,
            kind,
            description,
        }));
    }
    registry.register_generator(Box::new(SentenceGenerator));
    registry.register_generator(Box::new(ParagraphGenerator));

    registry.register_alias("zip", "postcode");
    registry.register_alias("street", "street_address");
}

struct FakerTextGenerator {
    id: &'static str,
    kind: FakerKind,
    description: &'static str,
}

impl Generator for FakerTextGenerator {
    fn id(&self) -> &'static str {
        self.id
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn generate(
        &self,
        ctx: &GeneratorContext,
        params: Option<&Value>,
        rng: &mut dyn RngCore,
    ) -> Result<Scalar, EngineError> {
        validate_params(params, &[], self.id)?;
        Ok(Scalar::Text(FakeRsAdapter::generate_text(
            self.kind, ctx.locale, rng,
        )))
    }
}

struct SentenceGenerator;

impl SentenceGenerator {
    fn bounds(params: Option<&Value>) -> Result<(usize, usize), EngineError> {
        let params = validate_params(params, SENTENCE_PARAMS, "sentence")?;
        word_bounds(&params, "sentence", ("min_words", "max_words"), (4, 10))
    }
}

impl Generator for SentenceGenerator {
    fn id(&self) -> &'static str {
        "sentence"
    }

    fn description(&self) -> &'static str {
        "lorem sentence"
    }

    fn params(&self) -> &'static [ParamSpec] {
        SENTENCE_PARAMS
    }

    fn validate(&self, params: Option<&Value>) -> Result<(), EngineError> {
        Self::bounds(params).map(|_| ())
    }

    fn generate(
        &self,
        ctx: &GeneratorContext,
        params: Option<&Value>,
        rng: &mut dyn RngCore,
    ) -> Result<Scalar, EngineError> {
        let (min_words, max_words) = Self::bounds(params)?;
        let kind = FakerKind::Sentence {
            min_words,
            max_words,
        };
        Ok(Scalar::Text(FakeRsAdapter::generate_text(
            kind, ctx.locale, rng,
        )))
    }
}

struct ParagraphGenerator;

impl ParagraphGenerator {
    fn bounds(params: Option<&Value>) -> Result<(usize, usize), EngineError> {
        let params = validate_params(params, TEXT_PARAMS, "text")?;
        word_bounds(&params, "text", ("min_sentences", "max_sentences"), (2, 5))
    }
}

impl Generator for ParagraphGenerator {
    fn id(&self) -> &'static str {
        "text"
    }

    fn description(&self) -> &'static str {
        "lorem paragraph"
    }

    fn params(&self) -> &'static [ParamSpec] {
        TEXT_PARAMS
    }

    fn validate(&self, params: Option<&Value>) -> Result<(), EngineError> {
        Self::bounds(params).map(|_| ())
    }

    fn generate(
        &self,
        ctx: &GeneratorContext,
        params: Option<&Value>,
        rng: &mut dyn RngCore,
    ) -> Result<Scalar, EngineError> {
        let (min_sentences, max_sentences) = Self::bounds(params)?;
        let kind = FakerKind::Paragraph {
            min_sentences,
            max_sentences,
        };
        Ok(Scalar::Text(FakeRsAdapter::generate_text(
            kind, ctx.locale, rng,
        )))
    }
}

fn word_bounds(
    params: &crate::params::ParamMap<'_>,
    ctx: &str,
    keys: (&str, &str),
    defaults: (i64, i64),
) -> Result<(usize, usize), EngineError> {
    let (min, max) = int_range(params, ctx, keys, defaults)?;
    if min < 1 {
        return Err(EngineError::InvalidRule(format!(
            "{ctx}: {} must be >= 1",
            keys.0
        )));
    }
    Ok((min as usize, max as usize))
}
