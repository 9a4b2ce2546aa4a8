use chrono::NaiveDate;
use rand::{Rng, RngCore};
use serde_json::Value;

use datamask_core::Scalar;

use crate::errors::EngineError;
use crate::generators::{Generator, GeneratorContext, GeneratorRegistry};
use crate::params::{ParamKind, ParamSpec, int_range, validate_params};

const DEFAULT_NUMBER_MIN: i64 = 0;
const DEFAULT_NUMBER_MAX: i64 = 100;
const DEFAULT_IBAN_COUNTRY: &str = "DE";
const IBAN_BBAN_DIGITS: usize = 18;
const DEFAULT_DUMMY: &str = "dummy";

const NUMBER_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("min", ParamKind::Int, false),
    ParamSpec::new("max", ParamKind::Int, false),
];
const DATE_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("min", ParamKind::Date, false),
    ParamSpec::new("max", ParamKind::Date, false),
];
const IBAN_PARAMS: &[ParamSpec] = &[ParamSpec::new("country", ParamKind::String, false)];
const DUMMY_PARAMS: &[ParamSpec] = &[ParamSpec::new("value", ParamKind::String, false)];

pub fn register(registry: &mut GeneratorRegistry) {
    registry.register_generator(Box::new(NumberGenerator));
    registry.register_generator(Box::new(DateGenerator));
    registry.register_generator(Box::new(Uuid4Generator));
    registry.register_generator(Box::new(IbanGenerator));
    registry.register_generator(Box::new(DummyGenerator));
}

pub struct NumberGenerator;

impl NumberGenerator {
    pub fn bounds(params: Option<&Value>) -> Result<(i64, i64), EngineError> {
        let params = validate_params(params, NUMBER_PARAMS, "number")?;
        int_range(
            &params,
            "number",
            ("min", "max"),
            (DEFAULT_NUMBER_MIN, DEFAULT_NUMBER_MAX),
        )
    }
}

impl Generator for NumberGenerator {
    fn id(&self) -> &'static str {
        "number"
    }

    fn description(&self) -> &'static str {
        "integer drawn uniformly from [min, max]"
    }

    fn params(&self) -> &'static [ParamSpec] {
        NUMBER_PARAMS
    }

    fn validate(&self, params: Option<&Value>) -> Result<(), EngineError> {
        Self::bounds(params).map(|_| ())
    }

    fn generate(
        &self,
        _ctx: &GeneratorContext,
        params: Option<&Value>,
        rng: &mut dyn RngCore,
    ) -> Result<Scalar, EngineError> {
        let (min, max) = Self::bounds(params)?;
        Ok(Scalar::Integer(rng.random_range(min..=max)))
    }
}

struct DateGenerator;

impl DateGenerator {
    fn bounds(params: Option<&Value>) -> Result<(NaiveDate, NaiveDate), EngineError> {
        let params = validate_params(params, DATE_PARAMS, "date")?;
        let min = params.get_date("min").unwrap_or_else(default_date_min);
        let max = params.get_date("max").unwrap_or_else(default_date_max);
        if min > max {
            return Err(EngineError::InvalidRule(
                "date: min must be <= max".to_string(),
            ));
        }
        Ok((min, max))
    }
}

fn default_date_min() -> NaiveDate {
    NaiveDate::from_ymd_opt(1950, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_date_max() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 12, 31).unwrap_or(NaiveDate::MAX)
}

impl Generator for DateGenerator {
    fn id(&self) -> &'static str {
        "date"
    }

    fn description(&self) -> &'static str {
        "ISO date (YYYY-MM-DD) between min and max"
    }

    fn params(&self) -> &'static [ParamSpec] {
        DATE_PARAMS
    }

    fn validate(&self, params: Option<&Value>) -> Result<(), EngineError> {
        Self::bounds(params).map(|_| ())
    }

    fn generate(
        &self,
        _ctx: &GeneratorContext,
        params: Option<&Value>,
        rng: &mut dyn RngCore,
    ) -> Result<Scalar, EngineError> {
        let (min, max) = Self::bounds(params)?;
        let span = (max - min).num_days().max(0);
        let offset = rng.random_range(0..=span);
        let date = min + chrono::Duration::days(offset);
        Ok(Scalar::Text(date.format("%Y-%m-%d").to_string()))
    }
}

struct Uuid4Generator;

impl Generator for Uuid4Generator {
    fn id(&self) -> &'static str {
        "uuid4"
    }

    fn description(&self) -> &'static str {
        "random UUID (version 4)"
    }

    fn generate(
        &self,
        _ctx: &GeneratorContext,
        params: Option<&Value>,
        rng: &mut dyn RngCore,
    ) -> Result<Scalar, EngineError> {
        validate_params(params, &[], "uuid4")?;
        let bytes: [u8; 16] = rng.random();
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        Ok(Scalar::Text(uuid.to_string()))
    }
}

struct IbanGenerator;

impl IbanGenerator {
    fn country(params: Option<&Value>) -> Result<String, EngineError> {
        let params = validate_params(params, IBAN_PARAMS, "iban")?;
        let country = params
            .get_str("country")
            .unwrap_or(DEFAULT_IBAN_COUNTRY)
            .to_ascii_uppercase();
        if country.len() != 2 || !country.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(EngineError::InvalidRule(format!(
                "iban: country must be a two-letter code, got '{country}'"
            )));
        }
        Ok(country)
    }
}

impl Generator for IbanGenerator {
    fn id(&self) -> &'static str {
        "iban"
    }

    fn description(&self) -> &'static str {
        "IBAN with valid mod-97 check digits"
    }

    fn params(&self) -> &'static [ParamSpec] {
        IBAN_PARAMS
    }

    fn validate(&self, params: Option<&Value>) -> Result<(), EngineError> {
        Self::country(params).map(|_| ())
    }

    fn generate(
        &self,
        _ctx: &GeneratorContext,
        params: Option<&Value>,
        rng: &mut dyn RngCore,
    ) -> Result<Scalar, EngineError> {
        let country = Self::country(params)?;
        let bban: String = (0..IBAN_BBAN_DIGITS)
            .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
            .collect();
        let check = iban_check_digits(&country, &bban);
        Ok(Scalar::Text(format!("{country}{check:02}{bban}")))
    }
}

/// ISO 13616 check digits: `98 - (bban ++ country ++ "00") mod 97`, letters as 10..35.
fn iban_check_digits(country: &str, bban: &str) -> u32 {
    let rearranged = format!("{bban}{country}00");
    let mut remainder: u32 = 0;
    for ch in rearranged.chars() {
        let Some(digit) = ch.to_digit(36) else {
            continue;
        };
        remainder = if digit >= 10 {
            (remainder * 100 + digit) % 97
        } else {
            (remainder * 10 + digit) % 97
        };
    }
    98 - remainder
}

struct DummyGenerator;

impl Generator for DummyGenerator {
    fn id(&self) -> &'static str {
        "dummy"
    }

    fn description(&self) -> &'static str {
        "constant value"
    }

    fn params(&self) -> &'static [ParamSpec] {
        DUMMY_PARAMS
    }

    fn generate(
        &self,
        _ctx: &GeneratorContext,
        params: Option<&Value>,
        _rng: &mut dyn RngCore,
    ) -> Result<Scalar, EngineError> {
        let params = validate_params(params, DUMMY_PARAMS, "dummy")?;
        Ok(Scalar::text(params.get_str("value").unwrap_or(DEFAULT_DUMMY)))
    }
}
