//! Run configuration: a TOML file, optionally extended by legacy `-i` selectors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use datamask_core::RuleSpec;
use datamask_engine::{
    EngineOptions, GeneratorRegistry, LocaleKey, model::DEFAULT_UNIQUE_MAX_ATTEMPTS,
};
use datamask_sources::{
    CsvOptions, DEFAULT_OUTPUT_SUFFIX, FieldLocation, FileOptions, SourceKind,
    csv::DEFAULT_DELIMITER, encoding_for_label,
};

/// Generator type used by legacy selectors that do not name one.
pub const DEFAULT_LEGACY_TYPE: &str = "number";

/// Range of legacy `number` selectors that give no `min`/`max`.
const LEGACY_NUMBER_BOUNDS: (i64, i64) = (0, 1_000_000);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },
    #[error("{0}")]
    Invalid(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub locale: Option<String>,
    pub seed: Option<u64>,
    /// Persisted consistency cache, loaded before and saved after each entry.
    pub cache_file: Option<PathBuf>,
    pub render_templates_for_empty: bool,
    pub unique_max_attempts: Option<usize>,
    pub delimiter: Option<String>,
    /// Encoding label of file sources; UTF-8 when unset.
    pub encoding: Option<String>,
    pub header_lines: usize,
    pub overwrite: bool,
    pub ignore_missing_files: bool,
    pub output_suffix: Option<String>,
    /// Prefixes usable in xpath selectors, bound to namespace URIs.
    pub namespaces: BTreeMap<String, String>,
    pub entries: Vec<EntryConfig>,
}

/// One input (file glob or database URL) and the fields to anonymize in it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryConfig {
    pub input: String,
    #[serde(default)]
    pub kind: Option<SourceKind>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub jsonpath: Option<String>,
    #[serde(default)]
    pub xpath: Option<String>,
    pub rule: RuleSpec,
    #[serde(default)]
    pub regexp: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Check everything that can be checked without touching the data.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.entries.is_empty() {
            return Err(ConfigError::Invalid(
                "no entries configured; pass --config or -i selectors".to_string(),
            ));
        }
        self.engine_options()?;
        self.csv_options()?;
        self.file_options()?;
        for entry in &self.entries {
            let kind = entry.kind()?;
            if entry.fields.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "entry {:?} has no fields",
                    entry.input
                )));
            }
            if kind == SourceKind::Sql && entry.table.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "database entry {:?} needs a table",
                    redacted(&entry.input)
                )));
            }
            for field in &entry.fields {
                entry.location(kind, field)?;
            }
        }
        Ok(())
    }

    pub fn engine_options(&self) -> ConfigResult<EngineOptions> {
        let locale = match &self.locale {
            Some(raw) => LocaleKey::parse(raw).ok_or_else(|| {
                ConfigError::Invalid(format!("unsupported locale {raw:?} (en_US, pt_BR, de_DE)"))
            })?,
            None => LocaleKey::default(),
        };
        Ok(EngineOptions {
            locale,
            seed: self.seed,
            render_templates_for_empty: self.render_templates_for_empty,
            unique_max_attempts: self
                .unique_max_attempts
                .unwrap_or(DEFAULT_UNIQUE_MAX_ATTEMPTS),
        })
    }

    pub fn csv_options(&self) -> ConfigResult<CsvOptions> {
        let delimiter = match self.delimiter.as_deref() {
            None => DEFAULT_DELIMITER,
            Some(raw) => parse_delimiter(raw)?,
        };
        Ok(CsvOptions {
            delimiter,
            header_lines: self.header_lines,
        })
    }

    pub fn file_options(&self) -> ConfigResult<FileOptions> {
        let mut options = FileOptions {
            overwrite: self.overwrite,
            suffix: self
                .output_suffix
                .clone()
                .unwrap_or_else(|| DEFAULT_OUTPUT_SUFFIX.to_string()),
            ..FileOptions::default()
        };
        if let Some(label) = &self.encoding {
            options.encoding = encoding_for_label(label)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown encoding {label:?}")))?;
        }
        Ok(options)
    }
}

impl EntryConfig {
    /// Explicit kind, or inferred from the extension / `://` of the input.
    pub fn kind(&self) -> ConfigResult<SourceKind> {
        self.kind
            .or_else(|| SourceKind::infer(&self.input))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "cannot infer the kind of {:?}; set kind = csv, json, xml or sql",
                    self.input
                ))
            })
    }

    pub fn location(&self, kind: SourceKind, field: &FieldConfig) -> ConfigResult<FieldLocation> {
        let missing = |what: &str| {
            ConfigError::Invalid(format!(
                "{kind} field of {:?} needs {what}",
                redacted(&self.input)
            ))
        };
        let location = match kind {
            SourceKind::Csv => {
                let column = field.column.as_deref().ok_or_else(|| missing("a column"))?;
                FieldLocation::column(column)
            }
            SourceKind::Json => {
                let path = field.jsonpath.as_deref().ok_or_else(|| missing("a jsonpath"))?;
                FieldLocation::json_path(path).map_err(invalid)?
            }
            SourceKind::Xml => {
                let path = field.xpath.as_deref().ok_or_else(|| missing("an xpath"))?;
                FieldLocation::xpath(path).map_err(invalid)?
            }
            SourceKind::Sql => {
                let column = field.column.as_deref().ok_or_else(|| missing("a column"))?;
                match field.jsonpath.as_deref() {
                    Some(path) => FieldLocation::column_json(column, path).map_err(invalid)?,
                    None => FieldLocation::column(column),
                }
            }
        };
        Ok(location)
    }
}

fn invalid(err: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid(err.to_string())
}

fn redacted(input: &str) -> String {
    if input.contains("://") {
        datamask_core::redact_connection_string(input)
    } else {
        input.to_string()
    }
}

/// `prefix=uri`, as given to `--namespace`.
pub fn parse_namespace(raw: &str) -> ConfigResult<(String, String)> {
    match raw.split_once('=') {
        Some((prefix, uri)) if !prefix.trim().is_empty() && !uri.trim().is_empty() => {
            Ok((prefix.trim().to_string(), uri.trim().to_string()))
        }
        _ => Err(ConfigError::Invalid(format!(
            "namespace must look like prefix=uri, got {raw:?}"
        ))),
    }
}

/// A single ASCII character; `\t` and `tab` mean a tab.
pub fn parse_delimiter(raw: &str) -> ConfigResult<u8> {
    match raw {
        "\\t" | "tab" => return Ok(b'\t'),
        _ => {}
    }
    match raw.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(ConfigError::Invalid(format!(
            "delimiter must be a single ascii character, got {raw:?}"
        ))),
    }
}

/// A parsed `-i SOURCE:SELECTOR` argument.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacySelector {
    pub input: String,
    pub kind: Option<SourceKind>,
    pub table: Option<String>,
    pub field: FieldConfig,
}

/// Parse `source:(key=value,...)`, `file.csv:3` or `file.xml:/x/path`.
///
/// The source is split at the rightmost single colon; `::` in the selector
/// stands for a literal colon.
pub fn parse_selector(argument: &str, default_type: &str) -> ConfigResult<LegacySelector> {
    let error = |message: &str| ConfigError::Selector {
        selector: argument.to_string(),
        message: message.to_string(),
    };
    let split = rightmost_single_colon(argument)
        .ok_or_else(|| error("no colon between input source and selector"))?;
    let input = argument[..split].to_string();
    let body = argument[split + 1..].replace("::", ":");
    if input.is_empty() {
        return Err(error("empty input source"));
    }

    let mut selector = LegacySelector {
        input,
        kind: None,
        table: None,
        field: FieldConfig {
            column: None,
            jsonpath: None,
            xpath: None,
            rule: RuleSpec::generator(default_type),
            regexp: None,
        },
    };

    let Some(inner) = body.strip_prefix('(') else {
        if body.is_empty() {
            return Err(error("empty selector"));
        }
        if body.bytes().all(|b| b.is_ascii_digit()) {
            selector.kind = Some(SourceKind::Csv);
            selector.field.column = Some(body);
        } else {
            selector.kind = Some(SourceKind::Xml);
            selector.field.xpath = Some(body);
        }
        selector.field.rule = legacy_rule(default_type.to_string(), Map::new());
        return Ok(selector);
    };
    let inner = inner
        .strip_suffix(')')
        .ok_or_else(|| error("selector is not closed with ')'"))?;

    let mut generator = default_type.to_string();
    let mut template = None;
    let mut params = Map::new();
    for part in split_top_level(inner) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| error(&format!("expected key=value, got {part:?}")))?;
        let value = value.trim().to_string();
        match key.trim() {
            "type" => generator = value,
            "table" => selector.table = Some(value),
            "column" => selector.field.column = Some(value),
            "xpath" => selector.field.xpath = Some(value),
            "jsonpath" => selector.field.jsonpath = Some(value),
            "regexp" => selector.field.regexp = Some(value),
            "template" => template = Some(value),
            "input-type" | "input_type" => {
                let kind = SourceKind::parse(&value)
                    .ok_or_else(|| error(&format!("unknown input-type {value:?}")))?;
                selector.kind = Some(kind);
            }
            "min" | "max" => {
                let bound: i64 = value
                    .parse()
                    .map_err(|_| error(&format!("{key} must be an integer, got {value:?}")))?;
                params.insert(key.trim().to_string(), Value::from(bound));
            }
            other => return Err(error(&format!("unknown key {other:?}"))),
        }
    }

    selector.field.rule = match template {
        Some(template) => RuleSpec::template(legacy_template(&template, &generator)?),
        None => legacy_rule(generator, params),
    };
    Ok(selector)
}

/// Legacy `number` selectors draw from 0..=1000000 unless bounded.
fn legacy_rule(generator: String, mut params: Map<String, Value>) -> RuleSpec {
    if generator == "number" {
        let (min, max) = LEGACY_NUMBER_BOUNDS;
        params.entry("min").or_insert_with(|| Value::from(min));
        params.entry("max").or_insert_with(|| Value::from(max));
    }
    if params.is_empty() {
        RuleSpec::generator(generator)
    } else {
        RuleSpec::generator_with_params(generator, Value::Object(params))
    }
}

/// Bindings and literals a legacy template may name without rewriting.
const TEMPLATE_NAMES: &[&str] = &["value", "row", "env", "gen", "none", "None"];

/// Translate a legacy template onto the template bindings.
///
/// `__value__` is the generated substitute and `__original_value__` the
/// original. A bare `{{ city }}` names a generator applied to the original,
/// and any other bare name such as `{{ col_1 }}` reads the row.
fn legacy_template(template: &str, generator: &str) -> ConfigResult<String> {
    let bare = Regex::new(r"\{\{(\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*)(\||\}\})")
        .map_err(invalid)?;
    let registry = GeneratorRegistry::new();
    let rewritten = bare.replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[2];
        let binding = if name.starts_with("__") || TEMPLATE_NAMES.contains(&name) {
            name.to_string()
        } else if registry.contains(name) {
            format!("gen['{name}']")
        } else {
            format!("row['{name}']")
        };
        format!("{{{{{}{binding}{}{}", &caps[1], &caps[3], &caps[4])
    });
    Ok(rewritten
        .replace("__original_value__", "value")
        .replace("__value__", &format!("gen['{generator}']")))
}

fn rightmost_single_colon(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    (0..bytes.len()).rev().find(|&index| {
        bytes[index] == b':'
            && (index == 0 || bytes[index - 1] != b':')
            && bytes.get(index + 1) != Some(&b':')
    })
}

/// Split on commas outside brackets, braces and parentheses.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in input.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Selectors naming the same source (same file, or same URL and table) form
/// one entry; order of first appearance is kept.
pub fn group_selectors(selectors: Vec<LegacySelector>) -> Vec<EntryConfig> {
    let mut entries: Vec<EntryConfig> = Vec::new();
    for selector in selectors {
        let existing = entries
            .iter_mut()
            .find(|entry| entry.input == selector.input && entry.table == selector.table);
        match existing {
            Some(entry) => {
                if entry.kind.is_none() {
                    entry.kind = selector.kind;
                }
                entry.fields.push(selector.field);
            }
            None => entries.push(EntryConfig {
                input: selector.input,
                kind: selector.kind,
                table: selector.table,
                id_column: None,
                fields: vec![selector.field],
            }),
        }
    }
    entries
}
