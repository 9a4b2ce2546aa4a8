use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};

use datamask_core::atomic::write_bytes_atomic;
use datamask_engine::SubstitutionEngine;

use crate::error::SourceError;
use crate::field::FieldSpec;

pub const DEFAULT_OUTPUT_SUFFIX: &str = "_anonymized";

/// Trait implemented by every data source that can be anonymized.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Returns the source kind (e.g. `csv`).
    fn kind(&self) -> SourceKind;

    /// Anonymize all `fields` of the source, in order, and write the result.
    async fn anonymize(
        &self,
        engine: &SubstitutionEngine,
        fields: &[FieldSpec],
    ) -> Result<SourceReport, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Csv,
    Json,
    Xml,
    Sql,
}

impl SourceKind {
    /// Database URLs contain `://`; files are recognised by extension.
    pub fn infer(input: &str) -> Option<Self> {
        if input.contains("://") {
            return Some(SourceKind::Sql);
        }
        let extension = Path::new(input).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(SourceKind::Csv),
            "json" => Some(SourceKind::Json),
            "xml" => Some(SourceKind::Xml),
            _ => None,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(SourceKind::Csv),
            "json" => Some(SourceKind::Json),
            "xml" => Some(SourceKind::Xml),
            "sql" | "db" => Some(SourceKind::Sql),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceKind::Csv => "csv",
            SourceKind::Json => "json",
            SourceKind::Xml => "xml",
            SourceKind::Sql => "sql",
        };
        f.write_str(label)
    }
}

/// Outcome of anonymizing one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    pub kind: SourceKind,
    pub values_anonymized: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// How file adapters read their input and where they write their result.
#[derive(Debug, Clone)]
pub struct FileOptions {
    pub overwrite: bool,
    pub suffix: String,
    /// Character encoding of both input and output files.
    pub encoding: &'static Encoding,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            encoding: UTF_8,
        }
    }
}

/// Resolve an encoding label such as `utf-8`, `latin1` or `ISO-8859-15`.
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

impl FileOptions {
    /// `data.csv` becomes `data.csv_anonymized` unless overwriting in place.
    pub fn target_for(&self, input: &Path) -> PathBuf {
        if self.overwrite {
            return input.to_path_buf();
        }
        let mut name: OsString = input.as_os_str().to_os_string();
        name.push(&self.suffix);
        PathBuf::from(name)
    }

    /// Read `input` and decode it; a byte-order mark overrides the encoding.
    pub(crate) fn read(&self, input: &Path) -> Result<String, SourceError> {
        let raw = std::fs::read(input)?;
        let (text, used, malformed) = self.encoding.decode(&raw);
        if malformed {
            return Err(SourceError::Encoding(format!(
                "{} is not valid {}",
                input.display(),
                used.name()
            )));
        }
        Ok(text.into_owned())
    }

    /// Encode UTF-8 `data` and write it next to (or over) `input`.
    pub(crate) fn write(&self, input: &Path, data: &[u8]) -> Result<PathBuf, SourceError> {
        let target = self.target_for(input);
        if self.encoding == UTF_8 {
            write_bytes_atomic(&target, data)?;
            return Ok(target);
        }
        let text = std::str::from_utf8(data)
            .map_err(|err| SourceError::Encoding(format!("output is not utf-8: {err}")))?;
        let (bytes, used, unmappable) = self.encoding.encode(text);
        if unmappable {
            return Err(SourceError::Encoding(format!(
                "{} cannot represent every substitute in {}",
                used.name(),
                target.display()
            )));
        }
        write_bytes_atomic(&target, &bytes)?;
        Ok(target)
    }
}
