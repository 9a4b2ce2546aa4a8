use std::path::PathBuf;

use async_trait::async_trait;
use csv::{ReaderBuilder, Terminator, WriterBuilder};
use tracing::debug;

use datamask_core::Scalar;
use datamask_engine::{RenderContext, SubstitutionEngine};

use crate::adapter::{FileOptions, SourceAdapter, SourceKind, SourceReport};
use crate::error::SourceError;
use crate::field::{ColumnRef, FieldLocation, FieldSpec};

pub const DEFAULT_DELIMITER: u8 = b';';

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Leading lines copied verbatim; the first one names the columns.
    pub header_lines: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            header_lines: 0,
        }
    }
}

/// Delimited text file anonymized row by row.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
    pub options: CsvOptions,
    pub files: FileOptions,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, options: CsvOptions, files: FileOptions) -> Self {
        Self {
            path: path.into(),
            options,
            files,
        }
    }

    fn column_index(&self, field: &FieldSpec, headers: &[String]) -> Result<usize, SourceError> {
        match &field.location {
            FieldLocation::Column(ColumnRef::Index(index)) => Ok(*index),
            FieldLocation::Column(ColumnRef::Name(name)) => headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| {
                    SourceError::InvalidLocation(format!(
                        "column {name:?} not found in header of {}",
                        self.path.display()
                    ))
                }),
            other => Err(SourceError::InvalidLocation(format!(
                "csv source {} cannot address {other}",
                self.path.display()
            ))),
        }
    }

    fn run(
        &self,
        engine: &SubstitutionEngine,
        fields: &[FieldSpec],
    ) -> Result<SourceReport, SourceError> {
        let text = self.files.read(&self.path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.options.delimiter)
            .from_reader(text.as_bytes());
        let mut writer = WriterBuilder::new()
            .flexible(true)
            .delimiter(self.options.delimiter)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        let mut records = reader.records();
        let mut headers: Vec<String> = Vec::new();
        for line in 0..self.options.header_lines {
            let Some(record) = records.next() else {
                break;
            };
            let record = record?;
            if line == 0 {
                headers = record.iter().map(|cell| cell.trim().to_string()).collect();
            }
            writer.write_record(&record)?;
        }

        let columns = fields
            .iter()
            .map(|field| self.column_index(field, &headers))
            .collect::<Result<Vec<_>, _>>()?;

        let mut values = 0u64;
        let mut rows = 0u64;
        for record in records {
            let record = record?;
            let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
            let mut context = RenderContext::new();
            for (index, cell) in cells.iter().enumerate() {
                bind(&mut context, &headers, index, Scalar::text(clean(cell)));
            }

            for (field, &index) in fields.iter().zip(&columns) {
                let Some(cell) = cells.get(index) else {
                    continue;
                };
                let original = clean(cell);
                if original.is_empty() {
                    continue;
                }
                let substitute = field.apply(engine, &Scalar::Text(original), &context)?;
                cells[index] = substitute.to_string();
                bind(&mut context, &headers, index, substitute);
                values += 1;
            }
            writer.write_record(&cells)?;
            rows += 1;
        }

        let data = writer
            .into_inner()
            .map_err(|err| SourceError::Io(err.into_error()))?;
        let target = self.files.write(&self.path, &data)?;
        debug!(source = %self.path.display(), rows, values, "csv rows written");

        Ok(SourceReport {
            source: self.path.display().to_string(),
            kind: SourceKind::Csv,
            values_anonymized: values,
            output: Some(target.display().to_string()),
        })
    }
}

#[async_trait]
impl SourceAdapter for CsvSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Csv
    }

    async fn anonymize(
        &self,
        engine: &SubstitutionEngine,
        fields: &[FieldSpec],
    ) -> Result<SourceReport, SourceError> {
        self.run(engine, fields)
    }
}

fn clean(cell: &str) -> String {
    cell.trim().replace('\n', "")
}

/// Cells are visible to templates as `col_<index>` and under their header name.
fn bind(context: &mut RenderContext, headers: &[String], index: usize, value: Scalar) {
    if let Some(name) = headers.get(index).filter(|name| !name.is_empty()) {
        context.insert(name.clone(), value.clone());
    }
    context.insert(format!("col_{index}"), value);
}
