use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row, ValueRef};
use tracing::{debug, warn};

use datamask_core::{Scalar, redact_connection_string};
use datamask_engine::{RenderContext, SubstitutionEngine};

use crate::adapter::{SourceAdapter, SourceKind, SourceReport};
use crate::error::SourceError;
use crate::field::{ColumnRef, FieldLocation, FieldSpec};
use crate::json::{JsonPath, anonymize_document, to_pretty_bytes};

/// One database table; every field of the entry targets a column of it.
#[derive(Debug, Clone)]
pub struct SqlSource {
    label: String,
    table: String,
    id_column: Option<String>,
    pool: AnyPool,
}

enum Target<'a> {
    Column(&'a str),
    Json(&'a str, &'a JsonPath),
}

impl SqlSource {
    /// Connect to `url` (postgres or sqlite) through the `Any` driver.
    pub async fn connect(
        url: &str,
        table: &str,
        id_column: Option<String>,
    ) -> Result<Self, SourceError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(1).connect(url).await?;
        Self::with_pool(
            pool,
            format!("{}#{table}", redact_connection_string(url)),
            table,
            id_column,
        )
    }

    pub fn with_pool(
        pool: AnyPool,
        label: impl Into<String>,
        table: &str,
        id_column: Option<String>,
    ) -> Result<Self, SourceError> {
        quote_identifier(table)?;
        if let Some(id) = &id_column {
            quote_identifier(id)?;
        }
        Ok(Self {
            label: label.into(),
            table: table.to_string(),
            id_column,
            pool,
        })
    }

    async fn run(
        &self,
        engine: &SubstitutionEngine,
        fields: &[FieldSpec],
    ) -> Result<SourceReport, SourceError> {
        let targets = fields
            .iter()
            .map(|field| resolve_target(&field.location))
            .collect::<Result<Vec<_>, _>>()?;

        let mut columns: Vec<&str> = Vec::new();
        let mut seen = HashSet::new();
        let selected = self
            .id_column
            .as_deref()
            .into_iter()
            .chain(targets.iter().map(Target::column));
        for name in selected {
            if seen.insert(name) {
                columns.push(name);
            }
        }
        let table = quote_identifier(&self.table)?;
        let select_list = columns
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");

        let mut tx = self.pool.begin().await?;
        let key = self.row_key(tx.backend_name(), &targets)?;
        let rows = sqlx::query(&format!(
            "SELECT {select_list}, {} FROM {table}",
            key.select_expr()?
        ))
        .fetch_all(&mut *tx)
        .await?;

        let mut values = 0u64;
        let mut updated = 0usize;
        for row in &rows {
            let mut context = RenderContext::new();
            for (index, column) in columns.iter().enumerate() {
                context.insert(*column, decode(row, index)?);
            }
            let row_id = decode(row, columns.len())?;

            let mut changes: Vec<(&str, Scalar)> = Vec::new();
            for (field, target) in fields.iter().zip(&targets) {
                let column = target.column();
                let original = context.get(column).cloned().unwrap_or(Scalar::Null);
                if original.is_null() {
                    continue;
                }
                let substitute = match target {
                    Target::Column(_) => {
                        values += 1;
                        field.apply(engine, &original, &context)?
                    }
                    Target::Json(_, path) => {
                        let Some(text) = original.as_str() else {
                            warn!(
                                source = %self.label,
                                column,
                                "json column value is not text; skipped"
                            );
                            continue;
                        };
                        let mut document: Value = match serde_json::from_str(text) {
                            Ok(document) => document,
                            Err(err) => {
                                warn!(
                                    source = %self.label,
                                    column,
                                    error = %err,
                                    "json column value does not parse; skipped"
                                );
                                continue;
                            }
                        };
                        let mut carry = context.clone();
                        values +=
                            anonymize_document(engine, &mut document, path, field, &mut carry)?;
                        let mut dumped = to_pretty_bytes(&document)?;
                        dumped.pop();
                        Scalar::Text(String::from_utf8_lossy(&dumped).into_owned())
                    }
                };

                match changes.iter_mut().find(|(name, _)| *name == column) {
                    Some((_, slot)) => *slot = substitute.clone(),
                    None => changes.push((column, substitute.clone())),
                }
                context.insert(column, substitute);
            }
            if changes.is_empty() {
                continue;
            }

            let assignments = changes
                .iter()
                .enumerate()
                .map(|(index, (column, _))| {
                    Ok(format!("{} = ${}", quote_identifier(column)?, index + 1))
                })
                .collect::<Result<Vec<_>, SourceError>>()?
                .join(", ");
            let sql = format!(
                "UPDATE {table} SET {assignments} WHERE {}",
                key.predicate(changes.len() + 1)?
            );
            let mut query = sqlx::query(&sql);
            for (_, substitute) in &changes {
                query = bind_scalar(query, substitute);
            }
            bind_scalar(query, &row_id).execute(&mut *tx).await?;
            updated += 1;
        }
        tx.commit().await?;
        debug!(source = %self.label, rows = rows.len(), updated, values, "table updated");

        Ok(SourceReport {
            source: self.label.clone(),
            kind: SourceKind::Sql,
            values_anonymized: values,
            output: None,
        })
    }

    /// Rows are addressed by `id_column` unless it is itself rewritten, then by
    /// the backend's physical row id. Every row is updated at most once.
    fn row_key<'a>(
        &'a self,
        backend: &str,
        targets: &[Target<'_>],
    ) -> Result<RowKey<'a>, SourceError> {
        if let Some(id) = self.id_column.as_deref() {
            if targets.iter().all(|target| target.column() != id) {
                return Ok(RowKey::Column(id));
            }
        }
        let backend = backend.to_ascii_lowercase();
        if backend.contains("sqlite") {
            Ok(RowKey::SqliteRowid)
        } else if backend.contains("postgres") {
            Ok(RowKey::PostgresCtid)
        } else {
            Err(SourceError::InvalidLocation(format!(
                "{}: no row id on {backend}; set an id_column that is not anonymized",
                self.label
            )))
        }
    }
}

/// How a fetched row is found again for its update.
enum RowKey<'a> {
    Column(&'a str),
    SqliteRowid,
    PostgresCtid,
}

impl RowKey<'_> {
    fn select_expr(&self) -> Result<String, SourceError> {
        Ok(match self {
            RowKey::Column(column) => quote_identifier(column)?,
            RowKey::SqliteRowid => "rowid".to_string(),
            RowKey::PostgresCtid => "ctid::text".to_string(),
        })
    }

    fn predicate(&self, placeholder: usize) -> Result<String, SourceError> {
        Ok(match self {
            RowKey::Column(column) => format!("{} = ${placeholder}", quote_identifier(column)?),
            RowKey::SqliteRowid => format!("rowid = ${placeholder}"),
            RowKey::PostgresCtid => format!("ctid = ${placeholder}::tid"),
        })
    }
}

#[async_trait]
impl SourceAdapter for SqlSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Sql
    }

    async fn anonymize(
        &self,
        engine: &SubstitutionEngine,
        fields: &[FieldSpec],
    ) -> Result<SourceReport, SourceError> {
        self.run(engine, fields).await
    }
}

impl Target<'_> {
    fn column(&self) -> &str {
        match self {
            Target::Column(column) | Target::Json(column, _) => *column,
        }
    }
}

fn resolve_target(location: &FieldLocation) -> Result<Target<'_>, SourceError> {
    match location {
        FieldLocation::Column(ColumnRef::Name(column)) => Ok(Target::Column(column)),
        FieldLocation::ColumnJson { column, path } => Ok(Target::Json(column, path)),
        other => Err(SourceError::InvalidLocation(format!(
            "sql source needs a column name, got {other}"
        ))),
    }
}

/// Validate and double-quote `name`; `schema.table` is accepted.
pub fn quote_identifier(name: &str) -> Result<String, SourceError> {
    if !name.split('.').all(is_plain_identifier) {
        return Err(SourceError::InvalidLocation(format!(
            "invalid sql identifier {name:?}"
        )));
    }
    Ok(name
        .split('.')
        .map(|part| format!("\"{part}\""))
        .collect::<Vec<_>>()
        .join("."))
}

fn is_plain_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn decode(row: &AnyRow, index: usize) -> Result<Scalar, SourceError> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Scalar::Null);
    }
    if let Ok(text) = row.try_get::<String, _>(index) {
        return Ok(Scalar::Text(text));
    }
    if let Ok(int) = row.try_get::<i64, _>(index) {
        return Ok(Scalar::Integer(int));
    }
    if let Ok(float) = row.try_get::<f64, _>(index) {
        return Ok(Scalar::Float(float));
    }
    if let Ok(flag) = row.try_get::<bool, _>(index) {
        return Ok(Scalar::Text(flag.to_string()));
    }
    Err(SourceError::InvalidLocation(format!(
        "column {index} has an unsupported type"
    )))
}

type AnyQuery<'q> = sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>;

fn bind_scalar<'q>(query: AnyQuery<'q>, value: &Scalar) -> AnyQuery<'q> {
    match value {
        Scalar::Null => query.bind(None::<String>),
        Scalar::Integer(value) => query.bind(*value),
        Scalar::Float(value) => query.bind(*value),
        Scalar::Text(value) => query.bind(value.clone()),
    }
}
