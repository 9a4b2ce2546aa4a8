use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use datamask_core::atomic::write_bytes_atomic;
use datamask_core::redact_connection_string;
use datamask_engine::{EngineStats, SubstitutionEngine};
use datamask_sources::{
    CsvOptions, CsvSource, FieldSpec, FileOptions, JsonSource, SourceAdapter, SourceKind,
    SourceReport, SqlSource, XmlSource,
};

use crate::CliError;
use crate::config::{Config, EntryConfig};

/// An entry whose rules, locations and regexps are already resolved.
struct PreparedEntry {
    input: String,
    kind: SourceKind,
    table: Option<String>,
    id_column: Option<String>,
    fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Interrupted,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunTotals {
    pub sources: usize,
    pub values: u64,
    pub duration_ms: u128,
}

/// JSON summary optionally written at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub status: RunStatus,
    pub sources: Vec<SourceReport>,
    pub totals: RunTotals,
    pub stats: EngineStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<String>,
}

/// Run every entry of `config` through one engine.
///
/// All entries are prepared before any source is opened, so rule and
/// location mistakes fail the run without touching data.
pub async fn execute(config: &Config, report_path: Option<&Path>) -> Result<RunReport, CliError> {
    config.validate()?;
    let run_id = Uuid::new_v4().to_string();
    let started_at: DateTime<Utc> = Utc::now();
    let started = Instant::now();

    let engine = SubstitutionEngine::new(config.engine_options()?);
    let entries = config
        .entries
        .iter()
        .map(|entry| prepare(&engine, entry))
        .collect::<Result<Vec<_>, _>>()?;
    let csv_options = config.csv_options()?;
    let files = config.file_options()?;

    if let Some(path) = &config.cache_file {
        let loaded = engine.load_cache(path)?;
        info!(cache = %path.display(), entries = loaded, "consistency cache loaded");
    }

    let interrupted = watch_interrupt();
    info!(event = "run_started", run_id = %run_id, entries = entries.len());

    let mut sources = Vec::new();
    let mut status = RunStatus::Success;
    'entries: for entry in &entries {
        for input in expand_inputs(entry, config.ignore_missing_files)? {
            if interrupted.load(Ordering::SeqCst) {
                status = RunStatus::Interrupted;
                break 'entries;
            }
            let adapter = build_adapter(entry, &input, config, &csv_options, &files).await?;
            debug!(
                source = %input,
                kind = %adapter.kind(),
                fields = entry.fields.len(),
                "anonymizing source"
            );
            let report = adapter.anonymize(&engine, &entry.fields).await?;
            info!(
                source = %report.source,
                kind = %report.kind,
                values = report.values_anonymized,
                output = report.output.as_deref().unwrap_or("-"),
                "source anonymized"
            );
            sources.push(report);
        }
        if let Some(path) = &config.cache_file {
            engine.save_cache(path)?;
        }
    }
    if status == RunStatus::Interrupted {
        warn!("interrupted; stopping before the next source");
        if let Some(path) = &config.cache_file {
            engine.save_cache(path)?;
        }
    }

    let duration_ms = started.elapsed().as_millis();
    let values = sources.iter().map(|source| source.values_anonymized).sum();
    let report = RunReport {
        run_id,
        started_at: started_at.to_rfc3339(),
        finished_at: Utc::now().to_rfc3339(),
        status,
        totals: RunTotals {
            sources: sources.len(),
            values,
            duration_ms,
        },
        sources,
        stats: engine.stats()?,
        cache_file: config
            .cache_file
            .as_ref()
            .map(|path| path.display().to_string()),
    };
    info!(
        event = "run_finished",
        status = ?report.status,
        sources = report.totals.sources,
        values = report.totals.values,
        duration_ms = report.totals.duration_ms as u64,
    );

    if let Some(path) = report_path {
        write_bytes_atomic(path, &serde_json::to_vec_pretty(&report)?)?;
    }
    if report.status == RunStatus::Interrupted {
        return Err(CliError::Interrupted);
    }
    Ok(report)
}

fn prepare(engine: &SubstitutionEngine, entry: &EntryConfig) -> Result<PreparedEntry, CliError> {
    let kind = entry.kind()?;
    let fields = entry
        .fields
        .iter()
        .map(|field| -> Result<FieldSpec, CliError> {
            let location = entry.location(kind, field)?;
            let spec = FieldSpec::new(location, engine.resolve_rule(&field.rule)?);
            match &field.regexp {
                Some(pattern) => Ok(spec.with_regexp(pattern)?),
                None => Ok(spec),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PreparedEntry {
        input: entry.input.clone(),
        kind,
        table: entry.table.clone(),
        id_column: entry.id_column.clone(),
        fields,
    })
}

/// Database URLs are used as-is; anything else is a glob.
fn expand_inputs(entry: &PreparedEntry, ignore_missing: bool) -> Result<Vec<String>, CliError> {
    if entry.kind == SourceKind::Sql || entry.input.contains("://") {
        return Ok(vec![entry.input.clone()]);
    }
    let paths = glob::glob(&entry.input).map_err(|err| {
        CliError::InvalidConfig(format!("bad input pattern {:?}: {err}", entry.input))
    })?;
    let mut inputs = Vec::new();
    for path in paths {
        match path {
            Ok(path) if path.is_file() => inputs.push(path.display().to_string()),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "skipping unreadable path"),
        }
    }
    if inputs.is_empty() {
        if ignore_missing {
            warn!(input = %entry.input, "no input files matched; skipping");
        } else {
            return Err(CliError::MissingInput(entry.input.clone()));
        }
    }
    Ok(inputs)
}

async fn build_adapter(
    entry: &PreparedEntry,
    input: &str,
    config: &Config,
    csv_options: &CsvOptions,
    files: &FileOptions,
) -> Result<Box<dyn SourceAdapter>, CliError> {
    let adapter: Box<dyn SourceAdapter> = match entry.kind {
        SourceKind::Csv => Box::new(CsvSource::new(
            PathBuf::from(input),
            csv_options.clone(),
            files.clone(),
        )),
        SourceKind::Json => Box::new(JsonSource::new(PathBuf::from(input), files.clone())),
        SourceKind::Xml => Box::new(
            XmlSource::new(PathBuf::from(input), files.clone())
                .with_namespaces(config.namespaces.clone()),
        ),
        SourceKind::Sql => {
            let table = entry.table.as_deref().ok_or_else(|| {
                CliError::InvalidConfig(format!(
                    "database entry {} needs a table",
                    redact_connection_string(input)
                ))
            })?;
            Box::new(SqlSource::connect(input, table, entry.id_column.clone()).await?)
        }
    };
    Ok(adapter)
}

/// Ctrl-C flips the flag; the run stops before the next source.
fn watch_interrupt() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.store(true, Ordering::SeqCst);
        }
    });
    flag
}
