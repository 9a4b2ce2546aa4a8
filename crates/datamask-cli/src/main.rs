mod config;
mod filter;
mod logging;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use datamask_engine::{EngineError, GeneratorRegistry};
use datamask_sources::SourceError;

use config::{
    Config, ConfigError, DEFAULT_LEGACY_TYPE, group_selectors, parse_namespace, parse_selector,
};
use logging::{LogFormat, init_logging};

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("source error: {0}")]
    Source(#[from] SourceError),
    #[error("no input files match {0:?}")]
    MissingInput(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(String),
    #[error("interrupted")]
    Interrupted,
}

impl CliError {
    /// 2 for configuration mistakes, 130 for Ctrl-C, 1 for everything else.
    fn exit_code(&self) -> u8 {
        match self {
            CliError::InvalidConfig(_) | CliError::Config(_) => 2,
            CliError::Engine(err) | CliError::Source(SourceError::Engine(err)) => {
                match err {
                    EngineError::InvalidRule(_) | EngineError::Template(_) => 2,
                    _ => 1,
                }
            }
            CliError::Source(SourceError::InvalidLocation(_)) => 2,
            CliError::Interrupted => 130,
            _ => 1,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "datamask",
    version,
    about = "Replace sensitive values in CSV, JSON, XML and SQL sources with consistent fakes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Anonymize the configured sources.
    Run(RunArgs),
    /// List the available generators.
    Generators(GeneratorsArgs),
    /// Keep header lines plus lines containing an expression.
    FilterLines(FilterLinesArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// TOML run configuration.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
    /// Legacy selector SOURCE:SELECTOR, e.g. `people.csv:(type=first_name,column=0)`.
    #[arg(long, short = 'i', value_name = "SELECTOR")]
    input: Vec<String>,
    /// Generator used by selectors without `type=`.
    #[arg(long = "type", short = 't', default_value = DEFAULT_LEGACY_TYPE)]
    generator: String,
    /// Locale for generated values (en_US, pt_BR, de_DE).
    #[arg(long, short = 'l')]
    locale: Option<String>,
    /// Seed for reproducible output.
    #[arg(long)]
    seed: Option<u64>,
    /// Consistency cache file shared across runs.
    #[arg(long)]
    cache: Option<PathBuf>,
    /// CSV delimiter.
    #[arg(long, short = 'd')]
    delimiter: Option<String>,
    /// Encoding of file sources, e.g. `utf-8` or `ISO-8859-15`.
    #[arg(long, short = 'e')]
    encoding: Option<String>,
    /// Leading CSV lines copied unchanged.
    #[arg(long)]
    header_lines: Option<usize>,
    /// XML namespace binding PREFIX=URI for xpath selectors; repeatable.
    #[arg(long, value_name = "PREFIX=URI")]
    namespace: Vec<String>,
    /// Rewrite input files in place.
    #[arg(long, short = 'o')]
    overwrite: bool,
    /// Warn instead of failing when an input pattern matches nothing.
    #[arg(long = "ignore-missing-file", short = 'j')]
    ignore_missing: bool,
    /// Suffix of output files when not overwriting.
    #[arg(long)]
    output_suffix: Option<String>,
    /// Write a JSON run report.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Append JSON logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Args, Debug)]
struct GeneratorsArgs {
    /// Print the catalog as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct FilterLinesArgs {
    /// Byte string a line must contain.
    expr: String,
    #[arg(default_value = "-")]
    infile: String,
    #[arg(default_value = "-")]
    outfile: String,
    /// Leading lines copied unchanged.
    #[arg(long, default_value_t = 0)]
    header_lines: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run_anonymize(args).await,
        Command::Generators(args) => list_generators(args),
        Command::FilterLines(args) => {
            filter::run(&args.expr, args.header_lines, &args.infile, &args.outfile)
                .map(|_| ())
                .map_err(CliError::from)
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run_anonymize(args: RunArgs) -> Result<(), CliError> {
    init_logging(args.log_file.as_deref(), args.log_format)?;
    let config = merge_config(&args)?;
    run::execute(&config, args.report.as_deref()).await?;
    Ok(())
}

/// Command-line flags override the TOML file; legacy selectors add entries.
fn merge_config(args: &RunArgs) -> Result<Config, CliError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if args.config.is_none() && args.input.is_empty() {
        return Err(CliError::InvalidConfig(
            "pass --config or at least one -i selector".to_string(),
        ));
    }

    let selectors = args
        .input
        .iter()
        .map(|raw| parse_selector(raw, &args.generator))
        .collect::<Result<Vec<_>, _>>()?;
    config.entries.extend(group_selectors(selectors));

    if let Some(locale) = &args.locale {
        config.locale = Some(locale.clone());
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(cache) = &args.cache {
        config.cache_file = Some(cache.clone());
    }
    if let Some(delimiter) = &args.delimiter {
        config.delimiter = Some(delimiter.clone());
    }
    if let Some(encoding) = &args.encoding {
        config.encoding = Some(encoding.clone());
    }
    for raw in &args.namespace {
        let (prefix, uri) = parse_namespace(raw)?;
        config.namespaces.insert(prefix, uri);
    }
    if let Some(header_lines) = args.header_lines {
        config.header_lines = header_lines;
    }
    if let Some(suffix) = &args.output_suffix {
        config.output_suffix = Some(suffix.clone());
    }
    config.overwrite |= args.overwrite;
    config.ignore_missing_files |= args.ignore_missing;
    Ok(config)
}

fn list_generators(args: GeneratorsArgs) -> Result<(), CliError> {
    let catalog = GeneratorRegistry::new().catalog();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }
    for info in catalog {
        let params = info
            .params
            .iter()
            .map(|param| {
                let marker = if param.required { "" } else { "?" };
                format!("{}{marker}:{}", param.key, param.kind)
            })
            .collect::<Vec<_>>()
            .join(", ");
        let aliases = if info.aliases.is_empty() {
            String::new()
        } else {
            format!(" (aliases: {})", info.aliases.join(", "))
        };
        println!("{:<24} {}{aliases}", info.name, info.description);
        if !params.is_empty() {
            println!("{:<24} params: {params}", "");
        }
    }
    Ok(())
}
