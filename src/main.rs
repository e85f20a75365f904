//! objselect CLI
//!
//! Runs SQL-subset queries over delimited text:
//! - Execute a query against a file or stdin
//! - Parse and describe a query without running it
//! - Generate a default config file

use std::io;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use objselect::config::{generate_default_config, Config, InputConfig, LoggingConfig};
use objselect::query::{ast::Source, QueryError, QueryExecutor, QueryOutput};
use objselect::source::CsvRowSource;

const EXIT_FAILED: i32 = 1;
const EXIT_SYNTAX: i32 = 2;

#[derive(Parser)]
#[command(name = "objselect")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run S3 Select style SQL queries over CSV data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: searched in the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, global = true, value_parser = ["text", "json"])]
    pub format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a query
    Run {
        /// Query text
        #[arg(short, long)]
        query: String,
        /// Input file (default: the FROM path, or stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Drop the header record
        #[arg(long)]
        skip_first_line: bool,
        /// Drop the trailing record
        #[arg(long)]
        skip_last_line: bool,
        /// Field delimiter
        #[arg(short, long)]
        delimiter: Option<char>,
    },

    /// Parse a query and describe it
    Parse {
        /// Query text
        #[arg(short, long)]
        query: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// JSON result report
#[derive(Debug, Serialize)]
struct Report {
    status: &'static str,
    output: Option<String>,
    error: Option<String>,
    rows_scanned: u64,
    rows_emitted: u64,
}

impl Report {
    fn completed(output: &QueryOutput) -> Self {
        Self {
            status: "completed",
            output: Some(output.text.clone()),
            error: None,
            rows_scanned: output.rows_scanned,
            rows_emitted: output.rows_emitted,
        }
    }

    fn failed(status: &'static str, error: &QueryError) -> Self {
        Self {
            status,
            output: None,
            error: Some(error.to_string()),
            rows_scanned: 0,
            rows_emitted: 0,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(EXIT_FAILED);
        }
    };
    init_logging(&config.logging);

    let json = cli.format.as_deref().unwrap_or(&config.output.format) == "json";

    let code = match cli.command {
        Commands::Run {
            query,
            input,
            skip_first_line,
            skip_last_line,
            delimiter,
        } => {
            let mut input_config = config.input.clone();
            input_config.skip_first_line |= skip_first_line;
            input_config.skip_last_line |= skip_last_line;
            if let Some(delimiter) = delimiter {
                input_config.field_delimiter = delimiter;
            }
            run(&query, input.as_deref(), &input_config, json)
        }
        Commands::Parse { query } => describe(&query, json),
        Commands::Config { output } => match write_config(output.as_deref()) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                EXIT_FAILED
            }
        },
    };

    process::exit(code);
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(Config::load_default()),
    }
}

/// Logs go to stderr so stdout carries only query results
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("objselect={}", logging.level).into());
    let json = logging.format == "json";

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(io::stderr)))
        .init();
}

fn run(query: &str, input: Option<&Path>, input_config: &InputConfig, json: bool) -> i32 {
    let executor = match QueryExecutor::prepare(query) {
        Ok(executor) => executor,
        Err(e) => return report_error("rejected", &e, json, EXIT_SYNTAX),
    };

    let object_path = match &executor.statement().source {
        Source::Object(path) => Some(Path::new(path)),
        Source::Stdin | Source::S3Object => None,
    };

    let result = match input.or(object_path) {
        Some(path) => CsvRowSource::from_path(path, input_config)
            .map_err(QueryError::from)
            .and_then(|mut source| executor.execute(&mut source)),
        None => CsvRowSource::from_reader(io::stdin().lock(), input_config)
            .map_err(QueryError::from)
            .and_then(|mut source| executor.execute(&mut source)),
    };

    match result {
        Ok(output) => {
            if json {
                print_json(&Report::completed(&output));
            } else {
                print!("{}", output.text);
            }
            0
        }
        Err(e) => report_error("failed", &e, json, EXIT_FAILED),
    }
}

fn report_error(status: &'static str, error: &QueryError, json: bool, code: i32) -> i32 {
    if json {
        print_json(&Report::failed(status, error));
    } else {
        eprintln!("Error: {}", error);
    }
    code
}

fn describe(query: &str, json: bool) -> i32 {
    let executor = match QueryExecutor::prepare(query) {
        Ok(executor) => executor,
        Err(e) => return report_error("rejected", &e, json, EXIT_SYNTAX),
    };
    let statement = executor.statement();

    if json {
        print_json(&serde_json::json!({
            "status": "parsed",
            "statement": statement.to_string(),
            "source": statement.source.to_string(),
            "aggregate": statement.is_aggregate(),
            "mode": executor.mode().as_str(),
        }));
    } else {
        println!("Statement: {}", statement);
        println!("Source:    {}", statement.source);
        println!("Aggregate: {}", statement.is_aggregate());
    }
    0
}

fn write_config(output: Option<&Path>) -> anyhow::Result<()> {
    let config = generate_default_config();

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            std::fs::write(path, &config)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Config written to {:?}", path);
        }
        None => {
            print!("{}", config);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: failed to serialize report: {}", e),
    }
}
