//! # objselect
//!
//! An S3 Select style query engine: a small SQL dialect evaluated over
//! positional text rows such as CSV records.
//!
//! ## Modules
//!
//! - [`query`]: Lexer, parser, value model, function library and executor
//! - [`source`]: Row sources (in-memory and CSV)
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use objselect::config::InputConfig;
//! use objselect::query::QueryExecutor;
//! use objselect::source::CsvRowSource;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = QueryExecutor::prepare(
//!         "SELECT count(*), avg(float(_3)) FROM s3object WHERE _2 LIKE 'a%'",
//!     )?;
//!
//!     let mut rows = CsvRowSource::from_path("data.csv", &InputConfig::default())?;
//!     let output = executor.execute(&mut rows)?;
//!
//!     println!("{}", output.text);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod query;
pub mod source;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError, InputConfig, LoggingConfig, OutputConfig};

pub use query::{
    parse_query, run_query, ExecutionMode, QueryError, QueryExecutor, QueryOutput, QueryResult,
    QueryStatus, Statement, Value,
};

pub use source::{CsvRowSource, MemoryRowSource, Row, RowSource, SourceError};
