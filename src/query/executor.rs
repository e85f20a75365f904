//! Query Executor
//!
//! Drives a parsed [`Statement`] over a [`RowSource`] and renders the
//! textual result.
//!
//! # Execution Modes
//!
//! ```text
//! streaming:  row → WHERE → project → "v1,v2,...,vn,\n"
//! aggregate:  row → WHERE → feed accumulators ... finalize → project once → "v1,...,vn,"
//! ```
//!
//! Output is only returned when every row was processed successfully; any
//! error discards what was rendered so far.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::query::ast::{Projection, Statement};
use crate::query::error::QueryResult;
use crate::query::eval::Evaluator;
use crate::query::functions::{Accumulator, PatternCache};
use crate::query::parser::parse_query;
use crate::query::value::Value;
use crate::source::{Row, RowSource};

/// How a statement is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One output line per retained row
    Streaming,
    /// A single output line computed after the source is exhausted
    Aggregate,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Streaming => "streaming",
            ExecutionMode::Aggregate => "aggregate",
        }
    }
}

/// Result of a successful execution
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub text: String,
    pub mode: ExecutionMode,
    /// Rows read from the source
    pub rows_scanned: u64,
    /// Rows that passed WHERE
    pub rows_emitted: u64,
}

/// Outcome of [`run_query`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Completed(String),
    /// The statement failed to lex or parse; no row was read
    Rejected(String),
    /// Execution aborted; partial output was discarded
    Failed(String),
}

impl QueryStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryStatus::Completed(_))
    }

    /// Result text for `Completed`, the error description otherwise
    pub fn text(&self) -> &str {
        match self {
            QueryStatus::Completed(text)
            | QueryStatus::Rejected(text)
            | QueryStatus::Failed(text) => text,
        }
    }
}

/// Parse and execute in one step
pub fn run_query<S: RowSource + ?Sized>(text: &str, source: &mut S) -> QueryStatus {
    let executor = match QueryExecutor::prepare(text) {
        Ok(executor) => executor,
        Err(err) => {
            warn!(error = %err, "query rejected");
            return QueryStatus::Rejected(err.to_string());
        }
    };
    match executor.execute(source) {
        Ok(output) => QueryStatus::Completed(output.text),
        Err(err) => QueryStatus::Failed(err.to_string()),
    }
}

/// Query executor for one statement
pub struct QueryExecutor {
    statement: Statement,
    /// Compiled LIKE patterns that are only known per row
    patterns: PatternCache,
}

impl QueryExecutor {
    pub fn new(statement: Statement) -> Self {
        let executor = Self {
            statement,
            patterns: PatternCache::new(),
        };
        debug!(mode = executor.mode().as_str(), "classified statement");
        executor
    }

    /// Parse a query string into an executor
    pub fn prepare(text: &str) -> QueryResult<Self> {
        Ok(Self::new(parse_query(text)?))
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn mode(&self) -> ExecutionMode {
        if self.statement.is_aggregate() {
            ExecutionMode::Aggregate
        } else {
            ExecutionMode::Streaming
        }
    }

    /// Execute against a row source
    pub fn execute<S: RowSource + ?Sized>(&self, source: &mut S) -> QueryResult<QueryOutput> {
        let start = Instant::now();
        let result = match self.mode() {
            ExecutionMode::Streaming => self.execute_streaming(source),
            ExecutionMode::Aggregate => self.execute_aggregate(source),
        };

        match &result {
            Ok(output) => info!(
                mode = output.mode.as_str(),
                rows_scanned = output.rows_scanned,
                rows_emitted = output.rows_emitted,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "query executed"
            ),
            Err(err) => warn!(error = %err, "query execution failed"),
        }
        result
    }

    fn execute_streaming<S: RowSource + ?Sized>(&self, source: &mut S) -> QueryResult<QueryOutput> {
        let mut text = String::new();
        let mut rows_scanned = 0;
        let mut rows_emitted = 0;

        while let Some(row) = source.next_row()? {
            rows_scanned += 1;
            let evaluator = Evaluator::new(&row).with_patterns(&self.patterns);
            if !self.retains(&evaluator)? {
                continue;
            }

            match &self.statement.projection {
                Projection::Wildcard => {
                    for field in row.fields() {
                        text.push_str(field);
                        text.push(',');
                    }
                }
                Projection::Items(items) => {
                    for item in items {
                        push_value(&mut text, &evaluator.eval(&item.expr)?);
                    }
                }
            }
            text.push('\n');
            rows_emitted += 1;
        }

        Ok(QueryOutput {
            text,
            mode: ExecutionMode::Streaming,
            rows_scanned,
            rows_emitted,
        })
    }

    fn execute_aggregate<S: RowSource + ?Sized>(&self, source: &mut S) -> QueryResult<QueryOutput> {
        let calls = &self.statement.aggregates;
        let mut accumulators: Vec<Accumulator> =
            calls.iter().map(|call| Accumulator::new(call.func)).collect();
        let mut rows_scanned = 0;
        let mut rows_emitted = 0;

        while let Some(row) = source.next_row()? {
            rows_scanned += 1;
            let evaluator = Evaluator::new(&row).with_patterns(&self.patterns);
            if !self.retains(&evaluator)? {
                continue;
            }
            rows_emitted += 1;

            for (call, accumulator) in calls.iter().zip(accumulators.iter_mut()) {
                let input = match &call.arg {
                    Some(arg) => Some(evaluator.eval(arg)?),
                    None => None,
                };
                accumulator.feed(input)?;
            }
        }

        let values = accumulators
            .iter()
            .map(Accumulator::finalize)
            .collect::<QueryResult<Vec<Value>>>()?;

        let empty = Row::default();
        let evaluator = Evaluator::new(&empty)
            .with_aggregates(&values)
            .with_patterns(&self.patterns);
        let mut text = String::new();
        if let Projection::Items(items) = &self.statement.projection {
            for item in items {
                push_value(&mut text, &evaluator.eval(&item.expr)?);
            }
        }

        Ok(QueryOutput {
            text,
            mode: ExecutionMode::Aggregate,
            rows_scanned,
            rows_emitted,
        })
    }

    /// A row is retained only when WHERE is exactly `true`
    fn retains(&self, evaluator: &Evaluator<'_>) -> QueryResult<bool> {
        match &self.statement.selection {
            None => Ok(true),
            Some(selection) => Ok(evaluator.eval(selection)? == Value::Bool(true)),
        }
    }
}

fn push_value(text: &mut String, value: &Value) {
    text.push_str(&value.to_string());
    text.push(',');
}
