//! Row sources
//!
//! A [`RowSource`] yields the rows a statement runs over. Each row is a
//! list of raw text fields addressed by 1-based position (`_1`, `_2`, ...).
//!
//! - [`MemoryRowSource`]: rows held in memory
//! - [`CsvRowSource`]: delimited text read through the `csv` crate

mod csv;

use std::collections::VecDeque;

use thiserror::Error;

pub use self::csv::CsvRowSource;

/// Errors raised while producing rows
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input option: {0}")]
    InvalidOption(String),
}

/// One input record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<String>,
}

impl Row {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Field at a 1-based position
    pub fn field(&self, position: usize) -> Option<&str> {
        position
            .checked_sub(1)
            .and_then(|index| self.fields.get(index))
            .map(String::as_str)
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Vec<String>> for Row {
    fn from(fields: Vec<String>) -> Self {
        Self::new(fields)
    }
}

/// Producer of input rows
pub trait RowSource {
    /// Next row, or `None` once the input is exhausted
    fn next_row(&mut self) -> Result<Option<Row>, SourceError>;
}

/// Rows held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRowSource {
    rows: VecDeque<Row>,
}

impl MemoryRowSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows<I, R, F>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| Row::new(row.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push_back(row);
    }

    /// Rows not yet consumed
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowSource for MemoryRowSource {
    fn next_row(&mut self) -> Result<Option<Row>, SourceError> {
        Ok(self.rows.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_positions_are_one_based() {
        let row = Row::from(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(row.field(1), Some("a"));
        assert_eq!(row.field(2), Some("b"));
        assert_eq!(row.field(0), None);
        assert_eq!(row.field(3), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_memory_source_drains_in_order() {
        let mut source = MemoryRowSource::from_rows(vec![vec!["1"], vec!["2"]]);
        source.push(Row::new(vec!["3".to_string()]));
        assert_eq!(source.len(), 3);

        let mut seen = Vec::new();
        while let Some(row) = source.next_row().unwrap() {
            seen.push(row.field(1).unwrap().to_string());
        }
        assert_eq!(seen, vec!["1", "2", "3"]);
        assert!(source.is_empty());
    }
}
