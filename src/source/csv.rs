//! Delimited text input

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord};
use tracing::debug;

use super::{Row, RowSource, SourceError};
use crate::config::InputConfig;

/// Rows parsed from delimited text.
///
/// `skip_first_line` drops the header record; `skip_last_line` holds one
/// record back so the trailing record is never returned.
pub struct CsvRowSource<R: Read> {
    reader: Reader<R>,
    skip_last_line: bool,
    pending: Option<Row>,
    record: StringRecord,
}

impl CsvRowSource<File> {
    /// Open a file
    pub fn from_path(path: impl AsRef<Path>, config: &InputConfig) -> Result<Self, SourceError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening CSV input");
        let file = File::open(path)?;
        Self::from_reader(file, config)
    }
}

impl<R: Read> CsvRowSource<R> {
    pub fn from_reader(reader: R, config: &InputConfig) -> Result<Self, SourceError> {
        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(config.skip_first_line)
            .flexible(true)
            .delimiter(ascii_byte("field_delimiter", config.field_delimiter)?)
            .quote(ascii_byte("quote", config.quote)?);

        if let Some(escape) = config.escape {
            builder
                .escape(Some(ascii_byte("escape", escape)?))
                .double_quote(false);
        }
        if let Some(comment) = config.comment {
            builder.comment(Some(ascii_byte("comment", comment)?));
        }

        Ok(Self {
            reader: builder.from_reader(reader),
            skip_last_line: config.skip_last_line,
            pending: None,
            record: StringRecord::new(),
        })
    }

    fn read(&mut self) -> Result<Option<Row>, SourceError> {
        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }
        Ok(Some(Row::new(
            self.record.iter().map(String::from).collect(),
        )))
    }
}

impl<R: Read> RowSource for CsvRowSource<R> {
    fn next_row(&mut self) -> Result<Option<Row>, SourceError> {
        if !self.skip_last_line {
            return self.read();
        }

        let current = match self.pending.take() {
            Some(row) => row,
            None => match self.read()? {
                Some(row) => row,
                None => return Ok(None),
            },
        };
        self.pending = self.read()?;
        if self.pending.is_some() {
            Ok(Some(current))
        } else {
            Ok(None)
        }
    }
}

fn ascii_byte(option: &str, ch: char) -> Result<u8, SourceError> {
    if ch.is_ascii() {
        Ok(ch as u8)
    } else {
        Err(SourceError::InvalidOption(format!(
            "{} must be a single ASCII character, found '{}'",
            option, ch
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn collect<R: Read>(mut source: CsvRowSource<R>) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        while let Some(row) = source.next_row().unwrap() {
            rows.push(row.fields().to_vec());
        }
        rows
    }

    fn from_str(text: &'static str, config: &InputConfig) -> CsvRowSource<&'static [u8]> {
        CsvRowSource::from_reader(text.as_bytes(), config).unwrap()
    }

    #[test]
    fn test_reads_all_records() {
        let rows = collect(from_str("a,b\n1,\"x,y\"\n2\n", &InputConfig::default()));
        assert_eq!(
            rows,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["1".to_string(), "x,y".to_string()],
                vec!["2".to_string()],
            ]
        );
    }

    #[test]
    fn test_skip_first_and_last_line() {
        let config = InputConfig {
            skip_first_line: true,
            skip_last_line: true,
            ..InputConfig::default()
        };
        let rows = collect(from_str("header\n1\n2\nfooter\n", &config));
        assert_eq!(rows, vec![vec!["1".to_string()], vec!["2".to_string()]]);
    }

    #[test]
    fn test_skip_last_line_on_single_record() {
        let config = InputConfig {
            skip_last_line: true,
            ..InputConfig::default()
        };
        assert!(collect(from_str("only\n", &config)).is_empty());
        assert!(collect(from_str("", &config)).is_empty());
    }

    #[test]
    fn test_custom_delimiter_and_comment() {
        let config = InputConfig {
            field_delimiter: '|',
            comment: Some('#'),
            ..InputConfig::default()
        };
        let rows = collect(from_str("# note\na|b\n", &config));
        assert_eq!(rows, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let config = InputConfig {
            field_delimiter: 'é',
            ..InputConfig::default()
        };
        let result = CsvRowSource::from_reader("".as_bytes(), &config);
        assert!(matches!(result, Err(SourceError::InvalidOption(_))));
    }

    #[test]
    fn test_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1,2").unwrap();
        writeln!(file, "3,4").unwrap();

        let source = CsvRowSource::from_path(file.path(), &InputConfig::default()).unwrap();
        assert_eq!(collect(source).len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let result = CsvRowSource::from_path("/nonexistent/input.csv", &InputConfig::default());
        assert!(matches!(result, Err(SourceError::Io(_))));
    }
}
