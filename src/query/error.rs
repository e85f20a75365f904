//! Query error types
//!
//! Defines every error condition that can occur while lexing, parsing and
//! executing a statement. Lexical and syntax errors are raised before any row
//! is read; cast and evaluation errors abort the whole execution.

use thiserror::Error;

use crate::source::SourceError;

/// Errors raised while splitting query text into tokens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    /// A quoted literal ran to the end of the input
    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    /// A character that starts no token
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
}

/// Grammar violation, unknown source, misplaced aggregate or unresolved name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error at offset {offset}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Conversion failures raised by `cast` and the numeric coercions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CastError {
    #[error("extra characters after the number")]
    ExtraCharacters,

    #[error("text cannot be converted to a number")]
    NotANumber,

    #[error("converted value would fall out of the range of the result type!")]
    OutOfRange,

    #[error("timestamp is invalid: {0}")]
    InvalidTimestamp(String),

    #[error("cannot cast {from} to {to}")]
    Unsupported {
        from: &'static str,
        to: &'static str,
    },
}

/// Runtime failures while evaluating an expression
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Operand kinds do not support the operation
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A function received an argument it cannot use
    #[error("invalid argument to {function}: {message}")]
    InvalidArgument {
        function: &'static str,
        message: String,
    },

    /// Integer arithmetic left the i64 range
    #[error("integer overflow in {0}")]
    Overflow(&'static str),

    /// `avg` finalized without a single qualifying row
    #[error("avg requires at least one qualifying row")]
    EmptyAverage,

    /// A LIKE pattern or escape that cannot be compiled
    #[error("invalid LIKE pattern: {0}")]
    InvalidPattern(String),

    /// An aggregate node reached outside of aggregate finalization
    #[error("aggregate function used outside of an aggregate query")]
    MisplacedAggregate,
}

impl EvalError {
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        EvalError::TypeMismatch(message.into())
    }
}

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("lexical error: {0}")]
    Lex(#[from] LexError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// Displays the bare cast message so callers see e.g.
    /// `extra characters after the number`
    #[error(transparent)]
    Cast(#[from] CastError),

    #[error("{0}")]
    Eval(#[from] EvalError),

    #[error("row source error: {0}")]
    Source(#[from] SourceError),
}

impl QueryError {
    /// True for failures raised before execution started
    pub fn is_syntax(&self) -> bool {
        matches!(self, QueryError::Lex(_) | QueryError::Syntax(_))
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_error_display_is_bare() {
        let err: QueryError = CastError::ExtraCharacters.into();
        assert_eq!(err.to_string(), "extra characters after the number");

        let err: QueryError = CastError::OutOfRange.into();
        assert_eq!(
            err.to_string(),
            "converted value would fall out of the range of the result type!"
        );

        let err: QueryError = CastError::NotANumber.into();
        assert_eq!(err.to_string(), "text cannot be converted to a number");
    }

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::new("unknown source 'file.txt'", 14);
        assert_eq!(
            err.to_string(),
            "syntax error at offset 14: unknown source 'file.txt'"
        );
    }

    #[test]
    fn test_is_syntax() {
        let lex: QueryError = LexError::UnterminatedString { offset: 3 }.into();
        assert!(lex.is_syntax());

        let syntax: QueryError = SyntaxError::new("bad", 0).into();
        assert!(syntax.is_syntax());

        let eval: QueryError = EvalError::EmptyAverage.into();
        assert!(!eval.is_syntax());
    }
}
