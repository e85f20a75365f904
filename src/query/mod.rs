//! Query Engine
//!
//! An S3 Select style SQL subset evaluated over positional text rows:
//!
//! - **Lexer**: Split query text into tokens
//! - **Parser**: Build and resolve the statement AST
//! - **Value**: Dynamically typed values, arithmetic, comparison and casts
//! - **Functions**: Scalar and aggregate function library
//! - **Eval**: Evaluate expressions against a row
//! - **Executor**: Drive a statement over a row source
//!
//! # Query Language
//!
//! ```text
//! SELECT * | expr [AS alias] [, ...]
//! FROM stdin | s3object | /bucket/key
//! [WHERE expr]
//! ```
//!
//! # Examples
//!
//! ```rust
//! use objselect::query::{run_query, QueryStatus};
//! use objselect::source::MemoryRowSource;
//!
//! let mut rows = MemoryRowSource::from_rows(vec![vec!["1", "a"], vec!["7", "b"]]);
//! let status = run_query("select _2 from stdin where int(_1) > 5", &mut rows);
//! assert_eq!(status, QueryStatus::Completed("b,\n".to_string()));
//! ```

pub mod ast;
pub mod error;
pub mod eval;
pub mod executor;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod value;

pub use ast::{Expr, Projection, SelectItem, Source, Statement};
pub use error::{CastError, EvalError, LexError, QueryError, QueryResult, SyntaxError};
pub use eval::{eval, Evaluator};
pub use executor::{run_query, ExecutionMode, QueryExecutor, QueryOutput, QueryStatus};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::{parse, parse_query};
pub use value::{CastType, Timestamp, Value};
