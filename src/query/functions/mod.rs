//! Function Registry and scalar dispatch
//!
//! Every function name the parser accepts is listed in [`FUNCTION_REGISTRY`]
//! together with its accepted argument count, so unknown names and arity
//! mistakes fail at parse time instead of on the first row.
//!
//! - **string**: `char_length`, `lower`, `upper`, `substring`, `trim`
//! - **datetime**: `to_timestamp`, `to_string`, `date_add`, `date_diff`, `extract`, `utcnow`
//! - **pattern**: LIKE matching
//! - **aggregate**: `count`, `sum`, `min`, `max`, `avg`

pub mod aggregate;
pub mod datetime;
pub mod pattern;
pub mod string;

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::query::ast::ScalarFunc;
use crate::query::error::{EvalError, QueryResult};
use crate::query::value::Value;

pub use aggregate::{Accumulator, AggregateFunc};
pub use pattern::{LikeMatcher, PatternCache};

/// Value returned by `version()`
pub const ENGINE_VERSION: &str = "41.a";

/// What a registered name resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    CharLength,
    Lower,
    Upper,
    Substring,
    Trim,
    NullIf,
    Coalesce,
    ToTimestamp,
    ToString,
    DateAdd,
    DateDiff,
    Extract,
    UtcNow,
    Version,
    Add,
    /// `int(x)`, shorthand for `cast(x as int)`
    IntCast,
    /// `float(x)`, shorthand for `cast(x as float)`
    FloatCast,
    Aggregate(AggregateFunc),
}

/// Registry entry. Argument counts exclude the unit of the date functions.
#[derive(Debug, Clone, Copy)]
pub struct FunctionDef {
    pub name: &'static str,
    pub kind: FunctionKind,
    pub min_args: usize,
    pub max_args: Option<usize>,
}

impl FunctionDef {
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, FunctionKind::Aggregate(_))
    }
}

/// Registry of all supported scalar and aggregate functions
pub struct FunctionRegistry {
    functions: HashMap<&'static str, FunctionDef>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };

        registry.register("char_length", FunctionKind::CharLength, 1, Some(1));
        registry.register("character_length", FunctionKind::CharLength, 1, Some(1));
        registry.register("lower", FunctionKind::Lower, 1, Some(1));
        registry.register("upper", FunctionKind::Upper, 1, Some(1));
        registry.register("substring", FunctionKind::Substring, 2, Some(3));
        registry.register("trim", FunctionKind::Trim, 1, Some(2));
        registry.register("nullif", FunctionKind::NullIf, 2, Some(2));
        registry.register("coalesce", FunctionKind::Coalesce, 1, None);
        registry.register("to_timestamp", FunctionKind::ToTimestamp, 1, Some(1));
        registry.register("to_string", FunctionKind::ToString, 2, Some(2));
        registry.register("date_add", FunctionKind::DateAdd, 2, Some(2));
        registry.register("date_diff", FunctionKind::DateDiff, 2, Some(2));
        registry.register("extract", FunctionKind::Extract, 1, Some(1));
        registry.register("utcnow", FunctionKind::UtcNow, 0, Some(0));
        registry.register("version", FunctionKind::Version, 0, Some(0));
        registry.register("add", FunctionKind::Add, 2, Some(2));
        registry.register("int", FunctionKind::IntCast, 1, Some(1));
        registry.register("float", FunctionKind::FloatCast, 1, Some(1));

        registry.register("count", FunctionKind::Aggregate(AggregateFunc::Count), 0, Some(1));
        for func in [
            AggregateFunc::Sum,
            AggregateFunc::Min,
            AggregateFunc::Max,
            AggregateFunc::Avg,
        ] {
            registry.register(func.name(), FunctionKind::Aggregate(func), 1, Some(1));
        }

        registry
    }

    fn register(
        &mut self,
        name: &'static str,
        kind: FunctionKind,
        min_args: usize,
        max_args: Option<usize>,
    ) {
        self.functions.insert(
            name,
            FunctionDef {
                name,
                kind,
                min_args,
                max_args,
            },
        );
    }

    /// Case-insensitive lookup
    pub fn lookup(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name.to_ascii_lowercase().as_str())
    }

    pub fn is_aggregate_function(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(FunctionDef::is_aggregate)
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global function registry instance (lazy-initialized)
pub static FUNCTION_REGISTRY: LazyLock<FunctionRegistry> = LazyLock::new(FunctionRegistry::new);

/// Read an integral argument; doubles are truncated toward zero.
/// `Ok(None)` for a null argument.
pub(crate) fn integer_arg(function: &'static str, value: &Value) -> Result<Option<i64>, EvalError> {
    match value {
        Value::Null => Ok(None),
        Value::Int(v) => Ok(Some(*v)),
        Value::Double(v) if v.is_finite() && v.abs() < i64::MAX as f64 => Ok(Some(v.trunc() as i64)),
        other => Err(EvalError::InvalidArgument {
            function,
            message: format!("expected an integer, found {}", other.kind_name()),
        }),
    }
}

static MISSING: Value = Value::Null;

/// Apply a scalar function to already evaluated arguments
pub fn call_scalar(func: ScalarFunc, args: &[Value]) -> QueryResult<Value> {
    let arg = |i: usize| args.get(i).unwrap_or(&MISSING);

    match func {
        ScalarFunc::CharLength => Ok(string::char_length(arg(0))?),
        ScalarFunc::Lower => Ok(string::lower(arg(0))?),
        ScalarFunc::Upper => Ok(string::upper(arg(0))?),
        ScalarFunc::Substring => Ok(string::substring(arg(0), arg(1), args.get(2))?),
        ScalarFunc::Trim(mode) => Ok(string::trim(arg(0), args.get(1), mode)?),
        ScalarFunc::NullIf => {
            let value = arg(0);
            if value.loose_eq(arg(1)) == Some(true) {
                Ok(Value::Null)
            } else {
                Ok(value.clone())
            }
        }
        ScalarFunc::Coalesce => Ok(args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null)),
        ScalarFunc::ToTimestamp => datetime::to_timestamp(arg(0)),
        ScalarFunc::ToString => datetime::to_string(arg(0), arg(1)),
        ScalarFunc::DateAdd(part) => datetime::date_add(part, arg(0), arg(1)),
        ScalarFunc::DateDiff(part) => datetime::date_diff(part, arg(0), arg(1)),
        ScalarFunc::Extract(part) => datetime::extract(part, arg(0)),
        ScalarFunc::UtcNow => Ok(datetime::utcnow()),
        ScalarFunc::Version => Ok(Value::Str(ENGINE_VERSION.to_string())),
        ScalarFunc::Add => Ok(arg(0).add(arg(1))?),
    }
}
