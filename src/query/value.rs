//! Runtime values
//!
//! Every expression evaluates to exactly one [`Value`]. `Null` means the value
//! is absent and `NaN` means a numeric operation had no defined result; both
//! propagate through arithmetic, with `Null` taking precedence.
//!
//! Coercion is always explicit: `Int` promotes to `Double` when the other
//! operand is a `Double`, while strings only become numbers through `cast`.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, FixedOffset, Timelike};

use crate::query::ast::CompareOp;
use crate::query::error::{CastError, EvalError, QueryResult};
use crate::query::functions::datetime;

/// Instant with the UTC offset it was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub datetime: DateTime<FixedOffset>,
    /// The offset was spelled `Z` rather than numerically
    pub zulu: bool,
}

impl Timestamp {
    pub fn new(datetime: DateTime<FixedOffset>, zulu: bool) -> Self {
        Self { datetime, zulu }
    }

    pub fn offset_seconds(&self) -> i32 {
        self.datetime.offset().local_minus_utc()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.datetime.format("%Y-%m-%dT%H:%M:%S"))?;
        let nanos = self.datetime.nanosecond() % 1_000_000_000;
        if nanos != 0 {
            write!(f, ".{:06}", nanos / 1_000)?;
        }
        if self.zulu {
            return f.write_str("Z");
        }
        let offset = self.offset_seconds();
        let sign = if offset < 0 { '-' } else { '+' };
        let abs = offset.unsigned_abs();
        write!(f, "{}{:02}:{:02}", sign, abs / 3600, abs % 3600 / 60)
    }
}

/// Target of a `cast(expr as type)` conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastType {
    Int,
    Float,
    String,
    Bool,
    Timestamp,
}

impl CastType {
    /// Parse a type name as written in a cast
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "int" | "integer" => Some(CastType::Int),
            "float" | "double" | "decimal" | "real" => Some(CastType::Float),
            "string" | "varchar" | "char" | "text" => Some(CastType::String),
            "bool" | "boolean" => Some(CastType::Bool),
            "timestamp" => Some(CastType::Timestamp),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CastType::Int => "int",
            CastType::Float => "float",
            CastType::String => "string",
            CastType::Bool => "bool",
            CastType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for CastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dynamically typed query value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    NaN,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Timestamp(Timestamp),
}

/// Result of resolving the operands of a numeric operation
enum Operands {
    /// Null or NaN decided the result without computing
    Decided(Value),
    Ints(i64, i64),
    Doubles(f64, f64),
}

impl Value {
    /// Wrap a float, folding IEEE NaN into [`Value::NaN`]
    pub fn from_f64(v: f64) -> Self {
        if v.is_nan() {
            Value::NaN
        } else {
            Value::Double(v)
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::NaN => "NaN",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "float",
            Value::Str(_) => "string",
            Value::Timestamp(_) => "timestamp",
        }
    }

    fn operands(&self, rhs: &Value, op: &str) -> Result<Operands, EvalError> {
        match (self, rhs) {
            (Value::Null, _) | (_, Value::Null) => Ok(Operands::Decided(Value::Null)),
            (Value::NaN, _) | (_, Value::NaN) => Ok(Operands::Decided(Value::NaN)),
            (Value::Int(a), Value::Int(b)) => Ok(Operands::Ints(*a, *b)),
            (Value::Int(a), Value::Double(b)) => Ok(Operands::Doubles(*a as f64, *b)),
            (Value::Double(a), Value::Int(b)) => Ok(Operands::Doubles(*a, *b as f64)),
            (Value::Double(a), Value::Double(b)) => Ok(Operands::Doubles(*a, *b)),
            _ => Err(EvalError::type_mismatch(format!(
                "cannot apply '{}' to {} and {}",
                op,
                self.kind_name(),
                rhs.kind_name()
            ))),
        }
    }

    pub fn add(&self, rhs: &Value) -> Result<Value, EvalError> {
        match self.operands(rhs, "+")? {
            Operands::Decided(v) => Ok(v),
            Operands::Ints(a, b) => a
                .checked_add(b)
                .map(Value::Int)
                .ok_or(EvalError::Overflow("addition")),
            Operands::Doubles(a, b) => Ok(Value::from_f64(a + b)),
        }
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value, EvalError> {
        match self.operands(rhs, "-")? {
            Operands::Decided(v) => Ok(v),
            Operands::Ints(a, b) => a
                .checked_sub(b)
                .map(Value::Int)
                .ok_or(EvalError::Overflow("subtraction")),
            Operands::Doubles(a, b) => Ok(Value::from_f64(a - b)),
        }
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value, EvalError> {
        match self.operands(rhs, "*")? {
            Operands::Decided(v) => Ok(v),
            Operands::Ints(a, b) => a
                .checked_mul(b)
                .map(Value::Int)
                .ok_or(EvalError::Overflow("multiplication")),
            Operands::Doubles(a, b) => Ok(Value::from_f64(a * b)),
        }
    }

    /// Division; a zero divisor yields `NaN`
    pub fn div(&self, rhs: &Value) -> Result<Value, EvalError> {
        match self.operands(rhs, "/")? {
            Operands::Decided(v) => Ok(v),
            Operands::Ints(_, 0) => Ok(Value::NaN),
            Operands::Ints(a, b) => a
                .checked_div(b)
                .map(Value::Int)
                .ok_or(EvalError::Overflow("division")),
            Operands::Doubles(_, b) if b == 0.0 => Ok(Value::NaN),
            Operands::Doubles(a, b) => Ok(Value::from_f64(a / b)),
        }
    }

    /// Remainder; a zero divisor yields `NaN`
    pub fn rem(&self, rhs: &Value) -> Result<Value, EvalError> {
        match self.operands(rhs, "%")? {
            Operands::Decided(v) => Ok(v),
            Operands::Ints(_, 0) => Ok(Value::NaN),
            Operands::Ints(a, b) => a
                .checked_rem(b)
                .map(Value::Int)
                .ok_or(EvalError::Overflow("modulo")),
            Operands::Doubles(_, b) if b == 0.0 => Ok(Value::NaN),
            Operands::Doubles(a, b) => Ok(Value::from_f64(a % b)),
        }
    }

    /// Power. Integer operands stay integral while the result fits.
    pub fn pow(&self, rhs: &Value) -> Result<Value, EvalError> {
        match self.operands(rhs, "^")? {
            Operands::Decided(v) => Ok(v),
            Operands::Ints(a, b) if a >= 0 && (0..=62).contains(&b) => Ok(a
                .checked_pow(b as u32)
                .map(Value::Int)
                .unwrap_or_else(|| Value::from_f64((a as f64).powf(b as f64)))),
            Operands::Ints(a, b) => Ok(Value::from_f64((a as f64).powf(b as f64))),
            Operands::Doubles(a, b) => Ok(Value::from_f64(a.powf(b))),
        }
    }

    pub fn neg(&self) -> Result<Value, EvalError> {
        match self {
            Value::Null => Ok(Value::Null),
            Value::NaN => Ok(Value::NaN),
            Value::Int(v) => v
                .checked_neg()
                .map(Value::Int)
                .ok_or(EvalError::Overflow("negation")),
            Value::Double(v) => Ok(Value::Double(-v)),
            other => Err(EvalError::type_mismatch(format!(
                "cannot negate {}",
                other.kind_name()
            ))),
        }
    }

    /// String concatenation for `||`
    pub fn concat(&self, rhs: &Value) -> Result<Value, EvalError> {
        match (self, rhs) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            _ => Err(EvalError::type_mismatch(format!(
                "cannot concatenate {} and {}",
                self.kind_name(),
                rhs.kind_name()
            ))),
        }
    }

    /// Ordering between two non-null values. `None` when either side is NaN.
    pub(crate) fn partial_order(&self, rhs: &Value) -> Result<Option<Ordering>, EvalError> {
        let ordering = match (self, rhs) {
            (Value::NaN, _) | (_, Value::NaN) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.datetime.cmp(&b.datetime)),
            _ => {
                return Err(EvalError::type_mismatch(format!(
                    "cannot compare {} with {}",
                    self.kind_name(),
                    rhs.kind_name()
                )))
            }
        };
        Ok(ordering)
    }

    /// Three-valued comparison used by `= != < <= > >=`
    pub fn compare(&self, op: CompareOp, rhs: &Value) -> Result<Value, EvalError> {
        if self.is_null() || rhs.is_null() {
            return Ok(Value::Null);
        }
        match self.partial_order(rhs)? {
            Some(ordering) => Ok(Value::Bool(op.test(ordering))),
            None => Ok(Value::Bool(op == CompareOp::NotEq)),
        }
    }

    /// Equality used by `IN`, `nullif` and simple `CASE`: kinds that cannot
    /// be compared are unequal rather than an error. `None` when either
    /// side is null.
    pub fn loose_eq(&self, rhs: &Value) -> Option<bool> {
        if self.is_null() || rhs.is_null() {
            return None;
        }
        match self.partial_order(rhs) {
            Ok(Some(ordering)) => Some(ordering == Ordering::Equal),
            Ok(None) | Err(_) => Some(false),
        }
    }

    /// Apply a `cast(.. as target)` conversion
    pub fn cast(&self, target: CastType) -> Result<Value, CastError> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        match target {
            CastType::Int => self.cast_int(),
            CastType::Float => self.cast_float(),
            CastType::String => Ok(match self {
                Value::Str(s) => Value::Str(s.clone()),
                other => Value::Str(other.to_string()),
            }),
            CastType::Bool => self.cast_bool(),
            CastType::Timestamp => match self {
                Value::Timestamp(ts) => Ok(Value::Timestamp(*ts)),
                Value::Str(s) => datetime::parse_timestamp(s).map(Value::Timestamp),
                other => Err(CastError::Unsupported {
                    from: other.kind_name(),
                    to: "timestamp",
                }),
            },
        }
    }

    fn cast_int(&self) -> Result<Value, CastError> {
        match self {
            Value::Int(v) => Ok(Value::Int(*v)),
            Value::NaN => Ok(Value::NaN),
            Value::Double(v) => {
                let truncated = v.trunc();
                if truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
                    Ok(Value::Int(truncated as i64))
                } else {
                    Err(CastError::OutOfRange)
                }
            }
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Str(s) => parse_int(s).map(Value::Int),
            other => Err(CastError::Unsupported {
                from: other.kind_name(),
                to: "int",
            }),
        }
    }

    fn cast_float(&self) -> Result<Value, CastError> {
        match self {
            Value::Int(v) => Ok(Value::Double(*v as f64)),
            Value::Double(v) => Ok(Value::Double(*v)),
            Value::NaN => Ok(Value::NaN),
            Value::Bool(b) => Ok(Value::Double(if *b { 1.0 } else { 0.0 })),
            Value::Str(s) => parse_float(s).map(Value::Double),
            other => Err(CastError::Unsupported {
                from: other.kind_name(),
                to: "float",
            }),
        }
    }

    fn cast_bool(&self) -> Result<Value, CastError> {
        match self {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Int(v) => Ok(Value::Bool(*v != 0)),
            Value::Double(v) => Ok(Value::Bool(*v != 0.0)),
            Value::NaN => Ok(Value::Bool(false)),
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Ok(Value::Bool(matches!(parse_float(trimmed), Ok(v) if v != 0.0)))
                }
            }
            other => Err(CastError::Unsupported {
                from: other.kind_name(),
                to: "bool",
            }),
        }
    }

    /// Numeric view used by aggregates: numbers pass through and strings are
    /// parsed strictly, as an integer when possible.
    pub fn to_numeric(&self) -> QueryResult<Value> {
        match self {
            Value::Null | Value::NaN | Value::Int(_) | Value::Double(_) => Ok(self.clone()),
            Value::Str(s) => match parse_int(s) {
                Ok(v) => Ok(Value::Int(v)),
                Err(_) => Ok(Value::Double(parse_float(s)?)),
            },
            other => Err(EvalError::type_mismatch(format!(
                "expected a number, found {}",
                other.kind_name()
            ))
            .into()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::NaN => f.write_str("NaN"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
            Value::Timestamp(ts) => write!(f, "{}", ts),
        }
    }
}

/// Length of the digit run starting at `start`
fn digit_run(bytes: &[u8], start: usize) -> usize {
    bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Strict integer parse: optional leading whitespace and sign, then digits only
pub fn parse_int(text: &str) -> Result<i64, CastError> {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    let digits = digit_run(bytes, i);
    if digits == 0 {
        return Err(CastError::NotANumber);
    }
    if i + digits < bytes.len() {
        return Err(CastError::ExtraCharacters);
    }
    s.parse::<i64>().map_err(|_| CastError::OutOfRange)
}

/// Strict decimal parse with optional fraction and exponent
pub fn parse_float(text: &str) -> Result<f64, CastError> {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    let int_digits = digit_run(bytes, i);
    i += int_digits;
    let mut frac_digits = 0;
    if bytes.get(i) == Some(&b'.') {
        frac_digits = digit_run(bytes, i + 1);
        if int_digits > 0 || frac_digits > 0 {
            i += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return Err(CastError::NotANumber);
    }
    if matches!(bytes.get(i), Some(b'e') | Some(b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+') | Some(b'-')) {
            j += 1;
        }
        let exp_digits = digit_run(bytes, j);
        if exp_digits > 0 {
            i = j + exp_digits;
        }
    }
    if i < bytes.len() {
        return Err(CastError::ExtraCharacters);
    }
    let value: f64 = s.parse().map_err(|_| CastError::NotANumber)?;
    if value.is_infinite() {
        return Err(CastError::OutOfRange);
    }
    Ok(value)
}
