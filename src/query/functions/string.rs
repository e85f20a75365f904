//! String functions: `char_length`, `lower`, `upper`, `substring`, `trim`

use crate::query::ast::TrimMode;
use crate::query::error::EvalError;
use crate::query::value::Value;

use super::integer_arg;

fn expect_str<'a>(function: &'static str, value: &'a Value) -> Result<&'a str, EvalError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(EvalError::InvalidArgument {
            function,
            message: format!("expected a string, found {}", other.kind_name()),
        }),
    }
}

/// Number of code points
pub fn char_length(value: &Value) -> Result<Value, EvalError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let s = expect_str("char_length", value)?;
    Ok(Value::Int(s.chars().count() as i64))
}

pub fn lower(value: &Value) -> Result<Value, EvalError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Str(expect_str("lower", value)?.to_lowercase()))
}

pub fn upper(value: &Value) -> Result<Value, EvalError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Str(expect_str("upper", value)?.to_uppercase()))
}

/// 1-based substring over code points, clamped to the string.
///
/// The window is `[start, start + length)`; positions before 1 are cut off,
/// so `substring('12345', 0, 5)` is `'1234'`.
pub fn substring(value: &Value, start: &Value, length: Option<&Value>) -> Result<Value, EvalError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let s = expect_str("substring", value)?;
    let start = match integer_arg("substring", start)? {
        Some(start) => start,
        None => return Ok(Value::Null),
    };
    let length = match length {
        Some(length) => match integer_arg("substring", length)? {
            Some(length) => Some(length),
            None => return Ok(Value::Null),
        },
        None => None,
    };

    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let begin = start.max(1);
    let end = match length {
        Some(length) => start.saturating_add(length).min(len + 1),
        None => len + 1,
    };
    if end <= begin || begin > len {
        return Ok(Value::Str(String::new()));
    }

    let slice: String = chars[(begin - 1) as usize..(end - 1) as usize].iter().collect();
    Ok(Value::Str(slice))
}

/// Strip characters from one or both ends. The default set is a single space.
pub fn trim(value: &Value, charset: Option<&Value>, mode: TrimMode) -> Result<Value, EvalError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let s = expect_str("trim", value)?;
    let set: Vec<char> = match charset {
        Some(Value::Null) => return Ok(Value::Null),
        Some(charset) => expect_str("trim", charset)?.chars().collect(),
        None => vec![' '],
    };

    let strip = |c: char| set.contains(&c);
    let trimmed = match mode {
        TrimMode::Leading => s.trim_start_matches(strip),
        TrimMode::Trailing => s.trim_end_matches(strip),
        TrimMode::Both => s.trim_matches(strip),
    };
    Ok(Value::Str(trimmed.to_string()))
}
