//! Expression evaluation against a single row

use crate::query::ast::{BinaryOp, CaseExpr, ColumnRef, CompareOp, Expr, UnaryOp};
use crate::query::error::{EvalError, QueryResult, SyntaxError};
use crate::query::functions::call_scalar;
use crate::query::functions::pattern::{escape_char, LikeMatcher, PatternCache};
use crate::query::value::Value;
use crate::source::Row;

/// Evaluate an expression against one row, outside of any aggregate context
pub fn eval(expr: &Expr, row: &Row) -> QueryResult<Value> {
    Evaluator::new(row).eval(expr)
}

/// Tree-walking evaluator bound to one row.
///
/// Aggregate nodes read finalized values from `aggregates`; LIKE patterns
/// that are only known per row are compiled through `patterns` when present.
pub struct Evaluator<'a> {
    row: &'a Row,
    aggregates: Option<&'a [Value]>,
    patterns: Option<&'a PatternCache>,
}

impl<'a> Evaluator<'a> {
    pub fn new(row: &'a Row) -> Self {
        Self {
            row,
            aggregates: None,
            patterns: None,
        }
    }

    pub fn with_aggregates(mut self, values: &'a [Value]) -> Self {
        self.aggregates = Some(values);
        self
    }

    pub fn with_patterns(mut self, patterns: &'a PatternCache) -> Self {
        self.patterns = Some(patterns);
        self
    }

    pub fn eval(&self, expr: &Expr) -> QueryResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Column(ColumnRef::Position(n)) => Ok(match self.row.field(*n) {
                Some(field) if !field.is_empty() => Value::Str(field.to_string()),
                _ => Value::Null,
            }),
            Expr::Column(ColumnRef::Wildcard) => {
                Err(EvalError::type_mismatch("'*' has no scalar value").into())
            }
            Expr::Identifier { name, offset } => Err(SyntaxError::new(
                format!("unknown identifier '{}'", name),
                *offset,
            )
            .into()),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(not(truth(&value, "NOT")?)),
                    UnaryOp::Neg => Ok(value.neg()?),
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, &left, &right)
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = self.eval(expr)?;
                let low = self.eval(low)?;
                let high = self.eval(high)?;
                let above = truth(&value.compare(CompareOp::GtEq, &low)?, "BETWEEN")?;
                let below = truth(&value.compare(CompareOp::LtEq, &high)?, "BETWEEN")?;
                let result = and(above, below);
                Ok(if *negated { not(result) } else { to_value(result) })
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let value = self.eval(expr)?;
                let mut found = false;
                let mut saw_null = value.is_null();
                for item in list {
                    match value.loose_eq(&self.eval(item)?) {
                        Some(true) => found = true,
                        Some(false) => {}
                        None => saw_null = true,
                    }
                }
                let result = if found {
                    Some(true)
                } else if saw_null {
                    None
                } else {
                    Some(false)
                };
                Ok(if *negated { not(result) } else { to_value(result) })
            }
            Expr::Like {
                expr,
                pattern,
                escape,
                negated,
                compiled,
            } => {
                let value = self.eval(expr)?;
                let text = match &value {
                    Value::Null => return Ok(Value::Null),
                    Value::Str(text) => text,
                    other => {
                        return Err(EvalError::type_mismatch(format!(
                            "LIKE requires a string, found {}",
                            other.kind_name()
                        ))
                        .into())
                    }
                };
                let matched = match compiled {
                    Some(matcher) => matcher.is_match(text),
                    None => match self.dynamic_matcher(pattern, escape.as_deref())? {
                        Some(matcher) => matcher.is_match(text),
                        None => return Ok(Value::Null),
                    },
                };
                Ok(Value::Bool(matched != *negated))
            }
            Expr::IsNull { expr, negated } => {
                let value = self.eval(expr)?;
                Ok(Value::Bool(value.is_null() != *negated))
            }
            Expr::Function { func, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<QueryResult<Vec<_>>>()?;
                call_scalar(*func, &args)
            }
            Expr::Aggregate(call) => self
                .aggregates
                .and_then(|values| values.get(call.slot))
                .cloned()
                .ok_or_else(|| EvalError::MisplacedAggregate.into()),
            Expr::Case(case) => self.case(case),
            Expr::Cast { expr, target } => Ok(self.eval(expr)?.cast(*target)?),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> QueryResult<Value> {
        let value = match op {
            BinaryOp::Add => left.add(right)?,
            BinaryOp::Sub => left.sub(right)?,
            BinaryOp::Mul => left.mul(right)?,
            BinaryOp::Div => left.div(right)?,
            BinaryOp::Mod => left.rem(right)?,
            BinaryOp::Pow => left.pow(right)?,
            BinaryOp::Concat => left.concat(right)?,
            BinaryOp::Compare(op) => left.compare(op, right)?,
            BinaryOp::And => to_value(and(truth(left, "AND")?, truth(right, "AND")?)),
            BinaryOp::Or => to_value(or(truth(left, "OR")?, truth(right, "OR")?)),
        };
        Ok(value)
    }

    /// Matcher for a pattern computed per row. `None` when pattern or escape is null.
    fn dynamic_matcher(&self, pattern: &Expr, escape: Option<&Expr>) -> QueryResult<Option<LikeMatcher>> {
        let pattern = match self.eval(pattern)? {
            Value::Null => return Ok(None),
            Value::Str(p) => p,
            other => {
                return Err(EvalError::type_mismatch(format!(
                    "LIKE pattern must be a string, found {}",
                    other.kind_name()
                ))
                .into())
            }
        };
        let escape = match escape.map(|e| self.eval(e)).transpose()? {
            None => None,
            Some(Value::Null) => return Ok(None),
            Some(Value::Str(e)) => Some(escape_char(&e)?),
            Some(other) => {
                return Err(EvalError::type_mismatch(format!(
                    "ESCAPE must be a string, found {}",
                    other.kind_name()
                ))
                .into())
            }
        };
        let matcher = match self.patterns {
            Some(cache) => cache.matcher(&pattern, escape)?,
            None => LikeMatcher::compile(&pattern, escape)?,
        };
        Ok(Some(matcher))
    }

    /// Branches are evaluated lazily, first match wins
    fn case(&self, case: &CaseExpr) -> QueryResult<Value> {
        let otherwise = match case {
            CaseExpr::Simple {
                operand,
                branches,
                otherwise,
            } => {
                let operand = self.eval(operand)?;
                for (when, then) in branches {
                    if operand.loose_eq(&self.eval(when)?) == Some(true) {
                        return self.eval(then);
                    }
                }
                otherwise
            }
            CaseExpr::Searched {
                branches,
                otherwise,
            } => {
                for (when, then) in branches {
                    if self.eval(when)? == Value::Bool(true) {
                        return self.eval(then);
                    }
                }
                otherwise
            }
        };
        match otherwise {
            Some(expr) => self.eval(expr),
            None => Ok(Value::Null),
        }
    }
}

fn truth(value: &Value, op: &str) -> Result<Option<bool>, EvalError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(EvalError::type_mismatch(format!(
            "{} expects boolean operands, found {}",
            op,
            other.kind_name()
        ))),
    }
}

fn to_value(truth: Option<bool>) -> Value {
    truth.map(Value::Bool).unwrap_or(Value::Null)
}

fn not(truth: Option<bool>) -> Value {
    to_value(truth.map(|b| !b))
}

fn and(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}
