//! Aggregate functions and their accumulators
//!
//! One [`Accumulator`] exists per aggregate call in a statement. It is fed
//! once per qualifying row and finalized once the row source is exhausted.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::query::error::{EvalError, QueryError, QueryResult};
use crate::query::value::Value;

/// Aggregation functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
            AggregateFunc::Avg => "avg",
        }
    }
}

impl FromStr for AggregateFunc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "count" => Ok(AggregateFunc::Count),
            "sum" => Ok(AggregateFunc::Sum),
            "min" => Ok(AggregateFunc::Min),
            "max" => Ok(AggregateFunc::Max),
            "avg" => Ok(AggregateFunc::Avg),
            _ => Err(format!("Unknown aggregation function: {}", s)),
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Running state of one aggregate call
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Count(i64),
    Sum(Value),
    Min(Option<Value>),
    Max(Option<Value>),
    Avg { sum: Value, count: i64 },
}

impl Accumulator {
    pub fn new(func: AggregateFunc) -> Self {
        match func {
            AggregateFunc::Count => Accumulator::Count(0),
            AggregateFunc::Sum => Accumulator::Sum(Value::Int(0)),
            AggregateFunc::Min => Accumulator::Min(None),
            AggregateFunc::Max => Accumulator::Max(None),
            AggregateFunc::Avg => Accumulator::Avg {
                sum: Value::Double(0.0),
                count: 0,
            },
        }
    }

    /// Fold one qualifying row. `None` is the `count(*)` row marker.
    pub fn feed(&mut self, input: Option<Value>) -> QueryResult<()> {
        let value = match input {
            None => {
                if let Accumulator::Count(n) = self {
                    *n += 1;
                    return Ok(());
                }
                return Err(EvalError::InvalidArgument {
                    function: "aggregate",
                    message: "only count accepts '*'".to_string(),
                }
                .into());
            }
            Some(Value::Null) => return Ok(()),
            Some(value) => value,
        };

        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum(total) => {
                *total = total.add(&value.to_numeric()?)?;
            }
            Accumulator::Min(current) => fold_extreme(current, value, Ordering::Less)?,
            Accumulator::Max(current) => fold_extreme(current, value, Ordering::Greater)?,
            Accumulator::Avg { sum, count } => {
                *sum = sum.add(&value.to_numeric()?)?;
                *count += 1;
            }
        }
        Ok(())
    }

    pub fn finalize(&self) -> QueryResult<Value> {
        match self {
            Accumulator::Count(n) => Ok(Value::Int(*n)),
            Accumulator::Sum(total) => Ok(total.clone()),
            Accumulator::Min(current) | Accumulator::Max(current) => {
                Ok(current.clone().unwrap_or(Value::Null))
            }
            Accumulator::Avg { count: 0, .. } => Err(QueryError::Eval(EvalError::EmptyAverage)),
            Accumulator::Avg { sum, count } => Ok(sum.div(&Value::Int(*count))?),
        }
    }
}

/// Replace `current` when `value` orders as `wanted` against it
fn fold_extreme(current: &mut Option<Value>, value: Value, wanted: Ordering) -> QueryResult<()> {
    let value = match value {
        Value::Str(_) => value.to_numeric()?,
        other => other,
    };
    let replace = match current {
        None => true,
        Some(existing) => value.partial_order(existing)? == Some(wanted),
    };
    if replace {
        *current = Some(value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(func: AggregateFunc, inputs: Vec<Value>) -> QueryResult<Value> {
        let mut acc = Accumulator::new(func);
        for input in inputs {
            acc.feed(Some(input))?;
        }
        acc.finalize()
    }

    #[test]
    fn test_aggregate_func_from_str() {
        assert_eq!("COUNT".parse::<AggregateFunc>().unwrap(), AggregateFunc::Count);
        assert_eq!("avg".parse::<AggregateFunc>().unwrap(), AggregateFunc::Avg);
        assert!("median".parse::<AggregateFunc>().is_err());
    }

    #[test]
    fn test_count_star_and_nulls() {
        let mut acc = Accumulator::new(AggregateFunc::Count);
        acc.feed(None).unwrap();
        acc.feed(Some(Value::Null)).unwrap();
        acc.feed(Some(Value::Int(0))).unwrap();
        assert_eq!(acc.finalize().unwrap(), Value::Int(2));
    }

    #[test]
    fn test_sum_keeps_integers() {
        let inputs = (0..128).map(Value::Int).collect();
        assert_eq!(run(AggregateFunc::Sum, inputs).unwrap(), Value::Int(8128));
    }

    #[test]
    fn test_sum_promotes_on_double() {
        let inputs = vec![Value::Int(1), Value::Double(0.5), Value::Null];
        assert_eq!(run(AggregateFunc::Sum, inputs).unwrap(), Value::Double(1.5));
    }

    #[test]
    fn test_sum_parses_strings() {
        let inputs = vec![Value::Str("3".into()), Value::Str("4".into())];
        assert_eq!(run(AggregateFunc::Sum, inputs).unwrap(), Value::Int(7));

        let err = run(AggregateFunc::Sum, vec![Value::Str("3x".into())]).unwrap_err();
        assert_eq!(err.to_string(), "extra characters after the number");
    }

    #[test]
    fn test_min_max() {
        let inputs = vec![Value::Int(5), Value::Null, Value::Int(-2), Value::Int(9)];
        assert_eq!(run(AggregateFunc::Min, inputs.clone()).unwrap(), Value::Int(-2));
        assert_eq!(run(AggregateFunc::Max, inputs).unwrap(), Value::Int(9));
        assert_eq!(run(AggregateFunc::Max, vec![]).unwrap(), Value::Null);
    }

    #[test]
    fn test_avg() {
        let inputs = (1..=128).map(Value::Int).collect();
        assert_eq!(run(AggregateFunc::Avg, inputs).unwrap(), Value::Double(64.5));
    }

    #[test]
    fn test_avg_over_nothing_fails() {
        let err = run(AggregateFunc::Avg, vec![Value::Null]).unwrap_err();
        assert!(matches!(err, QueryError::Eval(EvalError::EmptyAverage)));
    }

    #[test]
    fn test_empty_defaults() {
        assert_eq!(run(AggregateFunc::Count, vec![]).unwrap(), Value::Int(0));
        assert_eq!(run(AggregateFunc::Sum, vec![]).unwrap(), Value::Int(0));
        assert_eq!(run(AggregateFunc::Min, vec![]).unwrap(), Value::Null);
    }
}
