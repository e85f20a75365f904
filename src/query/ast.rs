//! Statement AST
//!
//! The parsed form of a `SELECT <projection> FROM <source> [WHERE <expr>]`
//! statement. The tree is immutable once the parser hands it over; aggregate
//! state lives with the executor and is addressed by each call's slot.

use std::cmp::Ordering;
use std::fmt;

use crate::query::functions::aggregate::AggregateFunc;
use crate::query::functions::pattern::LikeMatcher;
use crate::query::value::{CastType, Value};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// Whether an ordering satisfies the operator
    pub fn test(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(CompareOp::Eq),
            "!=" | "<>" => Some(CompareOp::NotEq),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::LtEq),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::GtEq),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Compare(CompareOp),
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "||",
            BinaryOp::Compare(op) => op.symbol(),
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Positional column reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRef {
    /// 1-based position, written `_N`
    Position(usize),
    Wildcard,
}

/// Which ends `trim` strips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrimMode {
    Leading,
    Trailing,
    #[default]
    Both,
}

impl TrimMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrimMode::Leading => "LEADING",
            TrimMode::Trailing => "TRAILING",
            TrimMode::Both => "BOTH",
        }
    }
}

/// Unit or field argument of the date functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Week,
    Hour,
    Minute,
    Second,
    TimezoneHour,
    TimezoneMinute,
}

impl DatePart {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "year" => Some(DatePart::Year),
            "month" => Some(DatePart::Month),
            "day" => Some(DatePart::Day),
            "week" => Some(DatePart::Week),
            "hour" => Some(DatePart::Hour),
            "minute" => Some(DatePart::Minute),
            "second" => Some(DatePart::Second),
            "timezone_hour" => Some(DatePart::TimezoneHour),
            "timezone_minute" => Some(DatePart::TimezoneMinute),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Month => "month",
            DatePart::Day => "day",
            DatePart::Week => "week",
            DatePart::Hour => "hour",
            DatePart::Minute => "minute",
            DatePart::Second => "second",
            DatePart::TimezoneHour => "timezone_hour",
            DatePart::TimezoneMinute => "timezone_minute",
        }
    }

    /// Parts accepted by `date_add` and `date_diff`
    pub fn is_interval_unit(&self) -> bool {
        matches!(
            self,
            DatePart::Year
                | DatePart::Month
                | DatePart::Day
                | DatePart::Hour
                | DatePart::Minute
                | DatePart::Second
        )
    }
}

/// Scalar functions, with their syntactic modifiers folded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarFunc {
    CharLength,
    Lower,
    Upper,
    Substring,
    Trim(TrimMode),
    NullIf,
    Coalesce,
    ToTimestamp,
    ToString,
    DateAdd(DatePart),
    DateDiff(DatePart),
    Extract(DatePart),
    UtcNow,
    Version,
    Add,
}

impl ScalarFunc {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarFunc::CharLength => "char_length",
            ScalarFunc::Lower => "lower",
            ScalarFunc::Upper => "upper",
            ScalarFunc::Substring => "substring",
            ScalarFunc::Trim(_) => "trim",
            ScalarFunc::NullIf => "nullif",
            ScalarFunc::Coalesce => "coalesce",
            ScalarFunc::ToTimestamp => "to_timestamp",
            ScalarFunc::ToString => "to_string",
            ScalarFunc::DateAdd(_) => "date_add",
            ScalarFunc::DateDiff(_) => "date_diff",
            ScalarFunc::Extract(_) => "extract",
            ScalarFunc::UtcNow => "utcnow",
            ScalarFunc::Version => "version",
            ScalarFunc::Add => "add",
        }
    }
}

/// An aggregate invocation. `slot` indexes the executor's accumulators.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub slot: usize,
    pub func: AggregateFunc,
    /// `None` for `count(*)` and `count()`
    pub arg: Option<Box<Expr>>,
}

/// `CASE` expression forms
#[derive(Debug, Clone, PartialEq)]
pub enum CaseExpr {
    /// `CASE operand WHEN value THEN result ... [ELSE default] END`
    Simple {
        operand: Box<Expr>,
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    /// `CASE WHEN cond THEN result ... [ELSE default] END`
    Searched {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column(ColumnRef),
    /// Alias reference; replaced by the aliased expression before execution
    Identifier { name: String, offset: usize },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        escape: Option<Box<Expr>>,
        negated: bool,
        /// Present when pattern and escape are literals
        compiled: Option<LikeMatcher>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Function {
        func: ScalarFunc,
        args: Vec<Expr>,
    },
    Aggregate(AggregateCall),
    Case(CaseExpr),
    Cast {
        expr: Box<Expr>,
        target: CastType,
    },
}

impl Expr {
    pub fn literal(value: Value) -> Self {
        Expr::Literal(value)
    }

    pub fn column(position: usize) -> Self {
        Expr::Column(ColumnRef::Position(position))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::Compare(op), left, right)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn cast(expr: Expr, target: CastType) -> Self {
        Expr::Cast {
            expr: Box::new(expr),
            target,
        }
    }

    /// Direct children in evaluation order
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal(_) | Expr::Column(_) | Expr::Identifier { .. } => Vec::new(),
            Expr::Unary { operand, .. } => vec![operand.as_ref()],
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Between {
                expr, low, high, ..
            } => vec![expr.as_ref(), low.as_ref(), high.as_ref()],
            Expr::InList { expr, list, .. } => {
                let mut children: Vec<&Expr> = vec![expr.as_ref()];
                children.extend(list.iter());
                children
            }
            Expr::Like {
                expr,
                pattern,
                escape,
                ..
            } => {
                let mut children: Vec<&Expr> = vec![expr.as_ref(), pattern.as_ref()];
                children.extend(escape.as_deref());
                children
            }
            Expr::IsNull { expr, .. } => vec![expr.as_ref()],
            Expr::Function { args, .. } => args.iter().collect(),
            Expr::Aggregate(call) => call.arg.as_deref().into_iter().collect(),
            Expr::Case(case) => {
                let (operand, branches, otherwise) = match case {
                    CaseExpr::Simple {
                        operand,
                        branches,
                        otherwise,
                    } => (Some(operand.as_ref()), branches, otherwise),
                    CaseExpr::Searched {
                        branches,
                        otherwise,
                    } => (None, branches, otherwise),
                };
                let mut children: Vec<&Expr> = operand.into_iter().collect();
                for (when, then) in branches {
                    children.push(when);
                    children.push(then);
                }
                children.extend(otherwise.as_deref());
                children
            }
            Expr::Cast { expr, .. } => vec![expr.as_ref()],
        }
    }

    /// Mutable direct children, same order as [`Expr::children`]
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Literal(_) | Expr::Column(_) | Expr::Identifier { .. } => Vec::new(),
            Expr::Unary { operand, .. } => vec![operand.as_mut()],
            Expr::Binary { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Expr::Between {
                expr, low, high, ..
            } => vec![expr.as_mut(), low.as_mut(), high.as_mut()],
            Expr::InList { expr, list, .. } => {
                let mut children: Vec<&mut Expr> = vec![expr.as_mut()];
                children.extend(list.iter_mut());
                children
            }
            Expr::Like {
                expr,
                pattern,
                escape,
                ..
            } => {
                let mut children: Vec<&mut Expr> = vec![expr.as_mut(), pattern.as_mut()];
                children.extend(escape.as_deref_mut());
                children
            }
            Expr::IsNull { expr, .. } => vec![expr.as_mut()],
            Expr::Function { args, .. } => args.iter_mut().collect(),
            Expr::Aggregate(call) => call.arg.as_deref_mut().into_iter().collect(),
            Expr::Case(case) => {
                let (operand, branches, otherwise) = match case {
                    CaseExpr::Simple {
                        operand,
                        branches,
                        otherwise,
                    } => (Some(operand.as_mut()), branches, otherwise),
                    CaseExpr::Searched {
                        branches,
                        otherwise,
                    } => (None, branches, otherwise),
                };
                let mut children: Vec<&mut Expr> = operand.into_iter().collect();
                for (when, then) in branches.iter_mut() {
                    children.push(when);
                    children.push(then);
                }
                children.extend(otherwise.as_deref_mut());
                children
            }
            Expr::Cast { expr, .. } => vec![expr.as_mut()],
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate(_) => true,
            other => other.children().into_iter().any(Expr::contains_aggregate),
        }
    }

    /// True if a column is referenced outside of any aggregate argument
    pub fn has_bare_column(&self) -> bool {
        match self {
            Expr::Column(_) => true,
            Expr::Aggregate(_) => false,
            other => other.children().into_iter().any(Expr::has_bare_column),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::Str(s)) => write!(f, "'{}'", s.replace('\'', "''")),
            Expr::Literal(Value::Timestamp(ts)) => write!(f, "'{}'", ts),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Column(ColumnRef::Position(n)) => write!(f, "_{}", n),
            Expr::Column(ColumnRef::Wildcard) => f.write_str("*"),
            Expr::Identifier { name, .. } => f.write_str(name),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => write!(f, "(NOT {})", operand),
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => write!(f, "(-{})", operand),
            Expr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "({} {}BETWEEN {} AND {})", expr, not, low, high)
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "({} {}IN (", expr, not)?;
                write_list(f, list)?;
                f.write_str("))")
            }
            Expr::Like {
                expr,
                pattern,
                escape,
                negated,
                ..
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "({} {}LIKE {}", expr, not, pattern)?;
                if let Some(escape) = escape {
                    write!(f, " ESCAPE {}", escape)?;
                }
                f.write_str(")")
            }
            Expr::IsNull { expr, negated } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "({} IS {}NULL)", expr, not)
            }
            Expr::Function { func, args } => match func {
                ScalarFunc::Trim(mode) => {
                    write!(f, "trim({} ", mode.as_str())?;
                    if let Some(chars) = args.get(1) {
                        write!(f, "{} ", chars)?;
                    }
                    f.write_str("FROM ")?;
                    if let Some(target) = args.first() {
                        write!(f, "{}", target)?;
                    }
                    f.write_str(")")
                }
                ScalarFunc::Extract(part) => {
                    write!(f, "extract({} FROM ", part.name())?;
                    write_list(f, args)?;
                    f.write_str(")")
                }
                ScalarFunc::DateAdd(part) | ScalarFunc::DateDiff(part) => {
                    write!(f, "{}({}, ", func.name(), part.name())?;
                    write_list(f, args)?;
                    f.write_str(")")
                }
                _ => {
                    write!(f, "{}(", func.name())?;
                    write_list(f, args)?;
                    f.write_str(")")
                }
            },
            Expr::Aggregate(call) => match &call.arg {
                Some(arg) => write!(f, "{}({})", call.func, arg),
                None => write!(f, "{}(*)", call.func),
            },
            Expr::Case(case) => {
                f.write_str("CASE")?;
                let (branches, otherwise) = match case {
                    CaseExpr::Simple {
                        operand,
                        branches,
                        otherwise,
                    } => {
                        write!(f, " {}", operand)?;
                        (branches, otherwise)
                    }
                    CaseExpr::Searched {
                        branches,
                        otherwise,
                    } => (branches, otherwise),
                };
                for (when, then) in branches {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                if let Some(otherwise) = otherwise {
                    write!(f, " ELSE {}", otherwise)?;
                }
                f.write_str(" END")
            }
            Expr::Cast { expr, target } => write!(f, "CAST({} AS {})", expr, target),
        }
    }
}

/// One projected expression
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", alias)?;
        }
        Ok(())
    }
}

/// Projection list
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `SELECT *`: every raw field of the row
    Wildcard,
    Items(Vec<SelectItem>),
}

/// Recognized `FROM` targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Stdin,
    S3Object,
    /// Object path, always starting with `/`
    Object(String),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Stdin => f.write_str("stdin"),
            Source::S3Object => f.write_str("s3object"),
            Source::Object(path) => f.write_str(path),
        }
    }
}

/// A parsed and resolved statement
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub projection: Projection,
    pub source: Source,
    pub selection: Option<Expr>,
    /// Every aggregate call in the projection, indexed by slot
    pub aggregates: Vec<AggregateCall>,
}

impl Statement {
    /// Whether the statement runs in aggregate mode
    pub fn is_aggregate(&self) -> bool {
        !self.aggregates.is_empty()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        match &self.projection {
            Projection::Wildcard => f.write_str("*")?,
            Projection::Items(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
            }
        }
        write!(f, " FROM {}", self.source)?;
        if let Some(selection) = &self.selection {
            write!(f, " WHERE {}", selection)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_op_test() {
        assert!(CompareOp::LtEq.test(Ordering::Equal));
        assert!(CompareOp::NotEq.test(Ordering::Less));
        assert!(!CompareOp::Gt.test(Ordering::Equal));
        assert_eq!(CompareOp::from_symbol("<>"), Some(CompareOp::NotEq));
    }

    #[test]
    fn test_contains_aggregate() {
        let sum = Expr::Aggregate(AggregateCall {
            slot: 0,
            func: AggregateFunc::Sum,
            arg: Some(Box::new(Expr::column(1))),
        });
        let expr = Expr::binary(BinaryOp::Div, sum, Expr::literal(Value::Int(2)));
        assert!(expr.contains_aggregate());
        assert!(!expr.has_bare_column());

        let plain = Expr::binary(BinaryOp::Add, Expr::column(1), Expr::literal(Value::Int(1)));
        assert!(!plain.contains_aggregate());
        assert!(plain.has_bare_column());
    }

    #[test]
    fn test_children_mut_reaches_case_branches() {
        let mut expr = Expr::Case(CaseExpr::Searched {
            branches: vec![(Expr::column(1), Expr::column(2))],
            otherwise: Some(Box::new(Expr::column(3))),
        });
        for child in expr.children_mut() {
            *child = Expr::literal(Value::Null);
        }
        assert!(!expr.has_bare_column());
    }

    #[test]
    fn test_statement_display() {
        let statement = Statement {
            projection: Projection::Items(vec![
                SelectItem::new(Expr::cast(Expr::column(1), CastType::Int)).alias("a1"),
            ]),
            source: Source::S3Object,
            selection: Some(Expr::compare(
                CompareOp::Gt,
                Expr::column(2),
                Expr::literal(Value::Str("x".to_string())),
            )),
            aggregates: Vec::new(),
        };
        assert_eq!(
            statement.to_string(),
            "SELECT CAST(_1 AS int) AS a1 FROM s3object WHERE (_2 > 'x')"
        );
        assert!(!statement.is_aggregate());
    }
}
