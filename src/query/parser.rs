//! Statement Parser
//!
//! Parses token streams into a resolved [`Statement`].
//!
//! # Supported Syntax
//!
//! ```text
//! statement  := SELECT ( '*' | item (',' item)* ) FROM source [WHERE expr] [';']
//! item       := expr [AS identifier]
//! source     := stdin | s3object | '/' path
//!
//! expr       := or
//! or         := and (OR and)*
//! and        := not (AND not)*
//! not        := NOT not | predicate
//! predicate  := additive ( compare-op additive
//!                        | IS [NOT] NULL
//!                        | [NOT] LIKE additive [ESCAPE additive]
//!                        | [NOT] IN '(' expr (',' expr)* ')'
//!                        | [NOT] BETWEEN additive AND additive )*
//! additive   := multiplicative (('+' | '-' | '||') multiplicative)*
//! multiplicative := power (('*' | '/' | '%') power)*
//! power      := unary ['^' power]
//! unary      := ('-' | '+') unary | primary
//! primary    := literal | _N | identifier | function-call | CAST | CASE | TRIM | '(' expr ')'
//! ```
//!
//! # Examples
//!
//! ```text
//! SELECT _1, _3 FROM stdin WHERE cast(_2 AS int) > 10
//! SELECT count(*), avg(float(_4)) FROM s3object
//! SELECT (int(_1) > int(_2)) AS a1 FROM s3object WHERE a1 = true
//! SELECT substring(_1 FROM 2 FOR 3), trim(LEADING '0' FROM _2) FROM /bucket/key
//! ```
//!
//! After parsing, alias references are replaced by the aliased expression,
//! aggregate calls are numbered, and the placement rules for aggregates are
//! checked.

use std::collections::HashMap;

use tracing::debug;

use crate::query::ast::*;
use crate::query::error::{QueryResult, SyntaxError};
use crate::query::functions::aggregate::AggregateFunc;
use crate::query::functions::pattern::{escape_char, LikeMatcher};
use crate::query::functions::{FunctionKind, FUNCTION_REGISTRY};
use crate::query::lexer::{tokenize, Keyword, Token, TokenKind};
use crate::query::value::{CastType, Value};

/// Parse a query string into a resolved statement
pub fn parse_query(text: &str) -> QueryResult<Statement> {
    let tokens = tokenize(text)?;
    let statement = parse(&tokens)?;
    debug!(
        aggregate = statement.is_aggregate(),
        aggregates = statement.aggregates.len(),
        filtered = statement.selection.is_some(),
        "parsed statement"
    );
    Ok(statement)
}

/// Parse a token stream into a resolved statement
pub fn parse(tokens: &[Token]) -> Result<Statement, SyntaxError> {
    let mut parser = Parser::new(tokens);
    let raw = parser.parse_statement()?;
    resolve(raw)
}

/// Deepest parenthesis, unary and call nesting the parser descends into
const MAX_NESTING_DEPTH: usize = 64;

/// Deepest expression tree accepted after alias substitution
const MAX_EXPR_DEPTH: usize = 128;

/// Statement before alias resolution and aggregate numbering
struct RawStatement {
    projection: Option<Vec<SelectItem>>,
    source: Source,
    selection: Option<(Expr, usize)>,
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    in_selection: bool,
    aggregate_depth: usize,
    depth: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            in_selection: false,
            aggregate_depth: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_nth(&self, n: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + n)
    }

    /// Offset of the current token, or the end of the input
    fn offset(&self) -> usize {
        match self.peek() {
            Some(token) => token.offset,
            None => self.tokens.last().map(Token::end).unwrap_or(0),
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.offset())
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        match self.peek() {
            Some(token) => self.error(format!("expected {}, found '{}'", expected, token.lexeme)),
            None => self.error(format!("expected {}, found end of input", expected)),
        }
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), SyntaxError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword.as_str()))
        }
    }

    fn check_punct(&self, punct: &str) -> bool {
        self.peek().is_some_and(|t| t.is_punct(punct))
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.check_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), SyntaxError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", punct)))
        }
    }

    fn check_operator(&self, op: &str) -> bool {
        self.peek().is_some_and(|t| t.is_operator(op))
    }

    fn eat_operator(&mut self, op: &str) -> bool {
        if self.check_operator(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<&'t Token, SyntaxError> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Identifier => {
                self.pos += 1;
                Ok(token)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    // ---- statement ----

    fn parse_statement(&mut self) -> Result<RawStatement, SyntaxError> {
        self.expect_keyword(Keyword::Select)?;

        let projection = if self.check_operator("*")
            && self.peek_nth(1).is_some_and(|t| t.is_keyword(Keyword::From))
        {
            self.pos += 1;
            None
        } else {
            Some(self.parse_select_items()?)
        };

        self.expect_keyword(Keyword::From)?;
        let source = self.parse_source()?;

        let selection = if self.eat_keyword(Keyword::Where) {
            let offset = self.offset();
            self.in_selection = true;
            let expr = self.parse_expr()?;
            self.in_selection = false;
            Some((expr, offset))
        } else {
            None
        };

        self.eat_punct(";");
        if let Some(token) = self.peek() {
            return Err(self.error(format!("unexpected '{}' after statement", token.lexeme)));
        }

        Ok(RawStatement {
            projection,
            source,
            selection,
        })
    }

    fn parse_select_items(&mut self) -> Result<Vec<SelectItem>, SyntaxError> {
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expr()?;
            let mut item = SelectItem::new(expr);
            if self.eat_keyword(Keyword::As) {
                let alias = self.expect_identifier("alias name")?;
                item = item.alias(alias.lexeme.clone());
            }
            items.push(item);
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(items)
    }

    fn parse_source(&mut self) -> Result<Source, SyntaxError> {
        let token = match self.peek() {
            Some(token) => token,
            None => return Err(self.unexpected("source")),
        };

        if token.kind == TokenKind::Identifier {
            let source = match token.lexeme.to_ascii_lowercase().as_str() {
                "stdin" => Source::Stdin,
                "s3object" => Source::S3Object,
                other => return Err(self.error(format!("unknown source '{}'", other))),
            };
            self.pos += 1;
            return Ok(source);
        }

        if token.is_operator("/") {
            self.pos += 1;
            let mut path = String::from("/");
            let mut end = token.end();
            while let Some(next) = self.peek() {
                let joinable = matches!(
                    next.kind,
                    TokenKind::Identifier | TokenKind::Number | TokenKind::Keyword(_)
                ) || next.is_operator("/")
                    || next.is_operator("-")
                    || next.is_punct(".");
                if next.offset != end || !joinable {
                    break;
                }
                path.push_str(&next.lexeme);
                end = next.end();
                self.pos += 1;
            }
            if path.len() == 1 {
                return Err(self.error("object path is empty"));
            }
            return Ok(Source::Object(path));
        }

        Err(self.error(format!("unknown source '{}'", token.lexeme)))
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(Self::parse_or)
    }

    /// Run a recursive production one nesting level deeper
    fn nested(
        &mut self,
        production: impl FnOnce(&mut Self) -> Result<Expr, SyntaxError>,
    ) -> Result<Expr, SyntaxError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error(format!(
                "expression nested deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }
        self.depth += 1;
        let result = production(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_not()?;
        while self.eat_keyword(Keyword::And) {
            let right = self.parse_not()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat_keyword(Keyword::Not) {
            let operand = self.nested(Self::parse_not)?;
            return Ok(Expr::unary(UnaryOp::Not, operand));
        }
        self.parse_predicate()
    }

    fn peek_compare_op(&self) -> Option<CompareOp> {
        self.peek()
            .filter(|t| t.kind == TokenKind::Operator)
            .and_then(|t| CompareOp::from_symbol(&t.lexeme))
    }

    fn parse_predicate(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_additive()?;

        loop {
            if let Some(op) = self.peek_compare_op() {
                self.pos += 1;
                let right = self.parse_additive()?;
                left = Expr::compare(op, left, right);
                continue;
            }

            if self.eat_keyword(Keyword::Is) {
                let negated = self.eat_keyword(Keyword::Not);
                self.expect_keyword(Keyword::Null)?;
                left = Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                };
                continue;
            }

            let negated = self.check_keyword(Keyword::Not)
                && self.peek_nth(1).is_some_and(|t| {
                    t.is_keyword(Keyword::Like)
                        || t.is_keyword(Keyword::In)
                        || t.is_keyword(Keyword::Between)
                });
            if negated {
                self.pos += 1;
            }

            if self.eat_keyword(Keyword::Like) {
                left = self.parse_like(left, negated)?;
            } else if self.eat_keyword(Keyword::In) {
                left = self.parse_in_list(left, negated)?;
            } else if self.eat_keyword(Keyword::Between) {
                let low = self.parse_additive()?;
                self.expect_keyword(Keyword::And)?;
                let high = self.parse_additive()?;
                left = Expr::Between {
                    expr: Box::new(left),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                };
            } else {
                break;
            }
        }

        Ok(left)
    }

    fn parse_like(&mut self, expr: Expr, negated: bool) -> Result<Expr, SyntaxError> {
        let pattern_offset = self.offset();
        let pattern = self.parse_additive()?;
        let escape = if self.eat_keyword(Keyword::Escape) {
            Some(self.parse_additive()?)
        } else {
            None
        };

        let escape_literal = match &escape {
            Some(Expr::Literal(Value::Str(e))) => Some(
                escape_char(e).map_err(|err| SyntaxError::new(err.to_string(), pattern_offset))?,
            ),
            _ => None,
        };
        let compiled = match (&pattern, &escape) {
            (Expr::Literal(Value::Str(p)), None) => Some(LikeMatcher::compile(p, None)),
            (Expr::Literal(Value::Str(p)), Some(_)) if escape_literal.is_some() => {
                Some(LikeMatcher::compile(p, escape_literal))
            }
            _ => None,
        }
        .transpose()
        .map_err(|err| SyntaxError::new(err.to_string(), pattern_offset))?;

        Ok(Expr::Like {
            expr: Box::new(expr),
            pattern: Box::new(pattern),
            escape: escape.map(Box::new),
            negated,
            compiled,
        })
    }

    fn parse_in_list(&mut self, expr: Expr, negated: bool) -> Result<Expr, SyntaxError> {
        self.expect_punct("(")?;
        if self.check_punct(")") {
            return Err(self.error("IN list must not be empty"));
        }
        let mut list = vec![self.parse_expr()?];
        while self.eat_punct(",") {
            list.push(self.parse_expr()?);
        }
        self.expect_punct(")")?;
        Ok(Expr::InList {
            expr: Box::new(expr),
            list,
            negated,
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_operator("+") {
                BinaryOp::Add
            } else if self.eat_operator("-") {
                BinaryOp::Sub
            } else if self.eat_operator("||") {
                BinaryOp::Concat
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_power()?;
        loop {
            let op = if self.eat_operator("*") {
                BinaryOp::Mul
            } else if self.eat_operator("/") {
                BinaryOp::Div
            } else if self.eat_operator("%") {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_power()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.parse_unary()?;
        if self.eat_operator("^") {
            let exponent = self.nested(Self::parse_power)?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat_operator("-") {
            // i64::MIN only exists with its sign attached
            if let Some(token) = self.peek().filter(|t| t.kind == TokenKind::Number) {
                if let Ok(v) = format!("-{}", token.lexeme).parse::<i64>() {
                    self.pos += 1;
                    return Ok(Expr::Literal(Value::Int(v)));
                }
            }
            let operand = self.nested(Self::parse_unary)?;
            return Ok(match operand {
                Expr::Literal(Value::Int(v)) if v != i64::MIN => Expr::Literal(Value::Int(-v)),
                Expr::Literal(Value::Double(v)) => Expr::Literal(Value::Double(-v)),
                other => Expr::unary(UnaryOp::Neg, other),
            });
        }
        if self.eat_operator("+") {
            return self.nested(Self::parse_unary);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = match self.peek() {
            Some(token) => token,
            None => return Err(self.unexpected("expression")),
        };

        match token.kind {
            TokenKind::Number => {
                self.pos += 1;
                parse_number(&token.lexeme)
                    .map(Expr::Literal)
                    .ok_or_else(|| SyntaxError::new(format!("invalid number '{}'", token.lexeme), token.offset))
            }
            TokenKind::StringLiteral => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Str(token.lexeme.clone())))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Null))
            }
            TokenKind::Keyword(Keyword::Cast) => {
                self.pos += 1;
                self.parse_cast()
            }
            TokenKind::Keyword(Keyword::Case) => {
                self.pos += 1;
                self.parse_case()
            }
            TokenKind::Keyword(Keyword::Trim) => {
                self.pos += 1;
                self.parse_trim()
            }
            TokenKind::Punctuation if token.lexeme == "(" => {
                self.pos += 1;
                let expr = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Identifier => {
                self.pos += 1;
                if self.check_punct("(") {
                    return self.parse_call(token);
                }
                if let Some(position) = column_position(&token.lexeme) {
                    return match position {
                        Some(0) | None => Err(SyntaxError::new(
                            format!("invalid column reference '{}'", token.lexeme),
                            token.offset,
                        )),
                        Some(n) => Ok(Expr::column(n)),
                    };
                }
                Ok(Expr::Identifier {
                    name: token.lexeme.clone(),
                    offset: token.offset,
                })
            }
            TokenKind::Operator if token.lexeme == "*" => Err(self.error(
                "'*' is only allowed as the whole projection or inside count(*)",
            )),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_cast(&mut self) -> Result<Expr, SyntaxError> {
        self.expect_punct("(")?;
        let expr = self.parse_expr()?;
        self.expect_keyword(Keyword::As)?;
        let type_token = self.expect_identifier("type name")?;
        let target = CastType::from_name(&type_token.lexeme).ok_or_else(|| {
            SyntaxError::new(
                format!("unknown type '{}'", type_token.lexeme),
                type_token.offset,
            )
        })?;
        self.expect_punct(")")?;
        Ok(Expr::cast(expr, target))
    }

    fn parse_case(&mut self) -> Result<Expr, SyntaxError> {
        let operand = if self.check_keyword(Keyword::When) {
            None
        } else {
            Some(self.parse_expr()?)
        };

        let mut branches = Vec::new();
        while self.eat_keyword(Keyword::When) {
            let when = self.parse_expr()?;
            self.expect_keyword(Keyword::Then)?;
            let then = self.parse_expr()?;
            branches.push((when, then));
        }
        if branches.is_empty() {
            return Err(self.unexpected("WHEN"));
        }

        let otherwise = if self.eat_keyword(Keyword::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;

        Ok(Expr::Case(match operand {
            Some(operand) => CaseExpr::Simple {
                operand: Box::new(operand),
                branches,
                otherwise,
            },
            None => CaseExpr::Searched {
                branches,
                otherwise,
            },
        }))
    }

    /// `trim([LEADING|TRAILING|BOTH] [chars] FROM expr)` or `trim(expr)`
    fn parse_trim(&mut self) -> Result<Expr, SyntaxError> {
        self.expect_punct("(")?;
        let mode = if self.eat_keyword(Keyword::Leading) {
            Some(TrimMode::Leading)
        } else if self.eat_keyword(Keyword::Trailing) {
            Some(TrimMode::Trailing)
        } else if self.eat_keyword(Keyword::Both) {
            Some(TrimMode::Both)
        } else {
            None
        };

        let (target, charset) = if self.eat_keyword(Keyword::From) {
            (self.parse_expr()?, None)
        } else {
            let first = self.parse_expr()?;
            if self.eat_keyword(Keyword::From) {
                (self.parse_expr()?, Some(first))
            } else if mode.is_some() {
                return Err(self.unexpected("FROM"));
            } else {
                (first, None)
            }
        };
        self.expect_punct(")")?;

        let mut args = vec![target];
        args.extend(charset);
        Ok(Expr::Function {
            func: ScalarFunc::Trim(mode.unwrap_or_default()),
            args,
        })
    }

    /// Comma separated arguments up to and including the closing parenthesis
    fn parse_args(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut args = Vec::new();
        if self.eat_punct(")") {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn parse_date_part(&mut self, interval_only: bool) -> Result<DatePart, SyntaxError> {
        let token = self.expect_identifier("date part")?;
        match DatePart::from_name(&token.lexeme) {
            Some(part) if !interval_only || part.is_interval_unit() => Ok(part),
            _ => Err(SyntaxError::new(
                format!("invalid date part '{}'", token.lexeme),
                token.offset,
            )),
        }
    }

    fn parse_call(&mut self, name: &'t Token) -> Result<Expr, SyntaxError> {
        let def = FUNCTION_REGISTRY.lookup(&name.lexeme).ok_or_else(|| {
            SyntaxError::new(format!("unknown function '{}'", name.lexeme), name.offset)
        })?;
        self.expect_punct("(")?;

        let check_arity = |count: usize| {
            if def.accepts(count) {
                Ok(())
            } else {
                Err(SyntaxError::new(
                    format!("{}() does not accept {} argument(s)", def.name, count),
                    name.offset,
                ))
            }
        };

        let func = match def.kind {
            FunctionKind::Aggregate(func) => return self.parse_aggregate(func, name.offset),
            FunctionKind::Substring => {
                let value = self.parse_expr()?;
                let args = if self.eat_keyword(Keyword::From) {
                    let mut args = vec![value, self.parse_expr()?];
                    if self.eat_keyword(Keyword::For) {
                        args.push(self.parse_expr()?);
                    }
                    self.expect_punct(")")?;
                    args
                } else {
                    let mut args = vec![value];
                    if self.eat_punct(",") {
                        args.extend(self.parse_args()?);
                    } else {
                        self.expect_punct(")")?;
                    }
                    args
                };
                check_arity(args.len())?;
                return Ok(Expr::Function {
                    func: ScalarFunc::Substring,
                    args,
                });
            }
            FunctionKind::Extract => {
                let part = self.parse_date_part(false)?;
                self.expect_keyword(Keyword::From)?;
                let ts = self.parse_expr()?;
                self.expect_punct(")")?;
                return Ok(Expr::Function {
                    func: ScalarFunc::Extract(part),
                    args: vec![ts],
                });
            }
            FunctionKind::DateAdd | FunctionKind::DateDiff => {
                let part = self.parse_date_part(true)?;
                self.expect_punct(",")?;
                let args = self.parse_args()?;
                check_arity(args.len())?;
                let func = if def.kind == FunctionKind::DateAdd {
                    ScalarFunc::DateAdd(part)
                } else {
                    ScalarFunc::DateDiff(part)
                };
                return Ok(Expr::Function { func, args });
            }
            FunctionKind::IntCast | FunctionKind::FloatCast => {
                let mut args = self.parse_args()?;
                check_arity(args.len())?;
                let target = if def.kind == FunctionKind::IntCast {
                    CastType::Int
                } else {
                    CastType::Float
                };
                return Ok(Expr::cast(args.remove(0), target));
            }
            FunctionKind::CharLength => ScalarFunc::CharLength,
            FunctionKind::Lower => ScalarFunc::Lower,
            FunctionKind::Upper => ScalarFunc::Upper,
            FunctionKind::Trim => ScalarFunc::Trim(TrimMode::Both),
            FunctionKind::NullIf => ScalarFunc::NullIf,
            FunctionKind::Coalesce => ScalarFunc::Coalesce,
            FunctionKind::ToTimestamp => ScalarFunc::ToTimestamp,
            FunctionKind::ToString => ScalarFunc::ToString,
            FunctionKind::UtcNow => ScalarFunc::UtcNow,
            FunctionKind::Version => ScalarFunc::Version,
            FunctionKind::Add => ScalarFunc::Add,
        };

        let args = self.parse_args()?;
        check_arity(args.len())?;
        Ok(Expr::Function { func, args })
    }

    fn parse_aggregate(&mut self, func: AggregateFunc, offset: usize) -> Result<Expr, SyntaxError> {
        if self.in_selection {
            return Err(SyntaxError::new(
                format!("aggregate function {}() is not allowed in WHERE", func),
                offset,
            ));
        }
        if self.aggregate_depth > 0 {
            return Err(SyntaxError::new(
                format!("aggregate function {}() cannot be nested", func),
                offset,
            ));
        }

        let arg = if func == AggregateFunc::Count && self.eat_operator("*") {
            self.expect_punct(")")?;
            None
        } else if func == AggregateFunc::Count && self.eat_punct(")") {
            None
        } else if self.check_punct(")") {
            return Err(self.error(format!("{}() requires an argument", func)));
        } else {
            self.aggregate_depth += 1;
            let arg = self.parse_expr();
            self.aggregate_depth -= 1;
            let arg = arg?;
            self.expect_punct(")")?;
            Some(Box::new(arg))
        };

        Ok(Expr::Aggregate(AggregateCall { slot: 0, func, arg }))
    }
}

/// `Some(Some(n))` for `_N`, `Some(None)` for an unparseable position,
/// `None` when the name is not positional at all
fn column_position(name: &str) -> Option<Option<usize>> {
    let digits = name.strip_prefix('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse().ok())
}

/// Integer literal when it fits in i64, otherwise a double
fn parse_number(lexeme: &str) -> Option<Value> {
    if !lexeme.contains(['.', 'e', 'E']) {
        if let Ok(v) = lexeme.parse::<i64>() {
            return Some(Value::Int(v));
        }
    }
    lexeme.parse::<f64>().ok().map(Value::Double)
}

// ---- resolution ----

fn resolve(raw: RawStatement) -> Result<Statement, SyntaxError> {
    let RawStatement {
        projection,
        source,
        selection,
    } = raw;

    let mut items = projection;
    let aliases = collect_aliases(items.as_deref().unwrap_or_default())?;

    if let Some(items) = items.as_mut() {
        for item in items.iter_mut() {
            substitute_aliases(&mut item.expr, &aliases, &mut Vec::new(), 1)?;
        }
    }

    let selection = match selection {
        Some((mut expr, offset)) => {
            substitute_aliases(&mut expr, &aliases, &mut Vec::new(), 1)?;
            if expr.contains_aggregate() {
                return Err(SyntaxError::new(
                    "aggregate functions are not allowed in WHERE",
                    offset,
                ));
            }
            Some(expr)
        }
        None => None,
    };

    let mut aggregates = Vec::new();
    let projection = match items {
        None => Projection::Wildcard,
        Some(mut items) => {
            for item in items.iter_mut() {
                number_aggregates(&mut item.expr, &mut aggregates);
            }
            if !aggregates.is_empty() {
                if let Some(item) = items.iter().find(|item| item.expr.has_bare_column()) {
                    return Err(SyntaxError::new(
                        format!(
                            "'{}' references a column outside of an aggregate in an aggregate query",
                            item.expr
                        ),
                        0,
                    ));
                }
            }
            Projection::Items(items)
        }
    };

    Ok(Statement {
        projection,
        source,
        selection,
        aggregates,
    })
}

fn collect_aliases(items: &[SelectItem]) -> Result<HashMap<String, Expr>, SyntaxError> {
    let mut aliases = HashMap::new();
    for item in items {
        if let Some(alias) = &item.alias {
            let key = alias.to_ascii_lowercase();
            if aliases.insert(key, item.expr.clone()).is_some() {
                return Err(SyntaxError::new(format!("duplicate alias '{}'", alias), 0));
            }
        }
    }
    Ok(aliases)
}

/// Replace alias references with the aliased expression, bounding the
/// depth of the resulting tree
fn substitute_aliases(
    expr: &mut Expr,
    aliases: &HashMap<String, Expr>,
    active: &mut Vec<String>,
    depth: usize,
) -> Result<(), SyntaxError> {
    if depth > MAX_EXPR_DEPTH {
        return Err(SyntaxError::new(
            format!("expression nested deeper than {} levels", MAX_EXPR_DEPTH),
            0,
        ));
    }
    if let Expr::Identifier { name, offset } = &*expr {
        let key = name.to_ascii_lowercase();
        let offset = *offset;
        if active.contains(&key) {
            return Err(SyntaxError::new(
                format!("alias '{}' refers to itself", name),
                offset,
            ));
        }
        let mut replacement = match aliases.get(&key) {
            Some(target) => target.clone(),
            None => {
                return Err(SyntaxError::new(
                    format!("unknown identifier '{}'", name),
                    offset,
                ))
            }
        };
        active.push(key);
        substitute_aliases(&mut replacement, aliases, active, depth)?;
        active.pop();
        *expr = replacement;
        return Ok(());
    }

    for child in expr.children_mut() {
        substitute_aliases(child, aliases, active, depth + 1)?;
    }
    Ok(())
}

fn number_aggregates(expr: &mut Expr, aggregates: &mut Vec<AggregateCall>) {
    if let Expr::Aggregate(call) = expr {
        call.slot = aggregates.len();
        aggregates.push(call.clone());
        return;
    }
    for child in expr.children_mut() {
        number_aggregates(child, aggregates);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(query: &str) -> Vec<SelectItem> {
        match parse_query(query).unwrap().projection {
            Projection::Items(items) => items,
            Projection::Wildcard => panic!("expected projection items"),
        }
    }

    fn first_expr(query: &str) -> Expr {
        items(query).remove(0).expr
    }

    fn syntax_error(query: &str) -> SyntaxError {
        match parse_query(query) {
            Err(crate::query::QueryError::Syntax(err)) => err,
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_select() {
        let statement = parse_query("select _1, _2 from stdin;").unwrap();
        assert_eq!(statement.source, Source::Stdin);
        assert!(statement.selection.is_none());
        assert!(!statement.is_aggregate());
        assert_eq!(
            statement.projection,
            Projection::Items(vec![
                SelectItem::new(Expr::column(1)),
                SelectItem::new(Expr::column(2)),
            ])
        );
    }

    #[test]
    fn test_parse_wildcard_and_sources() {
        let statement = parse_query("SELECT * FROM s3object WHERE _1 = 'a'").unwrap();
        assert_eq!(statement.projection, Projection::Wildcard);
        assert_eq!(statement.source, Source::S3Object);

        let statement = parse_query("select * from /bucket/data-1.csv").unwrap();
        assert_eq!(statement.source, Source::Object("/bucket/data-1.csv".to_string()));
    }

    #[test]
    fn test_unknown_source_rejected() {
        let err = syntax_error("select _1 from file.txt");
        assert!(err.message.contains("unknown source"));
        assert_eq!(err.offset, 15);
    }

    #[test]
    fn test_precedence() {
        assert_eq!(first_expr("select 1 + 2 * 3 from stdin").to_string(), "(1 + (2 * 3))");
        assert_eq!(first_expr("select 2 ^ 3 ^ 2 from stdin").to_string(), "(2 ^ (3 ^ 2))");
        assert_eq!(first_expr("select 10 - 4 - 3 from stdin").to_string(), "((10 - 4) - 3)");
        assert_eq!(
            first_expr("select 1 < 2 = true from stdin").to_string(),
            "((1 < 2) = true)"
        );
        assert_eq!(
            first_expr("select not 1 > 2 from stdin").to_string(),
            "(NOT (1 > 2))"
        );
        assert_eq!(
            first_expr("select not _1 is null from stdin").to_string(),
            "(NOT (_1 IS NULL))"
        );
        assert_eq!(
            first_expr("select _1 = 'a' or _2 = 'b' and _3 = 'c' from stdin").to_string(),
            "((_1 = 'a') OR ((_2 = 'b') AND (_3 = 'c')))"
        );
    }

    #[test]
    fn test_negative_literals_fold() {
        assert_eq!(first_expr("select -5 from stdin"), Expr::Literal(Value::Int(-5)));
        assert_eq!(first_expr("select -0.5 from stdin"), Expr::Literal(Value::Double(-0.5)));
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(first_expr("select 42 from stdin"), Expr::Literal(Value::Int(42)));
        assert_eq!(first_expr("select 4.5 from stdin"), Expr::Literal(Value::Double(4.5)));
        assert_eq!(
            first_expr("select 9223372036854775808 from stdin"),
            Expr::Literal(Value::Double(9223372036854775808.0))
        );
    }

    #[test]
    fn test_between_in_like() {
        let expr = first_expr("select _1 not between 1 and 5 from stdin");
        assert!(matches!(expr, Expr::Between { negated: true, .. }));

        let expr = first_expr("select _1 in ('a', 'b') from stdin");
        assert!(matches!(expr, Expr::InList { negated: false, ref list, .. } if list.len() == 2));

        let expr = first_expr("select _1 like 'abc$_d' escape '$' from stdin");
        match expr {
            Expr::Like { compiled: Some(matcher), .. } => assert!(matcher.is_match("abc_d")),
            other => panic!("expected compiled LIKE, got {:?}", other),
        }

        let expr = first_expr("select _1 like substring(_2, 1, 2) from stdin");
        assert!(matches!(expr, Expr::Like { compiled: None, .. }));
    }

    #[test]
    fn test_invalid_escape_rejected() {
        let err = syntax_error("select _1 like 'a%' escape 'xy' from stdin");
        assert!(err.message.contains("single character"));
    }

    #[test]
    fn test_function_forms() {
        assert_eq!(
            first_expr("select substring(_1 from 2 for 3) from stdin"),
            Expr::Function {
                func: ScalarFunc::Substring,
                args: vec![
                    Expr::column(1),
                    Expr::Literal(Value::Int(2)),
                    Expr::Literal(Value::Int(3)),
                ],
            }
        );
        assert_eq!(
            first_expr("select trim(leading '0' from _1) from stdin"),
            Expr::Function {
                func: ScalarFunc::Trim(TrimMode::Leading),
                args: vec![Expr::column(1), Expr::Literal(Value::Str("0".into()))],
            }
        );
        assert_eq!(
            first_expr("select trim(_1) from stdin"),
            Expr::Function {
                func: ScalarFunc::Trim(TrimMode::Both),
                args: vec![Expr::column(1)],
            }
        );
        assert!(matches!(
            first_expr("select extract(year from to_timestamp(_1)) from stdin"),
            Expr::Function { func: ScalarFunc::Extract(DatePart::Year), .. }
        ));
        assert!(matches!(
            first_expr("select date_diff(hour, to_timestamp(_1), utcnow()) from stdin"),
            Expr::Function { func: ScalarFunc::DateDiff(DatePart::Hour), .. }
        ));
        assert_eq!(
            first_expr("select int(_1) from stdin"),
            Expr::cast(Expr::column(1), CastType::Int)
        );
    }

    #[test]
    fn test_trim_syntax_errors() {
        syntax_error(r#"select trim(both from "12" "1112211foobar22211122") from stdin"#);
        syntax_error("select trim(both '1') from stdin");
    }

    #[test]
    fn test_function_validation() {
        let err = syntax_error("select nosuch(_1) from stdin");
        assert!(err.message.contains("unknown function"));

        let err = syntax_error("select upper(_1, _2) from stdin");
        assert!(err.message.contains("does not accept"));

        syntax_error("select date_add(week, 1, utcnow()) from stdin");
        syntax_error("select cast(_1 as money) from stdin");
    }

    #[test]
    fn test_case_forms() {
        let expr = first_expr("select case _1 when 'a' then 1 else 0 end from stdin");
        assert!(matches!(expr, Expr::Case(CaseExpr::Simple { .. })));

        let expr = first_expr("select case when _1 = 'a' then 1 end from stdin");
        assert!(matches!(
            expr,
            Expr::Case(CaseExpr::Searched { otherwise: None, .. })
        ));

        syntax_error("select case end from stdin");
    }

    #[test]
    fn test_aggregates_numbered() {
        let statement = parse_query(
            "select sum(int(_1)) / count(*), max(float(_2)), count() from stdin",
        )
        .unwrap();
        assert!(statement.is_aggregate());
        let slots: Vec<(usize, AggregateFunc)> =
            statement.aggregates.iter().map(|a| (a.slot, a.func)).collect();
        assert_eq!(
            slots,
            vec![
                (0, AggregateFunc::Sum),
                (1, AggregateFunc::Count),
                (2, AggregateFunc::Max),
                (3, AggregateFunc::Count),
            ]
        );
        assert!(statement.aggregates[1].arg.is_none());
        assert!(statement.aggregates[3].arg.is_none());
    }

    #[test]
    fn test_aggregate_placement_rules() {
        let err = syntax_error("select _1 from stdin where count(*) > 1");
        assert!(err.message.contains("not allowed in WHERE"));

        let err = syntax_error("select sum(count(*)) from stdin");
        assert!(err.message.contains("nested"));

        let err = syntax_error("select _1, count(*) from stdin");
        assert!(err.message.contains("outside of an aggregate"));

        let err = syntax_error("select count(*) as c from stdin where c > 1");
        assert!(err.message.contains("not allowed in WHERE"));
    }

    #[test]
    fn test_alias_substitution() {
        let statement = parse_query(
            "select (int(_1) > int(_2)) as a1, cast(a1 as int) * 4 from s3object where a1 = true",
        )
        .unwrap();
        let Projection::Items(items) = &statement.projection else {
            panic!("expected items");
        };
        assert_eq!(items[0].alias.as_deref(), Some("a1"));
        assert_eq!(
            items[1].expr.to_string(),
            "(CAST((CAST(_1 AS int) > CAST(_2 AS int)) AS int) * 4)"
        );
        assert_eq!(
            statement.selection.unwrap().to_string(),
            "((CAST(_1 AS int) > CAST(_2 AS int)) = true)"
        );
    }

    #[test]
    fn test_alias_errors() {
        let err = syntax_error("select _1 from stdin where missing = 1");
        assert!(err.message.contains("unknown identifier 'missing'"));

        let err = syntax_error("select b + 1 as a, a + 1 as b from stdin");
        assert!(err.message.contains("refers to itself"));

        let err = syntax_error("select _1 as a, _2 as A from stdin");
        assert!(err.message.contains("duplicate alias"));
    }

    #[test]
    fn test_trailing_garbage() {
        let err = syntax_error("select _1 from stdin; select");
        assert!(err.message.contains("after statement"));
        syntax_error("select _1 from stdin where");
        syntax_error("select _0 from stdin");
        syntax_error("select * + 1 from stdin");
    }

    #[test]
    fn test_nesting_limits() {
        let nested = |depth: usize| {
            format!("select {}1{} from stdin", "(".repeat(depth), ")".repeat(depth))
        };
        assert_eq!(
            first_expr(&nested(30)),
            Expr::Literal(Value::Int(1))
        );

        let err = syntax_error(&nested(200));
        assert!(err.message.contains("nested deeper"));
        let err = syntax_error(&format!("select {}1 from stdin", "not ".repeat(500)));
        assert!(err.message.contains("nested deeper"));

        // left-associative chains deepen the tree without recursing in the parser
        let chain = vec!["1"; 300].join(" + ");
        let err = syntax_error(&format!("select {} from stdin", chain));
        assert!(err.message.contains("nested deeper"));

        let chain = vec!["1"; 100].join(" + ");
        let err = syntax_error(&format!(
            "select {} as a, a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a + a as b from stdin",
            chain
        ));
        assert!(err.message.contains("nested deeper"));
    }

    #[test]
    fn test_negative_integer_bounds() {
        assert_eq!(
            first_expr("select -9223372036854775808 from stdin"),
            Expr::Literal(Value::Int(i64::MIN))
        );
        assert_eq!(first_expr("select -5 from stdin"), Expr::Literal(Value::Int(-5)));
        assert_eq!(
            first_expr("select -9223372036854775809 from stdin"),
            Expr::Literal(Value::Double(-9223372036854775808.0))
        );
    }

    #[test]
    fn test_lex_error_surfaces() {
        let err = parse_query("select 'abc from stdin").unwrap_err();
        assert!(err.is_syntax());
    }
}
