//! Query Lexer
//!
//! Splits statement text into tokens.
//!
//! ```text
//! identifier  := [A-Za-z_][A-Za-z0-9_]*       (keywords are matched case-insensitively)
//! number      := digits [ '.' digits? ] [ exponent ] | '.' digits [ exponent ]
//! exponent    := ('e' | 'E') ['+' | '-'] digits
//! string      := '\'' ... '\'' | '"' ... '"'  (backslash escapes, doubled quote)
//! operator    := + - * / % ^ = != <> < <= > >= ||
//! punctuation := ( ) , . ;
//! ```

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit0, digit1, one_of},
    combinator::{opt, recognize},
    multi::many0_count,
    sequence::{pair, tuple},
    IResult,
};

use crate::query::error::LexError;

/// Reserved words of the statement grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    Is,
    Null,
    Like,
    Escape,
    In,
    Between,
    Case,
    When,
    Then,
    Else,
    End,
    Cast,
    As,
    Trim,
    Leading,
    Trailing,
    Both,
    True,
    False,
    For,
}

impl Keyword {
    /// Look up a keyword, ignoring ASCII case
    pub fn from_ident(ident: &str) -> Option<Self> {
        let keyword = match ident.to_ascii_lowercase().as_str() {
            "select" => Keyword::Select,
            "from" => Keyword::From,
            "where" => Keyword::Where,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            "is" => Keyword::Is,
            "null" => Keyword::Null,
            "like" => Keyword::Like,
            "escape" => Keyword::Escape,
            "in" => Keyword::In,
            "between" => Keyword::Between,
            "case" => Keyword::Case,
            "when" => Keyword::When,
            "then" => Keyword::Then,
            "else" => Keyword::Else,
            "end" => Keyword::End,
            "cast" => Keyword::Cast,
            "as" => Keyword::As,
            "trim" => Keyword::Trim,
            "leading" => Keyword::Leading,
            "trailing" => Keyword::Trailing,
            "both" => Keyword::Both,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "for" => Keyword::For,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Select => "SELECT",
            Keyword::From => "FROM",
            Keyword::Where => "WHERE",
            Keyword::And => "AND",
            Keyword::Or => "OR",
            Keyword::Not => "NOT",
            Keyword::Is => "IS",
            Keyword::Null => "NULL",
            Keyword::Like => "LIKE",
            Keyword::Escape => "ESCAPE",
            Keyword::In => "IN",
            Keyword::Between => "BETWEEN",
            Keyword::Case => "CASE",
            Keyword::When => "WHEN",
            Keyword::Then => "THEN",
            Keyword::Else => "ELSE",
            Keyword::End => "END",
            Keyword::Cast => "CAST",
            Keyword::As => "AS",
            Keyword::Trim => "TRIM",
            Keyword::Leading => "LEADING",
            Keyword::Trailing => "TRAILING",
            Keyword::Both => "BOTH",
            Keyword::True => "TRUE",
            Keyword::False => "FALSE",
            Keyword::For => "FOR",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier,
    Number,
    StringLiteral,
    Operator,
    Punctuation,
}

/// A lexed token. For string literals `lexeme` holds the decoded text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub offset: usize,
}

impl Token {
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.lexeme == op
    }

    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.lexeme == punct
    }

    /// Offset one past the last source byte, for tokens whose lexeme is verbatim
    pub fn end(&self) -> usize {
        self.offset + self.lexeme.len()
    }
}

/// Tokenize a statement
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut rest = text;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let offset = text.len() - rest.len();

        if rest.starts_with('\'') || rest.starts_with('"') {
            let (remaining, literal) = string_literal(rest, offset)?;
            tokens.push(Token {
                kind: TokenKind::StringLiteral,
                lexeme: literal,
                offset,
            });
            rest = remaining;
            continue;
        }

        let (remaining, kind, lexeme) = if let Ok((r, n)) = number(rest) {
            (r, TokenKind::Number, n)
        } else if let Ok((r, ident)) = identifier(rest) {
            let kind = Keyword::from_ident(ident)
                .map(TokenKind::Keyword)
                .unwrap_or(TokenKind::Identifier);
            (r, kind, ident)
        } else if let Ok((r, op)) = operator(rest) {
            (r, TokenKind::Operator, op)
        } else if let Ok((r, p)) = punctuation(rest) {
            (r, TokenKind::Punctuation, p)
        } else {
            let ch = rest.chars().next().unwrap_or_default();
            return Err(LexError::UnexpectedChar { ch, offset });
        };

        tokens.push(Token {
            kind,
            lexeme: lexeme.to_string(),
            offset,
        });
        rest = remaining;
    }

    Ok(tokens)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(tuple((
            digit1,
            opt(pair(char('.'), digit0)),
            opt(exponent),
        ))),
        recognize(tuple((char('.'), digit1, opt(exponent)))),
    ))(input)
}

fn operator(input: &str) -> IResult<&str, &str> {
    alt((
        tag("<="),
        tag(">="),
        tag("<>"),
        tag("!="),
        tag("||"),
        recognize(one_of("+-*/%^=<>")),
    ))(input)
}

fn punctuation(input: &str) -> IResult<&str, &str> {
    recognize(one_of("(),.;"))(input)
}

/// Decode a quoted literal starting at the opening quote
fn string_literal(input: &str, offset: usize) -> Result<(&str, String), LexError> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, q)) => q,
        None => return Err(LexError::UnterminatedString { offset }),
    };

    let mut literal = String::new();
    let mut chars = chars.peekable();
    while let Some((idx, c)) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => literal.push('\n'),
                Some((_, 't')) => literal.push('\t'),
                Some((_, 'r')) => literal.push('\r'),
                Some((_, other)) => literal.push(other),
                None => break,
            }
        } else if c == quote {
            if let Some(&(_, next)) = chars.peek() {
                if next == quote {
                    literal.push(quote);
                    chars.next();
                    continue;
                }
            }
            return Ok((&input[idx + c.len_utf8()..], literal));
        } else {
            literal.push(c);
        }
    }

    Err(LexError::UnterminatedString { offset })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_select() {
        let tokens = tokenize("select _1, _2 from stdin;").unwrap();
        let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["select", "_1", ",", "_2", "from", "stdin", ";"]);
        assert_eq!(tokens[0].kind, TokenKind::Keyword(Keyword::Select));
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[4].offset, 14);
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            kinds("SeLeCt NOT Is nUlL"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Keyword(Keyword::Not),
                TokenKind::Keyword(Keyword::Is),
                TokenKind::Keyword(Keyword::Null),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("1 2.5 .5 3e10 4.2E-3 5.").unwrap();
        let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["1", "2.5", ".5", "3e10", "4.2E-3", "5."]);
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Number));
    }

    #[test]
    fn test_operators() {
        let tokens = tokenize("a<=b>=c<>d!=e||f^g%h").unwrap();
        let ops: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Operator)
            .map(|t| t.lexeme.as_str())
            .collect();
        assert_eq!(ops, vec!["<=", ">=", "<>", "!=", "||", "^", "%"]);
    }

    #[test]
    fn test_string_literals() {
        let tokens = tokenize(r#"'it''s' "say \"hi\"" 'tab\there'"#).unwrap();
        assert_eq!(tokens[0].lexeme, "it's");
        assert_eq!(tokens[1].lexeme, "say \"hi\"");
        assert_eq!(tokens[2].lexeme, "tab\there");
        assert!(tokens.iter().all(|t| t.kind == TokenKind::StringLiteral));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("select 'abc from stdin").unwrap_err();
        assert_eq!(err, LexError::UnterminatedString { offset: 7 });
    }

    #[test]
    fn test_unexpected_char() {
        let err = tokenize("select _1 # 2").unwrap_err();
        assert_eq!(err, LexError::UnexpectedChar { ch: '#', offset: 10 });
    }

    #[test]
    fn test_object_path_tokens() {
        let tokens = tokenize("from /bucket/key.csv").unwrap();
        let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["from", "/", "bucket", "/", "key", ".", "csv"]);
        assert_eq!(tokens[1].end(), tokens[2].offset);
    }
}
