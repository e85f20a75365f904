//! LIKE pattern matching
//!
//! Patterns are translated into anchored regular expressions:
//!
//! ```text
//! %        any run of characters, including none
//! _        exactly one character
//! [a-z]    one character from the class
//! [^a-z]   one character outside the class
//! <esc>c   the character c taken literally
//! ```

use std::cell::RefCell;
use std::collections::HashMap;

use regex::Regex;

use crate::query::error::EvalError;

/// Upper bound on cached dynamic patterns per execution
const PATTERN_CACHE_CAPACITY: usize = 64;

/// A compiled LIKE pattern
#[derive(Debug, Clone)]
pub struct LikeMatcher {
    regex: Regex,
}

impl PartialEq for LikeMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str()
    }
}

impl LikeMatcher {
    /// Compile `pattern` with an optional single-character escape
    pub fn compile(pattern: &str, escape: Option<char>) -> Result<Self, EvalError> {
        let source = like_to_regex(pattern, escape)?;
        let regex = Regex::new(&source).map_err(|e| EvalError::InvalidPattern(e.to_string()))?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn as_regex(&self) -> &str {
        self.regex.as_str()
    }
}

/// Validate an ESCAPE argument
pub fn escape_char(escape: &str) -> Result<char, EvalError> {
    let mut chars = escape.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(EvalError::InvalidPattern(format!(
            "escape must be a single character, found '{}'",
            escape
        ))),
    }
}

fn like_to_regex(pattern: &str, escape: Option<char>) -> Result<String, EvalError> {
    let mut out = String::from("(?s)^");
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        if Some(c) == escape {
            match chars.next() {
                Some(literal) => out.push_str(&regex::escape(literal.encode_utf8(&mut [0; 4]))),
                None => {
                    return Err(EvalError::InvalidPattern(
                        "escape character at end of pattern".to_string(),
                    ))
                }
            }
            continue;
        }
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    class.push(c);
                }
                if !closed || class.is_empty() || class == "^" {
                    return Err(EvalError::InvalidPattern(format!(
                        "unterminated or empty character class in '{}'",
                        pattern
                    )));
                }
                out.push('[');
                let body = match class.strip_prefix('^') {
                    Some(rest) => {
                        out.push('^');
                        rest
                    }
                    None => class.as_str(),
                };
                for c in body.chars() {
                    if matches!(c, '\\' | '[' | '&' | '~' | '^') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push(']');
            }
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    out.push('$');
    Ok(out)
}

/// Compiled patterns keyed by pattern text and escape, for LIKE operands
/// that are only known per row
#[derive(Debug, Default)]
pub struct PatternCache {
    entries: RefCell<HashMap<(String, Option<char>), LikeMatcher>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matcher(&self, pattern: &str, escape: Option<char>) -> Result<LikeMatcher, EvalError> {
        let key = (pattern.to_string(), escape);
        if let Some(matcher) = self.entries.borrow().get(&key) {
            return Ok(matcher.clone());
        }

        let matcher = LikeMatcher::compile(pattern, escape)?;
        let mut entries = self.entries.borrow_mut();
        if entries.len() >= PATTERN_CACHE_CAPACITY {
            entries.clear();
        }
        entries.insert(key, matcher.clone());
        Ok(matcher)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn like(text: &str, pattern: &str, escape: Option<char>) -> bool {
        LikeMatcher::compile(pattern, escape).unwrap().is_match(text)
    }

    #[test]
    fn test_wildcards() {
        assert!(like("abcdefgh", "abc%", None));
        assert!(like("abcdefgh", "%fgh", None));
        assert!(like("abc", "a_c", None));
        assert!(!like("abbc", "a_c", None));
        assert!(like("", "%", None));
        assert!(!like("xabc", "abc%", None));
    }

    #[test]
    fn test_character_classes() {
        assert!(like("c123", "[a-z]%", None));
        assert!(!like("C123", "[a-z]%", None));
        assert!(like("abc", "[abc]%", None));
        assert!(like("g", "[^d-f]", None));
        assert!(!like("e", "[^d-f]", None));
    }

    #[test]
    fn test_escape() {
        assert!(like("abc_defgh", "abc$_defgh", Some('$')));
        assert!(!like("abcXdefgh", "abc$_defgh", Some('$')));
        assert!(like("abc#efgh", "abc##efgh", Some('#')));
        assert!(like("_ar", "%_ar", Some('%')));
        assert!(!like("car", "%_ar", Some('%')));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(like("a.b", "a.b", None));
        assert!(!like("axb", "a.b", None));
        assert!(like("(1+1)", "(1+1)", None));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(LikeMatcher::compile("abc[", None).is_err());
        assert!(LikeMatcher::compile("abc$", Some('$')).is_err());
        assert!(escape_char("ab").is_err());
        assert_eq!(escape_char("#").unwrap(), '#');
    }

    #[test]
    fn test_pattern_cache() {
        let cache = PatternCache::new();
        assert!(cache.is_empty());
        assert!(cache.matcher("a%", None).unwrap().is_match("abc"));
        assert!(cache.matcher("a%", None).unwrap().is_match("axe"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_multiline_text() {
        assert!(like("line1\nline2", "line1%", None));
    }
}
