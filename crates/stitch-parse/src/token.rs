//! A [`TokenMatcher`] turns an ordered set of named regex patterns into a
//! single combined matcher. The first (highest-priority) named alternative
//! that fires at the cursor wins.

use std::sync::Arc;

use itertools::Itertools;
use regex::Regex;

use crate::span::Span;
use crate::ParseError;

/// Kind reported for a character no pattern recognizes.
pub const UNKNOWN: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: &'static str,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: &'static str, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }
}

/// An ordered set of named patterns compiled into one anchored alternation.
///
/// Matchers are value types: cloning shares the compiled regex, so stacking
/// and swapping matchers on a lexer is O(1) aside from re-anchoring.
#[derive(Clone, Debug)]
pub struct TokenMatcher {
    names: Arc<Vec<&'static str>>,
    re: Arc<Regex>,
}

impl TokenMatcher {
    /// Build a matcher from `(kind, pattern)` pairs, earlier entries taking
    /// priority. Patterns are standard regex syntax, matched at the cursor.
    pub fn new(patterns: &[(&'static str, &str)]) -> Result<Self, ParseError> {
        let combined = format!(
            r"\A(?:{})",
            patterns
                .iter()
                .enumerate()
                .map(|(i, (_, pat))| format!("(?P<t{i}>{pat})"))
                .format("|")
        );
        let re = Regex::new(&combined)
            .map_err(|e| ParseError::BadTokenPattern(e.to_string()))?;
        Ok(Self {
            names: Arc::new(patterns.iter().map(|(name, _)| *name).collect()),
            re: Arc::new(re),
        })
    }

    /// The token starting at `pos`, or `None` at end of input.
    ///
    /// When no pattern matches but the cursor is not at the end, a synthetic
    /// [`UNKNOWN`] token spanning exactly one character is returned so the
    /// caller can recover. A pattern matching the empty string is treated the
    /// same way, which keeps the cursor advancing.
    pub fn token_at(&self, src: &str, pos: usize) -> Option<Token> {
        if pos >= src.len() {
            return None;
        }
        if let Some(caps) = self.re.captures(&src[pos..]) {
            for (i, name) in self.names.iter().enumerate() {
                let group = format!("t{i}");
                if let Some(m) = caps.name(&group) {
                    if m.end() > m.start() {
                        return Some(Token::new(
                            name,
                            m.as_str(),
                            Span::new(pos + m.start()..pos + m.end()),
                        ));
                    }
                }
            }
        }
        let ch = src[pos..].chars().next().expect("pos is a char boundary");
        let end = pos + ch.len_utf8();
        Some(Token::new(UNKNOWN, &src[pos..end], Span::new(pos..end)))
    }
}

/// Build a pattern matching any of the space-separated literal symbols,
/// longest first so `::` wins over `:`.
pub fn match_one_of(symbols: &str) -> String {
    symbols
        .split_ascii_whitespace()
        .sorted_by_key(|s| std::cmp::Reverse(s.len()))
        .map(regex::escape)
        .format("|")
        .to_string()
}
