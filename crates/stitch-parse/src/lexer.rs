//! Stateful cursor over a source string, built on a [`TokenMatcher`] plus an
//! ignore set. Matchers and ignore sets are stacked as frames:
//! [`Lexer::push_matcher`] / [`Lexer::push_ignore`] save the current frame
//! and [`Lexer::pop_frame`] restores it, leaving the cursor where the inner
//! frame left it. The scoped `tokens` / `with_ignore` combinators drive
//! these through a guard on the parse context, so the outer frame comes back
//! on all exit paths.

use std::collections::HashSet;

use crate::log;
use crate::srcline::caret_excerpt;
use crate::token::{Token, TokenMatcher, UNKNOWN};
use crate::ParseError;

#[derive(Clone)]
struct Frame {
    matcher: TokenMatcher,
    ignore: HashSet<&'static str>,
}

pub struct Lexer<'s> {
    src: &'s str,
    pos: usize,
    matcher: TokenMatcher,
    ignore: HashSet<&'static str>,
    frames: Vec<Frame>,
    reported_unknown: HashSet<usize>,
}

impl<'s> Lexer<'s> {
    pub fn new(src: &'s str, matcher: TokenMatcher, ignore: &[&'static str]) -> Self {
        Self {
            src,
            pos: 0,
            matcher,
            ignore: ignore.iter().copied().collect(),
            frames: Vec::new(),
            reported_unknown: HashSet::new(),
        }
    }

    pub fn src(&self) -> &'s str {
        self.src
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        debug_assert!(pos <= self.src.len());
        self.pos = pos;
    }

    /// The next token not in the ignore set, advancing the cursor past it.
    /// `None` at end of input.
    pub fn next(&mut self) -> Option<Token> {
        loop {
            let tok = self.matcher.token_at(self.src, self.pos)?;
            self.pos = tok.span.end;
            if tok.kind == UNKNOWN && self.reported_unknown.insert(tok.span.start) {
                let err = ParseError::UnknownToken(tok.text.clone());
                log::log(&caret_excerpt(&err.to_string(), self.src, tok.span.start));
            }
            if !self.ignore.contains(tok.kind) {
                return Some(tok);
            }
        }
    }

    /// The next significant token without advancing.
    pub fn peek(&mut self) -> Option<Token> {
        let saved = self.pos;
        let tok = self.next();
        self.pos = saved;
        tok
    }

    /// True when only ignored tokens (or nothing) remain.
    pub fn eof(&mut self) -> bool {
        self.peek().is_none()
    }

    /// Make `matcher` active, saving the current matcher and ignore set.
    pub fn push_matcher(&mut self, matcher: TokenMatcher) {
        self.frames.push(Frame {
            matcher: std::mem::replace(&mut self.matcher, matcher),
            ignore: self.ignore.clone(),
        });
    }

    /// Make `ignore` the active ignore set, saving the current frame.
    pub fn push_ignore(&mut self, ignore: &[&'static str]) {
        let ignore: HashSet<&'static str> = ignore.iter().copied().collect();
        self.frames.push(Frame {
            matcher: self.matcher.clone(),
            ignore: std::mem::replace(&mut self.ignore, ignore),
        });
    }

    /// Restore the matcher and ignore set saved by the matching push. The
    /// cursor keeps the position the inner frame reached.
    pub fn pop_frame(&mut self) {
        let frame = self.frames.pop().expect("unbalanced lexer frame pop");
        self.matcher = frame.matcher;
        self.ignore = frame.ignore;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::match_one_of;

    fn main_matcher() -> TokenMatcher {
        TokenMatcher::new(&[
            ("ident", r"[a-zA-Z_]\w*"),
            ("ws", r"\s+"),
            ("symbol", &match_one_of("( ) ; =")),
        ])
        .unwrap()
    }

    fn digit_matcher() -> TokenMatcher {
        TokenMatcher::new(&[("digits", r"\d+"), ("ws", r"\s+")]).unwrap()
    }

    #[test]
    fn skips_ignored_kinds() {
        let mut lex = Lexer::new("a b c", main_matcher(), &["ws"]);
        let texts: Vec<_> = std::iter::from_fn(|| lex.next()).map(|t| t.text).collect();
        assert_eq!(texts, ["a", "b", "c"]);
        assert!(lex.eof());
    }

    #[test]
    fn pushed_matcher_restores_and_realigns() {
        let mut lex = Lexer::new("x 12 34 y", main_matcher(), &["ws"]);
        assert_eq!(lex.next().unwrap().text, "x");
        let outer_before = lex.position();
        lex.push_matcher(digit_matcher());
        assert_eq!(lex.next().unwrap().text, "12");
        assert_eq!(lex.next().unwrap().text, "34");
        lex.pop_frame();
        assert!(lex.position() > outer_before);
        // the outer matcher resumes where the inner one stopped
        assert_eq!(lex.next().unwrap().text, "y");
    }

    #[test]
    fn pushed_ignore_restores() {
        let mut lex = Lexer::new("a b", main_matcher(), &["ws"]);
        assert_eq!(lex.next().unwrap().text, "a");
        lex.push_ignore(&[]);
        assert_eq!(lex.next().unwrap().kind, "ws");
        lex.pop_frame();
        assert_eq!(lex.next().unwrap().text, "b");
    }

    #[test]
    fn frames_nest() {
        let mut lex = Lexer::new("a 1 b", main_matcher(), &["ws"]);
        assert_eq!(lex.next().unwrap().text, "a");
        lex.push_matcher(digit_matcher());
        lex.push_ignore(&[]);
        assert_eq!(lex.next().unwrap().kind, "ws");
        assert_eq!(lex.next().unwrap().text, "1");
        lex.pop_frame();
        lex.pop_frame();
        assert_eq!(lex.next().unwrap().text, "b");
        assert!(lex.eof());
    }
}
