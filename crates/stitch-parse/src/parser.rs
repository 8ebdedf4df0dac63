//! The combinator core: [`Parser`], [`ParseCtx`], and the tagged-result
//! containers carried by every successful parse step.
//!
//! A parser either succeeds, returning a [`Step`] and leaving the lexer past
//! the matched tokens, or returns `None` with the lexer position restored so
//! the caller can try alternatives. Grammars must not be left recursive: a
//! self-referential rule has to consume at least one token before recursing.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::lexer::Lexer;
#[cfg(feature = "trace")]
use crate::log;
use crate::span::Span;
use crate::srcline::report_error;
use crate::srcmap::SrcMap;
use crate::token::{Token, TokenMatcher};

/// Application state threaded through a parse. `Tag` is the value type
/// collected by [`Parser::tag`] into the named buckets of a [`Step`].
pub trait ParseState {
    type Tag: Clone;
}

/// Stateless parsing; tags collect raw tokens.
impl ParseState for () {
    type Tag = Token;
}

/// Named result buckets: an ordered map from tag name to the values matched
/// under that name, merged by concatenation in source order.
#[derive(Debug)]
pub struct Tags<V>(Option<Box<IndexMap<&'static str, Vec<V>>>>);

impl<V> Tags<V> {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn add(&mut self, name: &'static str, value: V) {
        self.0
            .get_or_insert_with(Default::default)
            .entry(name)
            .or_default()
            .push(value);
    }

    /// Append all of `other`'s buckets after this container's.
    pub fn merge(&mut self, other: Tags<V>) {
        let Some(other) = other.0 else { return };
        let map = self.0.get_or_insert_with(Default::default);
        for (name, values) in *other {
            map.entry(name).or_default().extend(values);
        }
    }

    pub fn get(&self, name: &str) -> &[V] {
        self.0
            .as_ref()
            .and_then(|map| map.get(name))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.as_ref().map_or(true, |map| map.is_empty())
    }
}

impl<V> Default for Tags<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// A successful parse: the produced value, the accumulated tag buckets, and
/// the span of consumed source.
#[derive(Debug)]
pub struct Step<T, V> {
    pub value: T,
    pub tags: Tags<V>,
    pub span: Span,
}

impl<T, V> Step<T, V> {
    pub fn new(value: T, span: Span) -> Self {
        Self {
            value,
            tags: Tags::new(),
            span,
        }
    }
}

/// Arguments handed to [`Parser::map_with`] callbacks.
pub struct MapArgs<'x, T, A: ParseState> {
    pub value: T,
    pub tags: &'x Tags<A::Tag>,
    pub span: Span,
    pub state: &'x mut A,
}

pub(crate) trait ErasedParser<A: ParseState> {
    fn try_skip(&self, cx: &mut ParseCtx<A>) -> bool;
}

impl<A: ParseState, P: Parser<A>> ErasedParser<A> for P {
    fn try_skip(&self, cx: &mut ParseCtx<A>) -> bool {
        self.parse(cx).is_some()
    }
}

/// Everything a parse invocation owns: the lexer, the caller's state, an
/// optional source map for diagnostics, the cooperative parse budget, and
/// the stack of cross-cutting pre-parsers.
pub struct ParseCtx<'s, 'a, A: ParseState> {
    pub lexer: Lexer<'s>,
    pub app: &'a mut A,
    src_map: Option<&'a SrcMap>,
    max_parse_count: Option<usize>,
    used: usize,
    fatal: bool,
    pre: Vec<Rc<dyn ErasedParser<A> + 'a>>,
}

impl<'s, 'a, A: ParseState> ParseCtx<'s, 'a, A> {
    pub fn new(
        src: &'s str,
        matcher: TokenMatcher,
        ignore: &[&'static str],
        app: &'a mut A,
    ) -> Self {
        Self {
            lexer: Lexer::new(src, matcher, ignore),
            app,
            src_map: None,
            max_parse_count: None,
            used: 0,
            fatal: false,
            pre: Vec::new(),
        }
    }

    pub fn with_src_map(mut self, src_map: &'a SrcMap) -> Self {
        self.src_map = Some(src_map);
        self
    }

    /// Bound the number of primitive token consumptions; exceeding the bound
    /// fails the whole parse.
    pub fn with_max_parse_count(mut self, max: usize) -> Self {
        self.max_parse_count = Some(max);
        self
    }

    pub fn src_map(&self) -> Option<&SrcMap> {
        self.src_map
    }

    /// True once the parse budget is exhausted; no further tokens will be
    /// consumed and combinators fail through without retrying alternatives.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// The next significant token, after running any active pre-parsers and
    /// charging the parse budget.
    pub fn next_token(&mut self) -> Option<Token> {
        if self.fatal {
            return None;
        }
        self.run_pre();
        if !self.use_budget() {
            return None;
        }
        self.lexer.next()
    }

    /// The span of the next significant token, for error reporting. Does not
    /// advance or charge the budget.
    pub fn peek_span(&mut self) -> Span {
        let src_len = self.lexer.src().len();
        self.lexer
            .peek()
            .map(|t| t.span)
            .unwrap_or_else(|| Span::at(src_len))
    }

    /// Log a caret-annotated diagnostic at `pos`, remapped through the
    /// source map when one is attached.
    pub fn report(&self, msg: &str, pos: usize) {
        report_error(msg, self.lexer.src(), pos, self.src_map);
    }

    fn use_budget(&mut self) -> bool {
        let Some(max) = self.max_parse_count else {
            return true;
        };
        self.used += 1;
        if self.used > max {
            if !self.fatal {
                self.fatal = true;
                let err = crate::ParseError::BudgetExceeded;
                self.report(&err.to_string(), self.lexer.position());
            }
            return false;
        }
        true
    }

    fn run_pre(&mut self) {
        if self.pre.is_empty() {
            return;
        }
        // pre-parsers run without themselves triggering pre-parsing
        let pres = std::mem::take(&mut self.pre);
        loop {
            let mut advanced = false;
            for pre in &pres {
                if pre.try_skip(self) {
                    advanced = true;
                }
            }
            if !advanced {
                break;
            }
        }
        self.pre = pres;
    }

    pub(crate) fn with_pre<R>(
        &mut self,
        pre: Rc<dyn ErasedParser<A> + 'a>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.pre.push(pre);
        let guard = PreGuard { cx: self };
        f(&mut *guard.cx)
    }

    pub(crate) fn without_pre<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = std::mem::take(&mut self.pre);
        let result = f(self);
        self.pre = saved;
        result
    }

    pub(crate) fn with_matcher<R>(
        &mut self,
        matcher: TokenMatcher,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.lexer.push_matcher(matcher);
        let guard = LexerFrameGuard { cx: self };
        f(&mut *guard.cx)
    }

    pub(crate) fn with_ignore<R>(
        &mut self,
        ignore: &[&'static str],
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.lexer.push_ignore(ignore);
        let guard = LexerFrameGuard { cx: self };
        f(&mut *guard.cx)
    }
}

struct PreGuard<'x, 's, 'a, A: ParseState> {
    cx: &'x mut ParseCtx<'s, 'a, A>,
}

impl<A: ParseState> Drop for PreGuard<'_, '_, '_, A> {
    fn drop(&mut self) {
        self.cx.pre.pop();
    }
}

struct LexerFrameGuard<'x, 's, 'a, A: ParseState> {
    cx: &'x mut ParseCtx<'s, 'a, A>,
}

impl<A: ParseState> Drop for LexerFrameGuard<'_, '_, '_, A> {
    fn drop(&mut self) {
        self.cx.lexer.pop_frame();
    }
}

pub trait Parser<A: ParseState> {
    type Out;

    /// Attempt the match. Implementations may leave the lexer anywhere on
    /// failure; [`Parser::parse`] restores it.
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>>;

    /// A short display name used by tracing and `expected …` diagnostics.
    fn label(&self) -> Option<&str> {
        None
    }

    /// Attempt the match, restoring the lexer position on failure so the
    /// caller can try alternatives.
    fn parse(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        let start = cx.lexer.position();
        #[cfg(feature = "trace")]
        if log::trace_enabled() {
            if let Some(label) = self.label() {
                log::log(&format!("{label}: enter at {start}"));
            }
        }
        let result = self.parse_inner(cx);
        if result.is_none() {
            cx.lexer.set_position(start);
        }
        #[cfg(feature = "trace")]
        if log::trace_enabled() {
            if let Some(label) = self.label() {
                match &result {
                    Some(step) => log::log(&format!("{label}: match {:?}", step.span)),
                    None => log::log(&format!("{label}: no match at {start}")),
                }
            }
        }
        result
    }

    /// Transform the produced value.
    fn map<U, F>(self, f: F) -> crate::combinator::Map<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Out) -> U,
    {
        crate::combinator::Map { p: self, f }
    }

    /// Transform with access to the tag buckets, the matched span, and the
    /// mutable application state.
    fn map_with<U, F>(self, f: F) -> crate::combinator::MapWith<Self, F>
    where
        Self: Sized,
        F: Fn(MapArgs<Self::Out, A>) -> U,
    {
        crate::combinator::MapWith { p: self, f }
    }

    /// On success, append the produced value to the named tag bucket.
    fn tag(self, name: &'static str) -> crate::combinator::Tag<Self>
    where
        Self: Sized,
        Self::Out: Into<A::Tag> + Clone,
    {
        crate::combinator::Tag { p: self, name }
    }

    /// Attach a display name for tracing and diagnostics.
    fn named(self, label: &'static str) -> crate::combinator::Named<Self>
    where
        Self: Sized,
    {
        crate::combinator::Named { p: self, label }
    }

    /// Erase the concrete type; required at grammar recursion points.
    fn boxed(self) -> BoxedParser<A, Self::Out>
    where
        Self: Sized + 'static,
    {
        BoxedParser { p: Rc::new(self) }
    }
}

trait DynParser<A: ParseState, T> {
    fn dyn_parse(&self, cx: &mut ParseCtx<A>) -> Option<Step<T, A::Tag>>;
    fn dyn_label(&self) -> Option<&str>;
}

impl<A: ParseState, P: Parser<A>> DynParser<A, P::Out> for P {
    fn dyn_parse(&self, cx: &mut ParseCtx<A>) -> Option<Step<P::Out, A::Tag>> {
        self.parse(cx)
    }
    fn dyn_label(&self) -> Option<&str> {
        self.label()
    }
}

/// A type-erased, reference-counted parser.
pub struct BoxedParser<A: ParseState, T> {
    p: Rc<dyn DynParser<A, T>>,
}

impl<A: ParseState, T> Clone for BoxedParser<A, T> {
    fn clone(&self) -> Self {
        Self { p: self.p.clone() }
    }
}

impl<A: ParseState, T> Parser<A> for BoxedParser<A, T> {
    type Out = T;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<T, A::Tag>> {
        self.p.dyn_parse(cx)
    }
    fn label(&self) -> Option<&str> {
        self.p.dyn_label()
    }
}
