//! The combinator vocabulary: sequencing, alternation, repetition, recovery,
//! and the scoped lexer/pre-parser wrappers.

use std::rc::Rc;

use crate::parser::{ErasedParser, MapArgs, ParseCtx, ParseState, Parser, Step, Tags};
use crate::span::Span;
use crate::token::{Token, TokenMatcher};

/// Match a token whose text equals the given string.
pub struct Text {
    text: &'static str,
    label: String,
}

pub fn text(t: &'static str) -> Text {
    Text {
        text: t,
        label: format!("text '{t}'"),
    }
}

impl<A: ParseState> Parser<A> for Text {
    type Out = Token;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Token, A::Tag>> {
        let tok = cx.next_token()?;
        (tok.text == self.text).then(|| {
            let span = tok.span.clone();
            Step::new(tok, span)
        })
    }
    fn label(&self) -> Option<&str> {
        Some(&self.label)
    }
}

/// Bare string literals parse as [`text`].
impl<A: ParseState> Parser<A> for &'static str {
    type Out = Token;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Token, A::Tag>> {
        let tok = cx.next_token()?;
        (tok.text == *self).then(|| {
            let span = tok.span.clone();
            Step::new(tok, span)
        })
    }
}

/// Match a token of the given kind.
pub struct Kind {
    kind: &'static str,
    label: String,
}

pub fn kind(k: &'static str) -> Kind {
    Kind {
        kind: k,
        label: format!("kind '{k}'"),
    }
}

impl<A: ParseState> Parser<A> for Kind {
    type Out = Token;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Token, A::Tag>> {
        let tok = cx.next_token()?;
        (tok.kind == self.kind).then(|| {
            let span = tok.span.clone();
            Step::new(tok, span)
        })
    }
    fn label(&self) -> Option<&str> {
        Some(&self.label)
    }
}

/// Match every sub-parser in order; the value is the tuple of sub-values and
/// tag buckets merge in source order.
pub struct Seq<T>(pub T);

pub fn seq<T>(parsers: T) -> Seq<T> {
    Seq(parsers)
}

macro_rules! seq_impl {
    ($($P:ident : $idx:tt),+) => {
        #[allow(non_snake_case)]
        impl<A: ParseState, $($P: Parser<A>),+> Parser<A> for Seq<($($P,)+)> {
            type Out = ($($P::Out,)+);
            fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
                let mut tags = Tags::new();
                let mut span: Option<Span> = None;
                $(
                    let step = (self.0).$idx.parse(cx)?;
                    span = Some(match span.take() {
                        Some(s) => s.extend(&step.span),
                        None => step.span.clone(),
                    });
                    tags.merge(step.tags);
                    let $P = step.value;
                )+
                Some(Step {
                    value: ($($P,)+),
                    tags,
                    span: span.unwrap_or_default(),
                })
            }
        }
    };
}

seq_impl!(P1: 0);
seq_impl!(P1: 0, P2: 1);
seq_impl!(P1: 0, P2: 1, P3: 2);
seq_impl!(P1: 0, P2: 1, P3: 2, P4: 3);
seq_impl!(P1: 0, P2: 1, P3: 2, P4: 3, P5: 4);
seq_impl!(P1: 0, P2: 1, P3: 2, P4: 3, P5: 4, P6: 5);
seq_impl!(P1: 0, P2: 1, P3: 2, P4: 3, P5: 4, P6: 5, P7: 6);
seq_impl!(P1: 0, P2: 1, P3: 2, P4: 3, P5: 4, P6: 5, P7: 6, P8: 7);
seq_impl!(P1: 0, P2: 1, P3: 2, P4: 3, P5: 4, P6: 5, P7: 6, P8: 7, P9: 8);

/// Try each alternative in order; first success wins, the lexer backtracking
/// between attempts. There is no longest-match selection.
pub struct Or<T>(pub T);

pub fn or<T>(parsers: T) -> Or<T> {
    Or(parsers)
}

macro_rules! or_impl {
    ($($P:ident : $idx:tt),+) => {
        impl<A: ParseState, O, $($P: Parser<A, Out = O>),+> Parser<A> for Or<($($P,)+)> {
            type Out = O;
            fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<O, A::Tag>> {
                $(
                    if let Some(step) = (self.0).$idx.parse(cx) {
                        return Some(step);
                    }
                    if cx.is_fatal() {
                        return None;
                    }
                )+
                None
            }
        }
    };
}

or_impl!(P1: 0, P2: 1);
or_impl!(P1: 0, P2: 1, P3: 2);
or_impl!(P1: 0, P2: 1, P3: 2, P4: 3);
or_impl!(P1: 0, P2: 1, P3: 2, P4: 3, P5: 4);
or_impl!(P1: 0, P2: 1, P3: 2, P4: 3, P5: 4, P6: 5);
or_impl!(P1: 0, P2: 1, P3: 2, P4: 3, P5: 4, P6: 5, P7: 6);
or_impl!(P1: 0, P2: 1, P3: 2, P4: 3, P5: 4, P6: 5, P7: 6, P8: 7);
or_impl!(P1: 0, P2: 1, P3: 2, P4: 3, P5: 4, P6: 5, P7: 6, P8: 7, P9: 8);
or_impl!(P1: 0, P2: 1, P3: 2, P4: 3, P5: 4, P6: 5, P7: 6, P8: 7, P9: 8, P10: 9);
or_impl!(P1: 0, P2: 1, P3: 2, P4: 3, P5: 4, P6: 5, P7: 6, P8: 7, P9: 8, P10: 9, P11: 10);

/// Always succeed; `None` value and no advance when the sub-parser fails.
pub struct Opt<P>(P);

pub fn opt<P>(p: P) -> Opt<P> {
    Opt(p)
}

impl<A: ParseState, P: Parser<A>> Parser<A> for Opt<P> {
    type Out = Option<P::Out>;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        match self.0.parse(cx) {
            Some(step) => Some(Step {
                value: Some(step.value),
                tags: step.tags,
                span: step.span,
            }),
            None if cx.is_fatal() => None,
            None => Some(Step::new(None, Span::at(cx.lexer.position()))),
        }
    }
}

/// Zero-or-more (`repeat`) / one-or-more (`repeat_plus`) matches of the
/// sub-parser; stops at the first failure without consuming past it.
pub struct Repeat<P> {
    p: P,
    min: usize,
}

pub fn repeat<P>(p: P) -> Repeat<P> {
    Repeat { p, min: 0 }
}

pub fn repeat_plus<P>(p: P) -> Repeat<P> {
    Repeat { p, min: 1 }
}

impl<A: ParseState, P: Parser<A>> Parser<A> for Repeat<P> {
    type Out = Vec<P::Out>;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        let mut values = Vec::new();
        let mut tags = Tags::new();
        let mut span = Span::at(cx.lexer.position());
        loop {
            let before = cx.lexer.position();
            match self.p.parse(cx) {
                Some(step) => {
                    span = span.extend(&step.span);
                    tags.merge(step.tags);
                    values.push(step.value);
                    // an empty match would repeat forever
                    if cx.lexer.position() == before {
                        break;
                    }
                }
                None if cx.is_fatal() => return None,
                None => break,
            }
        }
        (values.len() >= self.min).then_some(Step { value: values, tags, span })
    }
}

/// On sub-parser failure, log an `expected …` diagnostic at the failure
/// position and continue as a success with a `None` value, letting the
/// enclosing grammar resynchronize.
pub struct Req<P> {
    p: P,
    msg: Option<&'static str>,
}

pub fn req<P>(p: P) -> Req<P> {
    Req { p, msg: None }
}

pub fn req_msg<P>(p: P, msg: &'static str) -> Req<P> {
    Req { p, msg: Some(msg) }
}

impl<A: ParseState, P: Parser<A>> Parser<A> for Req<P> {
    type Out = Option<P::Out>;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        match self.p.parse(cx) {
            Some(step) => Some(Step {
                value: Some(step.value),
                tags: step.tags,
                span: step.span,
            }),
            None if cx.is_fatal() => None,
            None => {
                let pos = cx.peek_span().start;
                let what: &str = match self.msg {
                    Some(msg) => msg,
                    None => self.p.label().unwrap_or("more input"),
                };
                cx.report(&format!("expected {what}"), pos);
                Some(Step::new(None, Span::at(cx.lexer.position())))
            }
        }
    }
}

/// `p (sep p)*` with an optional trailing separator; zero matches succeed
/// with an empty list.
pub struct WithSep<S, P> {
    sep: S,
    p: P,
}

pub fn with_sep<S, P>(sep: S, p: P) -> WithSep<S, P> {
    WithSep { sep, p }
}

impl<A: ParseState, S: Parser<A>, P: Parser<A>> Parser<A> for WithSep<S, P> {
    type Out = Vec<P::Out>;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        let mut values = Vec::new();
        let mut tags = Tags::new();
        let mut span = Span::at(cx.lexer.position());
        match self.p.parse(cx) {
            Some(step) => {
                span = span.extend(&step.span);
                tags.merge(step.tags);
                values.push(step.value);
            }
            None if cx.is_fatal() => return None,
            None => return Some(Step { value: values, tags, span }),
        }
        loop {
            match self.sep.parse(cx) {
                Some(sep_step) => {
                    if cx.is_fatal() {
                        return None;
                    }
                    match self.p.parse(cx) {
                        Some(step) => {
                            span = span.extend(&step.span);
                            tags.merge(step.tags);
                            values.push(step.value);
                        }
                        None if cx.is_fatal() => return None,
                        // trailing separator
                        None => {
                            span = span.extend(&sep_step.span);
                            break;
                        }
                    }
                }
                None if cx.is_fatal() => return None,
                None => break,
            }
        }
        Some(Step { value: values, tags, span })
    }
}

/// Consume any single token.
pub struct Any;

pub fn any() -> Any {
    Any
}

impl<A: ParseState> Parser<A> for Any {
    type Out = Token;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Token, A::Tag>> {
        let tok = cx.next_token()?;
        let span = tok.span.clone();
        Some(Step::new(tok, span))
    }
}

/// Consume one token unless the sub-parser would match here.
pub struct AnyNot<P>(P);

pub fn any_not<P>(p: P) -> AnyNot<P> {
    AnyNot(p)
}

impl<A: ParseState, P: Parser<A>> Parser<A> for AnyNot<P> {
    type Out = Token;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Token, A::Tag>> {
        let start = cx.lexer.position();
        if self.0.parse(cx).is_some() {
            cx.lexer.set_position(start);
            return None;
        }
        if cx.is_fatal() {
            return None;
        }
        let tok = cx.next_token()?;
        let span = tok.span.clone();
        Some(Step::new(tok, span))
    }
}

/// Consume tokens until (and including) the sub-parser matches; the result
/// is the sub-parser's.
pub struct AnyThrough<P>(P);

pub fn any_through<P>(p: P) -> AnyThrough<P> {
    AnyThrough(p)
}

impl<A: ParseState, P: Parser<A>> Parser<A> for AnyThrough<P> {
    type Out = P::Out;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        let start = cx.lexer.position();
        loop {
            if let Some(step) = self.0.parse(cx) {
                return Some(Step {
                    value: step.value,
                    tags: step.tags,
                    span: Span::new(start..start.max(step.span.end)),
                });
            }
            if cx.is_fatal() {
                return None;
            }
            cx.next_token()?;
        }
    }
}

/// Run the sub-parser with a different token matcher active (scoped through
/// the lexer frame stack).
pub struct TokensWith<P> {
    matcher: TokenMatcher,
    p: P,
}

pub fn tokens<P>(matcher: TokenMatcher, p: P) -> TokensWith<P> {
    TokensWith { matcher, p }
}

impl<A: ParseState, P: Parser<A>> Parser<A> for TokensWith<P> {
    type Out = P::Out;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        cx.with_matcher(self.matcher.clone(), |cx| self.p.parse(cx))
    }
}

/// Run the sub-parser with a different ignore set.
pub struct IgnoreWith<P> {
    ignore: &'static [&'static str],
    p: P,
}

pub fn with_ignore<P>(ignore: &'static [&'static str], p: P) -> IgnoreWith<P> {
    IgnoreWith { ignore, p }
}

impl<A: ParseState, P: Parser<A>> Parser<A> for IgnoreWith<P> {
    type Out = P::Out;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        cx.with_ignore(self.ignore, |cx| self.p.parse(cx))
    }
}

/// While the sub-parser runs, attempt `skip` before every primitive token
/// consumption (comment skipping).
pub struct PreParse<A: ParseState, P> {
    skip: Rc<dyn ErasedParser<A>>,
    p: P,
}

pub fn pre_parse<A, S, P>(skip: S, p: P) -> PreParse<A, P>
where
    A: ParseState,
    S: Parser<A> + 'static,
{
    PreParse {
        skip: Rc::new(skip),
        p,
    }
}

impl<A: ParseState, P: Parser<A>> Parser<A> for PreParse<A, P> {
    type Out = P::Out;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        cx.with_pre(self.skip.clone(), |cx| self.p.parse(cx))
    }
}

/// Suppress any active pre-parsers within the sub-parser (so block comment
/// bodies match their own content literally).
pub struct DisablePreParse<P>(P);

pub fn disable_pre_parse<P>(p: P) -> DisablePreParse<P> {
    DisablePreParse(p)
}

impl<A: ParseState, P: Parser<A>> Parser<A> for DisablePreParse<P> {
    type Out = P::Out;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        cx.without_pre(|cx| self.0.parse(cx))
    }
}

/// Defer construction of a parser; required at grammar recursion points.
pub struct Lazy<P>(fn() -> P);

pub fn lazy<P>(f: fn() -> P) -> Lazy<P> {
    Lazy(f)
}

impl<A: ParseState, P: Parser<A>> Parser<A> for Lazy<P> {
    type Out = P::Out;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        (self.0)().parse(cx)
    }
}

pub struct Map<P, F> {
    pub(crate) p: P,
    pub(crate) f: F,
}

impl<A: ParseState, P: Parser<A>, U, F: Fn(P::Out) -> U> Parser<A> for Map<P, F> {
    type Out = U;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<U, A::Tag>> {
        let step = self.p.parse(cx)?;
        Some(Step {
            value: (self.f)(step.value),
            tags: step.tags,
            span: step.span,
        })
    }
    fn label(&self) -> Option<&str> {
        self.p.label()
    }
}

pub struct MapWith<P, F> {
    pub(crate) p: P,
    pub(crate) f: F,
}

impl<A: ParseState, P: Parser<A>, U, F> Parser<A> for MapWith<P, F>
where
    F: Fn(MapArgs<P::Out, A>) -> U,
{
    type Out = U;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<U, A::Tag>> {
        let step = self.p.parse(cx)?;
        let value = (self.f)(MapArgs {
            value: step.value,
            tags: &step.tags,
            span: step.span.clone(),
            state: cx.app,
        });
        Some(Step {
            value,
            tags: step.tags,
            span: step.span,
        })
    }
    fn label(&self) -> Option<&str> {
        self.p.label()
    }
}

pub struct Tag<P> {
    pub(crate) p: P,
    pub(crate) name: &'static str,
}

impl<A: ParseState, P: Parser<A>> Parser<A> for Tag<P>
where
    P::Out: Into<A::Tag> + Clone,
{
    type Out = P::Out;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        let mut step = self.p.parse(cx)?;
        step.tags.add(self.name, step.value.clone().into());
        Some(step)
    }
    fn label(&self) -> Option<&str> {
        self.p.label()
    }
}

pub struct Named<P> {
    pub(crate) p: P,
    pub(crate) label: &'static str,
}

impl<A: ParseState, P: Parser<A>> Parser<A> for Named<P> {
    type Out = P::Out;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Self::Out, A::Tag>> {
        self.p.parse(cx)
    }
    fn label(&self) -> Option<&str> {
        Some(self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log;
    use crate::token::match_one_of;

    fn matcher() -> TokenMatcher {
        TokenMatcher::new(&[
            ("ident", r"[a-zA-Z_]\w*"),
            ("digits", r"\d+"),
            ("ws", r"\s+"),
            ("symbol", &match_one_of("( ) [ ] { } @ ; , =")),
        ])
        .unwrap()
    }

    fn cx<'s, 'a>(src: &'s str, app: &'a mut ()) -> ParseCtx<'s, 'a, ()> {
        ParseCtx::new(src, matcher(), &["ws"], app)
    }

    #[test]
    fn seq_matches_fn_signature() {
        // tokens and grammar from the engine's canonical smoke scenario
        let src = "fn foo()";
        let mut app = ();
        let mut cx = cx(src, &mut app);
        let p = seq(("fn", kind("ident"), "(", ")"));
        let step = p.parse(&mut cx).expect("must match");
        assert_eq!(step.value.1.text, "foo");
        assert_eq!(cx.lexer.position(), src.len());
    }

    #[test]
    fn or_backtracks_on_failure() {
        let src = "a c";
        let mut app = ();
        let mut cx = cx(src, &mut app);
        let before = cx.lexer.position();
        let p = or((seq(("a", "b")), seq(("a", "c"))));
        assert!(p.parse(&mut cx).is_some());

        // a failing or() leaves the position untouched
        let mut app = ();
        let mut cx = self::cx(src, &mut app);
        let p = or((seq(("a", "b")), seq(("a", "d"))));
        assert!(p.parse(&mut cx).is_none());
        assert_eq!(cx.lexer.position(), before);
    }

    #[test]
    fn opt_succeeds_without_advancing() {
        let mut app = ();
        let mut cx = cx("x", &mut app);
        let step = opt("y").parse(&mut cx).unwrap();
        assert!(step.value.is_none());
        assert_eq!(cx.lexer.position(), 0);
    }

    #[test]
    fn tags_bubble_through_nesting() {
        let mut app = ();
        let mut cx = cx("a b c ;", &mut app);
        let p = seq((repeat(kind("ident").tag("names")), ";"));
        let step = p.parse(&mut cx).unwrap();
        let names: Vec<_> = step.tags.get("names").iter().map(|t| t.text.clone()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn req_logs_and_recovers() {
        let mut app = ();
        let ((), lines) = log::capture(|| {
            let mut cx = cx("fn foo)", &mut app);
            let p = seq(("fn", kind("ident"), req(text("(")), req(text(")"))));
            let step = p.parse(&mut cx).expect("req recovers");
            assert!(step.value.2.is_none());
        });
        assert!(lines[0].contains("expected text '('"), "{lines:?}");
    }

    #[test]
    fn with_sep_allows_trailing_separator() {
        let mut app = ();
        let mut cx = cx("a, b, c,", &mut app);
        let step = with_sep(text(","), kind("ident")).parse(&mut cx).unwrap();
        assert_eq!(step.value.len(), 3);
        assert_eq!(cx.lexer.position(), 8);
    }

    #[test]
    fn any_through_consumes_to_target() {
        let mut app = ();
        let mut cx = cx("junk more ; after", &mut app);
        let step = any_through(text(";")).parse(&mut cx).unwrap();
        assert_eq!(step.value.text, ";");
        assert_eq!(cx.lexer.peek().unwrap().text, "after");
    }

    #[test]
    fn budget_exhaustion_is_fatal() {
        let mut app = ();
        let ((), lines) = log::capture(|| {
            let mut cx =
                ParseCtx::new("a a a a a a a a", matcher(), &["ws"], &mut app)
                    .with_max_parse_count(3);
            let p = repeat(text("a"));
            assert!(p.parse(&mut cx).is_none());
            assert!(cx.is_fatal());
        });
        assert!(lines.iter().any(|l| l.contains("parse budget exceeded")));
    }

    #[test]
    fn pre_parse_skips_before_tokens() {
        let mut app = ();
        let mut cx = cx("a @ b @ c", &mut app);
        let p = pre_parse(text("@"), repeat(kind("ident").tag("ids")));
        let step = p.parse(&mut cx).unwrap();
        assert_eq!(step.value.len(), 3);
    }

    #[test]
    fn disable_pre_parse_suppresses_skipping() {
        let mut app = ();
        let mut cx = cx("a @ b", &mut app);
        let p = pre_parse(
            text("@"),
            seq((kind("ident"), disable_pre_parse(any()))),
        );
        let step = p.parse(&mut cx).unwrap();
        assert_eq!(step.value.1.text, "@");
    }

    #[test]
    fn scoped_matcher_in_parse() {
        let digits = TokenMatcher::new(&[("digits", r"\d+"), ("ws", r"\s+")]).unwrap();
        let mut app = ();
        let mut cx = cx("a 1 2 b", &mut app);
        let p = seq((
            kind("ident"),
            tokens(digits, repeat(kind("digits"))),
            kind("ident"),
        ));
        let step = p.parse(&mut cx).unwrap();
        assert_eq!(step.value.1.len(), 2);
        assert_eq!(step.value.2.text, "b");
    }
}
