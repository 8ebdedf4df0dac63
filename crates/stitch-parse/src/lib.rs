//! Combinator parsing over swappable regex lexers.
//!
//! The pieces, bottom up:
//!
//! * [`TokenMatcher`]: an ordered set of named patterns compiled into one
//!   combined regex; first alternative wins.
//! * [`Lexer`]: a cursor over a source string with an ignore set and a
//!   stack of scoped matcher frames.
//! * [`Parser`] and the [`combinator`] vocabulary: backtracking parsers with
//!   tagged result collection, a cooperative parse budget, and optional
//!   entry/exit tracing (`trace` feature).
//! * [`SrcMap`]: projects positions in derived text back to the original
//!   sources; maps compose through [`SrcMap::merge`].
//! * [`log`]: the swappable diagnostic sink everything reports through.
//!
//! # Example
//!
//! ```rust
//! use stitch_parse::combinator::{kind, seq};
//! use stitch_parse::{ParseCtx, Parser, TokenMatcher};
//!
//! let matcher = TokenMatcher::new(&[
//!     ("ident", r"[a-zA-Z_]\w*"),
//!     ("ws", r"\s+"),
//!     ("symbol", r"[(){};,]"),
//! ])
//! .unwrap();
//! let mut app = ();
//! let mut cx = ParseCtx::new("fn foo()", matcher, &["ws"], &mut app);
//! let step = seq(("fn", kind("ident"), "(", ")")).parse(&mut cx).unwrap();
//! assert_eq!(step.value.1.text, "foo");
//! ```
//!
//! Grammars must not be left recursive; rewrite rules so every recursive
//! path consumes at least one token first.

pub mod combinator;
pub mod error;
pub mod lexer;
pub mod log;
pub mod parser;
pub mod span;
pub mod srcline;
pub mod srcmap;
pub mod token;

pub use error::ParseError;
pub use lexer::Lexer;
pub use parser::{BoxedParser, MapArgs, ParseCtx, ParseState, Parser, Step, Tags};
pub use span::Span;
pub use srcmap::{SrcMap, SrcMapEntry, SrcPosition, SrcText};
pub use token::{match_one_of, Token, TokenMatcher, UNKNOWN};
