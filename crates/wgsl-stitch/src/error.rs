//! The umbrella error type and the renderable [`Diagnostic`] wrapper.
//!
//! Linking never fails hard on user input: errors become diagnostics that go
//! out through the log sink while the operation continues. `Diagnostic`
//! pairs an error with the source text and span needed to render a snippet.

use std::fmt::Display;
use std::rc::Rc;

use annotate_snippets::{Level, Renderer, Snippet};
use stitch_parse::{log, Span, SrcText};

use crate::condcomp::CondCompError;
use crate::import::ImportError;

#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] stitch_parse::ParseError),
    #[error("{0}")]
    CondComp(#[from] CondCompError),
    #[error("{0}")]
    Import(#[from] ImportError),
    #[error("reference not found: {0}")]
    RefNotFound(String),
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub error: Error,
    pub source: Option<Rc<SrcText>>,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(error: impl Into<Error>) -> Self {
        Self {
            error: error.into(),
            source: None,
            span: None,
        }
    }

    pub fn with_source(mut self, source: Rc<SrcText>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Render and send to the log sink.
    pub fn emit(self) {
        log::log(&self.to_string());
    }
}

impl std::error::Error for Diagnostic {}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let title = self.error.to_string();
        let mut msg = Level::Error.title(&title);

        if let (Some(source), Some(span)) = (&self.source, &self.span) {
            if span.end <= source.text.len() {
                let annot = Level::Error.span(span.range());
                let snip = Snippet::source(&source.text)
                    .origin(&source.name)
                    .fold(true)
                    .annotation(annot);
                msg = msg.snippet(snip);
            }
        }

        let renderer = Renderer::plain();
        let rendered = renderer.render(msg);
        write!(f, "{rendered}")
    }
}
