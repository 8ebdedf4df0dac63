use std::ops::Range;

use derive_more::derive::{AsMut, AsRef, Deref, DerefMut, From};

/// A half-open character interval `[start, end)` into a specific source
/// string. All diagnostic positions are spans.
#[derive(Default, Clone, Debug, PartialEq, Eq, Hash, Deref, DerefMut, AsRef, AsMut, From)]
pub struct Span(Range<usize>);

impl Span {
    pub fn new(range: Range<usize>) -> Self {
        Self(range)
    }
    /// An empty span anchored at `pos`.
    pub fn at(pos: usize) -> Self {
        Self(pos..pos)
    }
    pub fn range(&self) -> Range<usize> {
        self.0.clone()
    }
    /// The smallest span covering both `self` and `other`.
    pub fn extend(&self, other: &Span) -> Self {
        Self(self.start.min(other.start)..self.end.max(other.end))
    }
    pub fn len(&self) -> usize {
        self.end - self.start
    }
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
    /// Shift both ends by `offset`.
    pub fn offset(&self, offset: usize) -> Self {
        Self(self.start + offset..self.end + offset)
    }
}

impl From<Span> for Range<usize> {
    fn from(span: Span) -> Self {
        span.0
    }
}
