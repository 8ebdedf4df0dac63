//! Maps character ranges in a derived text back to ranges in one or more
//! original sources. Maps compose: a map whose sources are another map's
//! destination can be merged through it.

use std::rc::Rc;

use crate::span::Span;

/// A named source text. Identity (the `Rc` allocation) is what ties a
/// [`SrcMapEntry`] source to another map's destination.
#[derive(Debug, PartialEq, Eq)]
pub struct SrcText {
    pub name: String,
    pub text: String,
}

impl SrcText {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            text: text.into(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct SrcMapEntry {
    pub src: Rc<SrcText>,
    pub src_span: Span,
    pub dest_span: Span,
}

/// A position projected back into an original source.
#[derive(Clone, Debug)]
pub struct SrcPosition {
    pub src: Rc<SrcText>,
    pub pos: usize,
}

/// An ordered list of entries, non-overlapping in the destination.
/// Entries are length preserving (`src` and `dest` spans have equal length)
/// unless an entry is explicitly a replacement.
#[derive(Clone, Debug)]
pub struct SrcMap {
    dest: Rc<SrcText>,
    entries: Vec<SrcMapEntry>,
}

impl SrcMap {
    pub fn new(dest: Rc<SrcText>) -> Self {
        Self {
            dest,
            entries: Vec::new(),
        }
    }

    /// A map covering the whole of `src` unchanged.
    pub fn identity(src: Rc<SrcText>) -> Self {
        let len = src.text.len();
        let mut map = Self::new(src.clone());
        map.add(src, Span::new(0..len), Span::new(0..len));
        map
    }

    pub fn dest(&self) -> &Rc<SrcText> {
        &self.dest
    }

    pub fn entries(&self) -> &[SrcMapEntry] {
        &self.entries
    }

    /// Append an entry. Entries must be added in destination order and must
    /// not overlap in the destination.
    pub fn add(&mut self, src: Rc<SrcText>, src_span: Span, dest_span: Span) {
        debug_assert!(self
            .entries
            .last()
            .map_or(true, |e| e.dest_span.end <= dest_span.start));
        self.entries.push(SrcMapEntry {
            src,
            src_span,
            dest_span,
        });
    }

    /// Project a destination position back to its original source, or `None`
    /// for positions in unmapped (replaced or synthesized) regions.
    pub fn map_position(&self, pos: usize) -> Option<SrcPosition> {
        let idx = self.entries.partition_point(|e| e.dest_span.end <= pos);
        let entry = self.entries.get(idx)?;
        if pos < entry.dest_span.start {
            return None;
        }
        Some(SrcPosition {
            src: entry.src.clone(),
            pos: entry.src_span.start + (pos - entry.dest_span.start),
        })
    }

    /// Project a destination span. The start's entry decides the source; the
    /// end is clamped to that entry.
    pub fn map_span(&self, span: &Span) -> Option<(Rc<SrcText>, Span)> {
        let idx = self.entries.partition_point(|e| e.dest_span.end <= span.start);
        let entry = self.entries.get(idx)?;
        if span.start < entry.dest_span.start {
            return None;
        }
        let start = entry.src_span.start + (span.start - entry.dest_span.start);
        let end = (start + span.len()).min(entry.src_span.end).max(start);
        Some((entry.src.clone(), Span::new(start..end)))
    }

    /// Reproject `outer` (a map whose sources may reference this map's
    /// destination) through `self`, producing a map from `outer`'s
    /// destination straight to the original sources.
    ///
    /// For every position `p` in `outer`'s destination,
    /// `self.merge(outer).map_position(p)` equals
    /// `self.map_position(outer.map_position(p))`.
    pub fn merge(&self, outer: &SrcMap) -> SrcMap {
        let mut merged = SrcMap::new(outer.dest.clone());
        for entry in &outer.entries {
            if !Rc::ptr_eq(&entry.src, &self.dest) {
                merged.entries.push(entry.clone());
                continue;
            }
            // split the outer entry across the inner entries it lands on
            let mut pos = entry.src_span.start;
            while pos < entry.src_span.end {
                let dest_at = entry.dest_span.start + (pos - entry.src_span.start);
                match self.inner_entry_at(pos) {
                    Some(inner) => {
                        let end = entry.src_span.end.min(inner.dest_span.end);
                        let src_start = inner.src_span.start + (pos - inner.dest_span.start);
                        merged.entries.push(SrcMapEntry {
                            src: inner.src.clone(),
                            src_span: Span::new(src_start..src_start + (end - pos)),
                            dest_span: Span::new(dest_at..dest_at + (end - pos)),
                        });
                        pos = end;
                    }
                    None => {
                        // unmapped gap in the inner map: skip to the next
                        // inner entry, leaving the gap unmapped in the merge
                        let next = self
                            .entries
                            .iter()
                            .map(|e| e.dest_span.start)
                            .find(|&s| s > pos)
                            .unwrap_or(entry.src_span.end);
                        pos = next.min(entry.src_span.end);
                    }
                }
            }
        }
        merged
    }

    fn inner_entry_at(&self, pos: usize) -> Option<&SrcMapEntry> {
        self.entries
            .iter()
            .find(|e| e.dest_span.start <= pos && pos < e.dest_span.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_round_trip() {
        let src = SrcText::new("a.wgsl", "fn main() {}");
        let map = SrcMap::identity(src.clone());
        for pos in 0..src.text.len() {
            let mapped = map.map_position(pos).unwrap();
            assert_eq!(
                mapped.src.text.as_bytes()[mapped.pos],
                map.dest().text.as_bytes()[pos]
            );
        }
    }

    #[test]
    fn unmapped_gap_is_none() {
        let src = SrcText::new("a", "abcdef");
        let dest = SrcText::new("derived", "abc   ");
        let mut map = SrcMap::new(dest);
        map.add(src, Span::new(0..3), Span::new(0..3));
        assert!(map.map_position(1).is_some());
        assert!(map.map_position(4).is_none());
    }

    #[test]
    fn merge_composes() {
        // original --(m1)--> mid --(m2)--> out
        let orig = SrcText::new("orig", "hello world");
        let mid = SrcText::new("mid", "hello      ");
        let mut m1 = SrcMap::new(mid.clone());
        m1.add(orig.clone(), Span::new(0..5), Span::new(0..5));

        let out = SrcText::new("out", "hello      ");
        let mut m2 = SrcMap::new(out);
        m2.add(mid.clone(), Span::new(0..11), Span::new(0..11));

        let merged = m1.merge(&m2);
        for pos in 0..11 {
            let two_step = m2
                .map_position(pos)
                .and_then(|p| m1.map_position(p.pos))
                .map(|p| p.pos);
            let one_step = merged.map_position(pos).map(|p| p.pos);
            assert_eq!(one_step, two_step, "at {pos}");
            if let Some(p) = merged.map_position(pos) {
                assert!(Rc::ptr_eq(&p.src, &orig));
            }
        }
    }
}
