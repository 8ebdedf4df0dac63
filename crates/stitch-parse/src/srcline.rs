//! Source-line lookup and caret excerpts for diagnostics.
//!
//! Line-start positions are memoized per source so repeated lookups cost a
//! binary search after the first scan. Sources are keyed by identity (pointer
//! and length); they must stay unmoved for the duration of a parse, which the
//! borrow on the lexer already guarantees.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::log;
use crate::srcmap::SrcMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SrcLine<'s> {
    pub line: &'s str,
    /// 1-based line number.
    pub line_num: usize,
    /// Byte offset of the position within the line.
    pub line_pos: usize,
}

thread_local! {
    static LINE_STARTS: RefCell<HashMap<(usize, usize), Rc<Vec<usize>>>> =
        RefCell::new(HashMap::new());
}

fn line_starts(src: &str) -> Rc<Vec<usize>> {
    let key = (src.as_ptr() as usize, src.len());
    LINE_STARTS.with(|cache| {
        cache
            .borrow_mut()
            .entry(key)
            .or_insert_with(|| {
                let mut starts = vec![0];
                starts.extend(src.char_indices().filter_map(|(i, c)| (c == '\n').then_some(i + 1)));
                Rc::new(starts)
            })
            .clone()
    })
}

/// The line containing `pos`, with its 1-based number and the offset of
/// `pos` within it. `pos` may equal `src.len()`.
pub fn line_at(src: &str, pos: usize) -> SrcLine<'_> {
    let pos = pos.min(src.len());
    let starts = line_starts(src);
    let idx = starts.partition_point(|&s| s <= pos) - 1;
    let start = starts[idx];
    let end = starts
        .get(idx + 1)
        .map(|&next| next - 1)
        .unwrap_or(src.len());
    SrcLine {
        line: &src[start..end.max(start)],
        line_num: idx + 1,
        line_pos: pos - start,
    }
}

/// `msg`, the offending line, and a caret aligned under the position.
pub fn caret_excerpt(msg: &str, src: &str, pos: usize) -> String {
    let at = line_at(src, pos);
    format!(
        "{msg} at line {}\n{}\n{}^",
        at.line_num,
        at.line,
        " ".repeat(at.line_pos)
    )
}

/// Log a caret-annotated diagnostic. When `src_map` is given and maps `pos`,
/// the excerpt is taken from the original source instead of `src`.
pub fn report_error(msg: &str, src: &str, pos: usize, src_map: Option<&SrcMap>) {
    let excerpt = match src_map.and_then(|m| m.map_position(pos)) {
        Some(mapped) => caret_excerpt(msg, &mapped.src.text, mapped.pos),
        None => caret_excerpt(msg, src, pos),
    };
    log::log(&excerpt);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_and_later_lines() {
        let src = "one\ntwo\nthree";
        assert_eq!(
            line_at(src, 0),
            SrcLine { line: "one", line_num: 1, line_pos: 0 }
        );
        assert_eq!(
            line_at(src, 5),
            SrcLine { line: "two", line_num: 2, line_pos: 1 }
        );
        assert_eq!(
            line_at(src, src.len()),
            SrcLine { line: "three", line_num: 3, line_pos: 5 }
        );
    }

    #[test]
    fn caret_alignment() {
        let out = caret_excerpt("expected text ';'", "fn f()", 3);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[1], "fn f()");
        assert_eq!(lines[2], "   ^");
    }
}
