//! Conditional compilation: evaluates `#if expr` / `#else` / `#endif` lines
//! (with or without a leading `//` prefix) over a feature map before the
//! grammar runs. Disabled regions and the directive lines themselves are
//! replaced by spaces so every surviving character keeps its position, and a
//! source map records the surviving regions.

use std::collections::HashMap;
use std::rc::Rc;

use stitch_parse::log;
use stitch_parse::srcline::caret_excerpt;
use stitch_parse::{Span, SrcMap, SrcText};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CondCompError {
    #[error("invalid condition expression `{0}`")]
    InvalidExpression(String),
    #[error("`#else` without a matching `#if`")]
    UnexpectedElse,
    #[error("`#endif` without a matching `#if`")]
    UnexpectedEndif,
    #[error("`#if` without a matching `#endif`")]
    UnterminatedIf,
}

pub type Features = HashMap<String, bool>;

/// The preprocessor output: a same-length derived text plus the map back to
/// the original source.
#[derive(Debug)]
pub struct Prepped {
    pub text: Rc<SrcText>,
    pub src_map: SrcMap,
}

struct IfFrame {
    parent_active: bool,
    active: bool,
    seen_else: bool,
}

enum Directive {
    If(String),
    Else,
    Endif,
}

/// A directive line is `#if expr`, `#else` or `#endif`, optionally behind a
/// line-comment prefix.
fn directive(line: &str) -> Option<Directive> {
    let trimmed = line.trim_start();
    let trimmed = trimmed.strip_prefix("//").map(str::trim_start).unwrap_or(trimmed);
    if let Some(rest) = trimmed.strip_prefix("#if") {
        if rest.starts_with(char::is_whitespace) {
            return Some(Directive::If(rest.trim().to_string()));
        }
    }
    if trimmed.trim_end() == "#else" {
        return Some(Directive::Else);
    }
    if trimmed.trim_end() == "#endif" {
        return Some(Directive::Endif);
    }
    None
}

/// Evaluate a condition term: a bare feature name, `!name`, `true` or
/// `false`. Unknown features read as false.
fn eval_term(expr: &str, features: &Features) -> Result<bool, CondCompError> {
    let expr = expr.trim();
    if let Some(negated) = expr.strip_prefix('!') {
        return eval_term(negated, features).map(|v| !v);
    }
    match expr {
        "true" => Ok(true),
        "false" => Ok(false),
        name if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') => {
            Ok(features.get(name).copied().unwrap_or(false))
        }
        _ => Err(CondCompError::InvalidExpression(expr.to_string())),
    }
}

fn blank(line: &str, out: &mut String) {
    // per byte, so positions are preserved even through multibyte content
    out.extend(line.bytes().map(|b| match b {
        b'\n' => '\n',
        b'\r' => '\r',
        _ => ' ',
    }));
}

/// Run the preprocessor over `src`. Errors are logged with a caret excerpt
/// and recovered from; the output always covers the full source length.
pub fn run(src: &Rc<SrcText>, features: &Features) -> Prepped {
    let mut out = String::with_capacity(src.text.len());
    let mut stack: Vec<IfFrame> = Vec::new();
    let mut pos = 0;

    for line in split_lines(&src.text) {
        let active = stack.last().map_or(true, |f| f.parent_active && f.active);
        match directive(line) {
            Some(Directive::If(expr)) => {
                let value = eval_term(&expr, features).unwrap_or_else(|e| {
                    log::log(&caret_excerpt(&e.to_string(), &src.text, pos));
                    false
                });
                stack.push(IfFrame {
                    parent_active: active,
                    active: value,
                    seen_else: false,
                });
                blank(line, &mut out);
            }
            Some(Directive::Else) => {
                match stack.last_mut() {
                    Some(frame) if !frame.seen_else => {
                        frame.seen_else = true;
                        frame.active = !frame.active;
                    }
                    _ => log::log(&caret_excerpt(
                        &CondCompError::UnexpectedElse.to_string(),
                        &src.text,
                        pos,
                    )),
                }
                blank(line, &mut out);
            }
            Some(Directive::Endif) => {
                if stack.pop().is_none() {
                    log::log(&caret_excerpt(
                        &CondCompError::UnexpectedEndif.to_string(),
                        &src.text,
                        pos,
                    ));
                }
                blank(line, &mut out);
            }
            None if active => out.push_str(line),
            None => blank(line, &mut out),
        }
        pos += line.len();
    }
    if !stack.is_empty() {
        log::log(&caret_excerpt(
            &CondCompError::UnterminatedIf.to_string(),
            &src.text,
            src.text.len(),
        ));
    }
    debug_assert_eq!(out.len(), src.text.len());

    let prepped = SrcText::new(format!("{}!prepped", src.name), out);
    let src_map = surviving_regions(src, &prepped);
    Prepped {
        text: prepped,
        src_map,
    }
}

/// Lines including their terminators, so positions are preserved exactly.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let end = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
        let (line, tail) = rest.split_at(end);
        rest = tail;
        Some(line)
    })
}

/// Identity entries over the maximal runs where the derived text still
/// equals the source, so every mapped position round-trips to an equal
/// character.
fn surviving_regions(src: &Rc<SrcText>, prepped: &Rc<SrcText>) -> SrcMap {
    let mut map = SrcMap::new(prepped.clone());
    let mut run_start: Option<usize> = None;
    let bytes_src = src.text.as_bytes();
    let bytes_out = prepped.text.as_bytes();
    for i in 0..=bytes_src.len() {
        let same = i < bytes_src.len() && bytes_src[i] == bytes_out[i];
        match (run_start, same) {
            (None, true) => run_start = Some(i),
            (Some(start), false) => {
                map.add(src.clone(), Span::new(start..i), Span::new(start..i));
                run_start = None;
            }
            _ => {}
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pairs: &[(&str, bool)]) -> Features {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn disabled_region_blanks_and_keeps_lines() {
        let src = SrcText::new("m", "#if foo\nfn f(){}\n#endif\n");
        let prepped = run(&src, &features(&[("foo", false)]));
        assert_eq!(prepped.text.text.len(), src.text.len());
        assert_eq!(prepped.text.text.matches('\n').count(), 3);
        assert!(prepped.text.text.trim().is_empty());
    }

    #[test]
    fn enabled_region_survives_with_mapping() {
        let src = SrcText::new("m", "#if foo\nfn f(){}\n#endif\n");
        let prepped = run(&src, &features(&[("foo", true)]));
        assert!(prepped.text.text.contains("fn f(){}"));
        let pos = prepped.text.text.find("fn").unwrap();
        let mapped = prepped.src_map.map_position(pos).unwrap();
        assert_eq!(mapped.pos, pos);
        assert_eq!(&mapped.src.text[mapped.pos..mapped.pos + 2], "fn");
    }

    #[test]
    fn else_flips_and_nesting_works() {
        let src = SrcText::new(
            "m",
            "#if a\nA\n#else\n#if b\nB\n#endif\nC\n#endif\n",
        );
        let prepped = run(&src, &features(&[("a", false), ("b", true)]));
        let text = &prepped.text.text;
        assert!(!text.contains('A'));
        assert!(text.contains('B'));
        assert!(text.contains('C'));
    }

    #[test]
    fn negation_and_comment_prefix() {
        let src = SrcText::new("m", "// #if !hidden\nkeep\n// #endif\n");
        let prepped = run(&src, &features(&[]));
        assert!(prepped.text.text.contains("keep"));
    }

    #[test]
    fn unbalanced_directives_log() {
        let src = SrcText::new("m", "#endif\n#if foo\n");
        let ((), lines) = log::capture(|| {
            run(&src, &features(&[]));
        });
        assert!(lines.iter().any(|l| l.contains("`#endif` without")));
        assert!(lines.iter().any(|l| l.contains("`#if` without")));
    }
}
