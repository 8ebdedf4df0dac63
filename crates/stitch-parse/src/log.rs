//! The swappable log sink. Parse errors, resolution failures and (when
//! tracing) combinator entry/exit all go through [`log`]; callers rebind the
//! sink with [`with_sink`] or collect diagnostics with [`capture`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Sink = Rc<dyn Fn(&str)>;

thread_local! {
    static SINK: RefCell<Sink> = RefCell::new(Rc::new(|msg: &str| eprintln!("{msg}")));
    static TRACE: Cell<bool> = const { Cell::new(false) };
}

pub fn log(msg: &str) {
    let sink = SINK.with(|s| s.borrow().clone());
    sink(msg);
}

struct SinkGuard {
    prev: Sink,
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        SINK.with(|s| *s.borrow_mut() = self.prev.clone());
    }
}

/// Run `f` with `sink` installed as the log sink, restoring the previous
/// sink afterwards, including on unwind.
pub fn with_sink<R>(sink: impl Fn(&str) + 'static, f: impl FnOnce() -> R) -> R {
    let prev = SINK.with(|s| std::mem::replace(&mut *s.borrow_mut(), Rc::new(sink)));
    let _guard = SinkGuard { prev };
    f()
}

/// Run `f` with a collecting sink installed; returns `f`'s result and the
/// log lines it produced. Intended for tests.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<String>) {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink_lines = lines.clone();
    let result = with_sink(move |msg| sink_lines.borrow_mut().push(msg.to_string()), f);
    let lines = Rc::try_unwrap(lines).expect("capture sink still installed");
    (result, lines.into_inner())
}

pub fn trace_enabled() -> bool {
    TRACE.with(|t| t.get())
}

/// Set the combinator trace flag, returning the previous value. Tracing only
/// has an effect when the `trace` cargo feature is compiled in.
pub fn set_trace(on: bool) -> bool {
    TRACE.with(|t| t.replace(on))
}

struct TraceGuard {
    prev: bool,
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        set_trace(self.prev);
    }
}

/// Run `f` with tracing enabled, restoring the previous flag afterwards.
pub fn with_trace<R>(f: impl FnOnce() -> R) -> R {
    let _guard = TraceGuard {
        prev: set_trace(true),
    };
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_collects_in_order() {
        let ((), lines) = capture(|| {
            log("one");
            log("two");
        });
        assert_eq!(lines, ["one", "two"]);
    }

    #[test]
    fn sink_restored_after_scope() {
        let ((), outer) = capture(|| {
            log("a");
            let ((), inner) = capture(|| log("b"));
            assert_eq!(inner, ["b"]);
            log("c");
        });
        assert_eq!(outer, ["a", "c"]);
    }
}
