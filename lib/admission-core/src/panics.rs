//! Backtraces for panics caught by the dispatcher.
use std::{backtrace::Backtrace, cell::Cell, panic, sync::Once};

thread_local! {
    static LAST_PANIC_BACKTRACE: Cell<Option<Backtrace>> = const { Cell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// Installs a panic hook that records the backtrace of the panicking thread.
///
/// The previously installed hook still runs after the backtrace is recorded. Installing more than once has no effect.
///
/// Without this hook, handler panics are logged with the backtrace of the site that caught them rather than the site
/// that panicked. Call it early during process initialization.
pub fn set_panic_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            LAST_PANIC_BACKTRACE.with(|last| last.set(Some(Backtrace::force_capture())));
            previous(info);
        }));
    });
}

/// Takes the backtrace recorded by the most recent panic on this thread, if any.
pub(crate) fn take_panic_backtrace() -> Option<Backtrace> {
    LAST_PANIC_BACKTRACE.with(Cell::take)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn explode() {
        panic!("recorded");
    }

    #[test]
    fn records_backtrace_of_panicking_thread() {
        set_panic_hook();
        set_panic_hook();

        assert!(panic::catch_unwind(explode).is_err());
        let backtrace = take_panic_backtrace().expect("backtrace not recorded");
        assert!(backtrace.to_string().contains("explode"));

        // Taken once.
        assert!(take_panic_backtrace().is_none());
    }
}
