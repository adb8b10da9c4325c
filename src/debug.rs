//! Flagged debug logging through a process-global sink.
//!
//! Subsystems tag their messages with a short flag string (`"wd"` for
//! window damage, `"rb"` for render buffer operations, `"hk"` for hook
//! dispatch, `"tm"` for the terminal driver) so a sink can filter
//! without parsing message text. No sink is installed by default and
//! logging is a no-op until one is set.

use std::sync::{Mutex, OnceLock};

type LogSink = Box<dyn Fn(&str, &str) + Send + Sync + 'static>;

fn log_sink() -> &'static Mutex<Option<LogSink>> {
    static SINK: OnceLock<Mutex<Option<LogSink>>> = OnceLock::new();
    SINK.get_or_init(|| Mutex::new(None))
}

/// Install the global log sink, replacing any previous one.
pub fn set_log_sink<F>(sink: F)
where
    F: Fn(&str, &str) + Send + Sync + 'static,
{
    let mut guard = log_sink().lock().expect("log sink lock");
    *guard = Some(Box::new(sink));
}

/// Remove the global log sink.
pub fn clear_log_sink() {
    let mut guard = log_sink().lock().expect("log sink lock");
    *guard = None;
}

/// Check whether a sink is installed.
///
/// Callers building expensive messages should gate on this first.
#[must_use]
pub fn log_enabled() -> bool {
    log_sink().lock().is_ok_and(|g| g.is_some())
}

/// Emit a flagged debug message to the sink, if any.
pub fn debug_log(flag: &str, message: &str) {
    if let Ok(guard) = log_sink().lock() {
        if let Some(sink) = guard.as_ref() {
            sink(flag, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_log_sink_receives_flagged_messages() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        // The sink is process-global and other tests may log
        // concurrently; count only this test's own flag.
        set_log_sink(move |flag, msg| {
            if flag == "sink-probe" {
                assert_eq!(msg, "expose 1,2+3x4");
                count_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(log_enabled());

        debug_log("sink-probe", "expose 1,2+3x4");
        assert_eq!(count.load(Ordering::SeqCst), 1);

        clear_log_sink();
        debug_log("sink-probe", "expose 1,2+3x4");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
