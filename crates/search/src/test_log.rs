//! In-process `log` sink for asserting on what scoring and ranking report.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::sync::{Mutex, Once, PoisonError};
use std::thread::{self, ThreadId};

struct CapturingLogger {
    records: Mutex<Vec<(ThreadId, Level, String)>>,
}

static LOGGER: CapturingLogger = CapturingLogger {
    records: Mutex::new(Vec::new()),
};

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((thread::current().id(), record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

fn take_for_current_thread() -> Vec<(Level, String)> {
    let me = thread::current().id();
    let mut records = LOGGER.records.lock().unwrap_or_else(PoisonError::into_inner);
    let (mine, others): (Vec<_>, Vec<_>) = records.drain(..).partition(|(id, ..)| *id == me);
    *records = others;
    mine.into_iter()
        .map(|(_, level, message)| (level, message))
        .collect()
}

/// Runs `f` and returns its value with the records it logged on this thread.
///
/// Tests run on separate threads, so records are kept per thread.
pub(crate) fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<(Level, String)>) {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });

    take_for_current_thread();
    let value = f();
    (value, take_for_current_thread())
}
