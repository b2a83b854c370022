//! The module containing the console logger implementation.

// Inspired by Ian Kronquist's work.
// https://github.com/iankronquist/rustyvisor/blob/83b53ac104d85073858ba83326a28a6e08d1af12/pcuart/src/lib.rs

use crate::config::LOGGING_LEVEL;
use core::fmt::{self, Write};
use spin::Mutex;

/// Initializes the logger instance, routing `log` records to `sink`.
///
/// `sink` is typically the same UART the guest console uses, wrapped so
/// that host log lines and guest console bytes are told apart by a
/// prefix. Must be called at most once; the logger is a `'static`
/// singleton because `log::set_logger` requires one.
pub fn init(sink: &'static dyn Sink) {
    *LOGGER.sink.lock() = Some(sink);
    let _ = log::set_logger(&LOGGER).map(|()| {
        log::set_max_level(LOGGING_LEVEL);
    });
}

/// A `core::fmt::Write`-capable sink a board wires to its debug UART.
///
/// Separate from [`crate::hal::Console`] because the guest console and
/// the host's own log output are conventionally different physical
/// ports (or the same port with interleaved framing) on these boards.
pub trait Sink: Sync {
    /// Writes `s` to the sink.
    fn write_str(&self, s: &str);
}

struct ConsoleLogger {
    sink: Mutex<Option<&'static dyn Sink>>,
}

impl ConsoleLogger {
    const fn new() -> Self {
        Self {
            sink: Mutex::new(None),
        }
    }
}

static LOGGER: ConsoleLogger = ConsoleLogger::new();

struct Writer<'a>(&'a dyn Sink);

impl Write for Writer<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= LOGGING_LEVEL
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            if let Some(sink) = *self.sink.lock() {
                let _ = writeln!(Writer(sink), "{}: {}", record.level(), record.args());
            }
        }
    }

    fn flush(&self) {}
}
