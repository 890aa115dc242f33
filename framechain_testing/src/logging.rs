//! Capture of records emitted through the `log` facade.
//!
//! `logtest` installs a single process-wide logger, so a capture is held by
//! one test at a time.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use log::Level;
use logtest::Logger;
use rstest::fixture;

/// One record drained from the capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedRecord {
    /// Severity the record was emitted at.
    pub level: Level,
    /// Module path or explicit target of the record.
    pub target: String,
    /// Rendered message.
    pub message: String,
}

/// Exclusive access to the process-wide log capture.
///
/// A test that panicked while holding the capture does not block later
/// tests; they simply take the lock over.
pub struct LogCapture {
    logger: MutexGuard<'static, Logger>,
}

impl LogCapture {
    /// Wait for and take the capture.
    #[must_use]
    pub fn acquire() -> Self {
        static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

        let logger = LOGGER
            .get_or_init(|| Mutex::new(Logger::start()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Self { logger }
    }

    /// Forget everything recorded so far, including records left behind by
    /// earlier holders.
    pub fn discard(&mut self) { while self.logger.pop().is_some() {} }

    /// Drain the records captured since the last drain, oldest first.
    pub fn records(&mut self) -> Vec<CapturedRecord> {
        std::iter::from_fn(|| self.logger.pop())
            .map(|record| CapturedRecord {
                level: record.level(),
                target: record.target().to_owned(),
                message: record.args().to_owned(),
            })
            .collect()
    }

    /// Drain the capture and return the `needles` that no message contains.
    pub fn missing<'a>(&mut self, needles: &[&'a str]) -> Vec<&'a str> {
        let records = self.records();
        needles
            .iter()
            .copied()
            .filter(|needle| !records.iter().any(|record| record.message.contains(needle)))
            .collect()
    }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn log_capture() -> LogCapture { LogCapture::acquire() }
