//! Readable rendering of panic payloads caught from connection tasks.

use std::{any::Any, fmt};

/// A caught panic payload that displays as its message.
///
/// `String` and `&'static str` payloads (everything `panic!` produces)
/// display verbatim; anything else falls back to `Debug`.
///
/// ```
/// use framechain::panic::format_panic;
///
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert_eq!(format_panic(Box::new(format!("boom {}", 1))).to_string(), "boom 1");
/// assert!(format_panic(Box::new(5_u32)).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl PanicMessage {
    /// The payload text, if the payload is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| self.0.downcast_ref::<&'static str>().copied())
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(text) => f.write_str(text),
            None => write!(f, "{:?}", self.0),
        }
    }
}

/// Wrap `panic` for logging.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;

    async fn explode() -> u8 { panic!("filter exploded") }

    #[tokio::test]
    async fn caught_task_panic_keeps_its_message() {
        let caught = std::panic::AssertUnwindSafe(explode())
            .catch_unwind()
            .await
            .expect_err("future panics");
        let message = format_panic(caught);
        assert_eq!(message.as_str(), Some("filter exploded"));
    }
}
