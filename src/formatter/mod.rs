//! Formatter implementations.
//!
//! Provides the core [`FemtoFormatter`] trait, the shared trait-object
//! wrapper used by handlers, the `%`-style [`PercentFormatter`] and the
//! [`ConditionalExceptionFormatter`] every handler wraps its formatter in.

use std::{fmt, sync::Arc};

use crate::log_record::FemtoLogRecord;

mod conditional;
mod exception;
mod percent;

pub use conditional::ConditionalExceptionFormatter;
pub use exception::{decode_traceback, format_exception_payload, format_stack_frame};
pub use percent::{DEFAULT_DATEFMT, MAX_NAME_WIDTH, PercentFormatter, validate_datefmt};

/// Trait for formatting log records into strings.
///
/// Implementors must be thread-safe (`Send + Sync`) so formatters can be
/// shared across threads in a logging system.
pub trait FemtoFormatter: Send + Sync {
    /// Format a log record into a string representation.
    fn format(&self, record: &FemtoLogRecord) -> String;

    /// Widen a `%(name)-Ns` field to at least `width` characters.
    ///
    /// Returns a replacement formatter when the width changed, `None` when
    /// the formatter has no such field or is already wide enough.
    fn widen_name_field(&self, _width: usize) -> Option<SharedFormatter> {
        None
    }
}

/// Shared formatter trait object used across handlers.
#[derive(Clone)]
pub struct SharedFormatter {
    inner: Arc<dyn FemtoFormatter>,
}

impl SharedFormatter {
    /// Create a shared formatter from an owned formatter implementation.
    pub fn new<F>(formatter: F) -> Self
    where
        F: FemtoFormatter + 'static,
    {
        Self {
            inner: Arc::new(formatter),
        }
    }

    /// Wrap an existing shared formatter trait object.
    pub fn from_arc(inner: Arc<dyn FemtoFormatter>) -> Self {
        Self { inner }
    }

    /// Format a log record using the wrapped formatter instance.
    pub fn format(&self, record: &FemtoLogRecord) -> String {
        self.inner.format(record)
    }

    pub fn widen_name_field(&self, width: usize) -> Option<SharedFormatter> {
        self.inner.widen_name_field(width)
    }
}

impl FemtoFormatter for SharedFormatter {
    fn format(&self, record: &FemtoLogRecord) -> String {
        self.inner.format(record)
    }

    fn widen_name_field(&self, width: usize) -> Option<SharedFormatter> {
        self.inner.widen_name_field(width)
    }
}

impl fmt::Debug for SharedFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedFormatter(<dyn FemtoFormatter>)")
    }
}

/// Formatter that renders only the message, plus any unconditional
/// exception on the following lines.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultFormatter;

impl FemtoFormatter for DefaultFormatter {
    fn format(&self, record: &FemtoLogRecord) -> String {
        let mut output = record.message().into_owned();
        append_unconditional_exception(&mut output, record);
        output
    }
}

/// Append the traceback of an untagged exception, if the record has one.
pub(crate) fn append_unconditional_exception(output: &mut String, record: &FemtoLogRecord) {
    let Some(cell) = record.unconditional_exception() else {
        return;
    };
    let Some(rendered) = cell.rendered() else {
        return;
    };
    if !output.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(decode_traceback(&rendered, None).trim_end_matches('\n'));
}

#[cfg(test)]
mod tests {
    //! Tests for formatter implementations.

    use super::*;
    use crate::exception_schema::ExceptionPayload;
    use crate::level::FemtoLevel;
    use static_assertions::assert_impl_all;

    #[test]
    fn shared_formatter_is_send_sync() {
        assert_impl_all!(SharedFormatter: Send, Sync);
    }

    #[test]
    fn default_formatter_renders_message_only() {
        let record = FemtoLogRecord::new("test", FemtoLevel::INFO, "hello %s").with_args(["you"]);
        assert_eq!(DefaultFormatter.format(&record), "hello you");
    }

    #[test]
    fn default_formatter_includes_untagged_exception() {
        let record = FemtoLogRecord::new("test", FemtoLevel::ERROR, "failed")
            .with_exception(ExceptionPayload::new("ValueError", "test error"));
        let output = DefaultFormatter.format(&record);
        assert!(output.starts_with("failed\nTraceback (most recent call last):\n"));
        assert!(output.ends_with("ValueError: test error"));
    }

    #[test]
    fn default_formatter_skips_tagged_exception() {
        let record = FemtoLogRecord::new("test", FemtoLevel::ERROR, "failed")
            .with_exception_on_level(ExceptionPayload::new("E", "x"), FemtoLevel::DEBUG);
        assert_eq!(DefaultFormatter.format(&record), "failed");
    }

    #[test]
    fn default_formatter_cannot_widen() {
        assert!(DefaultFormatter.widen_name_field(40).is_none());
    }
}
