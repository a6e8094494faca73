//! Per-handler exception visibility.
//!
//! A record may carry an exception tagged with the level at which it
//! becomes visible. A log file handler at `DEBUG` then shows the traceback
//! while a console at `INFO` shows only the message. The traceback is
//! rendered once and cached on the record's shared
//! [`ExceptionCell`](crate::log_record::ExceptionCell).

use encoding_rs::Encoding;

use super::{FemtoFormatter, SharedFormatter, decode_traceback};
use crate::level::FemtoLevel;
use crate::log_record::FemtoLogRecord;

/// Wraps a base formatter and appends tagged tracebacks for enabled handlers.
#[derive(Clone, Debug)]
pub struct ConditionalExceptionFormatter {
    base: SharedFormatter,
    fallback_encoding: Option<&'static Encoding>,
}

impl ConditionalExceptionFormatter {
    pub fn new(base: SharedFormatter) -> Self {
        Self {
            base,
            fallback_encoding: None,
        }
    }

    /// Encoding used when a rendered traceback is not valid UTF-8.
    pub fn with_fallback_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.fallback_encoding = Some(encoding);
        self
    }

    pub fn base(&self) -> &SharedFormatter {
        &self.base
    }

    /// Replace the wrapped formatter, keeping the decoding settings.
    pub fn set_base(&mut self, base: SharedFormatter) {
        self.base = base;
    }

    /// Format `record` as seen by a handler whose threshold is `handler_level`.
    pub fn format_at(&self, record: &FemtoLogRecord, handler_level: FemtoLevel) -> String {
        let mut output = self.base.format(record);
        if let Some(traceback) = self.visible_traceback(record, handler_level) {
            if !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&traceback);
        }
        output
    }

    /// Traceback text for a tagged exception, if `handler_level` qualifies.
    ///
    /// Rendering releases the record's raw exception so it cannot leak into
    /// a handler that ships records to another process.
    pub fn visible_traceback(
        &self,
        record: &FemtoLogRecord,
        handler_level: FemtoLevel,
    ) -> Option<String> {
        let visible_at = record.exception_visible_at_level()?;
        if handler_level > visible_at {
            return None;
        }
        let cell = record.exception()?;
        let rendered = cell.rendered()?;
        cell.release_raw();
        Some(decode_traceback(&rendered, self.fallback_encoding).into_owned())
    }
}

impl FemtoFormatter for ConditionalExceptionFormatter {
    /// Without a handler threshold every tag qualifies.
    fn format(&self, record: &FemtoLogRecord) -> String {
        self.format_at(record, FemtoLevel::ALL)
    }

    fn widen_name_field(&self, width: usize) -> Option<SharedFormatter> {
        let base = self.base.widen_name_field(width)?;
        let mut widened = self.clone();
        widened.set_base(base);
        Some(SharedFormatter::new(widened))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception_schema::{ExceptionInfo, RenderedTraceback};
    use crate::formatter::{DefaultFormatter, PercentFormatter};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingTraceback(Arc<AtomicUsize>);

    impl ExceptionInfo for CountingTraceback {
        fn render(&self) -> Vec<u8> {
            self.0.fetch_add(1, Ordering::SeqCst);
            b"Traceback (most recent call last):\nKeyError: 'jid'\n".to_vec()
        }
    }

    fn formatter() -> ConditionalExceptionFormatter {
        ConditionalExceptionFormatter::new(SharedFormatter::new(DefaultFormatter))
    }

    #[test]
    fn untagged_record_is_unchanged() {
        let record = FemtoLogRecord::new("a", FemtoLevel::INFO, "plain");
        assert_eq!(formatter().format_at(&record, FemtoLevel::DEBUG), "plain");
    }

    #[test]
    fn traceback_only_for_enabled_handlers_and_rendered_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let record = FemtoLogRecord::new("a", FemtoLevel::ERROR, "lookup failed")
            .with_exception_on_level(CountingTraceback(Arc::clone(&calls)), FemtoLevel::DEBUG);
        let info_view = record.clone();
        let debug_view = record.clone();
        let fmt = formatter();

        let info = fmt.format_at(&info_view, FemtoLevel::INFO);
        let debug = fmt.format_at(&debug_view, FemtoLevel::DEBUG);
        let trace = fmt.format_at(&record, FemtoLevel::TRACE);

        assert_eq!(info, "lookup failed");
        assert!(debug.starts_with("lookup failed\nTraceback"));
        assert!(debug.contains("KeyError: 'jid'"));
        assert_eq!(debug, trace);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!record.exception().unwrap().holds_raw());
    }

    #[test]
    fn info_handler_does_not_render() {
        let calls = Arc::new(AtomicUsize::new(0));
        let record = FemtoLogRecord::new("a", FemtoLevel::ERROR, "x")
            .with_exception_on_level(CountingTraceback(Arc::clone(&calls)), FemtoLevel::DEBUG);
        formatter().format_at(&record, FemtoLevel::INFO);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(record.exception().unwrap().holds_raw());
    }

    #[test]
    fn invalid_utf8_is_decoded_permissively() {
        let record = FemtoLogRecord::new("a", FemtoLevel::ERROR, "x").with_exception_on_level(
            RenderedTraceback(b"caf\xe9".to_vec()),
            FemtoLevel::ERROR,
        );
        let output = formatter()
            .with_fallback_encoding(encoding_rs::WINDOWS_1252)
            .format_at(&record, FemtoLevel::ERROR);
        assert_eq!(output, "x\ncaf\u{e9}");
    }

    #[test]
    fn widening_passes_through_to_base() {
        let fmt = ConditionalExceptionFormatter::new(SharedFormatter::new(PercentFormatter::new(
            "%(name)-5s %(message)s",
        )));
        let wider = fmt.widen_name_field(8).expect("base should widen");
        let record = FemtoLogRecord::new("abc", FemtoLevel::INFO, "m");
        assert_eq!(wider.format(&record), "abc      m");
    }
}
