//! Stream-based logging handler implementation.
//!
//! `FemtoStreamHandler` formats each record on the calling thread and
//! writes it, newline terminated, to any `io::Write` destination. The
//! writer sits behind a mutex held only for the write and flush.

use std::any::Any;
use std::fmt;
use std::io::{self, Write};

use log::warn;
use parking_lot::Mutex;

use crate::formatter::{DefaultFormatter, FemtoFormatter, SharedFormatter};
use crate::handler::{FemtoHandlerTrait, HandlerError};
use crate::handlers::HandlerCore;
use crate::level::FemtoLevel;
use crate::log_record::FemtoLogRecord;
use crate::rate_limited_warner::RateLimitedWarner;

/// Handler that writes formatted log records to an `io::Write` stream.
pub struct FemtoStreamHandler {
    core: HandlerCore,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    warner: RateLimitedWarner,
}

impl FemtoStreamHandler {
    /// Create a new handler writing to `stdout` with a `DefaultFormatter`.
    pub fn stdout() -> Self {
        Self::new(io::stdout(), DefaultFormatter)
    }

    /// Create a new handler writing to `stderr` with a `DefaultFormatter`.
    pub fn stderr() -> Self {
        Self::new(io::stderr(), DefaultFormatter)
    }

    /// Create a new handler from an arbitrary writer and formatter.
    pub fn new<W, F>(writer: W, formatter: F) -> Self
    where
        W: Write + Send + 'static,
        F: FemtoFormatter + 'static,
    {
        Self::with_core(
            Box::new(writer),
            HandlerCore::new(FemtoLevel::ALL, SharedFormatter::new(formatter)),
        )
    }

    pub(crate) fn with_core(writer: Box<dyn Write + Send>, core: HandlerCore) -> Self {
        Self {
            core,
            writer: Mutex::new(Some(writer)),
            warner: RateLimitedWarner::default(),
        }
    }

    /// Access the shared level and formatter state.
    pub fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn write_line(&self, line: &str) -> Result<(), HandlerError> {
        let mut guard = self.writer.lock();
        let Some(writer) = guard.as_mut() else {
            return Err(HandlerError::Closed);
        };
        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush())
            .map_err(HandlerError::from)
    }
}

impl FemtoHandlerTrait for FemtoStreamHandler {
    fn handle(&self, record: FemtoLogRecord) -> Result<(), HandlerError> {
        if !self.core.is_enabled_for(record.level()) {
            return Ok(());
        }
        let line = self.core.format(&record);
        self.write_line(&line).inspect_err(|_| {
            self.warner.record_drop();
            self.warner.warn_if_due(|count| {
                warn!("FemtoStreamHandler: {count} records could not be written");
            });
        })
    }

    fn flush(&self) -> bool {
        match self.writer.lock().as_mut() {
            Some(writer) => writer.flush().is_ok(),
            None => false,
        }
    }

    fn close(&self) {
        if let Some(mut writer) = self.writer.lock().take() {
            let _ = writer.flush();
        }
    }

    fn level(&self) -> FemtoLevel {
        self.core.level()
    }

    fn set_level(&self, level: FemtoLevel) {
        self.core.set_level(level);
    }

    fn widen_name_field(&self, width: usize) -> bool {
        self.core.widen_name_field(width)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for FemtoStreamHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FemtoStreamHandler")
            .field("level", &self.core.level())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::PercentFormatter;
    use crate::test_utils::SharedBuf;

    #[test]
    fn writes_newline_terminated_records() {
        let buf = SharedBuf::default();
        let handler = FemtoStreamHandler::new(buf.clone(), DefaultFormatter);
        handler
            .handle(FemtoLogRecord::new("a", FemtoLevel::INFO, "Foo"))
            .unwrap();
        handler
            .handle(FemtoLogRecord::new("a", FemtoLevel::INFO, "Bar"))
            .unwrap();
        assert_eq!(buf.contents_string(), "Foo\nBar\n");
    }

    #[test]
    fn drops_records_below_level() {
        let buf = SharedBuf::default();
        let handler = FemtoStreamHandler::new(buf.clone(), PercentFormatter::new("%(message)s"));
        handler.set_level(FemtoLevel::WARNING);
        handler
            .handle(FemtoLogRecord::new("a", FemtoLevel::INFO, "hidden"))
            .unwrap();
        handler
            .handle(FemtoLogRecord::new("a", FemtoLevel::ERROR, "shown"))
            .unwrap();
        assert_eq!(buf.contents_string(), "shown\n");
    }

    #[test]
    fn closed_handler_reports_closed() {
        let handler = FemtoStreamHandler::new(SharedBuf::default(), DefaultFormatter);
        handler.close();
        let err = handler
            .handle(FemtoLogRecord::new("a", FemtoLevel::INFO, "late"))
            .unwrap_err();
        assert!(matches!(err, HandlerError::Closed));
        assert!(!handler.flush());
    }
}
