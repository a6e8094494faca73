//! Builder for [`FemtoStreamHandler`].
//!
//! Configures stream handlers writing to `stdout`, `stderr` or a caller
//! supplied writer. `new` defaults to `stderr` to mirror a console handler.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use super::{HandlerBuildError, HandlerBuilderTrait, common::CommonBuilder};
use crate::formatter::{FemtoFormatter, PercentFormatter, validate_datefmt};
use crate::handler::FemtoHandlerTrait;
use crate::level::FemtoLevel;
use crate::stream_handler::FemtoStreamHandler;

/// Console layout used when no format is configured.
pub const DEFAULT_CONSOLE_FORMAT: &str = "[%(levelname)-8s] %(message)s";

type WriterFactory = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

#[derive(Clone)]
enum StreamTarget {
    Stdout,
    Stderr,
    Writer(WriterFactory),
}

impl fmt::Debug for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamTarget::Stdout => f.write_str("Stdout"),
            StreamTarget::Stderr => f.write_str("Stderr"),
            StreamTarget::Writer(_) => f.write_str("Writer"),
        }
    }
}

/// Builder for constructing [`FemtoStreamHandler`] instances.
#[derive(Clone, Debug)]
pub struct StreamHandlerBuilder {
    target: StreamTarget,
    format: Option<String>,
    datefmt: Option<String>,
    common: CommonBuilder,
}

impl Default for StreamHandlerBuilder {
    fn default() -> Self {
        Self::stderr()
    }
}

impl StreamHandlerBuilder {
    /// Create a builder targeting `stderr`.
    pub fn new() -> Self {
        Self::stderr()
    }

    /// Create a builder targeting `stdout`.
    pub fn stdout() -> Self {
        Self::with_target(StreamTarget::Stdout)
    }

    /// Create a builder targeting `stderr`.
    pub fn stderr() -> Self {
        Self::with_target(StreamTarget::Stderr)
    }

    /// Create a builder whose handlers write to clones of `writer`.
    pub fn writer<W>(writer: W) -> Self
    where
        W: Write + Send + Sync + Clone + 'static,
    {
        Self::with_target(StreamTarget::Writer(Arc::new(move || {
            Box::new(writer.clone()) as Box<dyn Write + Send>
        })))
    }

    fn with_target(target: StreamTarget) -> Self {
        Self {
            target,
            format: None,
            datefmt: None,
            common: CommonBuilder::default(),
        }
    }

    pub fn with_level(mut self, level: FemtoLevel) -> Self {
        self.common.set_level(level);
        self
    }

    /// Use a `%(key)s` format string.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Set the `strftime` pattern for `%(asctime)s`.
    pub fn with_datefmt(mut self, datefmt: impl Into<String>) -> Self {
        self.datefmt = Some(datefmt.into());
        self
    }

    /// Use a custom formatter; takes precedence over [`with_format`](Self::with_format).
    pub fn with_formatter<F>(mut self, formatter: F) -> Self
    where
        F: FemtoFormatter + 'static,
    {
        self.common.set_formatter(formatter);
        self
    }

    fn validate(&self) -> Result<(), HandlerBuildError> {
        if matches!(&self.format, Some(format) if format.trim().is_empty()) {
            return Err(HandlerBuildError::InvalidConfig(
                "format must not be empty".into(),
            ));
        }
        if let Some(datefmt) = &self.datefmt {
            validate_datefmt(datefmt).map_err(HandlerBuildError::InvalidConfig)?;
        }
        Ok(())
    }

    pub(crate) fn percent_formatter(format: Option<&str>, datefmt: Option<&str>) -> PercentFormatter {
        let formatter = PercentFormatter::new(format.unwrap_or(DEFAULT_CONSOLE_FORMAT));
        match datefmt {
            Some(datefmt) => formatter.with_datefmt(datefmt),
            None => formatter,
        }
    }

    /// Build the concrete handler.
    pub fn build_inner(&self) -> Result<FemtoStreamHandler, HandlerBuildError> {
        self.validate()?;
        let core = self.common.core_with(
            FemtoLevel::ALL,
            Self::percent_formatter(self.format.as_deref(), self.datefmt.as_deref()),
        );
        let writer: Box<dyn Write + Send> = match &self.target {
            StreamTarget::Stdout => Box::new(io::stdout()),
            StreamTarget::Stderr => Box::new(io::stderr()),
            StreamTarget::Writer(factory) => factory(),
        };
        Ok(FemtoStreamHandler::with_core(writer, core))
    }
}

impl HandlerBuilderTrait for StreamHandlerBuilder {
    fn build(&self) -> Result<Arc<dyn FemtoHandlerTrait>, HandlerBuildError> {
        Ok(Arc::new(self.build_inner()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_record::FemtoLogRecord;
    use crate::test_utils::SharedBuf;

    #[test]
    fn default_console_layout() {
        let buf = SharedBuf::default();
        let handler = StreamHandlerBuilder::writer(buf.clone()).build_inner().unwrap();
        handler
            .handle(FemtoLogRecord::new("a", FemtoLevel::WARNING, "careful"))
            .unwrap();
        assert_eq!(buf.contents_string(), "[WARNING ] careful\n");
    }

    #[test]
    fn level_and_format_are_applied() {
        let buf = SharedBuf::default();
        let handler = StreamHandlerBuilder::writer(buf.clone())
            .with_level(FemtoLevel::ERROR)
            .with_format("%(name)s: %(message)s")
            .build()
            .unwrap();
        handler
            .handle(FemtoLogRecord::new("svc", FemtoLevel::INFO, "skip"))
            .unwrap();
        handler
            .handle(FemtoLogRecord::new("svc", FemtoLevel::ERROR, "keep"))
            .unwrap();
        assert_eq!(handler.level(), FemtoLevel::ERROR);
        assert_eq!(buf.contents_string(), "svc: keep\n");
    }

    #[test]
    fn rejects_unknown_datefmt_specifier() {
        let err = StreamHandlerBuilder::stdout()
            .with_datefmt("%H:%Q")
            .build_inner()
            .unwrap_err();
        assert!(matches!(err, HandlerBuildError::InvalidConfig(msg) if msg.contains("datefmt")));
    }

    #[test]
    fn rejects_blank_format() {
        let err = StreamHandlerBuilder::stdout()
            .with_format("  ")
            .build_inner()
            .unwrap_err();
        assert!(matches!(err, HandlerBuildError::InvalidConfig(msg) if msg.contains("format")));
    }
}
