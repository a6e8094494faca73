//! Builder for [`FemtoDeferredHandler`].

use std::io::{self, Write};
use std::sync::Arc;

use super::stream_builder::StreamHandlerBuilder;
use super::{HandlerBuildError, HandlerBuilderTrait, common::CommonBuilder};
use crate::deferred_handler::{DEFAULT_DEFERRED_FORMAT, DEFAULT_MAX_SIZE, FemtoDeferredHandler};
use crate::handler::FemtoHandlerTrait;
use crate::level::FemtoLevel;

type StreamFactory = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

/// Builder for the bootstrap handler.
#[derive(Clone)]
pub struct DeferredHandlerBuilder {
    max_size: usize,
    format: Option<String>,
    stream: Option<StreamFactory>,
    common: CommonBuilder,
}

impl Default for DeferredHandlerBuilder {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            format: None,
            stream: None,
            common: CommonBuilder::default(),
        }
    }
}

impl std::fmt::Debug for DeferredHandlerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredHandlerBuilder")
            .field("max_size", &self.max_size)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl DeferredHandlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of records retained. Must be greater than zero.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_level(mut self, level: FemtoLevel) -> Self {
        self.common.set_level(level);
        self
    }

    /// Format used when queued records are flushed to the raw stream.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Write last-resort output to clones of `stream` instead of `stderr`.
    pub fn with_stream<W>(mut self, stream: W) -> Self
    where
        W: Write + Send + Sync + Clone + 'static,
    {
        self.stream = Some(Arc::new(move || Box::new(stream.clone()) as Box<dyn Write + Send>));
        self
    }

    pub fn build_inner(&self) -> Result<FemtoDeferredHandler, HandlerBuildError> {
        CommonBuilder::ensure_non_zero("max_size", Some(self.max_size as u64))?;
        let core = self.common.core_with(
            FemtoLevel::ALL,
            StreamHandlerBuilder::percent_formatter(
                Some(self.format.as_deref().unwrap_or(DEFAULT_DEFERRED_FORMAT)),
                None,
            ),
        );
        let stream: Box<dyn Write + Send> = match &self.stream {
            Some(factory) => factory(),
            None => Box::new(io::stderr()),
        };
        Ok(FemtoDeferredHandler::with_core(stream, self.max_size, core))
    }
}

impl HandlerBuilderTrait for DeferredHandlerBuilder {
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
    fn zero_capacity_is_rejected() {
        let err = DeferredHandlerBuilder::new().with_max_size(0).build_inner().unwrap_err();
        assert!(matches!(err, HandlerBuildError::InvalidConfig(msg) if msg.contains("max_size")));
    }

    #[test]
    fn flush_uses_configured_format() {
        let buf = SharedBuf::default();
        let handler = DeferredHandlerBuilder::new()
            .with_max_size(4)
            .with_format("%(levelname)s|%(message)s")
            .with_stream(buf.clone())
            .build_inner()
            .unwrap();
        assert_eq!(handler.max_size(), 4);
        handler
            .handle(FemtoLogRecord::new("a", FemtoLevel::INFO, "queued"))
            .unwrap();
        assert!(handler.flush());
        assert_eq!(buf.contents_string(), "INFO|queued\n");
    }
}
