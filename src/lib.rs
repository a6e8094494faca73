//! Bootstrap-safe logging pipeline with conditional tracebacks and
//! forwarding to remote collectors.
//!
//! Records logged before configuration is known are held by a
//! [`FemtoDeferredHandler`] and replayed into the configured handlers by
//! [`LoggingPipeline::configure`]. Every handler decides for itself whether
//! a level-tagged exception is shown, and [`network`] handlers forward
//! records as fluent msgpack or logstash JSON with bounded buffering.

pub mod config;
pub mod deferred_handler;
pub mod exception_schema;
pub mod formatter;
pub mod handler;
pub mod handlers;
pub mod level;
pub mod lifecycle;
pub mod log_record;
pub mod logger;
mod logging_macros;
pub mod network;
pub mod rate_limited_warner;
pub mod stream_handler;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use config::{ConfigError, HandlerConfig, HandlerKind, LoggingPipeline, PipelineConfig};
pub use deferred_handler::FemtoDeferredHandler;
pub use exception_schema::{ExceptionInfo, ExceptionPayload, RenderedTraceback, StackFrame};
pub use formatter::{
    ConditionalExceptionFormatter, DefaultFormatter, FemtoFormatter, PercentFormatter,
    SharedFormatter,
};
pub use handler::{FemtoHandlerTrait, HandlerError};
pub use handlers::{
    DeferredHandlerBuilder, HandlerBuildError, HandlerBuilderTrait, NetworkHandlerBuilder,
    StreamHandlerBuilder,
};
pub use level::FemtoLevel;
pub use lifecycle::{ExitGuard, ExitHooks, install_exit_guard};
pub use log_record::{ExtraValue, FemtoLogRecord, RecordMetadata};
pub use logger::{FemtoLogger, LoggerRegistry, LoggingError, RecordBuilder, SeverityMethods};
pub use network::FemtoNetworkHandler;
pub use stream_handler::FemtoStreamHandler;
