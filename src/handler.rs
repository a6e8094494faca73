use std::any::Any;
use std::io;

use thiserror::Error;

use crate::level::FemtoLevel;
use crate::log_record::FemtoLogRecord;

/// Errors a handler may report back to the dispatching logger.
///
/// Loggers treat these as diagnostics only; a failing handler never stops
/// delivery to the others.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler has been closed or stopped.
    #[error("handler is closed")]
    Closed,
    /// Writing to the destination failed.
    #[error("handler I/O failed: {0}")]
    Io(#[from] io::Error),
    /// The record could not be encoded for the destination.
    #[error("failed to encode record: {0}")]
    Encode(String),
}

/// Trait implemented by all log handlers.
///
/// Handlers are shared between loggers behind `Arc`, so every method takes
/// `&self` and implementations guard mutable state internally. Delivery is
/// synchronous: `handle` returns once the record has been written, buffered
/// or dropped.
pub trait FemtoHandlerTrait: Send + Sync {
    /// Dispatch a log record for handling.
    fn handle(&self, record: FemtoLogRecord) -> Result<(), HandlerError>;

    /// Flush buffered output. Returns `true` when everything was written.
    fn flush(&self) -> bool {
        true
    }

    /// Release the destination. Later records are dropped.
    fn close(&self) {}

    /// Minimum level this handler accepts.
    fn level(&self) -> FemtoLevel {
        FemtoLevel::ALL
    }

    /// Update the minimum level.
    fn set_level(&self, _level: FemtoLevel) {}

    /// Widen a `%(name)-Ns` column in this handler's format string.
    ///
    /// Returns `true` if the format changed.
    fn widen_name_field(&self, _width: usize) -> bool {
        false
    }

    /// Return the handler as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Whether two handler references point at the same instance.
pub fn same_handler(a: &dyn FemtoHandlerTrait, b: &dyn FemtoHandlerTrait) -> bool {
    std::ptr::addr_eq(a as *const dyn FemtoHandlerTrait, b as *const dyn FemtoHandlerTrait)
}
