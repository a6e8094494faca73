//! Named loggers and their registry.
//!
//! A [`FemtoLogger`] gates records by its effective level and hands a clone
//! of each record to its handlers, then to its ancestors' handlers while
//! `propagate` is set. Loggers are obtained from a [`LoggerRegistry`], which
//! links dotted names to their parents and keeps handler name columns wide
//! enough for the longest registered name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use log::warn;
use parking_lot::RwLock;
use thiserror::Error;

use crate::exception_schema::ExceptionInfo;
use crate::handler::{FemtoHandlerTrait, same_handler};
use crate::level::FemtoLevel;
use crate::log_record::{ExtraValue, FemtoLogRecord, RecordMetadata};
use crate::rate_limited_warner::RateLimitedWarner;

mod registry;
mod severity;

pub use registry::{LoggerRegistry, ROOT_LOGGER_NAME};
pub use severity::SeverityMethods;

/// Errors raised by the logging front end.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoggingError {
    /// A record was given both an always-visible and a level-gated exception.
    #[error("only one of exc_info and exc_info_on_level may be set")]
    ConflictingExceptionInfo,
    /// Logger names are dot separated, non-empty segments.
    #[error("invalid logger name '{0}'")]
    InvalidLoggerName(String),
}

pub struct FemtoLogger {
    name: String,
    parent: Option<Arc<FemtoLogger>>,
    /// `ALL` means "inherit from the parent".
    level: AtomicU16,
    propagate: AtomicBool,
    handlers: RwLock<Vec<Arc<dyn FemtoHandlerTrait>>>,
    warner: RateLimitedWarner,
}

impl FemtoLogger {
    /// Create a detached logger with no parent.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_parent(name, None)
    }

    /// Create a logger with an explicit parent.
    pub fn with_parent(name: impl Into<String>, parent: Option<Arc<FemtoLogger>>) -> Self {
        Self {
            name: name.into(),
            parent,
            level: AtomicU16::new(FemtoLevel::ALL.value()),
            propagate: AtomicBool::new(true),
            handlers: RwLock::new(Vec::new()),
            warner: RateLimitedWarner::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<FemtoLogger>> {
        self.parent.as_ref()
    }

    pub fn set_level(&self, level: FemtoLevel) {
        self.level.store(level.value(), Ordering::Relaxed);
    }

    /// The level set on this logger; `ALL` when it inherits.
    pub fn level(&self) -> FemtoLevel {
        FemtoLevel::from_value(self.level.load(Ordering::Relaxed))
    }

    /// The first explicitly set level walking up towards the root.
    pub fn effective_level(&self) -> FemtoLevel {
        let mut current = Some(self);
        while let Some(logger) = current {
            let level = logger.level();
            if level != FemtoLevel::ALL {
                return level;
            }
            current = logger.parent.as_deref();
        }
        FemtoLevel::ALL
    }

    pub fn is_enabled_for(&self, level: FemtoLevel) -> bool {
        self.effective_level().allows(level)
    }

    pub fn propagate(&self) -> bool {
        self.propagate.load(Ordering::Relaxed)
    }

    pub fn set_propagate(&self, flag: bool) {
        self.propagate.store(flag, Ordering::Relaxed);
    }

    pub fn add_handler(&self, handler: Arc<dyn FemtoHandlerTrait>) {
        self.handlers.write().push(handler);
    }

    /// Detach `handler`, matched by identity. Returns whether it was attached.
    pub fn remove_handler(&self, handler: &Arc<dyn FemtoHandlerTrait>) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|h| !same_handler(h.as_ref(), handler.as_ref()));
        handlers.len() != before
    }

    pub fn clear_handlers(&self) {
        self.handlers.write().clear();
    }

    /// Snapshot of the attached handlers.
    pub fn handlers(&self) -> Vec<Arc<dyn FemtoHandlerTrait>> {
        self.handlers.read().clone()
    }

    pub fn has_handlers(&self) -> bool {
        !self.handlers.read().is_empty()
    }

    /// Log `message` at `level`. Returns whether the record was dispatched.
    pub fn log(&self, level: FemtoLevel, message: &str) -> bool {
        self.log_with_metadata(level, message, RecordMetadata::default())
    }

    /// Log with caller-supplied source location and extras.
    pub fn log_with_metadata(&self, level: FemtoLevel, message: &str, metadata: RecordMetadata) -> bool {
        if !self.is_enabled_for(level) {
            return false;
        }
        self.handle(FemtoLogRecord::new(&self.name, level, message).with_metadata(metadata));
        true
    }

    /// Start building a record with arguments, extras or an exception.
    pub fn record<'a>(&'a self, level: FemtoLevel, message: &str) -> RecordBuilder<'a> {
        RecordBuilder {
            logger: self,
            record: FemtoLogRecord::new(&self.name, level, message),
            exc_info: None,
            exc_info_on_level: None,
        }
    }

    /// Deliver a record to this logger's handlers and, while propagation
    /// allows, to each ancestor's handlers. Levels of ancestors are not
    /// consulted; each handler applies its own gate.
    pub fn handle(&self, record: FemtoLogRecord) {
        let mut current = Some(self);
        while let Some(logger) = current {
            for handler in logger.handlers() {
                if let Err(err) = handler.handle(record.clone()) {
                    self.warner.record_drop();
                    self.warner.warn_if_due(|count| {
                        warn!("FemtoLogger '{}': {count} records failed in handlers: {err}", self.name);
                    });
                }
            }
            current = if logger.propagate() {
                logger.parent.as_deref()
            } else {
                None
            };
        }
    }

    /// Flush every attached handler. Returns `false` if any flush failed.
    pub fn flush_handlers(&self) -> bool {
        self.handlers()
            .iter()
            .fold(true, |ok, handler| handler.flush() && ok)
    }
}

impl fmt::Debug for FemtoLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FemtoLogger")
            .field("name", &self.name)
            .field("level", &self.level())
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

/// Record under construction; see [`FemtoLogger::record`].
#[must_use = "records are only logged by `emit`"]
pub struct RecordBuilder<'a> {
    logger: &'a FemtoLogger,
    record: FemtoLogRecord,
    exc_info: Option<Box<dyn ExceptionInfo>>,
    exc_info_on_level: Option<(Box<dyn ExceptionInfo>, FemtoLevel)>,
}

impl RecordBuilder<'_> {
    /// Values substituted into `%s` placeholders.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record = self.record.with_args(args);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<ExtraValue>) -> Self {
        self.record = self.record.with_extra(key, value);
        self
    }

    pub fn extras(mut self, extras: BTreeMap<String, ExtraValue>) -> Self {
        self.record.metadata.key_values.extend(extras);
        self
    }

    pub fn location(mut self, module_path: &str, filename: &str, line_number: u32) -> Self {
        self.record.metadata.module_path = module_path.to_owned();
        self.record.metadata.filename = filename.to_owned();
        self.record.metadata.line_number = line_number;
        self
    }

    /// Attach an exception shown by every handler.
    pub fn exc_info(mut self, info: impl ExceptionInfo + 'static) -> Self {
        self.exc_info = Some(Box::new(info));
        self
    }

    /// Attach an exception shown only by handlers enabled for `level`.
    pub fn exc_info_on_level(mut self, info: impl ExceptionInfo + 'static, level: FemtoLevel) -> Self {
        self.exc_info_on_level = Some((Box::new(info), level));
        self
    }

    /// Finish the record without logging it.
    pub fn build(self) -> Result<FemtoLogRecord, LoggingError> {
        match (self.exc_info, self.exc_info_on_level) {
            (Some(_), Some(_)) => Err(LoggingError::ConflictingExceptionInfo),
            (Some(info), None) => Ok(self.record.with_boxed_exception(info, None)),
            (None, Some((info, level))) => Ok(self.record.with_boxed_exception(info, Some(level))),
            (None, None) => Ok(self.record),
        }
    }

    /// Log the record if the logger is enabled for its level. Returns
    /// whether it was dispatched.
    pub fn emit(self) -> Result<bool, LoggingError> {
        let logger = self.logger;
        let record = self.build()?;
        if !logger.is_enabled_for(record.level()) {
            return Ok(false);
        }
        logger.handle(record);
        Ok(true)
    }
}

#[cfg(test)]
mod tests;
