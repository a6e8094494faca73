//! Bootstrap handler that holds records until real handlers exist.
//!
//! `FemtoDeferredHandler` is attached to the root logger before the
//! configuration has been read. It keeps the newest `max_size` records and
//! either replays them into the configured handlers through [`sync`] or,
//! when configuration never completes, writes them to its raw stream on
//! [`flush`] (also run from an exit hook).
//!
//! [`sync`]: FemtoDeferredHandler::sync
//! [`flush`]: FemtoDeferredHandler::flush

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::formatter::{FemtoFormatter, PercentFormatter, SharedFormatter};
use crate::handler::{FemtoHandlerTrait, HandlerError, same_handler};
use crate::handlers::HandlerCore;
use crate::level::FemtoLevel;
use crate::lifecycle::{ExitHooks, HookId};
use crate::log_record::FemtoLogRecord;

/// Default number of records retained before the oldest are evicted.
pub const DEFAULT_MAX_SIZE: usize = 10_000;
/// Format used for the last-resort flush when none is configured.
pub const DEFAULT_DEFERRED_FORMAT: &str = "[%(levelname)-8s] %(message)s";

pub struct FemtoDeferredHandler {
    core: HandlerCore,
    queue: Mutex<VecDeque<FemtoLogRecord>>,
    max_size: usize,
    emitting: AtomicBool,
    stream: Mutex<Box<dyn Write + Send>>,
    exit_hook: Mutex<Option<(Arc<ExitHooks>, HookId)>>,
}

impl FemtoDeferredHandler {
    /// Create a handler that falls back to `stderr`.
    pub fn new(max_size: usize) -> Self {
        Self::with_stream(io::stderr(), max_size)
    }

    /// Create a handler whose last-resort destination is `stream`.
    pub fn with_stream<W>(stream: W, max_size: usize) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::with_core(
            Box::new(stream),
            max_size,
            HandlerCore::new(
                FemtoLevel::ALL,
                SharedFormatter::new(PercentFormatter::new(DEFAULT_DEFERRED_FORMAT)),
            ),
        )
    }

    pub(crate) fn with_core(stream: Box<dyn Write + Send>, max_size: usize, core: HandlerCore) -> Self {
        let max_size = max_size.max(1);
        Self {
            core,
            queue: Mutex::new(VecDeque::with_capacity(max_size.min(1024))),
            max_size,
            emitting: AtomicBool::new(false),
            stream: Mutex::new(stream),
            exit_hook: Mutex::new(None),
        }
    }

    pub fn core(&self) -> &HandlerCore {
        &self.core
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of records waiting for `sync` or `flush`.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Replace the formatter used by the last-resort flush.
    pub fn set_formatter<F>(&self, formatter: F)
    where
        F: FemtoFormatter + 'static,
    {
        self.core.set_formatter(SharedFormatter::new(formatter));
    }

    /// Register [`flush`](Self::flush) to run when `hooks` fire.
    ///
    /// A second registration replaces the first.
    pub fn register_exit_flush(self: &Arc<Self>, hooks: &Arc<ExitHooks>) {
        let weak = Arc::downgrade(self);
        let id = hooks.register(move || {
            if let Some(handler) = weak.upgrade() {
                handler.flush_to_stream();
            }
        });
        if let Some((old_hooks, old_id)) = self.exit_hook.lock().replace((Arc::clone(hooks), id)) {
            old_hooks.deregister(old_id);
        }
    }

    fn deregister_exit_flush(&self) {
        if let Some((hooks, id)) = self.exit_hook.lock().take() {
            hooks.deregister(id);
        }
    }

    fn enqueue(&self, record: FemtoLogRecord) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.max_size {
            queue.pop_front();
        }
        queue.push_back(record);
    }

    fn dequeue(&self) -> Option<FemtoLogRecord> {
        self.queue.lock().pop_front()
    }

    /// Write every queued record to the raw stream.
    ///
    /// Re-entrant calls made while a flush is running (for example from a
    /// writer that logs) return immediately. Returns `false` if any write
    /// failed or the flush was skipped.
    pub fn flush_to_stream(&self) -> bool {
        if self.emitting.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut ok = true;
        while let Some(record) = self.dequeue() {
            let line = self.core.format(&record);
            // The stream lock is released before the next dequeue so a
            // writer that logs can still enqueue.
            let mut stream = self.stream.lock();
            ok &= stream
                .write_all(line.as_bytes())
                .and_then(|()| stream.write_all(b"\n"))
                .is_ok();
        }
        ok &= self.stream.lock().flush().is_ok();
        self.emitting.store(false, Ordering::Release);
        ok
    }

    /// Replay queued records into `handlers`, in order, then empty the queue.
    ///
    /// The deferred handler itself is skipped if present in `handlers`. An
    /// empty slice discards the queue. The exit flush is deregistered, since
    /// nothing is left for it to write.
    pub fn sync(&self, handlers: &[Arc<dyn FemtoHandlerTrait>]) {
        self.deregister_exit_flush();
        while let Some(record) = self.dequeue() {
            for handler in handlers {
                if same_handler(handler.as_ref(), self) {
                    continue;
                }
                if let Err(err) = handler.handle(record.clone()) {
                    log::debug!("FemtoDeferredHandler: replay to handler failed: {err}");
                }
            }
        }
    }
}

impl FemtoHandlerTrait for FemtoDeferredHandler {
    fn handle(&self, record: FemtoLogRecord) -> Result<(), HandlerError> {
        if self.core.is_enabled_for(record.level()) {
            self.enqueue(record);
        }
        Ok(())
    }

    fn flush(&self) -> bool {
        self.flush_to_stream()
    }

    fn close(&self) {
        self.deregister_exit_flush();
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

impl Drop for FemtoDeferredHandler {
    fn drop(&mut self) {
        self.deregister_exit_flush();
    }
}

impl fmt::Debug for FemtoDeferredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FemtoDeferredHandler")
            .field("max_size", &self.max_size)
            .field("queued", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "deferred_handler_tests.rs"]
mod tests;
