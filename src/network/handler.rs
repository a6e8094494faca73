//! Handler that encodes records and forwards them through a sender.

use std::any::Any;
use std::fmt;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::formatter::{DefaultFormatter, SharedFormatter, decode_traceback};
use crate::handler::{FemtoHandlerTrait, HandlerError};
use crate::handlers::HandlerCore;
use crate::level::FemtoLevel;
use crate::lifecycle::{ExitHooks, HookId};
use crate::log_record::FemtoLogRecord;
use crate::rate_limited_warner::RateLimitedWarner;

use super::sender::RecordSender;
use super::serialise::{EncodeContext, WireFormat, detect_hostname};

/// Forwards records to a remote collector.
///
/// Delivery is synchronous: `handle` gates by level, checks for a fork,
/// encodes and hands the bytes to the sender. Sender failures never
/// surface to the caller.
pub struct FemtoNetworkHandler {
    core: HandlerCore,
    format: Box<dyn WireFormat>,
    sender: Box<dyn RecordSender>,
    host: String,
    exiting: AtomicBool,
    exit_hook: Mutex<Option<(Arc<ExitHooks>, HookId)>>,
    this: Weak<FemtoNetworkHandler>,
    warner: RateLimitedWarner,
}

impl FemtoNetworkHandler {
    pub fn new(format: Box<dyn WireFormat>, sender: Box<dyn RecordSender>) -> Arc<Self> {
        Self::with_core(
            HandlerCore::new(FemtoLevel::ALL, SharedFormatter::new(DefaultFormatter)),
            format,
            sender,
            None,
        )
    }

    pub(crate) fn with_core(
        core: HandlerCore,
        format: Box<dyn WireFormat>,
        sender: Box<dyn RecordSender>,
        host: Option<String>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            core,
            format,
            sender,
            host: host.unwrap_or_else(detect_hostname),
            exiting: AtomicBool::new(false),
            exit_hook: Mutex::new(None),
            this: this.clone(),
            warner: RateLimitedWarner::default(),
        })
    }

    pub fn core(&self) -> &HandlerCore {
        &self.core
    }

    pub fn sender(&self) -> &dyn RecordSender {
        self.sender.as_ref()
    }

    /// Connect the sender and register a flushing stop with `hooks`.
    ///
    /// Calling `start` again is a no-op apart from reconnecting a sender
    /// whose connection dropped.
    pub fn start(&self, hooks: &Arc<ExitHooks>) {
        self.exiting.store(false, Ordering::Release);
        self.sender.start();
        let mut slot = self.exit_hook.lock();
        if slot.is_some() {
            return;
        }
        let weak = self.this.clone();
        let id = hooks.register(move || {
            if let Some(handler) = weak.upgrade() {
                handler.stop(true);
            }
        });
        *slot = Some((Arc::clone(hooks), id));
    }

    /// Stop forwarding. Idempotent; later records are dropped.
    pub fn stop(&self, flush: bool) {
        if self.exiting.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some((hooks, id)) = self.exit_hook.lock().take() {
            hooks.deregister(id);
        }
        self.sender.stop(flush);
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    fn exception_text(&self, record: &FemtoLogRecord) -> Option<String> {
        if let Some(text) = self.core.visible_traceback(record) {
            return Some(text);
        }
        let cell = record.unconditional_exception()?;
        let rendered = cell.rendered()?;
        Some(decode_traceback(&rendered, None).into_owned())
    }
}

impl FemtoHandlerTrait for FemtoNetworkHandler {
    fn handle(&self, record: FemtoLogRecord) -> Result<(), HandlerError> {
        if !self.core.is_enabled_for(record.level()) {
            return Ok(());
        }
        if self.sender.reset_if_forked() {
            self.exiting.store(false, Ordering::Release);
        }
        if self.is_exiting() {
            self.warner.record_drop();
            return Ok(());
        }
        let exc_info = self.exception_text(&record);
        let ctx = EncodeContext {
            host: &self.host,
            exc_info: exc_info.as_deref(),
        };
        let payload = self.format.encode(&record, &ctx)?;
        self.sender.send(payload);
        Ok(())
    }

    /// Retry the sender's buffered data once.
    fn flush(&self) -> bool {
        !self.is_exiting() && self.sender.flush()
    }

    fn close(&self) {
        self.stop(true);
        self.warner.flush(|count| {
            log::warn!("FemtoNetworkHandler: {count} records arrived after stop");
        });
    }

    fn level(&self) -> FemtoLevel {
        self.core.level()
    }

    fn set_level(&self, level: FemtoLevel) {
        self.core.set_level(level);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for FemtoNetworkHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FemtoNetworkHandler")
            .field("format", &self.format)
            .field("sender", &self.sender)
            .field("exiting", &self.is_exiting())
            .finish_non_exhaustive()
    }
}
