//! Bootstrap-to-configured lifecycle of the root logger's handlers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use parking_lot::Mutex;

use super::{ConfigError, PipelineConfig};
use crate::deferred_handler::FemtoDeferredHandler;
use crate::handler::FemtoHandlerTrait;
use crate::handlers::DeferredHandlerBuilder;
use crate::level::FemtoLevel;
use crate::lifecycle::ExitHooks;
use crate::logger::LoggerRegistry;

/// Owns the handlers attached to a registry's root logger.
///
/// [`bootstrap`](Self::bootstrap) installs a [`FemtoDeferredHandler`] so
/// nothing logged before configuration is lost.
/// [`configure`](Self::configure) replaces it with the configured handlers,
/// replaying the queued records into them, and
/// [`shutdown`](Self::shutdown) stops and detaches everything.
pub struct LoggingPipeline {
    registry: Arc<LoggerRegistry>,
    hooks: Arc<ExitHooks>,
    deferred: Mutex<Option<Arc<FemtoDeferredHandler>>>,
    handlers: Mutex<Vec<Arc<dyn FemtoHandlerTrait>>>,
    lowest_level: Mutex<Option<FemtoLevel>>,
    shut_down: AtomicBool,
}

impl LoggingPipeline {
    /// Install a deferred handler holding up to `max_size` records, flushed
    /// to `stderr` by the global exit hooks if configuration never happens.
    pub fn bootstrap(registry: Arc<LoggerRegistry>, max_size: usize) -> Result<Self, ConfigError> {
        Self::bootstrap_with(
            registry,
            DeferredHandlerBuilder::new().with_max_size(max_size),
            ExitHooks::global(),
        )
    }

    /// [`bootstrap`](Self::bootstrap) with an explicit deferred handler and
    /// hook registry.
    ///
    /// The root logger is opened to `GARBAGE` so the deferred handler's own
    /// level decides what is kept.
    pub fn bootstrap_with(
        registry: Arc<LoggerRegistry>,
        deferred: DeferredHandlerBuilder,
        hooks: Arc<ExitHooks>,
    ) -> Result<Self, ConfigError> {
        let deferred = Arc::new(
            deferred
                .build_inner()
                .map_err(|source| ConfigError::HandlerBuild {
                    id: "deferred".into(),
                    source,
                })?,
        );
        deferred.register_exit_flush(&hooks);
        let root = registry.root();
        root.set_level(FemtoLevel::GARBAGE);
        root.add_handler(Arc::clone(&deferred) as Arc<dyn FemtoHandlerTrait>);
        registry.align_handlers();
        Ok(Self {
            registry,
            hooks,
            deferred: Mutex::new(Some(deferred)),
            handlers: Mutex::new(Vec::new()),
            lowest_level: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn registry(&self) -> &Arc<LoggerRegistry> {
        &self.registry
    }

    pub fn hooks(&self) -> &Arc<ExitHooks> {
        &self.hooks
    }

    /// The bootstrap handler, until [`configure`](Self::configure) succeeds.
    pub fn deferred(&self) -> Option<Arc<FemtoDeferredHandler>> {
        self.deferred.lock().clone()
    }

    pub fn is_configured(&self) -> bool {
        self.lowest_level.lock().is_some()
    }

    /// Root level chosen by the last configuration.
    pub fn lowest_level(&self) -> Option<FemtoLevel> {
        *self.lowest_level.lock()
    }

    /// Handlers attached by [`configure`](Self::configure).
    pub fn handlers(&self) -> Vec<Arc<dyn FemtoHandlerTrait>> {
        self.handlers.lock().clone()
    }

    /// Build every configured handler and hand the bootstrap queue over.
    ///
    /// Nothing is attached unless every handler builds; handlers already
    /// started for a failed configuration are closed again.
    pub fn configure(&self, config: &PipelineConfig) -> Result<(), ConfigError> {
        self.ensure_open()?;
        if self.is_configured() {
            return Err(ConfigError::AlreadyConfigured);
        }
        let mut built: Vec<Arc<dyn FemtoHandlerTrait>> = Vec::new();
        for (id, handler) in config.all_handlers() {
            match handler.build(&id, &self.hooks) {
                Ok(handler) => built.push(handler),
                Err(err) => {
                    built.iter().for_each(|h| h.close());
                    return Err(err);
                }
            }
        }
        self.activate(built, &config.granular_levels)
    }

    /// Attach already built `handlers` as the pipeline's destinations.
    ///
    /// Detaches the deferred handler and replays its queue into `handlers`,
    /// then attaches them, applies `levels` and sets the root level to the
    /// most verbose of the handler and logger levels.
    pub fn activate(
        &self,
        handlers: Vec<Arc<dyn FemtoHandlerTrait>>,
        levels: &BTreeMap<String, FemtoLevel>,
    ) -> Result<(), ConfigError> {
        self.ensure_open()?;
        let mut lowest_slot = self.lowest_level.lock();
        if lowest_slot.is_some() {
            return Err(ConfigError::AlreadyConfigured);
        }
        if let Err(err) = self.registry.set_levels(levels) {
            handlers.iter().for_each(|h| h.close());
            return Err(err.into());
        }
        let lowest = handlers
            .iter()
            .map(|h| h.level())
            .chain(levels.values().copied())
            .min()
            .unwrap_or_else(|| FemtoLevel::from_config(None));

        // Replay before attaching so bootstrap records precede live ones.
        let root = self.registry.root();
        if let Some(deferred) = self.deferred.lock().take() {
            root.remove_handler(&(Arc::clone(&deferred) as Arc<dyn FemtoHandlerTrait>));
            debug!("replaying {} bootstrap records", deferred.len());
            deferred.sync(&handlers);
        }
        for handler in &handlers {
            root.add_handler(Arc::clone(handler));
        }
        root.set_level(lowest);
        self.registry.align_handlers();
        *self.handlers.lock() = handlers;
        *lowest_slot = Some(lowest);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), ConfigError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ConfigError::ShutDown);
        }
        Ok(())
    }

    /// Stop and detach every handler. A deferred handler still in place is
    /// flushed to its raw stream first. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let root = self.registry.root();
        if let Some(deferred) = self.deferred.lock().take() {
            deferred.flush();
            deferred.close();
            root.remove_handler(&(deferred as Arc<dyn FemtoHandlerTrait>));
        }
        for handler in self.handlers.lock().drain(..) {
            handler.flush();
            handler.close();
            root.remove_handler(&handler);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for LoggingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingPipeline")
            .field("configured", &self.is_configured())
            .field("handlers", &self.handlers.lock().len())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
