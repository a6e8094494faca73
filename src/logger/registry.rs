//! Explicit factory mapping logger names to instances.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::{FemtoLogger, LoggingError};
use crate::formatter::MAX_NAME_WIDTH;
use crate::level::FemtoLevel;

/// Name under which the root logger is returned.
pub const ROOT_LOGGER_NAME: &str = "root";

/// Owns every logger of a pipeline.
///
/// Created once at startup and passed to whatever needs loggers. The root
/// logger starts at `WARNING`; other loggers inherit until a level is set.
pub struct LoggerRegistry {
    root: Arc<FemtoLogger>,
    loggers: RwLock<HashMap<String, Arc<FemtoLogger>>>,
    name_width: AtomicUsize,
}

impl Default for LoggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_name(name: &str) -> Result<(), LoggingError> {
    if name.is_empty() || name.split('.').any(str::is_empty) {
        return Err(LoggingError::InvalidLoggerName(name.to_owned()));
    }
    Ok(())
}

impl LoggerRegistry {
    pub fn new() -> Self {
        let root = FemtoLogger::new(ROOT_LOGGER_NAME);
        root.set_level(FemtoLevel::WARNING);
        Self {
            root: Arc::new(root),
            loggers: RwLock::new(HashMap::new()),
            name_width: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> Arc<FemtoLogger> {
        Arc::clone(&self.root)
    }

    /// Return the logger called `name`, creating it and any missing dotted
    /// ancestors. `"root"` returns the root logger.
    ///
    /// Creating a logger whose name is longer than any seen so far widens
    /// the `%(name)-Ns` column of every attached handler, up to
    /// [`MAX_NAME_WIDTH`].
    pub fn get_logger(&self, name: &str) -> Result<Arc<FemtoLogger>, LoggingError> {
        validate_name(name)?;
        if name == ROOT_LOGGER_NAME {
            return Ok(self.root());
        }
        if let Some(existing) = self.loggers.read().get(name) {
            return Ok(Arc::clone(existing));
        }
        let logger = {
            let mut loggers = self.loggers.write();
            let mut parent = self.root();
            let mut end = 0;
            loop {
                end = name[end..].find('.').map_or(name.len(), |pos| end + pos);
                let prefix = &name[..end];
                let logger = loggers
                    .entry(prefix.to_owned())
                    .or_insert_with(|| {
                        Arc::new(FemtoLogger::with_parent(prefix, Some(Arc::clone(&parent))))
                    })
                    .clone();
                if end == name.len() {
                    break logger;
                }
                parent = logger;
                end += 1;
            }
        };
        self.note_name(name);
        Ok(logger)
    }

    fn note_name(&self, name: &str) {
        let width = name.chars().count().min(MAX_NAME_WIDTH);
        if self.name_width.fetch_max(width, Ordering::AcqRel) < width {
            self.align_handlers();
        }
    }

    /// Longest registered logger name, capped at [`MAX_NAME_WIDTH`].
    pub fn name_width(&self) -> usize {
        self.name_width.load(Ordering::Acquire)
    }

    /// Widen every attached handler's name column to [`name_width`]. Run
    /// this after attaching new handlers. Returns how many handlers changed.
    ///
    /// [`name_width`]: Self::name_width
    pub fn align_handlers(&self) -> usize {
        let width = self.name_width();
        if width == 0 {
            return 0;
        }
        self.all_loggers()
            .iter()
            .flat_map(|logger| logger.handlers())
            .filter(|handler| handler.widen_name_field(width))
            .count()
    }

    fn all_loggers(&self) -> Vec<Arc<FemtoLogger>> {
        let mut all = vec![self.root()];
        all.extend(self.loggers.read().values().cloned());
        all
    }

    /// Names of every logger created so far, sorted, excluding the root.
    pub fn logger_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loggers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Apply per-logger levels, creating loggers as needed.
    pub fn set_levels(&self, levels: &BTreeMap<String, FemtoLevel>) -> Result<(), LoggingError> {
        for (name, level) in levels {
            self.get_logger(name)?.set_level(*level);
        }
        Ok(())
    }

    /// Flush the handlers of every logger.
    pub fn flush_all(&self) -> bool {
        self.all_loggers()
            .iter()
            .fold(true, |ok, logger| logger.flush_handlers() && ok)
    }
}

impl std::fmt::Debug for LoggerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerRegistry")
            .field("loggers", &self.loggers.read().len())
            .field("name_width", &self.name_width())
            .finish()
    }
}
