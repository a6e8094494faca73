//! A simple handler that accumulates records in memory for test assertions.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handler::{FemtoHandlerTrait, HandlerError};
use crate::handlers::HandlerCore;
use crate::formatter::{DefaultFormatter, SharedFormatter};
use crate::level::FemtoLevel;
use crate::log_record::FemtoLogRecord;

/// Handler that stores every record passing its level, along with the
/// text its formatter produced.
#[derive(Clone)]
pub struct CollectingHandler {
    core: Arc<HandlerCore>,
    records: Arc<Mutex<Vec<(FemtoLogRecord, String)>>>,
}

impl Default for CollectingHandler {
    fn default() -> Self {
        Self::with_level(FemtoLevel::ALL)
    }
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: FemtoLevel) -> Self {
        Self {
            core: Arc::new(HandlerCore::new(level, SharedFormatter::new(DefaultFormatter))),
            records: Arc::default(),
        }
    }

    pub fn core(&self) -> &HandlerCore {
        &self.core
    }

    /// Return a snapshot of all records received so far.
    pub fn collected(&self) -> Vec<FemtoLogRecord> {
        self.records.lock().iter().map(|(record, _)| record.clone()).collect()
    }

    /// Raw messages in arrival order.
    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|(record, _)| record.message().into_owned())
            .collect()
    }

    /// Formatted output in arrival order.
    pub fn lines(&self) -> Vec<String> {
        self.records.lock().iter().map(|(_, line)| line.clone()).collect()
    }
}

impl FemtoHandlerTrait for CollectingHandler {
    fn handle(&self, record: FemtoLogRecord) -> Result<(), HandlerError> {
        if self.core.is_enabled_for(record.level()) {
            let line = self.core.format(&record);
            self.records.lock().push((record, line));
        }
        Ok(())
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
