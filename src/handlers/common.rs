//! State and builder options shared by every handler.
//!
//! [`HandlerCore`] owns the level gate and the formatter slot. The slot
//! always holds a [`ConditionalExceptionFormatter`] so tagged tracebacks are
//! shown or hidden according to the handler's own level.

use std::sync::atomic::{AtomicU16, Ordering};

use parking_lot::RwLock;

use super::HandlerBuildError;
use crate::formatter::{ConditionalExceptionFormatter, FemtoFormatter, SharedFormatter};
use crate::level::FemtoLevel;
use crate::log_record::FemtoLogRecord;

#[derive(Debug)]
pub struct HandlerCore {
    level: AtomicU16,
    formatter: RwLock<ConditionalExceptionFormatter>,
}

impl HandlerCore {
    pub fn new(level: FemtoLevel, formatter: SharedFormatter) -> Self {
        Self {
            level: AtomicU16::new(level.value()),
            formatter: RwLock::new(ConditionalExceptionFormatter::new(formatter)),
        }
    }

    pub fn level(&self) -> FemtoLevel {
        FemtoLevel::from_value(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: FemtoLevel) {
        self.level.store(level.value(), Ordering::Relaxed);
    }

    /// Whether a record at `level` passes this handler's gate.
    pub fn is_enabled_for(&self, level: FemtoLevel) -> bool {
        self.level().allows(level)
    }

    /// Render `record` for this handler, including tagged tracebacks when
    /// the handler level qualifies.
    pub fn format(&self, record: &FemtoLogRecord) -> String {
        self.formatter.read().format_at(record, self.level())
    }

    /// Render only the base text, without any tagged traceback.
    pub fn format_base(&self, record: &FemtoLogRecord) -> String {
        self.formatter.read().base().format(record)
    }

    /// Tagged traceback text visible to this handler, if any.
    pub fn visible_traceback(&self, record: &FemtoLogRecord) -> Option<String> {
        self.formatter
            .read()
            .visible_traceback(record, self.level())
    }

    pub fn set_formatter(&self, formatter: SharedFormatter) {
        self.formatter.write().set_base(formatter);
    }

    pub fn formatter(&self) -> SharedFormatter {
        self.formatter.read().base().clone()
    }

    /// Widen the base formatter's name column; see
    /// [`FemtoFormatter::widen_name_field`].
    pub fn widen_name_field(&self, width: usize) -> bool {
        let mut slot = self.formatter.write();
        match slot.base().widen_name_field(width) {
            Some(widened) => {
                slot.set_base(widened);
                true
            }
            None => false,
        }
    }
}

/// Options understood by every handler builder.
#[derive(Clone, Debug, Default)]
pub struct CommonBuilder {
    pub(crate) level: Option<FemtoLevel>,
    pub(crate) formatter: Option<SharedFormatter>,
}

impl CommonBuilder {
    pub(crate) fn set_level(&mut self, level: FemtoLevel) {
        self.level = Some(level);
    }

    pub(crate) fn set_formatter<F>(&mut self, formatter: F)
    where
        F: FemtoFormatter + 'static,
    {
        self.formatter = Some(SharedFormatter::new(formatter));
    }

    /// Build the core, falling back to `default_level` and `default_formatter`.
    pub(crate) fn core_with<F>(&self, default_level: FemtoLevel, default_formatter: F) -> HandlerCore
    where
        F: FemtoFormatter + 'static,
    {
        let formatter = self
            .formatter
            .clone()
            .unwrap_or_else(|| SharedFormatter::new(default_formatter));
        HandlerCore::new(self.level.unwrap_or(default_level), formatter)
    }

    /// Validate that an optional numeric field (if provided) is greater than zero.
    ///
    /// Returns `InvalidConfig("{field} must be greater than zero")` when `value`
    /// is `Some(0)`.
    pub(crate) fn ensure_non_zero(field: &str, value: Option<u64>) -> Result<(), HandlerBuildError> {
        match value {
            Some(0) => Err(HandlerBuildError::InvalidConfig(format!(
                "{field} must be greater than zero",
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{DefaultFormatter, PercentFormatter};

    #[test]
    fn gate_follows_level_updates() {
        let core = HandlerCore::new(FemtoLevel::INFO, SharedFormatter::new(DefaultFormatter));
        assert!(!core.is_enabled_for(FemtoLevel::DEBUG));
        core.set_level(FemtoLevel::DEBUG);
        assert!(core.is_enabled_for(FemtoLevel::DEBUG));
    }

    #[test]
    fn widening_replaces_formatter_in_place() {
        let core = HandlerCore::new(
            FemtoLevel::ALL,
            SharedFormatter::new(PercentFormatter::new("%(name)-4s|%(message)s")),
        );
        assert!(core.widen_name_field(6));
        assert!(!core.widen_name_field(6));
        let record = FemtoLogRecord::new("ab", FemtoLevel::INFO, "m");
        assert_eq!(core.format(&record), "ab    |m");
    }

    #[test]
    fn ensure_non_zero_rejects_zero() {
        let err = CommonBuilder::ensure_non_zero("max_size", Some(0)).unwrap_err();
        assert!(matches!(err, HandlerBuildError::InvalidConfig(msg) if msg.contains("max_size")));
        assert!(CommonBuilder::ensure_non_zero("max_size", None).is_ok());
    }
}
