use std::sync::Arc;

use super::FemtoLogger;
use crate::level::FemtoLevel;

/// One method per named severity.
///
/// Implementors provide [`log_at`](Self::log_at); every other method
/// forwards to it. Each returns whether the record was dispatched.
pub trait SeverityMethods {
    fn log_at(&self, level: FemtoLevel, message: &str) -> bool;

    fn garbage(&self, message: &str) -> bool {
        self.log_at(FemtoLevel::GARBAGE, message)
    }

    fn trace(&self, message: &str) -> bool {
        self.log_at(FemtoLevel::TRACE, message)
    }

    fn debug(&self, message: &str) -> bool {
        self.log_at(FemtoLevel::DEBUG, message)
    }

    fn profile(&self, message: &str) -> bool {
        self.log_at(FemtoLevel::PROFILE, message)
    }

    fn info(&self, message: &str) -> bool {
        self.log_at(FemtoLevel::INFO, message)
    }

    fn warning(&self, message: &str) -> bool {
        self.log_at(FemtoLevel::WARNING, message)
    }

    fn error(&self, message: &str) -> bool {
        self.log_at(FemtoLevel::ERROR, message)
    }

    fn critical(&self, message: &str) -> bool {
        self.log_at(FemtoLevel::CRITICAL, message)
    }
}

impl SeverityMethods for FemtoLogger {
    fn log_at(&self, level: FemtoLevel, message: &str) -> bool {
        self.log(level, message)
    }
}

impl<T: SeverityMethods + ?Sized> SeverityMethods for Arc<T> {
    fn log_at(&self, level: FemtoLevel, message: &str) -> bool {
        (**self).log_at(level, message)
    }
}
