//! Logging macros that record the call site.
//!
//! Each macro fills `module_path!()`, `file!()` and `line!()` into the
//! record's [`RecordMetadata`] and returns whether the record was
//! dispatched. The `femtolog_` prefix keeps them apart from the `log`
//! crate's macros, which the pipeline uses for its own diagnostics.
//!
//! ```rust,ignore
//! use femtorelay::LoggerRegistry;
//!
//! let registry = LoggerRegistry::new();
//! let logger = registry.get_logger("app.http")?;
//! femtolog_info!(logger, "listening on port {}", 8080);
//! femtolog_trace!(logger, "accept loop idle");
//! ```
//!
//! [`RecordMetadata`]: crate::log_record::RecordMetadata

/// Log at `GARBAGE`, the most verbose level.
#[macro_export]
macro_rules! femtolog_garbage {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__femtolog_impl!($logger, $crate::FemtoLevel::GARBAGE, $($arg)+)
    };
}

/// Log at `TRACE`.
#[macro_export]
macro_rules! femtolog_trace {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__femtolog_impl!($logger, $crate::FemtoLevel::TRACE, $($arg)+)
    };
}

/// Log at `DEBUG`.
///
/// ```rust,ignore
/// femtolog_debug!(logger, "entering handler");
/// femtolog_debug!(logger, "request id = {}", request_id);
/// ```
#[macro_export]
macro_rules! femtolog_debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__femtolog_impl!($logger, $crate::FemtoLevel::DEBUG, $($arg)+)
    };
}

/// Log at `PROFILE`, between `DEBUG` and `INFO`.
#[macro_export]
macro_rules! femtolog_profile {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__femtolog_impl!($logger, $crate::FemtoLevel::PROFILE, $($arg)+)
    };
}

#[macro_export]
macro_rules! femtolog_info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__femtolog_impl!($logger, $crate::FemtoLevel::INFO, $($arg)+)
    };
}

#[macro_export]
macro_rules! femtolog_warning {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__femtolog_impl!($logger, $crate::FemtoLevel::WARNING, $($arg)+)
    };
}

#[macro_export]
macro_rules! femtolog_error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__femtolog_impl!($logger, $crate::FemtoLevel::ERROR, $($arg)+)
    };
}

#[macro_export]
macro_rules! femtolog_critical {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__femtolog_impl!($logger, $crate::FemtoLevel::CRITICAL, $($arg)+)
    };
}

/// Shared expansion of the level macros.
///
/// A lone message expression is passed through unformatted so `%s`
/// templates and literal braces survive; anything else goes through
/// `format!`.
#[doc(hidden)]
#[macro_export]
macro_rules! __femtolog_impl {
    ($logger:expr, $level:expr, $message:expr) => {{
        let metadata = $crate::__femtolog_metadata!();
        $logger.log_with_metadata($level, $message, metadata)
    }};
    ($logger:expr, $level:expr, $fmt:expr, $($arg:tt)+) => {{
        let metadata = $crate::__femtolog_metadata!();
        $logger.log_with_metadata($level, &::std::format!($fmt, $($arg)+), metadata)
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __femtolog_metadata {
    () => {
        $crate::RecordMetadata {
            module_path: ::std::string::String::from(::std::module_path!()),
            filename: ::std::string::String::from(::std::file!()),
            line_number: ::std::line!(),
            ..::std::default::Default::default()
        }
    };
}
