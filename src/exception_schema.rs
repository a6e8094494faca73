//! Structured exception payloads attached to log records.
//!
//! A record carries its exception as an opaque [`ExceptionInfo`] so callers
//! can plug in whatever traceback source they have. [`ExceptionPayload`] is
//! the stock implementation; it can be built by hand or captured from a
//! [`std::error::Error`] and its `source()` chain.
//!
//! # Example
//!
//! ```rust
//! use femtorelay::exception_schema::{ExceptionInfo, ExceptionPayload, StackFrame};
//!
//! let mut payload = ExceptionPayload::new("ValueError", "invalid input");
//! payload.frames.push(StackFrame::new("states/pkg.rs", 42, "install"));
//! let text = String::from_utf8(payload.render()).unwrap();
//! assert!(text.ends_with("ValueError: invalid input\n"));
//! ```

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::formatter::format_exception_payload;

/// Source of a rendered traceback.
///
/// `render` may be expensive; the pipeline calls it at most once per record
/// regardless of how many handlers display the result. The output is raw
/// bytes because traceback sources are not always valid UTF-8.
pub trait ExceptionInfo: Send + Sync + fmt::Debug {
    /// Render the full traceback text.
    fn render(&self) -> Vec<u8>;
}

/// A single frame in a captured stack.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Source filename where the frame originated.
    pub filename: String,
    /// Line number within `filename`.
    pub lineno: u32,
    /// Function or method name.
    pub function: String,
    /// Source line, if available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<String>,
}

impl StackFrame {
    /// Create a frame without source text.
    pub fn new(filename: impl Into<String>, lineno: u32, function: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            lineno,
            function: function.into(),
            source_line: None,
        }
    }
}

/// Exception captured for display in a traceback.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionPayload {
    /// Exception type name.
    pub type_name: String,
    /// Module that defines the type, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Display text of the exception.
    pub message: String,
    /// Frames from outermost to innermost.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<StackFrame>,
    /// Explicit cause (`raise ... from ...` or `Error::source`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ExceptionPayload>>,
    /// Exception being handled when this one was raised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Box<ExceptionPayload>>,
    /// Hide `context` when rendering.
    #[serde(default)]
    pub suppress_context: bool,
    /// Free-form notes appended after the header.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ExceptionPayload {
    /// Create a payload with a type name and message.
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Capture an error and its `source()` chain.
    ///
    /// The innermost source becomes the root of the `cause` chain so the
    /// rendering reads oldest first.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let mut chain: Vec<&(dyn Error + 'static)> = vec![err];
        let mut current = err.source();
        while let Some(source) = current {
            chain.push(source);
            current = source.source();
        }

        let mut payload: Option<ExceptionPayload> = None;
        for item in chain.into_iter().rev() {
            let mut next = ExceptionPayload::new(short_type_name(item), item.to_string());
            next.cause = payload.map(Box::new);
            payload = Some(next);
        }
        payload.unwrap_or_default()
    }
}

impl ExceptionInfo for ExceptionPayload {
    fn render(&self) -> Vec<u8> {
        format_exception_payload(self).into_bytes()
    }
}

/// Pre-rendered traceback bytes, for sources that already hold the text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedTraceback(pub Vec<u8>);

impl ExceptionInfo for RenderedTraceback {
    fn render(&self) -> Vec<u8> {
        self.0.clone()
    }
}

fn short_type_name(err: &dyn Error) -> String {
    // `Debug` output starts with the type or variant name for derived impls.
    let debug = format!("{err:?}");
    let end = debug
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
        .unwrap_or(debug.len());
    match &debug[..end] {
        "" => "Error".to_owned(),
        name => name.rsplit("::").next().unwrap_or(name).to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, thiserror::Error)]
    #[error("state run failed")]
    struct StateFailure {
        #[source]
        source: io::Error,
    }

    #[test]
    fn captures_source_chain_oldest_first() {
        let err = StateFailure {
            source: io::Error::new(io::ErrorKind::NotFound, "missing file"),
        };
        let payload = ExceptionPayload::from_error(&err);
        assert_eq!(payload.type_name, "StateFailure");
        assert_eq!(payload.message, "state run failed");
        let cause = payload.cause.as_ref().expect("cause");
        assert_eq!(cause.message, "missing file");
        assert!(cause.cause.is_none());
    }

    #[test]
    fn rendered_traceback_is_passthrough() {
        let tb = RenderedTraceback(b"Traceback\n".to_vec());
        assert_eq!(tb.render(), b"Traceback\n");
    }

    #[test]
    fn payload_round_trips_through_json() {
        let mut payload = ExceptionPayload::new("KeyError", "'jid'");
        payload.frames.push(StackFrame::new("minion.rs", 7, "run"));
        let json = serde_json::to_string(&payload).unwrap();
        let decoded: ExceptionPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, payload);
    }
}
