//! Log record representation.
//!
//! A [`FemtoLogRecord`] is immutable once created apart from its exception
//! cell. Handlers receive clones; clones share the same [`ExceptionCell`] so
//! the traceback is rendered once no matter how many handlers display it.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::exception_schema::ExceptionInfo;
use crate::level::FemtoLevel;

/// Value attached to a record as an extra field.
#[derive(Clone, Debug)]
pub enum ExtraValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<ExtraValue>),
    Map(BTreeMap<String, ExtraValue>),
    /// A value with no wire representation; encoders fall back to its
    /// `Debug` text.
    Opaque(Arc<dyn fmt::Debug + Send + Sync>),
}

impl ExtraValue {
    /// `Debug`-style text used when a wire format cannot carry the value.
    pub fn repr(&self) -> String {
        match self {
            ExtraValue::Opaque(inner) => format!("{inner:?}"),
            ExtraValue::Bytes(bytes) => format!("b{:?}", String::from_utf8_lossy(bytes)),
            ExtraValue::Float(f) => format!("{f:?}"),
            other => format!("{other:?}"),
        }
    }

    /// Plain text used by the percent formatter.
    pub fn display_text(&self) -> Cow<'_, str> {
        match self {
            ExtraValue::Null => Cow::Borrowed("None"),
            ExtraValue::Bool(b) => Cow::Borrowed(if *b { "True" } else { "False" }),
            ExtraValue::Int(i) => Cow::Owned(i.to_string()),
            ExtraValue::Float(f) => Cow::Owned(f.to_string()),
            ExtraValue::Str(s) => Cow::Borrowed(s),
            other => Cow::Owned(other.repr()),
        }
    }
}

macro_rules! extra_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for ExtraValue {
            fn from(value: $ty) -> Self {
                ExtraValue::$variant(value.into())
            }
        })*
    };
}

extra_from!(
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f64 => Float,
    String => Str,
    &str => Str,
    Vec<u8> => Bytes,
);

/// Shared exception state for a record and all of its clones.
///
/// The raw exception is dropped once the traceback has been rendered so it
/// never travels further than the first handler that needed it.
#[derive(Debug)]
pub struct ExceptionCell {
    state: Mutex<ExceptionState>,
}

#[derive(Debug)]
struct ExceptionState {
    raw: Option<Box<dyn ExceptionInfo>>,
    rendered: Option<Arc<[u8]>>,
}

impl ExceptionCell {
    pub fn new(info: Box<dyn ExceptionInfo>) -> Self {
        Self {
            state: Mutex::new(ExceptionState {
                raw: Some(info),
                rendered: None,
            }),
        }
    }

    /// Return the rendered traceback, rendering it on first use.
    ///
    /// Returns `None` only if the raw exception was already released
    /// without a successful render.
    pub fn rendered(&self) -> Option<Arc<[u8]>> {
        let mut state = self.state.lock();
        if let Some(cached) = &state.rendered {
            return Some(Arc::clone(cached));
        }
        let raw = state.raw.as_ref()?;
        let text: Arc<[u8]> = Arc::from(raw.render());
        state.rendered = Some(Arc::clone(&text));
        Some(text)
    }

    /// Cached traceback without triggering a render.
    pub fn cached(&self) -> Option<Arc<[u8]>> {
        self.state.lock().rendered.clone()
    }

    /// Drop the raw exception, keeping any rendered text.
    pub fn release_raw(&self) {
        self.state.lock().raw = None;
    }

    /// Whether the raw exception is still held.
    pub fn holds_raw(&self) -> bool {
        self.state.lock().raw.is_some()
    }
}

/// Contextual metadata captured when a record is created.
#[derive(Clone, Debug)]
pub struct RecordMetadata {
    /// Module path where the log call originated.
    pub module_path: String,
    /// Source file name for the log call.
    pub filename: String,
    /// Line number in the source file.
    pub line_number: u32,
    /// Time the record was created.
    pub timestamp: SystemTime,
    /// ID of the process that created the record.
    pub process_id: u32,
    /// ID of the thread that created the record.
    pub thread_id: ThreadId,
    /// Name of the thread that created the record (if any).
    pub thread_name: Option<String>,
    /// Extra fields attached by the caller.
    pub key_values: BTreeMap<String, ExtraValue>,
}

impl Default for RecordMetadata {
    fn default() -> Self {
        let current = thread::current();
        Self {
            module_path: String::new(),
            filename: String::new(),
            line_number: 0,
            timestamp: SystemTime::now(),
            process_id: std::process::id(),
            thread_id: current.id(),
            thread_name: current.name().map(ToString::to_string),
            key_values: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FemtoLogRecord {
    logger: String,
    level: FemtoLevel,
    message: String,
    args: Vec<String>,
    /// Contextual metadata for the record.
    pub metadata: RecordMetadata,
    exception: Option<Arc<ExceptionCell>>,
    exception_visible_at_level: Option<FemtoLevel>,
}

impl FemtoLogRecord {
    /// Construct a new log record from logger `name`, `level`, and `message`.
    pub fn new(logger: &str, level: FemtoLevel, message: &str) -> Self {
        Self {
            logger: logger.to_owned(),
            level,
            message: message.to_owned(),
            args: Vec::new(),
            metadata: RecordMetadata::default(),
            exception: None,
            exception_visible_at_level: None,
        }
    }

    /// Replace the metadata, keeping the runtime fields captured by `new`.
    pub fn with_metadata(mut self, metadata: RecordMetadata) -> Self {
        let runtime = std::mem::replace(&mut self.metadata, metadata);
        self.metadata.timestamp = runtime.timestamp;
        self.metadata.process_id = runtime.process_id;
        self.metadata.thread_id = runtime.thread_id;
        self.metadata.thread_name = runtime.thread_name;
        self
    }

    /// Attach positional arguments substituted into `%s` placeholders.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Attach an extra key-value field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<ExtraValue>) -> Self {
        self.metadata.key_values.insert(key.into(), value.into());
        self
    }

    /// Attach an exception shown by every formatter.
    pub fn with_exception(mut self, info: impl ExceptionInfo + 'static) -> Self {
        self.exception = Some(Arc::new(ExceptionCell::new(Box::new(info))));
        self.exception_visible_at_level = None;
        self
    }

    /// Attach an exception shown only by handlers enabled for `level`.
    pub fn with_exception_on_level(
        mut self,
        info: impl ExceptionInfo + 'static,
        level: FemtoLevel,
    ) -> Self {
        self.exception = Some(Arc::new(ExceptionCell::new(Box::new(info))));
        self.exception_visible_at_level = Some(level);
        self
    }

    /// Attach an already boxed exception, tagged with `level` if given.
    pub fn with_boxed_exception(
        mut self,
        info: Box<dyn ExceptionInfo>,
        level: Option<FemtoLevel>,
    ) -> Self {
        self.exception = Some(Arc::new(ExceptionCell::new(info)));
        self.exception_visible_at_level = level;
        self
    }

    pub fn logger(&self) -> &str {
        &self.logger
    }

    pub fn level(&self) -> FemtoLevel {
        self.level
    }

    /// Level name for display, e.g. `INFO`.
    pub fn level_str(&self) -> String {
        self.level.to_string()
    }

    /// The message template before argument substitution.
    pub fn raw_message(&self) -> &str {
        &self.message
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The message with `%s` placeholders replaced by `args` in order.
    ///
    /// `%%` yields a literal percent sign. Placeholders without a matching
    /// argument are kept; surplus arguments are appended space separated.
    pub fn message(&self) -> Cow<'_, str> {
        if self.args.is_empty() {
            return Cow::Borrowed(&self.message);
        }
        let mut out = String::with_capacity(self.message.len() + 16);
        let mut args = self.args.iter();
        let mut chars = self.message.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.peek() {
                Some('%') => {
                    chars.next();
                    out.push('%');
                }
                Some('s') => {
                    chars.next();
                    match args.next() {
                        Some(arg) => out.push_str(arg),
                        None => out.push_str("%s"),
                    }
                }
                _ => out.push('%'),
            }
        }
        for extra in args {
            out.push(' ');
            out.push_str(extra);
        }
        Cow::Owned(out)
    }

    pub fn exception(&self) -> Option<&Arc<ExceptionCell>> {
        self.exception.as_ref()
    }

    pub fn exception_visible_at_level(&self) -> Option<FemtoLevel> {
        self.exception_visible_at_level
    }

    /// Exception rendered by every formatter, i.e. one with no level tag.
    pub fn unconditional_exception(&self) -> Option<&Arc<ExceptionCell>> {
        match self.exception_visible_at_level {
            None => self.exception.as_ref(),
            Some(_) => None,
        }
    }
}

impl fmt::Display for FemtoLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.level, self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception_schema::RenderedTraceback;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingInfo(Arc<AtomicUsize>);

    impl ExceptionInfo for CountingInfo {
        fn render(&self) -> Vec<u8> {
            self.0.fetch_add(1, Ordering::SeqCst);
            b"Traceback".to_vec()
        }
    }

    #[test]
    fn substitutes_args_in_order() {
        let record = FemtoLogRecord::new("salt.minion", FemtoLevel::INFO, "%s returned %s (100%%)")
            .with_args(["test.ping", "True"]);
        assert_eq!(record.message(), "test.ping returned True (100%)");
    }

    #[test]
    fn keeps_unmatched_placeholders_and_appends_surplus() {
        let short = FemtoLogRecord::new("a", FemtoLevel::INFO, "%s and %s").with_args(["one"]);
        assert_eq!(short.message(), "one and %s");
        let long = FemtoLogRecord::new("a", FemtoLevel::INFO, "%s").with_args(["one", "two"]);
        assert_eq!(long.message(), "one two");
    }

    #[test]
    fn clones_share_exception_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let record = FemtoLogRecord::new("a", FemtoLevel::ERROR, "boom")
            .with_exception(CountingInfo(Arc::clone(&calls)));
        let copy = record.clone();
        record.exception().unwrap().rendered();
        copy.exception().unwrap().rendered();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_keeps_rendered_text() {
        let cell = ExceptionCell::new(Box::new(RenderedTraceback(b"tb".to_vec())));
        assert!(cell.cached().is_none());
        cell.rendered();
        cell.release_raw();
        assert!(!cell.holds_raw());
        assert_eq!(cell.rendered().as_deref(), Some(&b"tb"[..]));
    }

    #[test]
    fn tagged_exception_is_not_unconditional() {
        let record = FemtoLogRecord::new("a", FemtoLevel::ERROR, "boom")
            .with_exception_on_level(RenderedTraceback(Vec::new()), FemtoLevel::DEBUG);
        assert!(record.unconditional_exception().is_none());
        assert_eq!(record.exception_visible_at_level(), Some(FemtoLevel::DEBUG));
    }
}
