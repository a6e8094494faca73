//! Wire formats for forwarded records.
//!
//! Both formats build the same field list and differ in envelope and
//! value encoding: MessagePack carries bytes and non-finite floats
//! natively, JSON falls back to the value's `Debug` text.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};
use rmp_serde::Serializer;
use serde::Serialize;
use serde::ser::{SerializeMap, SerializeSeq};

use crate::handler::HandlerError;
use crate::log_record::{ExtraValue, FemtoLogRecord};

/// Extra keys never copied into a payload.
pub const EXCLUDED_FIELDS: &[&str] = &[
    "args",
    "asctime",
    "bracketlevel",
    "bracketname",
    "bracketprocess",
    "created",
    "exc_info",
    "exc_text",
    "id",
    "levelname",
    "levelno",
    "msecs",
    "message",
    "msg",
    "relativeCreated",
    "version",
];

/// Per-record values supplied by the handler.
#[derive(Clone, Copy, Debug)]
pub struct EncodeContext<'a> {
    pub host: &'a str,
    /// Traceback text the handler is allowed to ship.
    pub exc_info: Option<&'a str>,
}

/// Encodes a record into the bytes handed to a sender.
pub trait WireFormat: Send + Sync + fmt::Debug {
    fn encode(&self, record: &FemtoLogRecord, ctx: &EncodeContext<'_>) -> Result<Vec<u8>, HandlerError>;
}

/// Stream framing for binary payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Framing {
    /// Big-endian `u32` length before each payload.
    #[default]
    LengthPrefixed,
    /// Payloads are written back to back.
    None,
}

/// Frame the payload with a big-endian length prefix.
pub fn frame_payload(payload: &[u8]) -> Option<Vec<u8>> {
    let len = u32::try_from(payload.len()).ok()?;
    let mut framed = Vec::with_capacity(payload.len().checked_add(4)?);
    framed.extend(len.to_be_bytes());
    framed.extend_from_slice(payload);
    Some(framed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    MsgPack,
    Json,
}

enum FieldValue<'a> {
    Str(Cow<'a, str>),
    UInt(u64),
    Extra(&'a ExtraValue),
    Nested(Fields<'a>),
}

struct Fields<'a> {
    target: Target,
    entries: Vec<(&'a str, FieldValue<'a>)>,
}

impl<'a> Fields<'a> {
    fn new(target: Target) -> Self {
        Self {
            target,
            entries: Vec::with_capacity(16),
        }
    }

    fn str(&mut self, key: &'a str, value: impl Into<Cow<'a, str>>) -> &mut Self {
        self.entries.push((key, FieldValue::Str(value.into())));
        self
    }

    fn uint(&mut self, key: &'a str, value: u64) -> &mut Self {
        self.entries.push((key, FieldValue::UInt(value)));
        self
    }

    /// Merge extras into the field list. An extra sharing a key with a
    /// fixed field takes that field's slot, so keys stay unique.
    fn extras(&mut self, extras: &'a BTreeMap<String, ExtraValue>) -> &mut Self {
        for (key, value) in extras {
            let key = key.as_str();
            if EXCLUDED_FIELDS.contains(&key) {
                continue;
            }
            match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = FieldValue::Extra(value),
                None => self.entries.push((key, FieldValue::Extra(value))),
            }
        }
        self
    }
}

impl Serialize for Fields<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            match value {
                FieldValue::Str(s) => map.serialize_entry(key, s)?,
                FieldValue::UInt(n) => map.serialize_entry(key, n)?,
                FieldValue::Extra(extra) => map.serialize_entry(
                    key,
                    &EncodedExtra {
                        target: self.target,
                        value: extra,
                    },
                )?,
                FieldValue::Nested(fields) => map.serialize_entry(key, fields)?,
            }
        }
        map.end()
    }
}

struct EncodedExtra<'a> {
    target: Target,
    value: &'a ExtraValue,
}

impl EncodedExtra<'_> {
    fn nested<'b>(&self, value: &'b ExtraValue) -> EncodedExtra<'b> {
        EncodedExtra {
            target: self.target,
            value,
        }
    }
}

impl Serialize for EncodedExtra<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            ExtraValue::Null => serializer.serialize_unit(),
            ExtraValue::Bool(b) => serializer.serialize_bool(*b),
            ExtraValue::Int(i) => serializer.serialize_i64(*i),
            ExtraValue::Float(f) if self.target == Target::Json && !f.is_finite() => {
                serializer.serialize_str(&self.value.repr())
            }
            ExtraValue::Float(f) => serializer.serialize_f64(*f),
            ExtraValue::Str(s) => serializer.serialize_str(s),
            ExtraValue::Bytes(bytes) => match self.target {
                Target::MsgPack => serializer.serialize_bytes(bytes),
                Target::Json => match std::str::from_utf8(bytes) {
                    Ok(text) => serializer.serialize_str(text),
                    Err(_) => serializer.serialize_str(&self.value.repr()),
                },
            },
            ExtraValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&self.nested(item))?;
                }
                seq.end()
            }
            ExtraValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, &self.nested(value))?;
                }
                map.end()
            }
            ExtraValue::Opaque(_) => serializer.serialize_str(&self.value.repr()),
        }
    }
}

fn iso_timestamp(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn thread_label(record: &FemtoLogRecord) -> Cow<'_, str> {
    match &record.metadata.thread_name {
        Some(name) => Cow::Borrowed(name.as_str()),
        None => Cow::Owned(format!("{:?}", record.metadata.thread_id)),
    }
}

fn level_name(record: &FemtoLogRecord) -> String {
    record.level_str()
}

/// Flat payload shared by logstash v1 and the fluent logstash payload.
fn flat_fields<'a>(
    record: &'a FemtoLogRecord,
    ctx: &EncodeContext<'a>,
    message_type: &'a str,
    target: Target,
) -> Fields<'a> {
    let mut fields = Fields::new(target);
    fields
        .str("@timestamp", iso_timestamp(record.metadata.timestamp))
        .str("@version", "1")
        .str("message", record.message())
        .str("host", ctx.host)
        .str("levelname", level_name(record))
        .str("logger", record.logger())
        .uint("lineno", u64::from(record.metadata.line_number))
        .str("pathname", record.metadata.filename.as_str())
        .uint("process", u64::from(record.metadata.process_id))
        .str("threadName", thread_label(record))
        .str("type", message_type);
    if let Some(exc) = ctx.exc_info {
        fields.str("exc_info", exc);
    }
    fields.extras(&record.metadata.key_values);
    fields
}

fn nested_fields<'a>(
    record: &'a FemtoLogRecord,
    ctx: &EncodeContext<'a>,
    message_type: &'a str,
) -> Fields<'a> {
    let mut inner = Fields::new(Target::Json);
    inner
        .str("levelname", level_name(record))
        .str("logger", record.logger())
        .uint("lineno", u64::from(record.metadata.line_number))
        .str("pathname", record.metadata.filename.as_str())
        .uint("process", u64::from(record.metadata.process_id))
        .str("threadName", thread_label(record));
    if let Some(exc) = ctx.exc_info {
        inner.str("exc_info", exc);
    }
    inner.extras(&record.metadata.key_values);

    let mut outer = Fields::new(Target::Json);
    outer
        .str("@timestamp", iso_timestamp(record.metadata.timestamp))
        .str("@message", record.message())
        .str("@source", format!("Logstash://{}/{}", ctx.host, record.logger()))
        .str("@source_host", ctx.host)
        .str("@type", message_type);
    outer.entries.push(("@fields", FieldValue::Nested(inner)));
    outer
}

/// Plain map used by the fluent `plain` payload.
fn plain_fields<'a>(record: &'a FemtoLogRecord, ctx: &EncodeContext<'a>) -> Fields<'a> {
    let mut fields = Fields::new(Target::MsgPack);
    fields
        .str("name", record.logger())
        .str("levelname", level_name(record))
        .str("message", record.message())
        .str("host", ctx.host)
        .str("pathname", record.metadata.filename.as_str())
        .uint("lineno", u64::from(record.metadata.line_number))
        .uint("process", u64::from(record.metadata.process_id))
        .str("threadName", thread_label(record));
    if let Some(exc) = ctx.exc_info {
        fields.str("exc_info", exc);
    }
    fields.extras(&record.metadata.key_values);
    fields
}

/// Field layout inside the fluent envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadType {
    /// Logstash v1 field names (`@timestamp`, `logger`, ...).
    #[default]
    Logstash,
    /// Record attribute names (`name`, `levelname`, ...).
    Plain,
}

impl std::str::FromStr for PayloadType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "logstash" => Ok(PayloadType::Logstash),
            "plain" | "default" => Ok(PayloadType::Plain),
            other => Err(format!("unknown payload type '{other}'")),
        }
    }
}

/// MessagePack `[tag, unix_seconds, map]` envelope.
#[derive(Clone, Debug)]
pub struct FluentFormat {
    pub tag: String,
    pub payload: PayloadType,
    pub framing: Framing,
}

impl FluentFormat {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            payload: PayloadType::default(),
            framing: Framing::default(),
        }
    }
}

impl WireFormat for FluentFormat {
    fn encode(&self, record: &FemtoLogRecord, ctx: &EncodeContext<'_>) -> Result<Vec<u8>, HandlerError> {
        let seconds = record
            .metadata
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let fields = match self.payload {
            PayloadType::Logstash => flat_fields(record, ctx, "fluent", Target::MsgPack),
            PayloadType::Plain => plain_fields(record, ctx),
        };
        let mut buf = Vec::with_capacity(256);
        (self.tag.as_str(), seconds, &fields)
            .serialize(&mut Serializer::new(&mut buf))
            .map_err(|err| HandlerError::Encode(err.to_string()))?;
        match self.framing {
            Framing::None => Ok(buf),
            Framing::LengthPrefixed => frame_payload(&buf)
                .ok_or_else(|| HandlerError::Encode("payload exceeds u32 length prefix".into())),
        }
    }
}

/// Logstash event schema version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogstashVersion {
    /// Nested `@fields` layout.
    V0,
    /// Flat layout.
    #[default]
    V1,
}

impl TryFrom<u8> for LogstashVersion {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LogstashVersion::V0),
            1 => Ok(LogstashVersion::V1),
            other => Err(format!("unsupported logstash version {other}")),
        }
    }
}

/// JSON object per record.
#[derive(Clone, Debug)]
pub struct LogstashFormat {
    pub version: LogstashVersion,
    pub message_type: String,
    /// Append `\n` after each object; streams need it, datagrams do not.
    pub newline: bool,
}

impl LogstashFormat {
    pub fn new(version: LogstashVersion) -> Self {
        Self {
            version,
            message_type: "logstash".into(),
            newline: true,
        }
    }
}

impl WireFormat for LogstashFormat {
    fn encode(&self, record: &FemtoLogRecord, ctx: &EncodeContext<'_>) -> Result<Vec<u8>, HandlerError> {
        let fields = match self.version {
            LogstashVersion::V1 => flat_fields(record, ctx, &self.message_type, Target::Json),
            LogstashVersion::V0 => nested_fields(record, ctx, &self.message_type),
        };
        let mut buf = serde_json::to_vec(&fields).map_err(|err| HandlerError::Encode(err.to_string()))?;
        if self.newline {
            buf.push(b'\n');
        }
        Ok(buf)
    }
}

/// Best-effort host name for the `host` field.
pub fn detect_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_owned())
}
