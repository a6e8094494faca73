//! Declarative pipeline configuration.
//!
//! [`PipelineConfig`] describes the handlers to build once settings have
//! been read. It is plain data (`serde` serialisable) so it can be handed
//! to a child process; live handlers never cross that boundary. Parse it
//! from JSON with [`PipelineConfig::from_json_str`] or from INI with
//! [`PipelineConfig::from_ini_str`] and realise it through
//! [`LoggingPipeline::configure`].

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::deferred_handler::DEFAULT_MAX_SIZE;
use crate::handlers::HandlerBuildError;
use crate::level::FemtoLevel;
use crate::logger::LoggingError;

mod build;
mod ini_file;
mod pipeline;

pub use pipeline::LoggingPipeline;

/// Errors raised while loading or applying a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} is an empty file")]
    EmptyFile(String),
    #[error("unknown encoding {0}")]
    UnknownEncoding(String),
    #[error("{path} is not valid {encoding}")]
    Decode { path: String, encoding: &'static str },
    #[error("invalid INI configuration: {0}")]
    Ini(String),
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown section [{0}]")]
    UnknownSection(String),
    #[error("unknown key '{key}' in [{section}]")]
    UnknownKey { section: String, key: String },
    #[error("invalid value '{value}' for '{key}' in [{section}]")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
    /// Building a handler failed.
    #[error("failed to build handler {id}: {source}")]
    HandlerBuild {
        id: String,
        #[source]
        source: HandlerBuildError,
    },
    #[error(transparent)]
    Logger(#[from] LoggingError),
    #[error("the pipeline is already configured")]
    AlreadyConfigured,
    #[error("the pipeline has been shut down")]
    ShutDown,
}

/// Handler families a configuration can name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Console output on `stdout` or `stderr`.
    #[default]
    Stream,
    /// Fluent msgpack over TCP, TLS or a Unix socket.
    Fluent,
    /// Logstash JSON lines over TCP, TLS or a Unix socket.
    Logstash,
    /// Logstash JSON, one datagram per record.
    LogstashUdp,
    /// Fluent msgpack published as datagrams.
    Push,
}

impl FromStr for HandlerKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stream" | "console" => Ok(Self::Stream),
            "fluent" => Ok(Self::Fluent),
            "logstash" => Ok(Self::Logstash),
            "logstash_udp" => Ok(Self::LogstashUdp),
            "push" => Ok(Self::Push),
            other => Err(format!("unknown handler kind '{other}'")),
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stream => "stream",
            Self::Fluent => "fluent",
            Self::Logstash => "logstash",
            Self::LogstashUdp => "logstash_udp",
            Self::Push => "push",
        })
    }
}

/// TLS settings for stream transports.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsConfig {
    /// Name checked against the certificate; defaults to `host`.
    pub domain: Option<String>,
    pub insecure_skip_verify: bool,
}

/// One handler to build. Fields that do not apply to `kind` are ignored
/// unless the handler builder rejects them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerConfig {
    /// Label used in error messages.
    pub name: Option<String>,
    pub kind: HandlerKind,
    /// Handler level; `WARNING` when unset.
    pub level: Option<FemtoLevel>,
    pub format: Option<String>,
    pub datefmt: Option<String>,
    /// `stdout` or `stderr` for stream handlers.
    pub target: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Unix socket path; replaces `host` and `port`.
    pub path: Option<PathBuf>,
    pub timeout_seconds: Option<f64>,
    pub buffer_max_bytes: Option<usize>,
    pub high_water_mark: Option<usize>,
    pub linger_seconds: Option<f64>,
    pub tag: Option<String>,
    /// `logstash` or `plain`.
    pub payload_type: Option<String>,
    /// Logstash schema version, 0 or 1.
    pub version: Option<u8>,
    pub message_type: Option<String>,
    pub tls: Option<TlsConfig>,
    /// `length_prefixed` or `none`.
    pub framing: Option<String>,
}

impl HandlerConfig {
    pub fn new(kind: HandlerKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Level the handler is built with.
    pub fn effective_level(&self) -> FemtoLevel {
        self.level.unwrap_or_else(|| FemtoLevel::from_config(None))
    }

    fn label(&self, fallback: &str) -> String {
        self.name.clone().unwrap_or_else(|| fallback.to_owned())
    }
}

/// Everything needed to replace the bootstrap handler with real ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub console: Option<HandlerConfig>,
    pub handlers: Vec<HandlerConfig>,
    /// Capacity of the bootstrap queue.
    pub deferred_max_size: usize,
    /// Per-logger levels, keyed by dotted logger name.
    pub granular_levels: BTreeMap<String, FemtoLevel>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            console: None,
            handlers: Vec::new(),
            deferred_max_size: DEFAULT_MAX_SIZE,
            granular_levels: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse INI text with `[console]`, `[levels]`, `[deferred]` and one
    /// `[handler:<name>]` section per forwarding handler.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        ini_file::parse_str(text)
    }

    /// Read an INI file encoded as UTF-8.
    pub fn from_ini_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_ini_file_with_encoding(path, None)
    }

    /// Read an INI file in the encoding named by `label` (for example
    /// `latin1`), or UTF-8 when `None`.
    pub fn from_ini_file_with_encoding(
        path: impl AsRef<Path>,
        label: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let text = ini_file::read_file(path.as_ref(), label)?;
        ini_file::parse_str(&text)
    }

    /// Console first, then the forwarding handlers.
    pub fn all_handlers(&self) -> impl Iterator<Item = (String, &HandlerConfig)> {
        self.console
            .iter()
            .map(|h| (h.label("console"), h))
            .chain(
                self.handlers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| (h.label(&format!("handlers[{i}]")), h)),
            )
    }

    /// The most verbose level among handlers and granular levels.
    pub fn lowest_level(&self) -> FemtoLevel {
        self.all_handlers()
            .map(|(_, h)| h.effective_level())
            .chain(self.granular_levels.values().copied())
            .min()
            .unwrap_or_else(|| FemtoLevel::from_config(None))
    }
}
