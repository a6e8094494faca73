//! Builder for [`FemtoNetworkHandler`].
//!
//! Selects the wire format and the delivery path (stream or datagram),
//! validates the combination, and wires a sender. Built handlers are
//! started and their flushing stop is registered with the configured
//! [`ExitHooks`] (the global registry by default).

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{HandlerBuildError, HandlerBuilderTrait, common::CommonBuilder};
use crate::formatter::DefaultFormatter;
use crate::handler::FemtoHandlerTrait;
use crate::level::FemtoLevel;
use crate::lifecycle::ExitHooks;
use crate::network::config::{
    DEFAULT_BUFFER_MAX_BYTES, DEFAULT_FLUENT_PORT, DEFAULT_HIGH_WATER_MARK, DEFAULT_LINGER,
    DEFAULT_LOGSTASH_PORT, DEFAULT_TIMEOUT,
};
use crate::network::{
    DatagramSender, DatagramSenderConfig, DatagramTransport, FemtoNetworkHandler, FluentFormat,
    Framing, LogstashFormat, LogstashVersion, PayloadType, RecordSender, StreamSender,
    StreamSenderConfig, StreamTransport, TcpTransport, TlsOptions, UnixTransport, WireFormat,
};
use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

/// Payload encoding of a network handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormatKind {
    /// MessagePack `[tag, time, record]`.
    Fluent,
    /// Logstash JSON events.
    Logstash,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivery {
    Stream,
    Datagram,
}

/// Builder for forwarding handlers.
#[derive(Clone, Debug)]
pub struct NetworkHandlerBuilder {
    format: WireFormatKind,
    delivery: Delivery,
    host: String,
    port: Option<u16>,
    unix_path: Option<PathBuf>,
    tls: Option<TlsOptions>,
    timeout: Duration,
    buffer_max_bytes: Option<NonZeroUsize>,
    high_water_mark: Option<NonZeroUsize>,
    buffer_set: bool,
    linger: Duration,
    tag: String,
    payload: PayloadType,
    version: LogstashVersion,
    message_type: String,
    framing: Option<Framing>,
    source_host: Option<String>,
    hooks: Option<Arc<ExitHooks>>,
    common: CommonBuilder,
}

impl NetworkHandlerBuilder {
    fn with_kind(format: WireFormatKind, delivery: Delivery) -> Self {
        Self {
            format,
            delivery,
            host: "localhost".into(),
            port: None,
            unix_path: None,
            tls: None,
            timeout: DEFAULT_TIMEOUT,
            buffer_max_bytes: NonZeroUsize::new(DEFAULT_BUFFER_MAX_BYTES),
            high_water_mark: NonZeroUsize::new(DEFAULT_HIGH_WATER_MARK),
            buffer_set: false,
            linger: DEFAULT_LINGER,
            tag: "salt".into(),
            payload: PayloadType::default(),
            version: LogstashVersion::default(),
            message_type: "logstash".into(),
            framing: None,
            source_host: None,
            hooks: None,
            common: CommonBuilder::default(),
        }
    }

    /// Fluent msgpack over a stream.
    pub fn fluent() -> Self {
        Self::with_kind(WireFormatKind::Fluent, Delivery::Stream)
    }

    /// Logstash JSON over a stream.
    pub fn logstash() -> Self {
        Self::with_kind(WireFormatKind::Logstash, Delivery::Stream)
    }

    /// Logstash JSON, one datagram per event.
    pub fn logstash_udp() -> Self {
        Self::with_kind(WireFormatKind::Logstash, Delivery::Datagram)
    }

    /// Msgpack records pushed as datagrams to a collector.
    pub fn push() -> Self {
        Self::with_kind(WireFormatKind::Fluent, Delivery::Datagram)
    }

    pub fn wire_format(&self) -> WireFormatKind {
        self.format
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Connect to a Unix domain socket instead of TCP.
    pub fn with_unix_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.unix_path = Some(path.into());
        self
    }

    /// Wrap the TCP stream in TLS, validating certificates for `domain`
    /// (the host name when `None`).
    pub fn with_tls(mut self, domain: Option<String>, insecure_skip_verify: bool) -> Self {
        self.tls = Some(TlsOptions {
            domain: domain.unwrap_or_else(|| self.host.clone()),
            insecure_skip_verify,
        });
        self
    }

    /// Connection and write timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap on bytes kept for retry on a stream.
    pub fn with_buffer_max_bytes(mut self, bytes: usize) -> Self {
        self.buffer_max_bytes = NonZeroUsize::new(bytes);
        self.buffer_set = true;
        self
    }

    /// Datagrams queued before the oldest are dropped.
    pub fn with_high_water_mark(mut self, messages: usize) -> Self {
        self.high_water_mark = NonZeroUsize::new(messages);
        self
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_payload_type(mut self, payload: PayloadType) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_version(mut self, version: LogstashVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = message_type.into();
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = Some(framing);
        self
    }

    /// Value of the `host` field; defaults to the local host name.
    pub fn with_source_host(mut self, host: impl Into<String>) -> Self {
        self.source_host = Some(host.into());
        self
    }

    pub fn with_level(mut self, level: FemtoLevel) -> Self {
        self.common.set_level(level);
        self
    }

    /// Registry that receives the handler's flushing stop.
    pub fn with_exit_hooks(mut self, hooks: Arc<ExitHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    fn default_port(&self) -> u16 {
        match self.format {
            WireFormatKind::Fluent => DEFAULT_FLUENT_PORT,
            WireFormatKind::Logstash => DEFAULT_LOGSTASH_PORT,
        }
    }

    fn validate(&self) -> Result<(), HandlerBuildError> {
        if self.timeout.is_zero() {
            return Err(HandlerBuildError::InvalidConfig(
                "timeout must be greater than zero".into(),
            ));
        }
        if self.buffer_max_bytes.is_none() {
            return Err(HandlerBuildError::InvalidConfig(
                "buffer_max_bytes must be greater than zero".into(),
            ));
        }
        if self.high_water_mark.is_none() {
            return Err(HandlerBuildError::InvalidConfig(
                "high_water_mark must be greater than zero".into(),
            ));
        }
        if self.format == WireFormatKind::Fluent && self.tag.is_empty() {
            return Err(HandlerBuildError::InvalidConfig("tag must not be empty".into()));
        }
        if self.delivery == Delivery::Datagram {
            if self.unix_path.is_some() {
                return Err(HandlerBuildError::InvalidConfig(
                    "unix sockets are only supported for stream handlers".into(),
                ));
            }
            if self.tls.is_some() {
                return Err(HandlerBuildError::InvalidConfig(
                    "tls is only supported for stream handlers".into(),
                ));
            }
            if self.buffer_set {
                return Err(HandlerBuildError::InvalidConfig(
                    "buffer_max_bytes applies to stream handlers; use high_water_mark".into(),
                ));
            }
        }
        if self.unix_path.is_some() {
            if self.tls.is_some() {
                return Err(HandlerBuildError::InvalidConfig(
                    "tls is not supported for unix sockets".into(),
                ));
            }
            if !cfg!(unix) {
                return Err(HandlerBuildError::Unsupported(
                    "unix domain sockets are not available on this platform".into(),
                ));
            }
        }
        if self.host.is_empty() && self.unix_path.is_none() {
            return Err(HandlerBuildError::InvalidConfig("host must not be empty".into()));
        }
        Ok(())
    }

    fn wire(&self) -> Box<dyn WireFormat> {
        match self.format {
            WireFormatKind::Fluent => {
                // Datagram boundaries already delimit records.
                let default_framing = match self.delivery {
                    Delivery::Stream => Framing::LengthPrefixed,
                    Delivery::Datagram => Framing::None,
                };
                Box::new(FluentFormat {
                    tag: self.tag.clone(),
                    payload: self.payload,
                    framing: self.framing.unwrap_or(default_framing),
                })
            }
            WireFormatKind::Logstash => Box::new(LogstashFormat {
                version: self.version,
                message_type: self.message_type.clone(),
                newline: self.delivery == Delivery::Stream,
            }),
        }
    }

    fn sender(&self) -> Box<dyn RecordSender> {
        let port = self.port.unwrap_or_else(|| self.default_port());
        match self.delivery {
            Delivery::Stream => {
                let transport = match &self.unix_path {
                    Some(path) => StreamTransport::Unix(UnixTransport { path: path.clone() }),
                    None => StreamTransport::Tcp(TcpTransport {
                        host: self.host.clone(),
                        port,
                        tls: self.tls.clone(),
                    }),
                };
                Box::new(StreamSender::new(StreamSenderConfig {
                    transport,
                    connect_timeout: self.timeout,
                    write_timeout: self.timeout,
                    buffer_max_bytes: self
                        .buffer_max_bytes
                        .map_or(DEFAULT_BUFFER_MAX_BYTES, NonZeroUsize::get),
                    linger: self.linger,
                    warn_interval: DEFAULT_WARN_INTERVAL,
                }))
            }
            Delivery::Datagram => Box::new(DatagramSender::new(DatagramSenderConfig {
                transport: DatagramTransport {
                    host: self.host.clone(),
                    port,
                },
                write_timeout: self.timeout,
                high_water_mark: self
                    .high_water_mark
                    .map_or(DEFAULT_HIGH_WATER_MARK, NonZeroUsize::get),
                linger: self.linger,
                warn_interval: DEFAULT_WARN_INTERVAL,
            })),
        }
    }

    /// Build the handler without connecting it.
    pub fn build_inner(&self) -> Result<Arc<FemtoNetworkHandler>, HandlerBuildError> {
        self.validate()?;
        let core = self.common.core_with(FemtoLevel::ALL, DefaultFormatter);
        Ok(FemtoNetworkHandler::with_core(
            core,
            self.wire(),
            self.sender(),
            self.source_host.clone(),
        ))
    }

    /// Build, connect and register the exit stop.
    pub fn build_started(&self) -> Result<Arc<FemtoNetworkHandler>, HandlerBuildError> {
        let handler = self.build_inner()?;
        let hooks = self.hooks.clone().unwrap_or_else(ExitHooks::global);
        handler.start(&hooks);
        Ok(handler)
    }
}

impl HandlerBuilderTrait for NetworkHandlerBuilder {
    fn build(&self) -> Result<Arc<dyn FemtoHandlerTrait>, HandlerBuildError> {
        Ok(self.build_started()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn invalid(builder: NetworkHandlerBuilder) -> String {
        match builder.build_inner() {
            Err(HandlerBuildError::InvalidConfig(msg)) => msg,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[rstest]
    #[case(NetworkHandlerBuilder::fluent().with_timeout(Duration::ZERO), "timeout")]
    #[case(NetworkHandlerBuilder::fluent().with_buffer_max_bytes(0), "buffer_max_bytes")]
    #[case(NetworkHandlerBuilder::push().with_high_water_mark(0), "high_water_mark")]
    #[case(NetworkHandlerBuilder::fluent().with_tag(""), "tag")]
    #[case(NetworkHandlerBuilder::logstash_udp().with_unix_path("/tmp/x.sock"), "unix")]
    #[case(NetworkHandlerBuilder::logstash_udp().with_tls(None, false), "tls")]
    #[case(NetworkHandlerBuilder::push().with_buffer_max_bytes(64), "high_water_mark")]
    #[case(NetworkHandlerBuilder::logstash().with_host(""), "host")]
    fn rejects_invalid_combinations(#[case] builder: NetworkHandlerBuilder, #[case] needle: &str) {
        let msg = invalid(builder);
        assert!(msg.contains(needle), "{msg}");
    }

    #[cfg(unix)]
    #[rstest]
    fn rejects_tls_over_unix() {
        let msg = invalid(
            NetworkHandlerBuilder::fluent()
                .with_unix_path("/tmp/relay.sock")
                .with_tls(Some("example.com".into()), false),
        );
        assert!(msg.contains("tls"));
    }

    #[rstest]
    fn build_registers_exit_stop() {
        let hooks = Arc::new(ExitHooks::new());
        let handler = NetworkHandlerBuilder::logstash_udp()
            .with_host("127.0.0.1")
            .with_port(9)
            .with_level(FemtoLevel::INFO)
            .with_exit_hooks(Arc::clone(&hooks))
            .build()
            .unwrap();
        assert_eq!(handler.level(), FemtoLevel::INFO);
        assert_eq!(hooks.len(), 1);
        hooks.run_all();
        let network = handler
            .as_any()
            .downcast_ref::<FemtoNetworkHandler>()
            .unwrap();
        assert!(network.is_exiting());
    }

    #[rstest]
    fn kinds_report_their_wire_format() {
        assert_eq!(NetworkHandlerBuilder::push().wire_format(), WireFormatKind::Fluent);
        assert_eq!(
            NetworkHandlerBuilder::logstash_udp().wire_format(),
            WireFormatKind::Logstash
        );
    }
}
