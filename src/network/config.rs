//! Configuration structures consumed by the network senders.
//!
//! [`NetworkHandlerBuilder`](crate::handlers::NetworkHandlerBuilder)
//! constructs these values before handing them to a sender.

use std::time::Duration;

use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

use super::transport::{DatagramTransport, StreamTransport, TcpTransport};

/// Default connection and write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default cap on bytes retained for retry after a failed write.
pub const DEFAULT_BUFFER_MAX_BYTES: usize = 1 << 20; // 1 MiB
/// Default number of unsent datagrams kept before the oldest are dropped.
pub const DEFAULT_HIGH_WATER_MARK: usize = 1000;
/// Default grace period for in-flight data during shutdown.
pub const DEFAULT_LINGER: Duration = Duration::from_secs(1);
/// Default fluent port.
pub const DEFAULT_FLUENT_PORT: u16 = 24224;
/// Default logstash port.
pub const DEFAULT_LOGSTASH_PORT: u16 = 5959;

/// Settings for a stream (TCP, TLS or Unix) sender.
#[derive(Clone, Debug)]
pub struct StreamSenderConfig {
    pub transport: StreamTransport,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub buffer_max_bytes: usize,
    pub linger: Duration,
    pub warn_interval: Duration,
}

impl Default for StreamSenderConfig {
    fn default() -> Self {
        Self {
            transport: StreamTransport::Tcp(TcpTransport {
                host: "localhost".into(),
                port: DEFAULT_FLUENT_PORT,
                tls: None,
            }),
            connect_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            buffer_max_bytes: DEFAULT_BUFFER_MAX_BYTES,
            linger: DEFAULT_LINGER,
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }
}

impl StreamSenderConfig {
    /// Override the transport configuration.
    pub fn with_transport(mut self, transport: StreamTransport) -> Self {
        self.transport = transport;
        self
    }
}

/// Settings for a datagram push sender.
#[derive(Clone, Debug)]
pub struct DatagramSenderConfig {
    pub transport: DatagramTransport,
    pub write_timeout: Duration,
    pub high_water_mark: usize,
    pub linger: Duration,
    pub warn_interval: Duration,
}

impl Default for DatagramSenderConfig {
    fn default() -> Self {
        Self {
            transport: DatagramTransport {
                host: "localhost".into(),
                port: DEFAULT_LOGSTASH_PORT,
            },
            write_timeout: DEFAULT_TIMEOUT,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            linger: DEFAULT_LINGER,
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }
}
