//! Forwarding of records to remote collectors.
//!
//! A [`FemtoNetworkHandler`] pairs a [`WireFormat`] with a [`RecordSender`].
//! [`StreamSender`] covers TCP, TLS and Unix streams with a bounded retry
//! buffer; [`DatagramSender`] pushes UDP datagrams through a queue capped
//! by a high-water mark.

pub mod config;
mod datagram;
mod handler;
mod sender;
pub mod serialise;
pub mod transport;

pub use config::{DatagramSenderConfig, StreamSenderConfig};
pub use datagram::{DatagramSender, DatagramSocket, SocketFactory};
pub use handler::FemtoNetworkHandler;
pub use sender::{RecordSender, StreamSender};
pub use serialise::{
    EXCLUDED_FIELDS, EncodeContext, FluentFormat, Framing, LogstashFormat, LogstashVersion,
    PayloadType, WireFormat,
};
pub use transport::{
    Connection, Connector, DatagramTransport, StreamTransport, TcpTransport, TlsOptions,
    UnixTransport,
};
