//! Transport primitives for the network senders.
//!
//! Stream connections sit behind the [`Connector`] and [`Connection`]
//! traits so the sender state machine can be driven by scripted fakes.

use std::fmt;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use native_tls::{TlsConnector, TlsStream};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Stream transport targeted by a sender.
#[derive(Clone, Debug)]
pub enum StreamTransport {
    /// TCP transport with optional TLS.
    Tcp(TcpTransport),
    /// Unix domain socket transport.
    Unix(UnixTransport),
}

impl fmt::Display for StreamTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamTransport::Tcp(tcp) if tcp.tls.is_some() => write!(f, "tls://{}:{}", tcp.host, tcp.port),
            StreamTransport::Tcp(tcp) => write!(f, "tcp://{}:{}", tcp.host, tcp.port),
            StreamTransport::Unix(unix) => write!(f, "unix://{}", unix.path.display()),
        }
    }
}

/// TCP transport configuration.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsOptions>,
}

fn resolve(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    (host, port).to_socket_addrs().map(|iter| iter.collect())
}

/// Unix domain socket configuration.
#[derive(Clone, Debug)]
pub struct UnixTransport {
    pub path: PathBuf,
}

/// TLS connection options.
#[derive(Clone, Debug)]
pub struct TlsOptions {
    /// Domain name presented during the TLS handshake.
    pub domain: String,
    /// Skip certificate validation when true (intended for tests).
    pub insecure_skip_verify: bool,
}

impl TlsOptions {
    fn connector(&self) -> io::Result<TlsConnector> {
        let mut builder = TlsConnector::builder();
        if self.insecure_skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build().map_err(io::Error::other)
    }
}

/// Datagram destination for push senders.
#[derive(Clone, Debug)]
pub struct DatagramTransport {
    pub host: String,
    pub port: u16,
}

impl DatagramTransport {
    /// Bind an ephemeral local socket connected to the destination.
    pub fn open(&self, write_timeout: Duration) -> io::Result<UdpSocket> {
        let addrs = resolve(&self.host, self.port)?;
        let mut last_err = None;
        for addr in addrs {
            let local: SocketAddr = if addr.is_ipv4() {
                ([0, 0, 0, 0], 0).into()
            } else {
                ([0u16; 8], 0).into()
            };
            let attempt = UdpSocket::bind(local).and_then(|socket| {
                socket.connect(addr)?;
                socket.set_write_timeout(Some(write_timeout))?;
                Ok(socket)
            });
            match attempt {
                Ok(socket) => return Ok(socket),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address found for {}:{}", self.host, self.port),
            )
        }))
    }
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an established connection.
pub fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// A connected byte stream.
pub trait Connection: Send {
    fn set_write_timeout(&mut self, timeout: Duration) -> io::Result<()>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    /// Close the connection in an orderly way. Dropping without calling
    /// this only releases this process's descriptor.
    fn shutdown(&mut self) {}
}

/// Factory for [`Connection`]s.
pub trait Connector: Send + Sync + fmt::Debug {
    fn connect(&self) -> io::Result<Box<dyn Connection>>;
    /// Connect, spending at most `limit` on the attempt.
    fn connect_within(&self, _limit: Duration) -> io::Result<Box<dyn Connection>> {
        self.connect()
    }
    /// Human-readable endpoint used in warnings.
    fn describe(&self) -> String;
}

/// A live socket of any supported kind.
pub enum SocketConnection {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection for SocketConnection {
    fn set_write_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        match self {
            SocketConnection::Tcp(stream) => stream.set_write_timeout(Some(timeout)),
            SocketConnection::Tls(stream) => stream.get_ref().set_write_timeout(Some(timeout)),
            #[cfg(unix)]
            SocketConnection::Unix(stream) => stream.set_write_timeout(Some(timeout)),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            SocketConnection::Tcp(stream) => stream.write_all(buf),
            SocketConnection::Tls(stream) => stream.write_all(buf),
            #[cfg(unix)]
            SocketConnection::Unix(stream) => stream.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SocketConnection::Tcp(stream) => stream.flush(),
            SocketConnection::Tls(stream) => stream.flush(),
            #[cfg(unix)]
            SocketConnection::Unix(stream) => stream.flush(),
        }
    }

    fn shutdown(&mut self) {
        let _ = match self {
            SocketConnection::Tcp(stream) => stream.shutdown(std::net::Shutdown::Both),
            SocketConnection::Tls(stream) => stream.shutdown(),
            #[cfg(unix)]
            SocketConnection::Unix(stream) => stream.shutdown(std::net::Shutdown::Both),
        };
    }
}

fn connect_tcp(config: &TcpTransport, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in resolve(&config.host, config.port)? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            // Timeouts are not retried against other addresses.
            Err(err) if err.kind() == io::ErrorKind::TimedOut => return Err(err),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address found for {}:{}", config.host, config.port),
        )
    }))
}

/// Open `transport`, completing the TLS handshake when configured.
pub fn connect_transport(
    transport: &StreamTransport,
    connect_timeout: Duration,
) -> io::Result<SocketConnection> {
    match transport {
        StreamTransport::Tcp(config) => {
            let stream = connect_tcp(config, connect_timeout)?;
            if let Some(tls) = &config.tls {
                let connector = tls.connector()?;
                stream.set_read_timeout(Some(connect_timeout))?;
                stream.set_write_timeout(Some(connect_timeout))?;
                let stream = connector
                    .connect(&tls.domain, stream)
                    .map_err(io::Error::other)?;
                stream.get_ref().set_read_timeout(None)?;
                Ok(SocketConnection::Tls(Box::new(stream)))
            } else {
                Ok(SocketConnection::Tcp(stream))
            }
        }
        StreamTransport::Unix(config) => {
            #[cfg(unix)]
            {
                Ok(SocketConnection::Unix(UnixStream::connect(&config.path)?))
            }
            #[cfg(not(unix))]
            {
                let _ = (config, connect_timeout);
                Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "unix domain sockets are not supported on this platform",
                ))
            }
        }
    }
}

/// [`Connector`] backed by a real socket transport.
#[derive(Clone, Debug)]
pub struct TransportConnector {
    pub transport: StreamTransport,
    pub connect_timeout: Duration,
}

impl Connector for TransportConnector {
    fn connect(&self) -> io::Result<Box<dyn Connection>> {
        Ok(Box::new(connect_transport(&self.transport, self.connect_timeout)?))
    }

    fn connect_within(&self, limit: Duration) -> io::Result<Box<dyn Connection>> {
        let timeout = self.connect_timeout.min(limit);
        Ok(Box::new(connect_transport(&self.transport, timeout)?))
    }

    fn describe(&self) -> String {
        self.transport.to_string()
    }
}
