//! Connectionless push sender.
//!
//! Records are queued and sent as individual datagrams. When the queue
//! exceeds its high-water mark the oldest datagrams are discarded.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::UdpSocket;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::warn;
use parking_lot::Mutex;

use crate::lifecycle::{OsPid, PidSource};
use crate::rate_limited_warner::RateLimitedWarner;

use super::config::DatagramSenderConfig;
use super::sender::RecordSender;

const LINGER_POLL: Duration = Duration::from_millis(10);

/// Minimal socket surface used by [`DatagramSender`].
pub trait DatagramSocket: Send {
    fn send(&mut self, datagram: &[u8]) -> io::Result<usize>;
}

impl DatagramSocket for UdpSocket {
    fn send(&mut self, datagram: &[u8]) -> io::Result<usize> {
        UdpSocket::send(self, datagram)
    }
}

/// Opens a fresh socket; called lazily and again after a fork.
pub type SocketFactory = Box<dyn Fn() -> io::Result<Box<dyn DatagramSocket>> + Send + Sync>;

#[derive(Default)]
struct DatagramState {
    socket: Option<Box<dyn DatagramSocket>>,
    queue: VecDeque<Vec<u8>>,
    owning_pid: Option<u32>,
    stopped: bool,
}

fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionRefused
    )
}

pub struct DatagramSender {
    open: SocketFactory,
    endpoint: String,
    pid: Arc<dyn PidSource>,
    high_water_mark: usize,
    linger: Duration,
    state: Mutex<DatagramState>,
    warner: RateLimitedWarner,
}

impl DatagramSender {
    pub fn new(config: DatagramSenderConfig) -> Self {
        let transport = config.transport.clone();
        let timeout = config.write_timeout;
        let endpoint = format!("udp://{}:{}", transport.host, transport.port);
        let open: SocketFactory = Box::new(move || {
            transport
                .open(timeout)
                .map(|socket| Box::new(socket) as Box<dyn DatagramSocket>)
        });
        Self::with_socket_factory(open, endpoint, Arc::new(OsPid), &config)
    }

    /// Build a sender that obtains sockets from `open`.
    pub fn with_socket_factory(
        open: SocketFactory,
        endpoint: String,
        pid: Arc<dyn PidSource>,
        config: &DatagramSenderConfig,
    ) -> Self {
        Self {
            open,
            endpoint,
            pid,
            high_water_mark: config.high_water_mark.max(1),
            linger: config.linger,
            state: Mutex::new(DatagramState::default()),
            warner: RateLimitedWarner::new(config.warn_interval),
        }
    }

    /// Datagrams waiting to be sent.
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Claim the state on first use; drop it when a parent claimed it.
    fn forget_parent_state(&self, state: &mut DatagramState) -> bool {
        let current = self.pid.current_pid();
        match state.owning_pid {
            None => {
                state.owning_pid = Some(current);
                false
            }
            Some(owner) if owner != current => {
                state.socket = None;
                state.queue.clear();
                state.stopped = false;
                state.owning_pid = Some(current);
                true
            }
            _ => false,
        }
    }

    fn open_socket(&self, state: &mut DatagramState) -> io::Result<()> {
        if state.socket.is_none() {
            state.socket = Some((self.open)()?);
            state.owning_pid = Some(self.pid.current_pid());
        }
        Ok(())
    }

    /// Send queued datagrams until the queue empties or a transient error
    /// occurs. Returns `true` when the queue was drained.
    fn drain(&self, state: &mut DatagramState) -> bool {
        if let Err(err) = self.open_socket(state) {
            log::debug!("DatagramSender: unable to open socket for {}: {err}", self.endpoint);
            return state.queue.is_empty();
        }
        let DatagramState { socket, queue, .. } = state;
        let Some(socket) = socket.as_mut() else {
            return queue.is_empty();
        };
        while let Some(front) = queue.front() {
            match socket.send(front) {
                Ok(_) => {
                    queue.pop_front();
                }
                Err(err) if is_transient(err.kind()) => return false,
                Err(err) => {
                    // Oversized or otherwise unsendable; retrying cannot help.
                    log::debug!("DatagramSender: discarding datagram: {err}");
                    queue.pop_front();
                    self.warner.record_drop();
                }
            }
        }
        true
    }
}

impl RecordSender for DatagramSender {
    fn start(&self) {
        let mut state = self.state.lock();
        self.forget_parent_state(&mut state);
        state.stopped = false;
        if let Err(err) = self.open_socket(&mut state) {
            warn!("DatagramSender: unable to open socket for {}: {err}", self.endpoint);
        }
    }

    fn send(&self, payload: Vec<u8>) {
        let mut state = self.state.lock();
        self.forget_parent_state(&mut state);
        if state.stopped {
            drop(state);
            self.warner.record_drop();
        } else {
            if !payload.is_empty() {
                state.queue.push_back(payload);
            }
            while state.queue.len() > self.high_water_mark {
                state.queue.pop_front();
                self.warner.record_drop();
            }
            self.drain(&mut state);
            drop(state);
        }
        self.warner.warn_if_due(|count| {
            warn!("DatagramSender: dropped {count} datagrams for {}", self.endpoint);
        });
    }

    fn flush(&self) -> bool {
        let mut state = self.state.lock();
        self.forget_parent_state(&mut state);
        !state.stopped && self.drain(&mut state)
    }

    fn stop(&self, flush: bool) {
        let mut state = self.state.lock();
        if self.forget_parent_state(&mut state) {
            state.stopped = true;
            return;
        }
        if state.stopped {
            return;
        }
        state.stopped = true;
        if flush {
            let deadline = Instant::now() + self.linger;
            while !self.drain(&mut state) && Instant::now() < deadline {
                thread::sleep(LINGER_POLL);
            }
        }
        self.warner.record_drops(state.queue.len() as u64);
        state.queue.clear();
        state.socket = None;
        drop(state);
        self.warner.flush(|count| {
            warn!("DatagramSender: discarded {count} datagrams for {}", self.endpoint);
        });
    }

    fn reset_if_forked(&self) -> bool {
        self.forget_parent_state(&mut self.state.lock())
    }

    fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

impl fmt::Debug for DatagramSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramSender")
            .field("endpoint", &self.endpoint)
            .field("high_water_mark", &self.high_water_mark)
            .finish_non_exhaustive()
    }
}
