//! Connection-oriented sender with a bounded retry buffer.
//!
//! `StreamSender` connects lazily on the first send after construction,
//! a failure, or a fork. Bytes that could not be written are kept in a
//! pending buffer and prepended to the next payload. If the combined data
//! would exceed `buffer_max_bytes` everything is dropped, keeping memory
//! bounded while an endpoint is down.

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use parking_lot::Mutex;

use crate::lifecycle::{OsPid, PidSource};
use crate::rate_limited_warner::RateLimitedWarner;

use super::config::StreamSenderConfig;
use super::transport::{Connection, Connector, TransportConnector, next_connection_id};

/// Destination for encoded records.
///
/// Senders never report failures to the caller. Problems are logged through
/// rate-limited warnings and the data is buffered or dropped.
pub trait RecordSender: Send + Sync + fmt::Debug {
    /// Establish the connection if needed. Idempotent.
    fn start(&self);
    /// Transmit one encoded record.
    fn send(&self, payload: Vec<u8>);
    /// Retry anything buffered from earlier failures. Returns `true` when
    /// nothing is left waiting.
    fn flush(&self) -> bool;
    /// Close the sender, giving buffered data up to the linger period when
    /// `flush` is true. Idempotent.
    fn stop(&self, flush: bool);
    /// Discard state inherited from a parent process. Returns `true` when
    /// the current pid differs from the one that owned the state.
    fn reset_if_forked(&self) -> bool;
    fn is_stopped(&self) -> bool;
}

struct EstablishedConnection {
    id: u64,
    stream: Box<dyn Connection>,
}

#[derive(Default)]
struct StreamState {
    connection: Option<EstablishedConnection>,
    pending: Vec<u8>,
    owning_pid: Option<u32>,
    stopped: bool,
}

/// Stream sender over TCP, TLS or a Unix socket.
pub struct StreamSender {
    connector: Box<dyn Connector>,
    pid: Arc<dyn PidSource>,
    write_timeout: Duration,
    buffer_max_bytes: usize,
    linger: Duration,
    state: Mutex<StreamState>,
    warner: RateLimitedWarner,
}

impl StreamSender {
    pub fn new(config: StreamSenderConfig) -> Self {
        let connector = TransportConnector {
            transport: config.transport.clone(),
            connect_timeout: config.connect_timeout,
        };
        Self::with_connector(Box::new(connector), Arc::new(OsPid), &config)
    }

    /// Build a sender around an arbitrary connector and pid source.
    pub fn with_connector(
        connector: Box<dyn Connector>,
        pid: Arc<dyn PidSource>,
        config: &StreamSenderConfig,
    ) -> Self {
        Self {
            connector,
            pid,
            write_timeout: config.write_timeout,
            buffer_max_bytes: config.buffer_max_bytes,
            linger: config.linger,
            state: Mutex::new(StreamState::default()),
            warner: RateLimitedWarner::new(config.warn_interval),
        }
    }

    /// Identifier of the live connection, if any.
    pub fn connection_id(&self) -> Option<u64> {
        self.state.lock().connection.as_ref().map(|conn| conn.id)
    }

    /// Bytes waiting to be retried.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connection.is_some()
    }

    /// Claim the state for this process on first use, or drop it when it
    /// was claimed by a parent.
    fn forget_parent_state(&self, state: &mut StreamState) -> bool {
        let current = self.pid.current_pid();
        match state.owning_pid {
            None => {
                state.owning_pid = Some(current);
                false
            }
            Some(owner) if owner != current => {
                // The descriptor is shared with the parent; close only our copy.
                state.connection = None;
                state.pending.clear();
                state.stopped = false;
                state.owning_pid = Some(current);
                true
            }
            _ => false,
        }
    }

    fn connect(&self, state: &mut StreamState) -> std::io::Result<()> {
        self.connect_bounded(state, None)
    }

    /// Connect if needed, with the connect attempt capped at `limit`.
    fn connect_bounded(&self, state: &mut StreamState, limit: Option<Duration>) -> std::io::Result<()> {
        if state.connection.is_some() {
            return Ok(());
        }
        let mut stream = match limit {
            Some(limit) => self.connector.connect_within(limit)?,
            None => self.connector.connect()?,
        };
        stream.set_write_timeout(self.write_timeout)?;
        state.connection = Some(EstablishedConnection {
            id: next_connection_id(),
            stream,
        });
        state.owning_pid = Some(self.pid.current_pid());
        Ok(())
    }

    fn write_locked(&self, state: &mut StreamState, payload: &[u8]) -> std::io::Result<()> {
        self.connect(state)?;
        let Some(conn) = state.connection.as_mut() else {
            return Err(std::io::ErrorKind::NotConnected.into());
        };
        let result = conn
            .stream
            .write_all(payload)
            .and_then(|()| conn.stream.flush());
        if result.is_err() {
            state.connection = None;
        }
        result
    }

    fn warn_drops(&self) {
        self.warner.warn_if_due(|count| {
            warn!(
                "StreamSender: dropped {count} bytes for {}",
                self.connector.describe()
            );
        });
    }
}

impl RecordSender for StreamSender {
    fn start(&self) {
        let mut state = self.state.lock();
        self.forget_parent_state(&mut state);
        state.stopped = false;
        if let Err(err) = self.connect(&mut state) {
            warn!(
                "StreamSender: unable to connect to {}: {err}",
                self.connector.describe()
            );
        }
    }

    fn send(&self, payload: Vec<u8>) {
        let mut state = self.state.lock();
        self.forget_parent_state(&mut state);
        if state.stopped {
            drop(state);
            self.warner.record_drops(payload.len() as u64);
            self.warn_drops();
            return;
        }
        let mut data = mem::take(&mut state.pending);
        if data.is_empty() {
            data = payload;
        } else {
            data.extend_from_slice(&payload);
        }
        if data.is_empty() {
            return;
        }
        if let Err(err) = self.write_locked(&mut state, &data) {
            if data.len() > self.buffer_max_bytes {
                drop(state);
                log::debug!("StreamSender: write failed: {err}");
                self.warner.record_drops(data.len() as u64);
                self.warn_drops();
            } else {
                state.pending = data;
            }
        }
    }

    fn flush(&self) -> bool {
        let mut state = self.state.lock();
        self.forget_parent_state(&mut state);
        if state.stopped {
            return false;
        }
        if state.pending.is_empty() {
            return true;
        }
        let data = mem::take(&mut state.pending);
        match self.write_locked(&mut state, &data) {
            Ok(()) => true,
            Err(err) => {
                log::debug!("StreamSender: flush failed: {err}");
                state.pending = data;
                false
            }
        }
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
        let pending = mem::take(&mut state.pending);
        if flush && !pending.is_empty() && !self.linger.is_zero() {
            let ready = self.connect_bounded(&mut state, Some(self.linger)).is_ok();
            if let (true, Some(conn)) = (ready, state.connection.as_mut()) {
                let _ = conn.stream.set_write_timeout(self.linger);
                if conn
                    .stream
                    .write_all(&pending)
                    .and_then(|()| conn.stream.flush())
                    .is_err()
                {
                    self.warner.record_drops(pending.len() as u64);
                }
            } else {
                self.warner.record_drops(pending.len() as u64);
            }
        } else if !pending.is_empty() {
            self.warner.record_drops(pending.len() as u64);
        }
        if let Some(mut conn) = state.connection.take() {
            conn.stream.shutdown();
        }
        drop(state);
        self.warner.flush(|count| {
            warn!(
                "StreamSender: discarded {count} bytes for {} at shutdown",
                self.connector.describe()
            );
        });
    }

    fn reset_if_forked(&self) -> bool {
        self.forget_parent_state(&mut self.state.lock())
    }

    fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

impl fmt::Debug for StreamSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSender")
            .field("endpoint", &self.connector.describe())
            .field("buffer_max_bytes", &self.buffer_max_bytes)
            .finish_non_exhaustive()
    }
}
