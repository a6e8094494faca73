//! In-process [`Connector`] whose failures are scripted by the test.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::network::{Connection, Connector};

/// One successful write as seen by the fake peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptedWrite {
    /// Index of the connection that carried the write, starting at 0.
    pub connection: usize,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct Script {
    failing_connects: usize,
    failing_writes: usize,
    connects: usize,
    connect_limits: Vec<Duration>,
    shutdowns: usize,
    writes: Vec<ScriptedWrite>,
}

/// Cloneable handle; clones observe and script the same fake peer.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_connects(&self, n: usize) {
        self.script.lock().failing_connects = n;
    }

    /// Make the next `n` writes fail with a broken pipe.
    pub fn fail_writes(&self, n: usize) {
        self.script.lock().failing_writes = n;
    }

    pub fn connects(&self) -> usize {
        self.script.lock().connects
    }

    /// Limits passed to bounded connection attempts, in call order.
    pub fn connect_limits(&self) -> Vec<Duration> {
        self.script.lock().connect_limits.clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.script.lock().shutdowns
    }

    pub fn writes(&self) -> Vec<ScriptedWrite> {
        self.script.lock().writes.clone()
    }

    /// Every successfully written byte, concatenated.
    pub fn received(&self) -> Vec<u8> {
        self.script
            .lock()
            .writes
            .iter()
            .flat_map(|write| write.bytes.iter().copied())
            .collect()
    }

    pub fn boxed(&self) -> Box<dyn Connector> {
        Box::new(self.clone())
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self) -> io::Result<Box<dyn Connection>> {
        let mut script = self.script.lock();
        if script.failing_connects > 0 {
            script.failing_connects -= 1;
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        let index = script.connects;
        script.connects += 1;
        Ok(Box::new(ScriptedConnection {
            index,
            script: Arc::clone(&self.script),
        }))
    }

    fn connect_within(&self, limit: Duration) -> io::Result<Box<dyn Connection>> {
        self.script.lock().connect_limits.push(limit);
        self.connect()
    }

    fn describe(&self) -> String {
        "scripted://peer".into()
    }
}

struct ScriptedConnection {
    index: usize,
    script: Arc<Mutex<Script>>,
}

impl Connection for ScriptedConnection {
    fn set_write_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut script = self.script.lock();
        if script.failing_writes > 0 {
            script.failing_writes -= 1;
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        script.writes.push(ScriptedWrite {
            connection: self.index,
            bytes: buf.to_vec(),
        });
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) {
        self.script.lock().shutdowns += 1;
    }
}
