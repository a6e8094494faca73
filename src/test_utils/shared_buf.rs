use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// In-memory writer whose clones share one buffer.
#[derive(Clone, Debug, Default)]
pub struct SharedBuf {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuf {
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    /// Buffer contents decoded as UTF-8, lossily.
    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    pub fn clear(&self) {
        self.bytes.lock().clear();
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
