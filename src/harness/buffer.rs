//! Bounded byte buffers for the helper channel
//!
//! Each direction of the channel has its own [`ByteRing`]. Writes are
//! all-or-nothing: a write that does not fit is rejected whole, so a frame is
//! never split across a full buffer.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::{HostError, Result};

/// Capacity of each direction of the helper channel (1 MiB).
pub const IPC_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Fixed-capacity FIFO of bytes.
#[derive(Debug)]
pub struct ByteRing {
    data: VecDeque<u8>,
    capacity: usize,
}

impl ByteRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes that can still be written.
    pub fn available(&self) -> usize {
        self.capacity - self.data.len()
    }

    /// Append `bytes`, or fail without writing anything if they do not fit.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.available() {
            return Err(HostError::Ipc(format!(
                "buffer full: {} bytes requested, {} of {} available",
                bytes.len(),
                self.available(),
                self.capacity
            )));
        }
        self.data.extend(bytes);
        Ok(())
    }

    /// Contiguous view of the buffered bytes.
    pub fn contents(&mut self) -> &[u8] {
        self.data.make_contiguous()
    }

    /// Drop `n` bytes from the front.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.data.len());
        self.data.drain(..n);
    }

    /// Remove and return everything buffered.
    pub fn take_all(&mut self) -> Vec<u8> {
        self.data.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// The two rings of one helper channel: helper to host, and host to helper.
#[derive(Debug)]
pub struct BufferPair {
    inbound: Mutex<ByteRing>,
    outbound: Mutex<ByteRing>,
}

impl BufferPair {
    /// Allocate both directions with the same capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            inbound: Mutex::new(ByteRing::with_capacity(capacity)),
            outbound: Mutex::new(ByteRing::with_capacity(capacity)),
        }
    }

    pub fn inbound(&self) -> &Mutex<ByteRing> {
        &self.inbound
    }

    pub fn outbound(&self) -> &Mutex<ByteRing> {
        &self.outbound
    }

    pub fn clear(&self) {
        self.inbound.lock().clear();
        self.outbound.lock().clear();
    }
}

impl Default for BufferPair {
    fn default() -> Self {
        Self::new(IPC_BUFFER_CAPACITY)
    }
}
