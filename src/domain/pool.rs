//! Shared free list of fixed-size copy buffers.
//!
//! Every tunnel direction leases one buffer for the whole copy loop and gives it back
//! when the loop ends. Leased contents are not cleared: only read the part you filled.

use crossbeam_queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

pub const BUFFER_SIZE: usize = 32 * 1024;

/// Default number of idle buffers kept around between leases.
pub const DEFAULT_MAX_IDLE: usize = 1024;

#[derive(Clone)]
pub struct BufferPool {
    idle: Arc<ArrayQueue<Box<[u8]>>>,
}

impl BufferPool {
    /// `max_idle` bounds how many returned buffers are retained; extra ones are freed.
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Arc::new(ArrayQueue::new(max_idle.max(1))),
        }
    }

    pub fn lease(&self) -> PooledBuffer {
        let buf = self
            .idle
            .pop()
            .unwrap_or_else(|| vec![0u8; BUFFER_SIZE].into_boxed_slice());
        PooledBuffer {
            buf,
            idle: self.idle.clone(),
        }
    }

    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    pub fn max_idle(&self) -> usize {
        self.idle.capacity()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("idle", &self.idle.len())
            .field("max_idle", &self.idle.capacity())
            .finish()
    }
}

/// A buffer on loan from a [`BufferPool`]. Goes back to the pool on drop.
pub struct PooledBuffer {
    buf: Box<[u8]>,
    idle: Arc<ArrayQueue<Box<[u8]>>>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        // A full queue just frees the buffer.
        let _ = self.idle.push(buf);
    }
}
