// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Pooled host memory for the owned-CPU fallback path.

When a producer cannot stage straight into GPU-visible memory it copies its pixels into
a [PooledBytes].  The handle has exactly one owner: the producer fills it, hands it to the
queue, and the render thread drops it once the upload call has been issued (or the command
is discarded).  Dropping returns the allocation to the pool so that bursts of fallback
uploads do not churn the allocator.
*/

use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const DEFAULT_MAX_RETAINED: usize = 32;
const DEFAULT_MAX_RETAINED_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug)]
struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    outstanding_bytes: AtomicU64,
    max_retained: usize,
    max_retained_bytes: usize,
}

impl PoolInner {
    fn give_back(&self, bytes: Vec<u8>) {
        self.outstanding_bytes
            .fetch_sub(bytes.len() as u64, Ordering::Relaxed);
        if bytes.capacity() > self.max_retained_bytes {
            return;
        }
        let mut free = self.free.lock().unwrap();
        if free.len() < self.max_retained {
            free.push(bytes);
        }
    }
}

/// Recycles host buffers for owned fallback copies.
#[derive(Debug, Clone)]
pub struct CpuBufferPool {
    inner: Arc<PoolInner>,
}

impl Default for CpuBufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETAINED, DEFAULT_MAX_RETAINED_BYTES)
    }
}

impl CpuBufferPool {
    /**
    Creates a pool that keeps at most `max_retained` free buffers, none larger than
    `max_retained_bytes`.
    */
    pub fn new(max_retained: usize, max_retained_bytes: usize) -> Self {
        CpuBufferPool {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                outstanding_bytes: AtomicU64::new(0),
                max_retained,
                max_retained_bytes,
            }),
        }
    }

    /// Copies `source` into a pooled buffer.
    pub fn copy_from(&self, source: &[u8]) -> PooledBytes {
        self.fill_with(source.len(), |bytes| bytes.copy_from_slice(source))
    }

    /// Hands `fill` a zeroed pooled buffer of `len` bytes to write into.
    pub fn fill_with(&self, len: usize, fill: impl FnOnce(&mut [u8])) -> PooledBytes {
        let recycled = {
            let mut free = self.inner.free.lock().unwrap();
            free.iter()
                .position(|b| b.capacity() >= len)
                .map(|i| free.swap_remove(i))
        };
        let mut bytes = recycled.unwrap_or_else(|| Vec::with_capacity(len));
        bytes.clear();
        bytes.resize(len, 0);
        fill(&mut bytes);
        self.inner
            .outstanding_bytes
            .fetch_add(len as u64, Ordering::Relaxed);
        PooledBytes {
            bytes,
            pool: self.inner.clone(),
        }
    }

    /// Bytes currently held by live handles.
    pub fn outstanding_bytes(&self) -> u64 {
        self.inner.outstanding_bytes.load(Ordering::Relaxed)
    }

    /// Number of idle buffers waiting for reuse.
    pub fn retained(&self) -> usize {
        self.inner.free.lock().unwrap().len()
    }
}

/// Single-owner handle to pooled pixel bytes; returns its memory on drop.
pub struct PooledBytes {
    bytes: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl PooledBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for PooledBytes {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.bytes));
    }
}

impl Debug for PooledBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBytes")
            .field("len", &self.bytes.len())
            .finish()
    }
}
