// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Admission queues between producer threads and the render thread.
//!
//! # Overview
//!
//! [`CommandQueue`] is a bounded multi-producer/single-consumer queue.  Capacity is handed
//! out as *slots*: a producer first reserves a slot with
//! [`CommandQueue::try_acquire_enqueue_slot`], then prepares its payload (which may involve
//! copying pixels into staging memory), then fills the slot.  Because the reservation is
//! an atomic compare-and-swap on the slot counter, two producers can never both observe
//! "one slot left" and both succeed.
//!
//! When no slot is available the caller keeps the data anyway and pushes it onto the
//! unbounded [`OverflowQueue`].  Nothing is dropped for lack of queue space; the cost is
//! unbounded memory growth under sustained overrun.

use crate::command::UploadCommand;
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounded queue with slot reservation.
pub struct CommandQueue {
    capacity: usize,
    //acquired slots, filled or not, that have not been drained yet
    reserved: AtomicUsize,
    items: Mutex<VecDeque<UploadCommand>>,
}

impl Debug for CommandQueue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("capacity", &self.capacity)
            .field("reserved", &self.reserved.load(Ordering::Relaxed))
            .finish()
    }
}

/**
A reserved place in a [`CommandQueue`].

Fill it with [`CommandQueue::try_enqueue_reserved`] or give it back with
[`EnqueueSlot::release`].  Dropping an unfilled slot releases it.
*/
#[must_use = "an unfilled slot holds queue capacity until it is released"]
pub struct EnqueueSlot<'a> {
    queue: &'a CommandQueue,
    armed: bool,
}

impl Debug for EnqueueSlot<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnqueueSlot").field("armed", &self.armed).finish()
    }
}

impl EnqueueSlot<'_> {
    /// Returns the reservation without enqueuing anything.
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for EnqueueSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.reserved.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        CommandQueue {
            capacity: capacity.max(1),
            reserved: AtomicUsize::new(0),
            items: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Atomically reserves one slot, or returns `None` when the queue is full.
    pub fn try_acquire_enqueue_slot(&self) -> Option<EnqueueSlot<'_>> {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .ok()
            .map(|_| EnqueueSlot {
                queue: self,
                armed: true,
            })
    }

    /**
    Fills a slot previously reserved on this queue.

    Under correct use this cannot fail; a slot that belongs to a different queue is
    released and the command handed back.
    */
    pub fn try_enqueue_reserved(
        &self,
        mut slot: EnqueueSlot<'_>,
        command: UploadCommand,
    ) -> Result<(), UploadCommand> {
        if !std::ptr::eq(slot.queue, self) {
            return Err(command);
        }
        self.items.lock().unwrap().push_back(command);
        //the slot now belongs to the queued command until it is drained
        slot.armed = false;
        Ok(())
    }

    /// Reserves and fills in one step.
    pub fn try_enqueue(&self, command: UploadCommand) -> Result<(), UploadCommand> {
        match self.try_acquire_enqueue_slot() {
            Some(slot) => self.try_enqueue_reserved(slot, command),
            None => Err(command),
        }
    }

    /// Explicitly returns an acquired-but-unused slot.
    pub fn release_enqueue_slot(&self, slot: EnqueueSlot<'_>) {
        slot.release()
    }

    /// Moves up to `max` commands, oldest first, onto the end of `out`.
    pub fn drain(&self, out: &mut Vec<UploadCommand>, max: usize) -> usize {
        let mut items = self.items.lock().unwrap();
        let n = max.min(items.len());
        out.extend(items.drain(..n));
        drop(items);
        self.reserved.fetch_sub(n, Ordering::AcqRel);
        n
    }

    /// Approximate occupancy including in-flight reservations.
    pub fn count(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Commands currently queued.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded queue that absorbs admissions when [`CommandQueue`] is full.
#[derive(Default)]
pub struct OverflowQueue {
    items: Mutex<VecDeque<UploadCommand>>,
    len: AtomicUsize,
}

impl Debug for OverflowQueue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverflowQueue")
            .field("len", &self.len())
            .finish()
    }
}

impl OverflowQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: UploadCommand) {
        let mut items = self.items.lock().unwrap();
        items.push_back(command);
        self.len.store(items.len(), Ordering::Release);
    }

    pub fn drain(&self, out: &mut Vec<UploadCommand>, max: usize) -> usize {
        let mut items = self.items.lock().unwrap();
        let n = max.min(items.len());
        out.extend(items.drain(..n));
        self.len.store(items.len(), Ordering::Release);
        n
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
