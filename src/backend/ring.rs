// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The persistent-mapped ring backend.

# Allocation

[`RingAllocator`] hands out aligned byte ranges of a fixed-capacity buffer.  Live ranges are
kept in a FIFO in allocation order; the oldest live range starts at the *tail*, and the next
allocation starts at the *head*.  A range is recorded the moment it is allocated, before any
fence exists for it, and receives its fence when the upload that reads it is submitted.
Retirement pops from the front only while the front range is finished, so the tail can never
pass a range that is staged but not yet submitted, whatever order uploads are submitted in.

Placement follows the ring shape:

```text
not wrapped:  [ free | tail ... head | free ]   try [head, capacity), else [0, tail)
wrapped:      [ ... head | free | tail ... ]    try [head, tail)
```

# Sharing

[`RingShared`] is published to producer threads, which stage straight into the mapping.
The allocator lives behind a mutex; the bytes themselves are copied outside the lock since
an allocated range is exclusive to its owner until it retires.
*/

use crate::backend::{BackendKind, StageFailure, StagedUpload, StagingBackend, next_buffer_id};
use crate::bittricks::{align_down, checked_align_up, sanitize_alignment};
use crate::command::{MappedFlushRange, PboUpload, StagingBufferId};
use crate::device::{GpuFence, MappedMemory, TextureWrite, UploadDevice};
use crate::error::{BackendError, DeviceError};
use crate::settings::Settings;
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
enum RegionState<T> {
    /// Holds data nobody has read yet.
    Staged,
    Submitted(T),
    /// Will never be read.
    Abandoned,
}

#[derive(Debug)]
struct PendingRegion<T> {
    offset: u64,
    size: u64,
    state: RegionState<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Allocation {
    pub(crate) offset: u64,
    pub(crate) size: u64,
}

/// Device-free ring allocator; `T` is whatever marks a range as finished (a fence).
#[derive(Debug)]
pub(crate) struct RingAllocator<T> {
    capacity: u64,
    alignment: u64,
    head: u64,
    pending: VecDeque<PendingRegion<T>>,
}

impl<T> RingAllocator<T> {
    /// Capacity is rounded down to the alignment.
    pub(crate) fn new(capacity: u64, alignment: u64) -> Result<Self, BackendError> {
        let alignment = sanitize_alignment(alignment);
        let usable = align_down(capacity, alignment);
        if usable == 0 {
            return Err(BackendError::RingTooSmall {
                capacity,
                alignment,
            });
        }
        Ok(RingAllocator {
            capacity: usable,
            alignment,
            head: 0,
            pending: VecDeque::new(),
        })
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.capacity
    }

    fn tail(&self) -> Option<u64> {
        self.pending.front().map(|r| r.offset)
    }

    pub(crate) fn allocate(&mut self, len: u64) -> Result<Allocation, StageFailure> {
        let size = checked_align_up(len.max(1), self.alignment).ok_or(StageFailure::TooLarge)?;
        if size > self.capacity {
            return Err(StageFailure::TooLarge);
        }
        let fits = |start: u64, end: u64| start.checked_add(size).is_some_and(|e| e <= end);
        let offset = match self.tail() {
            None => 0,
            Some(tail) if self.head > tail => {
                if fits(self.head, self.capacity) {
                    self.head
                } else if fits(0, tail) {
                    0
                } else {
                    return Err(StageFailure::Full);
                }
            }
            //wrapped; head == tail means every byte is in flight
            Some(tail) => {
                if fits(self.head, tail) {
                    self.head
                } else {
                    return Err(StageFailure::Full);
                }
            }
        };
        self.head = offset + size;
        self.pending.push_back(PendingRegion {
            offset,
            size,
            state: RegionState::Staged,
        });
        Ok(Allocation { offset, size })
    }

    /// Attaches the completion marker to the staged range at `offset`.
    pub(crate) fn attach(&mut self, offset: u64, marker: T) -> bool {
        match self
            .pending
            .iter_mut()
            .find(|r| r.offset == offset && matches!(r.state, RegionState::Staged))
        {
            Some(region) => {
                region.state = RegionState::Submitted(marker);
                true
            }
            None => false,
        }
    }

    /// Marks the staged range at `offset` as never going to be read.
    pub(crate) fn abandon(&mut self, offset: u64) {
        if let Some(region) = self
            .pending
            .iter_mut()
            .find(|r| r.offset == offset && matches!(r.state, RegionState::Staged))
        {
            region.state = RegionState::Abandoned;
        }
    }

    /// Retires finished ranges from the front.  Returns the bytes reclaimed.
    pub(crate) fn retire(&mut self, mut finished: impl FnMut(&T) -> bool) -> u64 {
        let mut reclaimed = 0;
        while let Some(front) = self.pending.front() {
            let done = match &front.state {
                RegionState::Staged => false,
                RegionState::Submitted(marker) => finished(marker),
                RegionState::Abandoned => true,
            };
            if !done {
                break;
            }
            reclaimed += front.size;
            self.pending.pop_front();
        }
        if self.pending.is_empty() {
            self.head = 0;
        }
        reclaimed
    }

    /// Forgets every range without waiting.
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
        self.head = 0;
    }

    pub(crate) fn bytes_in_flight(&self) -> u64 {
        self.pending.iter().map(|r| r.size).sum()
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

struct RingState<F> {
    allocator: RingAllocator<F>,
    disposed: bool,
}

/**
A persistently mapped ring shared between producers and the render thread.

Producers reach it through an `Arc` the manager publishes while the ring is active.  After
disposal the manager keeps it on a retired list: the mapping stays readable so commands that
still reference it can be re-homed, and the buffer is released once the last such command is
gone and no producer holds a reference.
*/
pub(crate) struct RingShared<D: UploadDevice> {
    id: StagingBufferId,
    buffer: D::Buffer,
    mapping: D::Mapping,
    coherent: bool,
    state: Mutex<RingState<D::Fence>>,
    //queued commands whose pixels live in this ring
    live_commands: AtomicUsize,
}

impl<D: UploadDevice> Debug for RingShared<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingShared")
            .field("id", &self.id)
            .field("coherent", &self.coherent)
            .field("live_commands", &self.live_commands.load(Ordering::Relaxed))
            .finish()
    }
}

impl<D: UploadDevice> RingShared<D> {
    pub(crate) fn create(device: &D, settings: &Settings) -> Result<Self, BackendError> {
        let caps = device.capabilities();
        if !caps.persistent_mapping {
            return Err(BackendError::PersistentUnsupported);
        }
        let allocator = RingAllocator::new(settings.ring_capacity, settings.allocation_alignment)?;
        let coherent = settings.use_coherent_mapping && caps.coherent_mapping;
        let (buffer, mapping) = device.create_persistent_buffer(allocator.capacity(), coherent)?;
        let id = next_buffer_id();
        logwise::info_sync!(
            "persistent ring {id} created with {capacity} bytes, coherent {coherent}",
            id = id.0,
            capacity = allocator.capacity(),
            coherent = logwise::privacy::LogIt(&coherent)
        );
        Ok(RingShared {
            id,
            buffer,
            mapping,
            coherent,
            state: Mutex::new(RingState {
                allocator,
                disposed: false,
            }),
            live_commands: AtomicUsize::new(0),
        })
    }

    pub(crate) fn id(&self) -> StagingBufferId {
        self.id
    }

    /// Retires what it can, allocates, and copies `bytes` into the mapping.
    pub(crate) fn try_stage(&self, bytes: &[u8]) -> Result<StagedUpload, StageFailure> {
        let allocation = {
            let mut state = self.state.lock().unwrap();
            if state.disposed {
                return Err(StageFailure::Disposed);
            }
            state.allocator.retire(|fence| fence.is_signaled());
            state.allocator.allocate(bytes.len() as u64)?
        };
        self.mapping.write(allocation.offset, bytes);
        Ok(StagedUpload {
            upload: PboUpload {
                buffer: self.id,
                offset: allocation.offset,
                size: allocation.size,
                slot: None,
            },
            flush: (!self.coherent).then_some(MappedFlushRange {
                offset: allocation.offset,
                size: bytes.len() as u64,
            }),
        })
    }

    /// Copies staged bytes back out of the mapping.
    pub(crate) fn read_back(&self, offset: u64, out: &mut [u8]) {
        self.mapping.read(offset, out)
    }

    fn issue(&self, device: &D, staged: &StagedUpload, write: &TextureWrite) -> Result<(), DeviceError> {
        if let Some(range) = staged.flush {
            device.flush_mapped_range(&self.buffer, range);
        }
        device.upload_from_buffer(&self.buffer, staged.upload.offset, write)
    }

    fn submit(&self, device: &D, offset: u64) {
        let fence = device.insert_fence();
        let mut state = self.state.lock().unwrap();
        if state.disposed {
            return;
        }
        if !state.allocator.attach(offset, fence) {
            logwise::error_sync!(
                "ring {id} has no staged range at offset {offset}",
                id = self.id.0,
                offset = offset
            );
        }
    }

    pub(crate) fn abandon(&self, offset: u64) {
        self.state.lock().unwrap().allocator.abandon(offset);
    }

    pub(crate) fn retire(&self) -> u64 {
        self.state
            .lock()
            .unwrap()
            .allocator
            .retire(|fence| fence.is_signaled())
    }

    /// Refuses further staging and drops every pending fence.
    pub(crate) fn dispose(&self) {
        let mut state = self.state.lock().unwrap();
        state.disposed = true;
        state.allocator.clear();
    }

    #[cfg(test)]
    pub(crate) fn is_disposed(&self) -> bool {
        self.state.lock().unwrap().disposed
    }

    pub(crate) fn bytes_in_flight(&self) -> u64 {
        self.state.lock().unwrap().allocator.bytes_in_flight()
    }

    pub(crate) fn retain_command(&self) {
        self.live_commands.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_command(&self) {
        self.live_commands.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn live_commands(&self) -> usize {
        self.live_commands.load(Ordering::Acquire)
    }

    /// Unmaps and frees the buffer.
    pub(crate) fn release(self, device: &D) {
        logwise::info_sync!("persistent ring {id} released", id = self.id.0);
        device.release_persistent_buffer(self.buffer, self.mapping);
    }
}

/**
Releases every retired ring that nothing references any more.

With `ignore_commands` (used once the manager is disposed) queued commands no longer keep
a ring alive; only producers still holding it do.
*/
pub(crate) fn release_retired<D: UploadDevice>(
    retired: &mut Vec<Arc<RingShared<D>>>,
    device: &D,
    ignore_commands: bool,
) {
    for ring in std::mem::take(retired) {
        if !ignore_commands && ring.live_commands() > 0 {
            retired.push(ring);
            continue;
        }
        match Arc::try_unwrap(ring) {
            Ok(ring) => ring.release(device),
            Err(ring) => retired.push(ring),
        }
    }
}

/// [`StagingBackend`] view of the active ring.
pub(crate) struct PersistentRing<D: UploadDevice> {
    shared: Arc<RingShared<D>>,
}

impl<D: UploadDevice> PersistentRing<D> {
    pub(crate) fn new(shared: Arc<RingShared<D>>) -> Self {
        PersistentRing { shared }
    }
}

impl<D: UploadDevice> StagingBackend<D> for PersistentRing<D> {
    fn kind(&self) -> BackendKind {
        BackendKind::PersistentRing
    }

    fn try_stage_upload(&mut self, _device: &D, bytes: &[u8]) -> Result<StagedUpload, StageFailure> {
        self.shared.try_stage(bytes)
    }

    fn issue_upload(
        &mut self,
        device: &D,
        staged: &StagedUpload,
        write: &TextureWrite,
    ) -> Result<(), DeviceError> {
        self.shared.issue(device, staged, write)
    }

    fn submit_upload(&mut self, device: &D, staged: &StagedUpload) {
        self.shared.submit(device, staged.upload.offset)
    }

    fn discard(&mut self, staged: &StagedUpload) {
        self.shared.abandon(staged.upload.offset)
    }

    fn tick(&mut self, _device: &D) {
        self.shared.retire();
    }

    fn dispose(&mut self, _device: &D) {
        self.shared.dispose();
        logwise::info_sync!("persistent ring {id} disposed", id = self.shared.id.0);
    }

    fn owns(&self, buffer: StagingBufferId) -> bool {
        self.shared.id == buffer
    }
}
