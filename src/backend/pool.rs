// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The triple-buffered pool backend.
//!
//! A fixed set of small staging buffers, each guarded by the fence of the last upload that
//! read it.  Slots are scanned round-robin from a cursor that advances on every submit, so
//! consecutive uploads land in different buffers.  Every stage orphans the slot's storage
//! before writing, which keeps a GPU read that is still in flight away from the new bytes.

use crate::backend::{BackendKind, StageFailure, StagedUpload, StagingBackend, next_buffer_id};
use crate::command::{PboUpload, StagingBufferId};
use crate::device::{GpuFence, TextureWrite, UploadDevice};
use crate::error::{BackendError, DeviceError};
use crate::settings::Settings;
use std::fmt::{Debug, Formatter};

struct PoolSlot<D: UploadDevice> {
    id: StagingBufferId,
    buffer: D::Buffer,
    fence: Option<D::Fence>,
}

impl<D: UploadDevice> PoolSlot<D> {
    /// Clears a signaled fence.  True when the slot may be written.
    fn is_free(&mut self) -> bool {
        match &self.fence {
            None => true,
            Some(fence) if fence.is_signaled() => {
                self.fence = None;
                true
            }
            Some(_) => false,
        }
    }
}

pub(crate) struct TripleBufferedPool<D: UploadDevice> {
    slots: Vec<PoolSlot<D>>,
    cursor: usize,
    slot_size: u64,
}

impl<D: UploadDevice> Debug for TripleBufferedPool<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripleBufferedPool")
            .field("slots", &self.slots.len())
            .field("cursor", &self.cursor)
            .field("slot_size", &self.slot_size)
            .finish()
    }
}

impl<D: UploadDevice> TripleBufferedPool<D> {
    pub(crate) fn create(device: &D, settings: &Settings) -> Result<Self, BackendError> {
        let count = settings.pool_slot_count();
        let slot_size = settings.pool_slot_size.max(1);
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            match device.create_staging_buffer(slot_size) {
                Ok(buffer) => slots.push(PoolSlot {
                    id: next_buffer_id(),
                    buffer,
                    fence: None,
                }),
                Err(e) => {
                    for slot in slots {
                        device.release_buffer(slot.buffer);
                    }
                    return Err(e.into());
                }
            }
        }
        logwise::info_sync!(
            "staging pool created with {count} slots of {slot_size} bytes",
            count = count,
            slot_size = slot_size
        );
        Ok(TripleBufferedPool {
            slots,
            cursor: 0,
            slot_size,
        })
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn slot_mut(&mut self, staged: &StagedUpload) -> Option<&mut PoolSlot<D>> {
        let slot = self.slots.get_mut(staged.upload.slot?)?;
        (slot.id == staged.upload.buffer).then_some(slot)
    }
}

impl<D: UploadDevice> StagingBackend<D> for TripleBufferedPool<D> {
    fn kind(&self) -> BackendKind {
        BackendKind::TripleBuffered
    }

    fn try_stage_upload(&mut self, device: &D, bytes: &[u8]) -> Result<StagedUpload, StageFailure> {
        if bytes.len() as u64 > self.slot_size {
            return Err(StageFailure::TooLarge);
        }
        let n = self.slots.len();
        if n == 0 {
            return Err(StageFailure::Disposed);
        }
        let index = (0..n)
            .map(|i| (self.cursor + i) % n)
            .find(|&i| self.slots[i].is_free())
            .ok_or(StageFailure::Full)?;
        let slot = &mut self.slots[index];
        device
            .write_orphaned(&mut slot.buffer, self.slot_size, bytes)
            .map_err(StageFailure::Device)?;
        Ok(StagedUpload {
            upload: PboUpload {
                buffer: slot.id,
                offset: 0,
                size: bytes.len() as u64,
                slot: Some(index),
            },
            flush: None,
        })
    }

    fn issue_upload(
        &mut self,
        device: &D,
        staged: &StagedUpload,
        write: &TextureWrite,
    ) -> Result<(), DeviceError> {
        let slot = self
            .slot_mut(staged)
            .ok_or_else(|| DeviceError::Backend("upload was not staged in this pool".to_string()))?;
        device.upload_from_buffer(&slot.buffer, staged.upload.offset, write)
    }

    fn submit_upload(&mut self, device: &D, staged: &StagedUpload) {
        let n = self.slots.len();
        let Some(index) = staged.upload.slot else {
            return;
        };
        if let Some(slot) = self.slot_mut(staged) {
            slot.fence = Some(device.insert_fence());
            self.cursor = (index + 1) % n;
        }
    }

    fn discard(&mut self, _staged: &StagedUpload) {
        //an unfenced slot is already free
    }

    fn tick(&mut self, _device: &D) {
        for slot in &mut self.slots {
            slot.is_free();
        }
    }

    fn dispose(&mut self, device: &D) {
        let count = self.slots.len();
        for slot in self.slots.drain(..) {
            device.release_buffer(slot.buffer);
        }
        self.cursor = 0;
        logwise::info_sync!("staging pool disposed ({count} slots)", count = count);
    }

    fn owns(&self, buffer: StagingBufferId) -> bool {
        self.slots.iter().any(|s| s.id == buffer)
    }
}
