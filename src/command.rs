// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Admitted upload work.
//!
//! An [`UploadCommand`] is created when a request is admitted and consumed exactly once by
//! the render thread.  Its [`CommandPayload`] records where the pixels currently live:
//!
//! | Variant              | Pixels live in                       | Extra state                   |
//! |----------------------|--------------------------------------|-------------------------------|
//! | `FromCpuArray`       | the caller's shared [`PixelData`]    | none                          |
//! | `FromPersistentRing` | the persistent ring staging buffer   | [`PboUpload`] + flush range   |
//! | `FromOwnedCpuBytes`  | a [`PooledBytes`] copy               | none; dropped after upload    |

use crate::cpu_pool::PooledBytes;
use crate::request::{LayoutError, PixelData, UploadDescriptor, UploadLayout};

/// Identity of a staging buffer owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StagingBufferId(pub u64);

/// Where a staged copy of the pixels lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PboUpload {
    pub buffer: StagingBufferId,
    pub offset: u64,
    /// Bytes reserved for the allocation (aligned).
    pub size: u64,
    /// Pool slot index, or `None` for ring allocations.
    pub slot: Option<usize>,
}

/// A range of a non-coherent mapping that must be flushed before the GPU reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappedFlushRange {
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug)]
pub enum CommandPayload {
    FromCpuArray(PixelData),
    FromPersistentRing {
        upload: PboUpload,
        flush: Option<MappedFlushRange>,
    },
    FromOwnedCpuBytes(PooledBytes),
}

#[derive(Debug)]
pub struct UploadCommand {
    /// Assigned at admission, never reused.  Breaks priority ties.
    pub sequence: u64,
    pub descriptor: UploadDescriptor,
    /// Derived at admission; malformed commands are dropped when drained.
    pub layout: Result<UploadLayout, LayoutError>,
    pub payload: CommandPayload,
}

impl UploadCommand {
    pub fn new(sequence: u64, descriptor: UploadDescriptor, payload: CommandPayload) -> Self {
        UploadCommand {
            sequence,
            descriptor,
            layout: descriptor.layout(),
            payload,
        }
    }

    pub fn priority(&self) -> i32 {
        self.descriptor.priority
    }

    /// Bytes the upload reads, or zero for malformed commands.
    pub fn byte_count(&self) -> u64 {
        self.layout.map(|l| l.byte_count).unwrap_or(0)
    }

    /// Re-checks the command against its payload just before upload.
    pub fn validate(&self) -> Result<UploadLayout, LayoutError> {
        let layout = self.layout?;
        let available = match &self.payload {
            CommandPayload::FromCpuArray(data) => {
                self.descriptor.check_source(&layout, data.as_source())?;
                return Ok(layout);
            }
            CommandPayload::FromPersistentRing { upload, .. } => upload.size,
            CommandPayload::FromOwnedCpuBytes(bytes) => bytes.len() as u64,
        };
        if available < layout.byte_count {
            return Err(LayoutError::DataTooSmall {
                required: layout.byte_count,
                available,
            });
        }
        Ok(layout)
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self.payload {
            CommandPayload::FromCpuArray(_) => "cpu_array",
            CommandPayload::FromPersistentRing { .. } => "persistent_ring",
            CommandPayload::FromOwnedCpuBytes(_) => "owned_cpu",
        }
    }
}
