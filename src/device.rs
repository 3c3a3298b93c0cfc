// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The graphics capability the streaming subsystem drives.
//!
//! The subsystem never talks to a graphics API directly.  Everything it needs (staging
//! buffer allocation, mapping, flushing, texture sub-image uploads from a buffer or from
//! host memory, and fences) goes through [`UploadDevice`].  Two implementations ship with
//! the crate: a CPU emulation, [`crate::SoftwareDevice`], and a wgpu-backed device behind
//! the `backend_wgpu` feature.
//!
//! # Threading
//!
//! Device methods are only called from the render thread, with two exceptions that are
//! safe by construction:
//!
//! - [`MappedMemory`] writes happen on producer threads after the ring allocator's lock is
//!   released, into ranges the allocator has handed out exclusively;
//! - [`GpuFence::is_signaled`] is a zero-timeout poll and may run on any thread.

use crate::command::MappedFlushRange;
use crate::error::DeviceError;
use crate::pixel_formats::{PixelFormat, PixelType};
use crate::request::{TextureId, UploadDescriptor, UploadLayout, UploadRegion, UploadTarget};

/// Optional features the device offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Buffers can stay mapped while the GPU reads from them.
    pub persistent_mapping: bool,
    /// Persistent mappings can be coherent (no explicit flushes).
    pub coherent_mapping: bool,
}

/// Host view of a persistently mapped buffer.
pub trait MappedMemory: Send + Sync {
    fn len(&self) -> u64;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Copies `bytes` into the mapping at `offset`.
    fn write(&self, offset: u64, bytes: &[u8]);
    /// Copies from the mapping at `offset` into `out`.
    fn read(&self, offset: u64, out: &mut [u8]);
}

/// A GPU-signaled completion marker.
pub trait GpuFence: Send + Sync {
    /// Non-blocking poll.
    fn is_signaled(&self) -> bool;
}

/// Everything the device needs to perform one texture sub-image upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureWrite {
    pub texture: TextureId,
    pub target: UploadTarget,
    pub region: UploadRegion,
    pub format: PixelFormat,
    pub ty: PixelType,
    pub unpack_alignment: u32,
    pub layout: UploadLayout,
}

impl TextureWrite {
    pub fn new(descriptor: &UploadDescriptor, layout: UploadLayout) -> Self {
        TextureWrite {
            texture: descriptor.texture,
            target: descriptor.target,
            region: descriptor.region,
            format: descriptor.format,
            ty: descriptor.ty,
            unpack_alignment: descriptor.unpack.alignment,
            layout,
        }
    }

    /// Origin z, with cube faces mapped to their layer.
    pub fn origin_z(&self) -> u32 {
        match self.target {
            UploadTarget::CubeMapFace(face) => face.layer(),
            _ => self.region.z,
        }
    }
}

/**
The graphics API surface consumed by the streaming subsystem.

Buffers created by [`UploadDevice::create_persistent_buffer`] stay mapped for their whole
life; [`UploadDevice::create_staging_buffer`] buffers are written with
[`UploadDevice::write_orphaned`], which discards the previous storage first so that a
GPU read still in flight never observes the new contents.
*/
pub trait UploadDevice: Send + Sync + 'static {
    type Buffer: Send + Sync + 'static;
    type Mapping: MappedMemory + 'static;
    type Fence: GpuFence + 'static;

    fn capabilities(&self) -> DeviceCapabilities;

    fn create_persistent_buffer(
        &self,
        size: u64,
        coherent: bool,
    ) -> Result<(Self::Buffer, Self::Mapping), DeviceError>;

    /// Makes host writes in `range` visible to the GPU.
    fn flush_mapped_range(&self, buffer: &Self::Buffer, range: MappedFlushRange);

    /// Unmaps and frees a persistent buffer.
    fn release_persistent_buffer(&self, buffer: Self::Buffer, mapping: Self::Mapping);

    fn create_staging_buffer(&self, size: u64) -> Result<Self::Buffer, DeviceError>;

    /// Orphans the buffer's storage (reallocating `storage_size` bytes), maps
    /// `0..bytes.len()` write-only, copies `bytes` in and unmaps.
    fn write_orphaned(
        &self,
        buffer: &mut Self::Buffer,
        storage_size: u64,
        bytes: &[u8],
    ) -> Result<(), DeviceError>;

    fn release_buffer(&self, buffer: Self::Buffer);

    /// Sub-image upload reading from `buffer` starting at `offset`.
    fn upload_from_buffer(
        &self,
        buffer: &Self::Buffer,
        offset: u64,
        write: &TextureWrite,
    ) -> Result<(), DeviceError>;

    /// Sub-image upload reading straight from host memory.
    fn upload_from_cpu(&self, bytes: &[u8], write: &TextureWrite) -> Result<(), DeviceError>;

    /// Inserts a fence after every command issued so far.
    fn insert_fence(&self) -> Self::Fence;

    /// Lets the driver make progress on completions without blocking.
    fn poll(&self);

    /// Blocks until the GPU has finished all issued work.
    fn finish(&self);
}
