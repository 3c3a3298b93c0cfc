// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! texture_streaming moves pixel uploads off the critical path of a renderer.

Producer threads decode images, tiles or video frames and hand the pixels to a
[`StreamingManager`].  The render thread calls [`StreamingManager::tick_on_render_thread`] once
per frame, and the manager uploads as much pending work as the frame budget allows, highest
priority first.  Producers never wait on the GPU and never lose work to a full queue.

# Staging

The manager prefers, in order:

| Path             | Where the pixels wait                           | Used when                                                  |
|------------------|-------------------------------------------------|------------------------------------------------------------|
| Persistent ring  | One large persistently mapped staging buffer    | The device supports persistent mapping                     |
| Triple-buffered  | A few small fenced staging buffers              | No ring, the ring is full, or the item was copied off-ring |
| Direct           | The caller's memory, uploaded synchronously     | No staging memory is available and direct uploads are on   |

Ring memory is handed out FIFO and reclaimed as the fences of finished uploads signal, so the
ring never overwrites bytes the GPU may still read.  A full ring is not an error; the item
falls back to a pooled host copy and the [`FallbackReason`] is counted.

# Admission

* [`StreamingManager::stage_copy`] validates the request and copies the pixels before it
  returns, so the caller may reuse its buffer immediately.
* [`StreamingManager::enqueue`] takes shared ownership of the pixels as [`PixelData`] and
  defers validation to the render thread.

# Budgets

[`Settings::max_uploads_per_frame`] and [`Settings::max_bytes_per_frame`] bound each tick.
Work past the budget is carried over, ahead of newly queued work, to the next tick.
An item larger than the byte budget waits until the budget grows, unless
[`Settings::upload_oversized_first`] lets it go first in a tick.

# Backends

[`UploadDevice`] is the seam to the graphics API.  With the `backend_wgpu` feature (on by
default) [`WgpuUploadDevice`] uploads into [wgpu](https://wgpu.rs) textures.  [`SoftwareDevice`]
keeps textures in host memory and is useful for tests and headless tools.

# Diagnostics

[`StreamingManager::diagnostics_snapshot`] returns counters for admission, fallbacks, uploads
by path and priority tier, deferrals, drops and the state of the staging backend.
*/

mod backend;
mod bittricks;
mod command;
mod cpu_pool;
mod device;
mod diagnostics;
mod error;
mod imp;
mod manager;
pub mod pixel_formats;
mod queue;
mod request;
mod scheduler;
mod settings;
mod sys;

pub use backend::BackendKind;
pub use command::{CommandPayload, MappedFlushRange, PboUpload, StagingBufferId, UploadCommand};
pub use cpu_pool::{CpuBufferPool, PooledBytes};
pub use device::{DeviceCapabilities, GpuFence, MappedMemory, TextureWrite, UploadDevice};
pub use diagnostics::{DiagnosticsSnapshot, FallbackCounts, TierCounts};
pub use error::{BackendError, DeviceError, FallbackReason, RejectReason};
pub use imp::software::{DeviceStats, SoftwareDevice, TextureDesc};
pub use manager::{Staged, StreamingManager};
pub use pixel_formats::{PixelFormat, PixelType};
pub use queue::{CommandQueue, EnqueueSlot, OverflowQueue};
pub use request::{
    CubeFace, Dimensionality, LayoutError, PixelData, PixelSource, TextureId, UnpackOverrides,
    UploadDescriptor, UploadLayout, UploadRegion, UploadRequest, UploadTarget,
};
pub use scheduler::{PriorityTier, sort_batch};
pub use settings::Settings;

#[cfg(all(feature = "backend_wgpu", not(target_arch = "wasm32")))]
pub use imp::{WgpuFence, WgpuMapping, WgpuSetupError, WgpuStagingBuffer, WgpuUploadDevice};
