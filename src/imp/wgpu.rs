// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
wgpu implementation of the upload device.

wgpu has no persistently mapped upload memory that texture copies can read at arbitrary
row pitches (`copy_buffer_to_texture` wants 256-byte aligned rows).  Staging buffers are
therefore host shadows, and every upload goes through `Queue::write_texture`, which copies
the bytes into wgpu's own staging memory at call time.  That makes the shadow reusable as
soon as the call returns; the streaming subsystem still fences it like real GPU memory.
*/

use crate::command::MappedFlushRange;
use crate::device::{DeviceCapabilities, GpuFence, MappedMemory, TextureWrite, UploadDevice};
use crate::error::DeviceError;
use crate::request::{TextureId, UploadTarget};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use wgpu::{Extent3d, Origin3d, PollType, TexelCopyBufferLayout, TexelCopyTextureInfo};

#[derive(Debug, thiserror::Error)]
pub enum WgpuSetupError {
    #[error("no suitable adapter")]
    NoSuchAdapter,
    #[error(transparent)]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

type Shadow = Arc<Mutex<Box<[u8]>>>;

fn shadow(len: u64) -> Result<Shadow, DeviceError> {
    let len = usize::try_from(len).map_err(|_| DeviceError::OutOfMemory)?;
    Ok(Arc::new(Mutex::new(vec![0; len].into_boxed_slice())))
}

#[derive(Debug)]
pub struct WgpuStagingBuffer {
    bytes: Shadow,
}

#[derive(Debug)]
pub struct WgpuMapping {
    bytes: Shadow,
    len: u64,
}

impl MappedMemory for WgpuMapping {
    fn len(&self) -> u64 {
        self.len
    }

    fn write(&self, offset: u64, bytes: &[u8]) {
        let mut memory = self.bytes.lock().unwrap();
        let start = offset as usize;
        memory[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn read(&self, offset: u64, out: &mut [u8]) {
        let memory = self.bytes.lock().unwrap();
        let start = offset as usize;
        out.copy_from_slice(&memory[start..start + out.len()]);
    }
}

/// Set once the queue has finished the submission it was inserted after.
#[derive(Debug)]
pub struct WgpuFence {
    done: Arc<AtomicBool>,
}

impl GpuFence for WgpuFence {
    fn is_signaled(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/**
Uploads into wgpu textures.

Textures are created by the caller and registered with
[`WgpuUploadDevice::register_texture`] to obtain the [`TextureId`] that upload requests name.
*/
#[derive(Debug)]
pub struct WgpuUploadDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    textures: Mutex<HashMap<TextureId, wgpu::Texture>>,
    next_texture: AtomicU32,
}

impl WgpuUploadDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        WgpuUploadDevice {
            device,
            queue,
            textures: Mutex::new(HashMap::new()),
            next_texture: AtomicU32::new(1),
        }
    }

    /// Opens a device on `adapter` with default limits.
    pub async fn from_adapter(adapter: &wgpu::Adapter) -> Result<Self, WgpuSetupError> {
        let descriptor = wgpu::DeviceDescriptor {
            label: Some("texture streaming"),
            ..Default::default()
        };
        let (device, queue) = adapter.request_device(&descriptor).await?;
        Ok(Self::new(device, queue))
    }

    /// Picks the default adapter of `instance` and opens a device on it.
    pub async fn from_instance(instance: &wgpu::Instance) -> Result<Self, WgpuSetupError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|_| WgpuSetupError::NoSuchAdapter)?;
        Self::from_adapter(&adapter).await
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Makes `texture` addressable by upload requests.  It needs `COPY_DST` usage.
    pub fn register_texture(&self, texture: wgpu::Texture) -> TextureId {
        let id = TextureId(self.next_texture.fetch_add(1, Ordering::Relaxed));
        self.textures.lock().unwrap().insert(id, texture);
        id
    }

    pub fn unregister_texture(&self, id: TextureId) -> Option<wgpu::Texture> {
        self.textures.lock().unwrap().remove(&id)
    }

    fn write_texture(&self, data: &[u8], write: &TextureWrite) -> Result<(), DeviceError> {
        if matches!(write.target, UploadTarget::Texture1DArray) {
            return Err(DeviceError::Unsupported("1D array textures"));
        }
        let textures = self.textures.lock().unwrap();
        let texture = textures
            .get(&write.texture)
            .ok_or(DeviceError::UnknownTexture(write.texture))?;
        let layout = &write.layout;
        let r = &write.region;
        if texture.format().block_copy_size(None) != Some(layout.bytes_per_pixel) {
            return Err(DeviceError::Unsupported("pixel size differs from the texture format"));
        }
        if r.mip_level >= texture.mip_level_count() {
            return Err(DeviceError::OutOfBounds);
        }
        let extent = texture.size().mip_level_size(r.mip_level, texture.dimension());
        let z = write.origin_z();
        let inside = |origin: u32, size: u32, limit: u32| {
            origin.checked_add(size).is_some_and(|end| end <= limit)
        };
        if !inside(r.x, r.width, extent.width)
            || !inside(r.y, r.height, extent.height)
            || !inside(z, r.depth, extent.depth_or_array_layers)
        {
            return Err(DeviceError::OutOfBounds);
        }
        let data = data
            .get(..layout.byte_count as usize)
            .ok_or(DeviceError::OutOfBounds)?;
        let bytes_per_row = u32::try_from(layout.row_stride).map_err(|_| DeviceError::OutOfBounds)?;

        self.queue.write_texture(
            TexelCopyTextureInfo {
                texture,
                mip_level: r.mip_level,
                origin: Origin3d { x: r.x, y: r.y, z },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(layout.image_height),
            },
            Extent3d {
                width: r.width,
                height: r.height,
                depth_or_array_layers: r.depth,
            },
        );
        Ok(())
    }
}

impl UploadDevice for WgpuUploadDevice {
    type Buffer = WgpuStagingBuffer;
    type Mapping = WgpuMapping;
    type Fence = WgpuFence;

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            persistent_mapping: true,
            coherent_mapping: false,
        }
    }

    fn create_persistent_buffer(
        &self,
        size: u64,
        _coherent: bool,
    ) -> Result<(WgpuStagingBuffer, WgpuMapping), DeviceError> {
        let bytes = shadow(size)?;
        Ok((
            WgpuStagingBuffer {
                bytes: bytes.clone(),
            },
            WgpuMapping { bytes, len: size },
        ))
    }

    fn flush_mapped_range(&self, _buffer: &WgpuStagingBuffer, _range: MappedFlushRange) {
        //write_texture reads the shadow directly
    }

    fn release_persistent_buffer(&self, _buffer: WgpuStagingBuffer, _mapping: WgpuMapping) {}

    fn create_staging_buffer(&self, size: u64) -> Result<WgpuStagingBuffer, DeviceError> {
        Ok(WgpuStagingBuffer {
            bytes: shadow(size)?,
        })
    }

    fn write_orphaned(
        &self,
        buffer: &mut WgpuStagingBuffer,
        storage_size: u64,
        bytes: &[u8],
    ) -> Result<(), DeviceError> {
        if bytes.len() as u64 > storage_size {
            return Err(DeviceError::OutOfBounds);
        }
        let fresh = shadow(storage_size)?;
        fresh.lock().unwrap()[..bytes.len()].copy_from_slice(bytes);
        buffer.bytes = fresh;
        Ok(())
    }

    fn release_buffer(&self, _buffer: WgpuStagingBuffer) {}

    fn upload_from_buffer(
        &self,
        buffer: &WgpuStagingBuffer,
        offset: u64,
        write: &TextureWrite,
    ) -> Result<(), DeviceError> {
        let bytes = buffer.bytes.lock().unwrap();
        let source = bytes
            .get(offset as usize..)
            .ok_or(DeviceError::OutOfBounds)?;
        self.write_texture(source, write)
    }

    fn upload_from_cpu(&self, bytes: &[u8], write: &TextureWrite) -> Result<(), DeviceError> {
        self.write_texture(bytes, write)
    }

    fn insert_fence(&self) -> WgpuFence {
        //an empty submission flushes the queued texture writes
        self.queue.submit(std::iter::empty::<wgpu::CommandBuffer>());
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        self.queue.on_submitted_work_done(move || {
            flag.store(true, Ordering::Release);
        });
        WgpuFence { done }
    }

    fn poll(&self) {
        let _ = self.device.poll(PollType::Poll);
    }

    fn finish(&self) {
        self.queue.submit(std::iter::empty::<wgpu::CommandBuffer>());
        let _ = self.device.poll(PollType::Wait);
    }
}
