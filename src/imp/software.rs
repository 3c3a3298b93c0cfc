// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A CPU emulation of the upload device.

Textures are byte images, buffers are shared host memory and fences are points on a
timeline.  Non-coherent persistent mappings are emulated faithfully: host writes land in a
shadow copy and only become visible to uploads after [`UploadDevice::flush_mapped_range`].

The device can be told to misbehave (fail direct uploads, refuse persistent buffers, hold
fences unsignaled) and counts every call it receives, which makes it the device of choice
for tests and headless tools.
*/

use crate::command::MappedFlushRange;
use crate::device::{DeviceCapabilities, GpuFence, MappedMemory, TextureWrite, UploadDevice};
use crate::error::DeviceError;
use crate::request::TextureId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Shape of an emulated texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, layers for arrays and cube maps.
    pub depth_or_layers: u32,
    pub bytes_per_pixel: u32,
    pub mip_levels: u32,
}

impl TextureDesc {
    pub fn new_2d(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        TextureDesc {
            width,
            height,
            depth_or_layers: 1,
            bytes_per_pixel,
            mip_levels: 1,
        }
    }

    /// Extent of `level`; layers do not shrink.
    fn level_extent(&self, level: u32) -> (u32, u32, u32) {
        (
            self.width.checked_shr(level).unwrap_or(0).max(1),
            self.height.checked_shr(level).unwrap_or(0).max(1),
            self.depth_or_layers,
        )
    }
}

#[derive(Debug)]
struct SoftTexture {
    desc: TextureDesc,
    levels: Vec<Vec<u8>>,
}

impl SoftTexture {
    fn new(desc: TextureDesc) -> Self {
        let levels = (0..desc.mip_levels.max(1))
            .map(|level| {
                let (w, h, d) = desc.level_extent(level);
                vec![0u8; w as usize * h as usize * d as usize * desc.bytes_per_pixel as usize]
            })
            .collect();
        SoftTexture { desc, levels }
    }

    fn write(&mut self, source: &[u8], write: &TextureWrite) -> Result<(), DeviceError> {
        let layout = &write.layout;
        if layout.bytes_per_pixel != self.desc.bytes_per_pixel {
            return Err(DeviceError::Unsupported("pixel size differs from the texture's"));
        }
        if (source.len() as u64) < layout.byte_count {
            return Err(DeviceError::OutOfBounds);
        }
        let r = &write.region;
        let level = self
            .levels
            .get_mut(r.mip_level as usize)
            .ok_or(DeviceError::OutOfBounds)?;
        let (w, h, d) = self.desc.level_extent(r.mip_level);
        let z0 = write.origin_z();
        let inside = |origin: u32, extent: u32, limit: u32| {
            origin.checked_add(extent).is_some_and(|end| end <= limit)
        };
        if !inside(r.x, r.width, w) || !inside(r.y, r.height, h) || !inside(z0, r.depth, d) {
            return Err(DeviceError::OutOfBounds);
        }

        let bpp = self.desc.bytes_per_pixel as usize;
        let row_bytes = r.width as usize * bpp;
        for z in 0..r.depth as usize {
            for y in 0..r.height as usize {
                let src = z * layout.image_stride as usize + y * layout.row_stride as usize;
                let dst_row = ((z0 as usize + z) * h as usize + r.y as usize + y) * w as usize;
                let dst = (dst_row + r.x as usize) * bpp;
                level[dst..dst + row_bytes].copy_from_slice(&source[src..src + row_bytes]);
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BufferStorage {
    //what uploads read
    visible: Mutex<Vec<u8>>,
    //host writes of a non-coherent mapping, published by flushes
    shadow: Option<Mutex<Vec<u8>>>,
}

/// An emulated GPU buffer.
#[derive(Debug)]
pub struct SoftBuffer {
    storage: Arc<BufferStorage>,
}

/// The host view of an emulated persistent buffer.
#[derive(Debug)]
pub struct SoftMapping {
    storage: Arc<BufferStorage>,
    len: u64,
}

impl MappedMemory for SoftMapping {
    fn len(&self) -> u64 {
        self.len
    }

    fn write(&self, offset: u64, bytes: &[u8]) {
        let target = self.storage.shadow.as_ref().unwrap_or(&self.storage.visible);
        let mut memory = target.lock().unwrap();
        let start = offset as usize;
        memory[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn read(&self, offset: u64, out: &mut [u8]) {
        let source = self.storage.shadow.as_ref().unwrap_or(&self.storage.visible);
        let memory = source.lock().unwrap();
        let start = offset as usize;
        out.copy_from_slice(&memory[start..start + out.len()]);
    }
}

/// A point on the emulated GPU timeline.
#[derive(Debug)]
pub struct SoftFence {
    value: u64,
    completed: Arc<AtomicU64>,
}

impl GpuFence for SoftFence {
    fn is_signaled(&self) -> bool {
        self.completed.load(Ordering::Acquire) >= self.value
    }
}

/// Calls the device has received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub direct_uploads: u64,
    pub buffer_uploads: u64,
    pub failed_uploads: u64,
    pub flushes: u64,
    pub flushed_bytes: u64,
    pub orphaned_writes: u64,
    pub fences_inserted: u64,
    pub persistent_buffers_created: u64,
    pub persistent_buffers_released: u64,
    pub staging_buffers_created: u64,
    pub staging_buffers_released: u64,
    pub finishes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    direct_uploads: AtomicU64,
    buffer_uploads: AtomicU64,
    failed_uploads: AtomicU64,
    flushes: AtomicU64,
    flushed_bytes: AtomicU64,
    orphaned_writes: AtomicU64,
    fences_inserted: AtomicU64,
    persistent_buffers_created: AtomicU64,
    persistent_buffers_released: AtomicU64,
    staging_buffers_created: AtomicU64,
    staging_buffers_released: AtomicU64,
    finishes: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

/// CPU emulation of [`UploadDevice`].
#[derive(Debug)]
pub struct SoftwareDevice {
    capabilities: Mutex<DeviceCapabilities>,
    textures: Mutex<HashMap<TextureId, SoftTexture>>,
    next_texture: AtomicU32,
    issued: AtomicU64,
    completed: Arc<AtomicU64>,
    auto_signal: AtomicBool,
    fail_direct_uploads: AtomicU32,
    fail_persistent_creation: AtomicBool,
    counters: Counters,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    /// A device with coherent persistent mapping whose fences signal on the next poll.
    pub fn new() -> Self {
        SoftwareDevice {
            capabilities: Mutex::new(DeviceCapabilities {
                persistent_mapping: true,
                coherent_mapping: true,
            }),
            textures: Mutex::new(HashMap::new()),
            next_texture: AtomicU32::new(1),
            issued: AtomicU64::new(0),
            completed: Arc::new(AtomicU64::new(0)),
            auto_signal: AtomicBool::new(true),
            fail_direct_uploads: AtomicU32::new(0),
            fail_persistent_creation: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        let device = Self::new();
        device.set_capabilities(capabilities);
        device
    }

    pub fn set_capabilities(&self, capabilities: DeviceCapabilities) {
        *self.capabilities.lock().unwrap() = capabilities;
    }

    pub fn create_texture(&self, desc: TextureDesc) -> TextureId {
        let id = TextureId(self.next_texture.fetch_add(1, Ordering::Relaxed));
        self.textures
            .lock()
            .unwrap()
            .insert(id, SoftTexture::new(desc));
        id
    }

    /// Contents of one mip level, or `None` for unknown textures and levels.
    pub fn texture_bytes(&self, texture: TextureId, level: u32) -> Option<Vec<u8>> {
        self.textures
            .lock()
            .unwrap()
            .get(&texture)?
            .levels
            .get(level as usize)
            .cloned()
    }

    /// When on (the default), every [`UploadDevice::poll`] completes all issued work.
    pub fn set_auto_signal(&self, on: bool) {
        self.auto_signal.store(on, Ordering::Relaxed);
    }

    /// Completes every fence inserted so far.
    pub fn signal_all(&self) {
        self.completed
            .store(self.issued.load(Ordering::Acquire), Ordering::Release);
    }

    /// Makes the next `count` direct uploads fail with [`DeviceError::Lost`].
    pub fn fail_next_direct_uploads(&self, count: u32) {
        self.fail_direct_uploads.store(count, Ordering::Relaxed);
    }

    pub fn fail_persistent_creation(&self, fail: bool) {
        self.fail_persistent_creation.store(fail, Ordering::Relaxed);
    }

    pub fn stats(&self) -> DeviceStats {
        let c = &self.counters;
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        DeviceStats {
            direct_uploads: load(&c.direct_uploads),
            buffer_uploads: load(&c.buffer_uploads),
            failed_uploads: load(&c.failed_uploads),
            flushes: load(&c.flushes),
            flushed_bytes: load(&c.flushed_bytes),
            orphaned_writes: load(&c.orphaned_writes),
            fences_inserted: load(&c.fences_inserted),
            persistent_buffers_created: load(&c.persistent_buffers_created),
            persistent_buffers_released: load(&c.persistent_buffers_released),
            staging_buffers_created: load(&c.staging_buffers_created),
            staging_buffers_released: load(&c.staging_buffers_released),
            finishes: load(&c.finishes),
        }
    }

    fn write_texture(&self, source: &[u8], write: &TextureWrite) -> Result<(), DeviceError> {
        let mut textures = self.textures.lock().unwrap();
        let texture = textures
            .get_mut(&write.texture)
            .ok_or(DeviceError::UnknownTexture(write.texture))?;
        let result = texture.write(source, write);
        if result.is_err() {
            bump(&self.counters.failed_uploads, 1);
        }
        result
    }
}

impl UploadDevice for SoftwareDevice {
    type Buffer = SoftBuffer;
    type Mapping = SoftMapping;
    type Fence = SoftFence;

    fn capabilities(&self) -> DeviceCapabilities {
        *self.capabilities.lock().unwrap()
    }

    fn create_persistent_buffer(
        &self,
        size: u64,
        coherent: bool,
    ) -> Result<(SoftBuffer, SoftMapping), DeviceError> {
        if !self.capabilities().persistent_mapping {
            return Err(DeviceError::Unsupported("persistent mapping"));
        }
        if self.fail_persistent_creation.load(Ordering::Relaxed) {
            return Err(DeviceError::OutOfMemory);
        }
        let len = usize::try_from(size).map_err(|_| DeviceError::OutOfMemory)?;
        let storage = Arc::new(BufferStorage {
            visible: Mutex::new(vec![0; len]),
            shadow: (!coherent).then(|| Mutex::new(vec![0; len])),
        });
        bump(&self.counters.persistent_buffers_created, 1);
        Ok((
            SoftBuffer {
                storage: storage.clone(),
            },
            SoftMapping { storage, len: size },
        ))
    }

    fn flush_mapped_range(&self, buffer: &SoftBuffer, range: MappedFlushRange) {
        bump(&self.counters.flushes, 1);
        bump(&self.counters.flushed_bytes, range.size);
        if let Some(shadow) = &buffer.storage.shadow {
            let shadow = shadow.lock().unwrap();
            let mut visible = buffer.storage.visible.lock().unwrap();
            let start = range.offset as usize;
            let end = start + range.size as usize;
            visible[start..end].copy_from_slice(&shadow[start..end]);
        }
    }

    fn release_persistent_buffer(&self, _buffer: SoftBuffer, _mapping: SoftMapping) {
        bump(&self.counters.persistent_buffers_released, 1);
    }

    fn create_staging_buffer(&self, size: u64) -> Result<SoftBuffer, DeviceError> {
        let len = usize::try_from(size).map_err(|_| DeviceError::OutOfMemory)?;
        bump(&self.counters.staging_buffers_created, 1);
        Ok(SoftBuffer {
            storage: Arc::new(BufferStorage {
                visible: Mutex::new(vec![0; len]),
                shadow: None,
            }),
        })
    }

    fn write_orphaned(
        &self,
        buffer: &mut SoftBuffer,
        storage_size: u64,
        bytes: &[u8],
    ) -> Result<(), DeviceError> {
        if bytes.len() as u64 > storage_size {
            return Err(DeviceError::OutOfBounds);
        }
        let len = usize::try_from(storage_size).map_err(|_| DeviceError::OutOfMemory)?;
        //fresh storage; an in-flight reader keeps the old allocation alive
        let mut fresh = vec![0; len];
        fresh[..bytes.len()].copy_from_slice(bytes);
        buffer.storage = Arc::new(BufferStorage {
            visible: Mutex::new(fresh),
            shadow: None,
        });
        bump(&self.counters.orphaned_writes, 1);
        Ok(())
    }

    fn release_buffer(&self, _buffer: SoftBuffer) {
        bump(&self.counters.staging_buffers_released, 1);
    }

    fn upload_from_buffer(
        &self,
        buffer: &SoftBuffer,
        offset: u64,
        write: &TextureWrite,
    ) -> Result<(), DeviceError> {
        bump(&self.counters.buffer_uploads, 1);
        let visible = buffer.storage.visible.lock().unwrap();
        let source = visible
            .get(offset as usize..)
            .ok_or(DeviceError::OutOfBounds)?;
        self.write_texture(source, write)
    }

    fn upload_from_cpu(&self, bytes: &[u8], write: &TextureWrite) -> Result<(), DeviceError> {
        let failing = self
            .fail_direct_uploads
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            bump(&self.counters.failed_uploads, 1);
            return Err(DeviceError::Lost);
        }
        bump(&self.counters.direct_uploads, 1);
        self.write_texture(bytes, write)
    }

    fn insert_fence(&self) -> SoftFence {
        bump(&self.counters.fences_inserted, 1);
        SoftFence {
            value: self.issued.fetch_add(1, Ordering::AcqRel) + 1,
            completed: self.completed.clone(),
        }
    }

    fn poll(&self) {
        if self.auto_signal.load(Ordering::Relaxed) {
            self.signal_all();
        }
    }

    fn finish(&self) {
        bump(&self.counters.finishes, 1);
        self.signal_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_formats::{PixelFormat, PixelType};
    use crate::request::{UploadDescriptor, UploadRegion, UploadTarget};

    fn write_for(texture: TextureId, region: UploadRegion) -> TextureWrite {
        let descriptor = UploadDescriptor::new(
            texture,
            UploadTarget::Texture2D,
            region,
            PixelFormat::Red,
            PixelType::UnsignedByte,
        );
        TextureWrite::new(&descriptor, descriptor.layout().unwrap())
    }

    #[test]
    fn direct_upload_writes_the_region() {
        let device = SoftwareDevice::new();
        let tex = device.create_texture(TextureDesc::new_2d(4, 4, 1));
        //2x2 at (1, 2), rows padded to 4 bytes
        let write = write_for(tex, UploadRegion::new_2d(1, 2, 2, 2));
        device.upload_from_cpu(&[1, 2, 0, 0, 3, 4], &write).unwrap();
        let image = device.texture_bytes(tex, 0).unwrap();
        assert_eq!(&image[8..12], &[0, 1, 2, 0]);
        assert_eq!(&image[12..16], &[0, 3, 4, 0]);
    }

    #[test]
    fn out_of_bounds_and_unknown_textures_fail() {
        let device = SoftwareDevice::new();
        let tex = device.create_texture(TextureDesc::new_2d(4, 4, 1));
        let write = write_for(tex, UploadRegion::new_2d(3, 0, 2, 1));
        assert_eq!(device.upload_from_cpu(&[0; 2], &write), Err(DeviceError::OutOfBounds));
        let write = write_for(TextureId(99), UploadRegion::new_2d(0, 0, 1, 1));
        assert_eq!(
            device.upload_from_cpu(&[0], &write),
            Err(DeviceError::UnknownTexture(TextureId(99)))
        );
        assert_eq!(device.stats().failed_uploads, 1);
    }

    #[test]
    fn non_coherent_mapping_needs_a_flush() {
        let device = SoftwareDevice::new();
        let tex = device.create_texture(TextureDesc::new_2d(2, 1, 1));
        let (buffer, mapping) = device.create_persistent_buffer(16, false).unwrap();
        mapping.write(4, &[7, 8]);
        let write = write_for(tex, UploadRegion::new_2d(0, 0, 2, 1));

        device.upload_from_buffer(&buffer, 4, &write).unwrap();
        assert_eq!(device.texture_bytes(tex, 0).unwrap(), vec![0, 0]);

        device.flush_mapped_range(&buffer, MappedFlushRange { offset: 4, size: 2 });
        device.upload_from_buffer(&buffer, 4, &write).unwrap();
        assert_eq!(device.texture_bytes(tex, 0).unwrap(), vec![7, 8]);
    }

    #[test]
    fn fences_follow_the_timeline() {
        let device = SoftwareDevice::new();
        device.set_auto_signal(false);
        let a = device.insert_fence();
        device.poll();
        assert!(!a.is_signaled());
        device.signal_all();
        assert!(a.is_signaled());
        let b = device.insert_fence();
        assert!(!b.is_signaled());
        device.finish();
        assert!(b.is_signaled());
    }

    #[test]
    fn injected_failures_run_out() {
        let device = SoftwareDevice::new();
        let tex = device.create_texture(TextureDesc::new_2d(1, 1, 1));
        let write = write_for(tex, UploadRegion::new_2d(0, 0, 1, 1));
        device.fail_next_direct_uploads(1);
        assert_eq!(device.upload_from_cpu(&[5], &write), Err(DeviceError::Lost));
        assert!(device.upload_from_cpu(&[5], &write).is_ok());
    }
}
