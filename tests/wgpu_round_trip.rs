// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Streams pixels into a real wgpu texture and reads them back.
//!
//! Needs a GPU adapter; the test returns early when none is available.
#![cfg(all(feature = "testing", feature = "backend_wgpu"))]

use std::sync::Arc;
use texture_streaming::{
    PixelFormat, PixelSource, PixelType, Settings, StreamingManager, UploadDescriptor,
    UploadRegion, UploadRequest, UploadTarget, WgpuSetupError, WgpuUploadDevice,
};

const SIZE: u32 = 8;

fn read_back(gpu: &WgpuUploadDevice, texture: &wgpu::Texture) -> Vec<u8> {
    //copies out of a texture need 256-byte rows
    let padded_row = 256u32;
    let buffer = gpu.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: (padded_row * SIZE) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = gpu
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback"),
        });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: Some(SIZE),
            },
        },
        wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue().submit([encoder.finish()]);
    buffer
        .slice(..)
        .map_async(wgpu::MapMode::Read, |result| result.unwrap());
    gpu.device().poll(wgpu::PollType::Wait).unwrap();
    let mapped = buffer.slice(..).get_mapped_range();
    let mut out = Vec::new();
    for row in 0..SIZE as usize {
        let start = row * padded_row as usize;
        out.extend_from_slice(&mapped[start..start + (SIZE * 4) as usize]);
    }
    out
}

#[test]
fn staged_and_enqueued_pixels_reach_the_texture() {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());
    let gpu = match pollster::block_on(WgpuUploadDevice::from_instance(&instance)) {
        Ok(gpu) => Arc::new(gpu),
        Err(WgpuSetupError::NoSuchAdapter) => {
            eprintln!("no adapter, skipping");
            return;
        }
        Err(e) => panic!("{e}"),
    };
    let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
        label: Some("streamed"),
        size: wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let id = gpu.register_texture(texture.clone());
    let manager = StreamingManager::new(
        gpu.clone(),
        Settings {
            ring_capacity: 64 * 1024,
            pool_slot_size: 16 * 1024,
            ..Settings::default()
        },
    );

    let top: Vec<u8> = (0..SIZE * 4 * 4).map(|i| i as u8).collect();
    let bottom: Vec<u8> = (0..SIZE * 4 * 4).map(|i| 255 - i as u8).collect();
    let descriptor = |y| {
        UploadDescriptor::new(
            id,
            UploadTarget::Texture2D,
            UploadRegion::new_2d(0, y, SIZE, 4),
            PixelFormat::Rgba,
            PixelType::UnsignedByte,
        )
    };
    manager
        .stage_copy(descriptor(0), PixelSource::Bytes(&top))
        .unwrap();
    manager
        .enqueue(UploadRequest::new(descriptor(4), bottom.clone()))
        .unwrap();
    manager.tick_on_render_thread();
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.uploaded, 2);
    assert_eq!(s.upload_failures, 0);

    let mut expected = top;
    expected.extend_from_slice(&bottom);
    assert_eq!(read_back(&gpu, &texture), expected);
    manager.dispose();
}
