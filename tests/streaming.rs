// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! End-to-end behavior of the streaming manager on the software device.

use proptest::prelude::*;
use std::sync::Arc;
use texture_streaming::{
    BackendKind, DeviceCapabilities, FallbackReason, PixelFormat, PixelSource, PixelType,
    RejectReason, Settings, SoftwareDevice, Staged, StreamingManager, TextureDesc, TextureId,
    TierCounts, UnpackOverrides, UploadDescriptor, UploadRegion, UploadRequest, UploadTarget,
};

const WIDTH: u32 = 16;

fn settings() -> Settings {
    Settings {
        ring_capacity: 64 * 1024,
        pool_slot_size: 16 * 1024,
        ..Settings::default()
    }
}

fn setup(
    device: SoftwareDevice,
    settings: Settings,
) -> (Arc<SoftwareDevice>, TextureId, StreamingManager<SoftwareDevice>) {
    let device = Arc::new(device);
    let texture = device.create_texture(TextureDesc::new_2d(WIDTH, WIDTH, 4));
    let manager = StreamingManager::new(device.clone(), settings);
    (device, texture, manager)
}

fn tile(texture: TextureId, x: u32, y: u32, w: u32, h: u32) -> UploadDescriptor {
    UploadDescriptor::new(
        texture,
        UploadTarget::Texture2D,
        UploadRegion::new_2d(x, y, w, h),
        PixelFormat::Rgba,
        PixelType::UnsignedByte,
    )
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
}

/// Reads back a `w`x`h` RGBA region of mip 0.
fn read_region(device: &SoftwareDevice, texture: TextureId, x: u32, y: u32, w: u32, h: u32) -> Vec<u8> {
    let image = device.texture_bytes(texture, 0).unwrap();
    let mut out = Vec::new();
    for row in y..y + h {
        let start = ((row * WIDTH + x) * 4) as usize;
        out.extend_from_slice(&image[start..start + (w * 4) as usize]);
    }
    out
}

/// Ticks once with a throwaway item so the staging backend exists.
fn warm_up(manager: &StreamingManager<SoftwareDevice>, texture: TextureId) {
    manager
        .enqueue(UploadRequest::new(tile(texture, 0, 0, 1, 1), vec![0u8; 4]))
        .unwrap();
    manager.tick_on_render_thread();
}

#[test]
fn every_admitted_item_uploads_exactly_once() {
    let (_device, texture, manager) = setup(
        SoftwareDevice::new(),
        Settings {
            max_uploads_per_frame: 4,
            ..settings()
        },
    );
    let mut admitted = 0;
    for y in 0..8 {
        for x in 0..8 {
            let d = tile(texture, x * 2, y * 2, 2, 2).with_priority((x as i32) - 4);
            let pixels = pattern(16, (x + y) as u8);
            if (x + y) % 2 == 0 {
                manager.enqueue(UploadRequest::new(d, pixels)).unwrap();
            } else {
                manager.stage_copy(d, PixelSource::Bytes(&pixels)).unwrap();
            }
            admitted += 1;
        }
    }

    let mut last = manager.diagnostics_snapshot();
    for _ in 0..100 {
        manager.tick_on_render_thread();
        let now = manager.diagnostics_snapshot();
        assert!(now.uploaded - last.uploaded <= 4);
        last = now;
        if now.pending == 0 {
            break;
        }
    }
    assert_eq!(last.enqueued, admitted);
    assert_eq!(last.uploaded, admitted);
    assert_eq!(last.uploaded_by_tier.total(), admitted);
    assert_eq!(
        last.ring_uploads + last.pool_uploads + last.direct_uploads,
        admitted
    );
    assert_eq!(last.dropped_invalid, 0);
}

#[test]
fn upload_count_budget_carries_work_over() {
    let (_device, texture, manager) = setup(
        SoftwareDevice::new(),
        Settings {
            max_uploads_per_frame: 2,
            ..settings()
        },
    );
    for i in 0..5 {
        manager
            .enqueue(UploadRequest::new(tile(texture, i, 0, 1, 1), vec![1u8; 4]))
            .unwrap();
    }
    let mut progress = Vec::new();
    for _ in 0..3 {
        manager.tick_on_render_thread();
        let s = manager.diagnostics_snapshot();
        progress.push((s.uploaded, s.pending));
    }
    assert_eq!(progress, vec![(2, 3), (4, 1), (5, 0)]);
}

#[test]
fn byte_budget_defers_the_overflowing_item() {
    let (_device, texture, manager) = setup(
        SoftwareDevice::new(),
        Settings {
            max_bytes_per_frame: 256,
            ..settings()
        },
    );
    //5x5 RGBA reads 100 bytes
    for i in 0..5 {
        manager
            .enqueue(UploadRequest::new(tile(texture, i, 0, 5, 5), vec![2u8; 100]))
            .unwrap();
    }
    manager.tick_on_render_thread();
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.uploaded, 2);
    assert_eq!(s.uploaded_bytes, 200);
    assert_eq!(s.pending, 3);
    assert_eq!(s.deferred, 3);
    assert_eq!(s.deferred_by_tier.normal, 3);
}

#[test]
fn outcomes_are_counted_per_priority_tier() {
    let (_device, texture, manager) = setup(
        SoftwareDevice::new(),
        Settings {
            max_uploads_per_frame: 1,
            ..settings()
        },
    );
    let pixels = [1u8; 16];
    //no backend before the first tick
    assert_eq!(
        manager.stage_copy(tile(texture, 0, 0, 2, 2).with_priority(-3), PixelSource::Bytes(&pixels)),
        Ok(Staged::Fallback(FallbackReason::BackendUninitialized))
    );
    manager
        .enqueue(UploadRequest::new(tile(texture, 0, 0, 2, 2).with_priority(5), vec![0u8; 3]))
        .unwrap();
    manager
        .enqueue(UploadRequest::new(tile(texture, 4, 0, 2, 2), pixels.to_vec()))
        .unwrap();
    //the short high request is dropped, the normal one uses the only upload
    manager.tick_on_render_thread();
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.dropped_invalid_by_tier, TierCounts { low: 0, normal: 0, high: 1 });
    assert_eq!(s.uploaded_by_tier, TierCounts { low: 0, normal: 1, high: 0 });
    assert_eq!(s.fallback_by_tier, TierCounts { low: 1, normal: 0, high: 0 });
    assert_eq!(s.deferred_by_tier, TierCounts { low: 1, normal: 0, high: 0 });
}

#[test]
fn higher_priority_uploads_first() {
    let (device, texture, manager) = setup(
        SoftwareDevice::new(),
        Settings {
            max_uploads_per_frame: 1,
            ..settings()
        },
    );
    for (priority, value) in [(-5, 1u8), (0, 2u8), (5, 3u8)] {
        let d = tile(texture, 0, 0, 1, 1).with_priority(priority);
        manager
            .enqueue(UploadRequest::new(d, vec![value; 4]))
            .unwrap();
    }
    manager.tick_on_render_thread();
    assert_eq!(read_region(&device, texture, 0, 0, 1, 1), vec![3u8; 4]);
    assert_eq!(manager.diagnostics_snapshot().uploaded_by_tier.high, 1);
    manager.tick_on_render_thread();
    manager.tick_on_render_thread();
    assert_eq!(read_region(&device, texture, 0, 0, 1, 1), vec![1u8; 4]);
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.uploaded_by_tier.low, 1);
    assert_eq!(s.uploaded_by_tier.normal, 1);
}

#[test]
fn ring_path_delivers_bytes() {
    let (device, texture, manager) = setup(SoftwareDevice::new(), settings());
    warm_up(&manager, texture);
    assert_eq!(
        manager.diagnostics_snapshot().backend,
        BackendKind::PersistentRing
    );
    let pixels = pattern(4 * 3 * 4, 11);
    assert_eq!(
        manager.stage_copy(tile(texture, 5, 6, 4, 3), PixelSource::Bytes(&pixels)),
        Ok(Staged::PersistentRing)
    );
    manager.tick_on_render_thread();
    assert_eq!(read_region(&device, texture, 5, 6, 4, 3), pixels);
    assert_eq!(manager.diagnostics_snapshot().ring_uploads, 2);
}

#[test]
fn non_coherent_ring_flushes_before_upload() {
    let device = SoftwareDevice::with_capabilities(DeviceCapabilities {
        persistent_mapping: true,
        coherent_mapping: false,
    });
    let (device, texture, manager) = setup(device, settings());
    warm_up(&manager, texture);
    let flushes = device.stats().flushes;
    let pixels = pattern(64, 3);
    assert_eq!(
        manager.stage_copy(tile(texture, 0, 8, 4, 4), PixelSource::Bytes(&pixels)),
        Ok(Staged::PersistentRing)
    );
    manager.tick_on_render_thread();
    assert_eq!(read_region(&device, texture, 0, 8, 4, 4), pixels);
    let stats = device.stats();
    assert_eq!(stats.flushes, flushes + 1);
    assert!(stats.flushed_bytes >= 64);
}

#[test]
fn unpack_row_length_skips_source_padding() {
    let (device, texture, manager) = setup(SoftwareDevice::new(), settings());
    warm_up(&manager, texture);
    //source rows are 4 pixels wide, the region takes the first 2
    let source = pattern(4 * 4 * 2, 9);
    let d = tile(texture, 2, 2, 2, 2).with_unpack(UnpackOverrides {
        row_length: 4,
        ..UnpackOverrides::default()
    });
    manager.stage_copy(d, PixelSource::Bytes(&source)).unwrap();
    manager.tick_on_render_thread();
    let mut expected = source[0..8].to_vec();
    expected.extend_from_slice(&source[16..24]);
    assert_eq!(read_region(&device, texture, 2, 2, 2, 2), expected);
}

#[test]
fn pool_path_when_persistent_mapping_is_disabled() {
    let (device, texture, manager) = setup(
        SoftwareDevice::new(),
        Settings {
            force_disable_persistent: true,
            ..settings()
        },
    );
    let pixels = pattern(16, 21);
    manager
        .enqueue(UploadRequest::new(tile(texture, 3, 3, 2, 2), pixels.clone()))
        .unwrap();
    manager.tick_on_render_thread();
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.backend, BackendKind::TripleBuffered);
    assert_eq!(s.pool_uploads, 1);
    assert_eq!(read_region(&device, texture, 3, 3, 2, 2), pixels);
    assert_eq!(device.stats().persistent_buffers_created, 0);
}

#[test]
fn pool_path_when_device_lacks_persistent_mapping() {
    let device = SoftwareDevice::with_capabilities(DeviceCapabilities {
        persistent_mapping: false,
        coherent_mapping: false,
    });
    let (_device, texture, manager) = setup(device, settings());
    warm_up(&manager, texture);
    assert_eq!(
        manager.diagnostics_snapshot().backend,
        BackendKind::TripleBuffered
    );
    let pixels = [4u8; 16];
    assert_eq!(
        manager.stage_copy(tile(texture, 0, 0, 2, 2), PixelSource::Bytes(&pixels)),
        Ok(Staged::Fallback(FallbackReason::BackendUninitialized))
    );
}

#[test]
fn streaming_disabled_uploads_directly_within_one_tick() {
    let (device, texture, manager) = setup(
        SoftwareDevice::new(),
        Settings {
            enable_pbo_streaming: false,
            ..settings()
        },
    );
    let pixels = pattern(16, 5);
    assert_eq!(
        manager.stage_copy(tile(texture, 1, 1, 2, 2), PixelSource::Bytes(&pixels)),
        Ok(Staged::Fallback(FallbackReason::StreamingDisabled))
    );
    manager.tick_on_render_thread();
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.backend, BackendKind::None);
    assert_eq!(s.direct_uploads, 1);
    assert_eq!(s.pending, 0);
    assert_eq!(s.fallback_by_reason.streaming_disabled, 1);
    assert_eq!(read_region(&device, texture, 1, 1, 2, 2), pixels);
    assert_eq!(device.stats().staging_buffers_created, 0);
}

#[test]
fn oversized_items_skip_the_ring() {
    let (_device, texture, manager) = setup(
        SoftwareDevice::new(),
        Settings {
            max_staging_item_bytes: 32,
            ..settings()
        },
    );
    warm_up(&manager, texture);
    let pixels = [0u8; 64];
    assert_eq!(
        manager.stage_copy(tile(texture, 0, 0, 4, 4), PixelSource::Bytes(&pixels)),
        Ok(Staged::Fallback(FallbackReason::TooLarge))
    );
    manager.tick_on_render_thread();
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.pool_uploads, 1);
    assert_eq!(s.fallback_by_reason.too_large, 1);
}

#[test]
fn full_ring_falls_back_and_recovers_after_fences() {
    let (device, texture, manager) = setup(
        SoftwareDevice::new(),
        Settings {
            ring_capacity: 1024,
            ..settings()
        },
    );
    warm_up(&manager, texture);
    //the warm-up region retires on this tick's poll
    manager.tick_on_render_thread();
    //8x8 RGBA fills one 256-byte slice of the ring
    let pixels = [6u8; 256];
    for i in 0..4 {
        assert_eq!(
            manager.stage_copy(tile(texture, (i % 2) * 8, (i / 2) * 8, 8, 8), PixelSource::Bytes(&pixels)),
            Ok(Staged::PersistentRing)
        );
    }
    assert_eq!(
        manager.stage_copy(tile(texture, 0, 0, 8, 8), PixelSource::Bytes(&pixels)),
        Ok(Staged::Fallback(FallbackReason::RingFull))
    );
    manager.tick_on_render_thread();
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.uploaded, 6);
    assert_eq!(s.ring_bytes_in_flight, 1024);
    assert_eq!(s.fallback_by_reason.ring_full, 1);

    manager.tick_on_render_thread();
    assert_eq!(manager.diagnostics_snapshot().ring_bytes_in_flight, 0);
    assert_eq!(
        manager.stage_copy(tile(texture, 0, 0, 8, 8), PixelSource::Bytes(&pixels)),
        Ok(Staged::PersistentRing)
    );
    assert!(device.stats().fences_inserted >= 5);
}

#[test]
fn volume_targets_take_one_slice_per_request() {
    let (device, texture, manager) = setup(SoftwareDevice::new(), settings());
    let volume = |target, depth| UploadDescriptor {
        target,
        region: UploadRegion {
            depth,
            ..UploadRegion::new_2d(0, 0, 2, 2)
        },
        ..tile(texture, 0, 0, 2, 2)
    };
    let pixels = [0u8; 32];
    assert_eq!(
        manager.stage_copy(volume(UploadTarget::Texture3D, 2), PixelSource::Bytes(&pixels)),
        Err(RejectReason::InvalidArguments)
    );
    assert_eq!(
        manager.stage_copy(volume(UploadTarget::Texture2DArray, 2), PixelSource::Bytes(&pixels)),
        Err(RejectReason::InvalidArguments)
    );
    manager
        .enqueue(UploadRequest::new(volume(UploadTarget::Texture3D, 2), pixels.to_vec()))
        .unwrap();
    manager.tick_on_render_thread();
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.rejected, 2);
    assert_eq!(s.dropped_invalid_by_tier.normal, 1);
    assert_eq!(s.uploaded, 0);
    let stats = device.stats();
    assert_eq!(stats.direct_uploads + stats.buffer_uploads, 0);
}

#[test]
fn rejected_requests_never_reach_the_device() {
    let (device, texture, manager) = setup(SoftwareDevice::new(), settings());
    let short = [0u8; 15];
    assert_eq!(
        manager.stage_copy(tile(texture, 0, 0, 2, 2), PixelSource::Bytes(&short)),
        Err(RejectReason::DataTooSmall)
    );
    let pixels = [0u8; 16];
    assert_eq!(
        manager.stage_copy(tile(texture, 0, 0, 0, 2), PixelSource::Bytes(&pixels)),
        Err(RejectReason::InvalidArguments)
    );
    let bad_alignment = tile(texture, 0, 0, 2, 2).with_unpack(UnpackOverrides {
        alignment: 3,
        ..UnpackOverrides::default()
    });
    assert_eq!(
        manager.stage_copy(bad_alignment, PixelSource::Bytes(&pixels)),
        Err(RejectReason::InvalidArguments)
    );
    let deep = UploadDescriptor {
        region: UploadRegion {
            depth: 2,
            ..UploadRegion::new_2d(0, 0, 2, 2)
        },
        ..tile(texture, 0, 0, 2, 2)
    };
    assert_eq!(
        manager.stage_copy(deep, PixelSource::Bytes(&[0u8; 32])),
        Err(RejectReason::InvalidArguments)
    );
    manager.tick_on_render_thread();
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.rejected, 4);
    assert_eq!(s.enqueued, 0);
    let stats = device.stats();
    assert_eq!(stats.direct_uploads + stats.buffer_uploads, 0);
}

#[test]
fn failed_direct_upload_is_retried_next_tick() {
    let (device, texture, manager) = setup(
        SoftwareDevice::new(),
        Settings {
            enable_pbo_streaming: false,
            ..settings()
        },
    );
    device.fail_next_direct_uploads(1);
    let pixels = pattern(16, 1);
    manager
        .stage_copy(tile(texture, 0, 0, 2, 2), PixelSource::Bytes(&pixels))
        .unwrap();
    manager.tick_on_render_thread();
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.uploaded, 0);
    assert_eq!(s.upload_failures, 1);
    assert_eq!(s.pending, 1);

    manager.tick_on_render_thread();
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.uploaded, 1);
    assert_eq!(s.pending, 0);
    assert_eq!(read_region(&device, texture, 0, 0, 2, 2), pixels);
}

#[test]
fn full_queue_spills_into_overflow() {
    let (_device, texture, manager) = setup(
        SoftwareDevice::new(),
        Settings {
            queue_capacity: 2,
            ..settings()
        },
    );
    for i in 0..10 {
        manager
            .enqueue(UploadRequest::new(tile(texture, i, 0, 1, 1), vec![0u8; 4]))
            .unwrap();
    }
    let s = manager.diagnostics_snapshot();
    assert_eq!(s.fallback_by_reason.queue_full, 8);
    assert_eq!(s.pending, 10);
    manager.tick_on_render_thread();
    assert_eq!(manager.diagnostics_snapshot().uploaded, 10);
}

#[test]
fn typed_sources_upload_as_bytes() {
    let device = Arc::new(SoftwareDevice::new());
    let texture = device.create_texture(TextureDesc::new_2d(2, 1, 4));
    let manager = StreamingManager::new(device.clone(), settings());
    let d = UploadDescriptor::new(
        texture,
        UploadTarget::Texture2D,
        UploadRegion::new_2d(0, 0, 2, 1),
        PixelFormat::Red,
        PixelType::Float,
    );
    let texels = [1.5f32, -2.0];
    manager.stage_copy(d, PixelSource::Floats(&texels)).unwrap();
    manager.tick_on_render_thread();
    let mut expected = 1.5f32.to_ne_bytes().to_vec();
    expected.extend_from_slice(&(-2.0f32).to_ne_bytes());
    assert_eq!(device.texture_bytes(texture, 0).unwrap(), expected);
}

#[derive(Debug, Clone, Copy)]
enum Path {
    StageBeforeBackend,
    StageIntoRing,
    Enqueue,
    Direct,
}

fn any_path() -> impl Strategy<Value = Path> {
    prop_oneof![
        Just(Path::StageBeforeBackend),
        Just(Path::StageIntoRing),
        Just(Path::Enqueue),
        Just(Path::Direct),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn uploaded_bytes_match_the_source(
        x in 0..8u32,
        y in 0..8u32,
        w in 1..=8u32,
        h in 1..=8u32,
        seed in any::<u8>(),
        path in any_path(),
    ) {
        let settings = Settings {
            enable_pbo_streaming: !matches!(path, Path::Direct),
            ..settings()
        };
        let (device, texture, manager) = setup(SoftwareDevice::new(), settings);
        if matches!(path, Path::StageIntoRing) {
            warm_up(&manager, texture);
        }
        let pixels = pattern((w * h * 4) as usize, seed);
        let d = tile(texture, x, y, w, h);
        match path {
            Path::Enqueue => manager.enqueue(UploadRequest::new(d, pixels.clone())).unwrap(),
            _ => {
                manager.stage_copy(d, PixelSource::Bytes(&pixels)).unwrap();
            }
        }
        manager.tick_on_render_thread();
        prop_assert_eq!(manager.diagnostics_snapshot().pending, 0);
        prop_assert_eq!(read_region(&device, texture, x, y, w, h), pixels);
    }
}
