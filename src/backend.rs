// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Staging backends: GPU-visible intermediate memory between producers and textures.

Two implementations exist.  [`ring::PersistentRing`] owns one large persistently-mapped
buffer managed as a ring with fence-based retirement; producers may stage into it directly.
[`pool::TripleBufferedPool`] owns a handful of small, independently fenced buffers that are
orphaned on every use; it only runs on the render thread.

The streaming manager picks one at construction time and talks to it through
[`StagingBackend`].  Every method here runs on the render thread.
*/

pub(crate) mod pool;
pub(crate) mod ring;

use crate::command::{MappedFlushRange, PboUpload, StagingBufferId};
use crate::device::{TextureWrite, UploadDevice};
use crate::error::{DeviceError, FallbackReason};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_buffer_id() -> StagingBufferId {
    StagingBufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
}

/// Which staging strategy the manager is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Nothing has been constructed yet, or a reset is pending.
    Uninitialized,
    /// Streaming is disabled; only direct uploads remain.
    None,
    PersistentRing,
    TripleBuffered,
}

impl BackendKind {
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            BackendKind::Uninitialized => 0,
            BackendKind::None => 1,
            BackendKind::PersistentRing => 2,
            BackendKind::TripleBuffered => 3,
        }
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            1 => BackendKind::None,
            2 => BackendKind::PersistentRing,
            3 => BackendKind::TripleBuffered,
            _ => BackendKind::Uninitialized,
        }
    }
}

/// An allocation that already holds the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StagedUpload {
    pub(crate) upload: PboUpload,
    /// Present when the mapping is not coherent.
    pub(crate) flush: Option<MappedFlushRange>,
}

/// Why bytes could not be staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StageFailure {
    /// No free space right now; try again after retirement.
    Full,
    /// The item can never fit.
    TooLarge,
    /// The backend has been disposed.
    Disposed,
    Device(DeviceError),
}

impl StageFailure {
    pub(crate) fn fallback_reason(&self) -> FallbackReason {
        match self {
            StageFailure::Full | StageFailure::Device(_) => FallbackReason::RingFull,
            StageFailure::TooLarge => FallbackReason::TooLarge,
            StageFailure::Disposed => FallbackReason::BackendUninitialized,
        }
    }
}

/**
The render-thread interface of a staging backend.

An upload is staged, issued, then submitted.  A staged upload that is not going to be
issued (because the device call failed) must be handed back with
[`StagingBackend::discard`] so the space is reclaimed.
*/
pub(crate) trait StagingBackend<D: UploadDevice>: Send {
    fn kind(&self) -> BackendKind;

    /// Copies `bytes` into staging memory.
    fn try_stage_upload(&mut self, device: &D, bytes: &[u8]) -> Result<StagedUpload, StageFailure>;

    /// Flushes if needed, then reads the texture update out of staging memory.
    fn issue_upload(
        &mut self,
        device: &D,
        staged: &StagedUpload,
        write: &TextureWrite,
    ) -> Result<(), DeviceError>;

    /// Fences the allocation consumed by the last issued upload.
    fn submit_upload(&mut self, device: &D, staged: &StagedUpload);

    /// Returns an allocation that will never be issued.
    fn discard(&mut self, staged: &StagedUpload);

    /// Opportunistic retirement.
    fn tick(&mut self, device: &D);

    /// Drops pending fences without waiting and releases what can be released.
    fn dispose(&mut self, device: &D);

    fn owns(&self, buffer: StagingBufferId) -> bool;
}
