// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Error and outcome types shared across the subsystem.

use crate::request::LayoutError;

/// Why a producer call was refused outright.
///
/// Rejections happen before any GPU interaction and leave no state behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum RejectReason {
    #[error("invalid upload arguments")]
    InvalidArguments,
    #[error("source data is smaller than the upload reads")]
    DataTooSmall,
    #[error("streaming manager has been disposed")]
    Disposed,
}

impl From<LayoutError> for RejectReason {
    fn from(value: LayoutError) -> Self {
        match value {
            LayoutError::DataTooSmall { .. } => RejectReason::DataTooSmall,
            _ => RejectReason::InvalidArguments,
        }
    }
}

/// Why an admitted item went to owned CPU memory instead of the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackReason {
    QueueFull,
    RingFull,
    BackendUninitialized,
    TooLarge,
    StreamingDisabled,
}

impl FallbackReason {
    pub(crate) const ALL: [FallbackReason; 5] = [
        FallbackReason::QueueFull,
        FallbackReason::RingFull,
        FallbackReason::BackendUninitialized,
        FallbackReason::TooLarge,
        FallbackReason::StreamingDisabled,
    ];

    pub(crate) const fn index(self) -> usize {
        match self {
            FallbackReason::QueueFull => 0,
            FallbackReason::RingFull => 1,
            FallbackReason::BackendUninitialized => 2,
            FallbackReason::TooLarge => 3,
            FallbackReason::StreamingDisabled => 4,
        }
    }
}

/// Failure reported by an [`crate::UploadDevice`] call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("out of device memory")]
    OutOfMemory,
    #[error("unknown texture {0:?}")]
    UnknownTexture(crate::request::TextureId),
    #[error("write falls outside the texture image")]
    OutOfBounds,
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("device lost")]
    Lost,
    #[error("{0}")]
    Backend(String),
}

/// Why a staging backend could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("ring capacity {capacity} is smaller than the allocation alignment {alignment}")]
    RingTooSmall { capacity: u64, alignment: u64 },
    #[error("device does not support persistent mapping")]
    PersistentUnsupported,
    #[error(transparent)]
    Device(#[from] DeviceError),
}
