// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Monotonic counters describing what the streaming subsystem has done.
//!
//! Counters are plain relaxed atomics: they are written from producer threads and the
//! render thread without any coupling to the data path, and read only through
//! [`DiagnosticsSnapshot`].  Nothing in the subsystem branches on them.

use crate::backend::BackendKind;
use crate::error::FallbackReason;
use crate::scheduler::PriorityTier;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Which path carried an upload to the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadPath {
    Ring,
    Pool,
    Direct,
}

#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    enqueued: AtomicU64,
    uploaded: AtomicU64,
    uploaded_bytes: AtomicU64,
    fallback: AtomicU64,
    dropped_invalid: AtomicU64,
    dropped_disposed: AtomicU64,
    deferred: AtomicU64,
    rejected: AtomicU64,
    upload_failures: AtomicU64,
    enqueued_by_tier: [AtomicU64; 3],
    uploaded_by_tier: [AtomicU64; 3],
    fallback_by_tier: [AtomicU64; 3],
    dropped_invalid_by_tier: [AtomicU64; 3],
    deferred_by_tier: [AtomicU64; 3],
    fallback_by_reason: [AtomicU64; 5],
    uploads_by_path: [AtomicU64; 3],
    backend_resets: AtomicU64,
    ticks: AtomicU64,
    last_tick_micros: AtomicU64,
    carry_over: AtomicU64,
    ring_bytes_in_flight: AtomicU64,
    backend: AtomicU8,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

fn bump_tier(tiers: &[AtomicU64; 3], priority: i32) {
    bump(&tiers[PriorityTier::from_priority(priority).index()], 1);
}

impl Diagnostics {
    pub(crate) fn record_enqueued(&self, priority: i32) {
        bump(&self.enqueued, 1);
        bump_tier(&self.enqueued_by_tier, priority);
    }

    pub(crate) fn record_fallback(&self, priority: i32, reason: FallbackReason) {
        bump(&self.fallback, 1);
        bump_tier(&self.fallback_by_tier, priority);
        bump(&self.fallback_by_reason[reason.index()], 1);
    }

    pub(crate) fn record_uploaded(&self, priority: i32, bytes: u64, path: UploadPath) {
        bump(&self.uploaded, 1);
        bump(&self.uploaded_bytes, bytes);
        bump_tier(&self.uploaded_by_tier, priority);
        let path = match path {
            UploadPath::Ring => 0,
            UploadPath::Pool => 1,
            UploadPath::Direct => 2,
        };
        bump(&self.uploads_by_path[path], 1);
    }

    pub(crate) fn record_dropped_invalid(&self, priority: i32) {
        bump(&self.dropped_invalid, 1);
        bump_tier(&self.dropped_invalid_by_tier, priority);
    }

    pub(crate) fn record_dropped_disposed(&self, count: u64) {
        bump(&self.dropped_disposed, count);
    }

    pub(crate) fn record_deferred(&self, priority: i32) {
        bump(&self.deferred, 1);
        bump_tier(&self.deferred_by_tier, priority);
    }

    pub(crate) fn record_rejected(&self) {
        bump(&self.rejected, 1);
    }

    pub(crate) fn record_upload_failure(&self) {
        bump(&self.upload_failures, 1);
    }

    pub(crate) fn record_backend_reset(&self) {
        bump(&self.backend_resets, 1);
    }

    pub(crate) fn record_tick(&self, micros: u64) {
        bump(&self.ticks, 1);
        self.last_tick_micros.store(micros, Ordering::Relaxed);
    }

    pub(crate) fn set_carry_over(&self, len: usize) {
        self.carry_over.store(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn set_ring_bytes_in_flight(&self, bytes: u64) {
        self.ring_bytes_in_flight.store(bytes, Ordering::Relaxed);
    }

    pub(crate) fn set_backend(&self, kind: BackendKind) {
        self.backend.store(kind.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, queued: u64, pooled_cpu_bytes: u64) -> DiagnosticsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let tiers = |a: &[AtomicU64; 3]| TierCounts {
            low: load(&a[0]),
            normal: load(&a[1]),
            high: load(&a[2]),
        };
        let reasons = &self.fallback_by_reason;
        DiagnosticsSnapshot {
            enqueued: load(&self.enqueued),
            uploaded: load(&self.uploaded),
            uploaded_bytes: load(&self.uploaded_bytes),
            fallback: load(&self.fallback),
            dropped_invalid: load(&self.dropped_invalid),
            dropped_disposed: load(&self.dropped_disposed),
            deferred: load(&self.deferred),
            rejected: load(&self.rejected),
            pending: queued + load(&self.carry_over),
            upload_failures: load(&self.upload_failures),
            enqueued_by_tier: tiers(&self.enqueued_by_tier),
            uploaded_by_tier: tiers(&self.uploaded_by_tier),
            fallback_by_tier: tiers(&self.fallback_by_tier),
            dropped_invalid_by_tier: tiers(&self.dropped_invalid_by_tier),
            deferred_by_tier: tiers(&self.deferred_by_tier),
            fallback_by_reason: FallbackCounts {
                queue_full: load(&reasons[FallbackReason::QueueFull.index()]),
                ring_full: load(&reasons[FallbackReason::RingFull.index()]),
                backend_uninitialized: load(&reasons[FallbackReason::BackendUninitialized.index()]),
                too_large: load(&reasons[FallbackReason::TooLarge.index()]),
                streaming_disabled: load(&reasons[FallbackReason::StreamingDisabled.index()]),
            },
            ring_uploads: load(&self.uploads_by_path[0]),
            pool_uploads: load(&self.uploads_by_path[1]),
            direct_uploads: load(&self.uploads_by_path[2]),
            backend_resets: load(&self.backend_resets),
            ticks: load(&self.ticks),
            last_tick_micros: load(&self.last_tick_micros),
            backend: BackendKind::from_u8(self.backend.load(Ordering::Relaxed)),
            ring_bytes_in_flight: load(&self.ring_bytes_in_flight),
            pooled_cpu_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub low: u64,
    pub normal: u64,
    pub high: u64,
}

impl TierCounts {
    pub fn total(&self) -> u64 {
        self.low + self.normal + self.high
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackCounts {
    pub queue_full: u64,
    pub ring_full: u64,
    pub backend_uninitialized: u64,
    pub too_large: u64,
    pub streaming_disabled: u64,
}

/**
Point-in-time copy of every counter.

`pending` is live work (bounded queue, overflow queue and carry-over) at the moment the
snapshot was taken; everything else only ever grows, except the gauges
`last_tick_micros`, `backend`, `ring_bytes_in_flight` and `pooled_cpu_bytes`.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub enqueued: u64,
    pub uploaded: u64,
    pub uploaded_bytes: u64,
    pub fallback: u64,
    pub dropped_invalid: u64,
    pub dropped_disposed: u64,
    pub deferred: u64,
    pub rejected: u64,
    pub pending: u64,
    pub upload_failures: u64,
    pub enqueued_by_tier: TierCounts,
    pub uploaded_by_tier: TierCounts,
    pub fallback_by_tier: TierCounts,
    pub dropped_invalid_by_tier: TierCounts,
    pub deferred_by_tier: TierCounts,
    pub fallback_by_reason: FallbackCounts,
    pub ring_uploads: u64,
    pub pool_uploads: u64,
    pub direct_uploads: u64,
    pub backend_resets: u64,
    pub ticks: u64,
    pub last_tick_micros: u64,
    pub backend: BackendKind,
    pub ring_bytes_in_flight: u64,
    pub pooled_cpu_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_break_out_by_tier_and_reason() {
        let d = Diagnostics::default();
        d.record_enqueued(-1);
        d.record_enqueued(0);
        d.record_enqueued(5);
        d.record_fallback(-3, FallbackReason::RingFull);
        d.record_uploaded(5, 64, UploadPath::Ring);
        d.record_uploaded(0, 16, UploadPath::Direct);
        d.record_dropped_invalid(2);
        d.record_deferred(0);
        d.record_deferred(-1);
        d.set_carry_over(2);
        d.set_backend(BackendKind::PersistentRing);

        let s = d.snapshot(3, 0);
        assert_eq!(s.enqueued, 3);
        assert_eq!(s.enqueued_by_tier, TierCounts { low: 1, normal: 1, high: 1 });
        assert_eq!(s.uploaded_by_tier.total(), 2);
        assert_eq!(s.uploaded_bytes, 80);
        assert_eq!(s.fallback_by_reason.ring_full, 1);
        assert_eq!(s.fallback_by_tier, TierCounts { low: 1, normal: 0, high: 0 });
        assert_eq!(s.dropped_invalid_by_tier.high, 1);
        assert_eq!(s.deferred, 2);
        assert_eq!(s.deferred_by_tier, TierCounts { low: 1, normal: 1, high: 0 });
        assert_eq!(s.ring_uploads, 1);
        assert_eq!(s.direct_uploads, 1);
        assert_eq!(s.pending, 5);
        assert_eq!(s.backend, BackendKind::PersistentRing);
    }
}
