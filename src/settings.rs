// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Policy knobs for the streaming manager.
//!
//! Settings may be replaced from any thread with
//! [`crate::StreamingManager::update_settings`]; they take effect on the next render-thread
//! tick.  Changing a field that shapes an already-built staging backend (see
//! [`Settings::invalidates_backend`]) makes that tick tear the backend down and rebuild it.

use crate::bittricks::sanitize_alignment;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Build a staging backend at all.  When off, only direct uploads remain.
    pub enable_pbo_streaming: bool,
    /// Permit synchronous uploads straight from CPU memory as a last resort.
    pub allow_direct_uploads: bool,
    /// Never use the persistent ring, even if the device supports it.
    pub force_disable_persistent: bool,
    /// Ask for a coherent persistent mapping (no explicit flushes).
    pub use_coherent_mapping: bool,
    pub max_uploads_per_frame: u32,
    pub max_bytes_per_frame: u64,
    /// Let an item larger than `max_bytes_per_frame` go when it is the first upload of a
    /// tick.  Off, such an item waits in the carry-over until the budget is raised.
    pub upload_oversized_first: bool,
    /// Largest single item that producers stage eagerly.
    pub max_staging_item_bytes: u64,
    pub ring_capacity: u64,
    /// Size of each pool slot's staging buffer.
    pub pool_slot_size: u64,
    pub allocation_alignment: u64,
    /// Bounded queue slots.  Read once, when the manager is created.
    pub queue_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enable_pbo_streaming: true,
            allow_direct_uploads: true,
            force_disable_persistent: false,
            use_coherent_mapping: false,
            max_uploads_per_frame: 64,
            max_bytes_per_frame: 32 * MIB,
            upload_oversized_first: false,
            max_staging_item_bytes: 16 * MIB,
            ring_capacity: 64 * MIB,
            pool_slot_size: 4 * MIB,
            allocation_alignment: 256,
            queue_capacity: 1024,
        }
    }
}

impl Settings {
    /// Clamps every knob into a usable range.
    pub fn sanitized(mut self) -> Self {
        self.max_uploads_per_frame = self.max_uploads_per_frame.max(1);
        self.max_bytes_per_frame = self.max_bytes_per_frame.max(1);
        self.pool_slot_size = self.pool_slot_size.max(1);
        self.allocation_alignment = sanitize_alignment(self.allocation_alignment);
        self.queue_capacity = self.queue_capacity.max(1);
        self
    }

    /// True when moving from `self` to `next` requires rebuilding the staging backend.
    pub fn invalidates_backend(&self, next: &Settings) -> bool {
        self.enable_pbo_streaming != next.enable_pbo_streaming
            || self.force_disable_persistent != next.force_disable_persistent
            || self.use_coherent_mapping != next.use_coherent_mapping
            || self.ring_capacity != next.ring_capacity
            || self.pool_slot_size != next.pool_slot_size
            || self.allocation_alignment != next.allocation_alignment
            || self.max_uploads_per_frame != next.max_uploads_per_frame
    }

    /// Pool slot count: `clamp(max(3, max_uploads_per_frame), 3, 512)`.
    pub fn pool_slot_count(&self) -> usize {
        (self.max_uploads_per_frame.max(3) as usize).clamp(3, 512)
    }

    /// Working batch bound: `clamp(4 * max_uploads_per_frame, 64, 4096)`.
    pub fn batch_limit(&self) -> usize {
        (self.max_uploads_per_frame as usize)
            .saturating_mul(4)
            .clamp(64, 4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budgets_only_do_not_invalidate() {
        let a = Settings::default();
        let mut b = a;
        b.max_bytes_per_frame = 1;
        b.allow_direct_uploads = false;
        b.max_staging_item_bytes = 5;
        b.upload_oversized_first = true;
        assert!(!a.invalidates_backend(&b));

        b.force_disable_persistent = true;
        assert!(a.invalidates_backend(&b));
    }

    #[test]
    fn derived_sizes_are_clamped() {
        let mut s = Settings::default();
        s.max_uploads_per_frame = 1;
        assert_eq!(s.pool_slot_count(), 3);
        assert_eq!(s.batch_limit(), 64);
        s.max_uploads_per_frame = 10_000;
        assert_eq!(s.pool_slot_count(), 512);
        assert_eq!(s.batch_limit(), 4096);
        s.max_uploads_per_frame = 100;
        assert_eq!(s.pool_slot_count(), 100);
        assert_eq!(s.batch_limit(), 400);
    }

    #[test]
    fn sanitize_fixes_alignment_and_zeros() {
        let s = Settings {
            max_uploads_per_frame: 0,
            allocation_alignment: 100,
            queue_capacity: 0,
            ..Settings::default()
        }
        .sanitized();
        assert_eq!(s.max_uploads_per_frame, 1);
        assert_eq!(s.allocation_alignment, 128);
        assert_eq!(s.queue_capacity, 1);
    }
}
