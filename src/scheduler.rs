// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Ordering of a tick's working batch.
//!
//! The batch is rebuilt every tick from carry-over, the bounded queue and the overflow
//! queue, so it is sorted afresh rather than kept in a persistent heap.  Higher priority
//! comes first; within a priority, lower sequence ids (earlier admissions) come first.

use crate::command::UploadCommand;

/// Coarse priority bucket used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriorityTier {
    Low,
    Normal,
    High,
}

impl PriorityTier {
    pub const fn from_priority(priority: i32) -> Self {
        if priority < 0 {
            PriorityTier::Low
        } else if priority == 0 {
            PriorityTier::Normal
        } else {
            PriorityTier::High
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            PriorityTier::Low => 0,
            PriorityTier::Normal => 1,
            PriorityTier::High => 2,
        }
    }
}

/// Stable sort by descending priority, then ascending sequence id.
pub fn sort_batch(batch: &mut [UploadCommand]) {
    batch.sort_by(|a, b| {
        b.priority()
            .cmp(&a.priority())
            .then_with(|| a.sequence.cmp(&b.sequence))
    });
}
