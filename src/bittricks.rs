// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Alignment arithmetic shared by the layout code and the staging allocators.
*/

/// Rounds `value` up to the next multiple of `alignment`.
///
/// Returns `None` on overflow.  `alignment` must be nonzero.
pub fn checked_align_up(value: u64, alignment: u64) -> Option<u64> {
    debug_assert!(alignment > 0);
    let add = alignment - 1;
    Some(value.checked_add(add)? / alignment * alignment)
}

/// Rounds `value` down to a multiple of `alignment`.
pub fn align_down(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);
    value / alignment * alignment
}

/// Clamps a requested alignment into something an allocator can use: at least 1,
/// rounded up to a power of two.
pub fn sanitize_alignment(alignment: u64) -> u64 {
    alignment.max(1).checked_next_power_of_two().unwrap_or(1 << 63)
}
