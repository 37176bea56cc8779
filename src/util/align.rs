//! Alignment helpers.

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a non-zero power of two.
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Check that `value` is a non-zero power of two.
#[inline]
pub const fn is_power_of_two(value: u64) -> bool {
    value != 0 && (value & (value - 1)) == 0
}
