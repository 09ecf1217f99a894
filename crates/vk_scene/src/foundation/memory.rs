//! Memory layout helpers

/// Round `size` up to the next multiple of `alignment`.
///
/// An alignment of zero or one leaves `size` untouched. Vulkan guarantees
/// that alignment limits are powers of two, but non-power-of-two values are
/// handled too.
pub fn align_up(size: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return size;
    }
    if alignment.is_power_of_two() {
        (size + alignment - 1) & !(alignment - 1)
    } else {
        size.div_ceil(alignment) * alignment
    }
}
