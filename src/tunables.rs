//! Sizing constants for the patch engine.
//!
//! The default values are those used in practice; a consumer that overrides
//! [`crate::engine::Bpatch::write_queue_length`] or
//! [`crate::engine::Bpatch::read_cache_length`] must preserve the sizing
//! relationship checked below, or in-place patching of a same-file
//! source/target is unsafe.

/// Granularity of source blocks and the delta decoder's reference window.
pub const BLOCK_SIZE: usize = 1 << 23; // 8 MiB

/// Size of each target write window. Always equal to [`BLOCK_SIZE`].
pub const TARGET_WINDOW_SIZE: usize = BLOCK_SIZE;

/// Delta decoder's reference horizon.
pub const SOURCE_WINDOW_SIZE: usize = 8 * BLOCK_SIZE;

/// Number of windows buffered before a target write becomes visible.
pub const WRITE_QUEUE_LENGTH: usize = 4;

/// Number of most-recently-used source blocks cached.
pub const READ_CACHE_LENGTH: usize = 12;

/// Output buffer size for the XZ feeder.
pub const XZ_OUTPUT_SIZE: usize = 1 << 23;

/// Dictionary size handed to the XZ decoder.
pub const XZ_DICT_SIZE: u64 = 1 << 26;

const _: () = assert!(
    WRITE_QUEUE_LENGTH * TARGET_WINDOW_SIZE >= SOURCE_WINDOW_SIZE / 2,
    "WRITE_QUEUE_LENGTH * TARGET_WINDOW_SIZE must cover half of SOURCE_WINDOW_SIZE, \
     or a same-file source/target patch is unsafe"
);

const _: () = assert!(
    READ_CACHE_LENGTH >= 8 && READ_CACHE_LENGTH <= 16,
    "READ_CACHE_LENGTH is meant to stay within 8..=16"
);

/// Checks the sizing invariant for a caller-supplied `(write_queue_length,
/// target_window_size, source_window_size)` triple. Used by
/// [`crate::engine::Bpatch`] when tunables are overridden at runtime, since
/// the `const` assertions above only cover the defaults.
pub fn check_frontier_margin(
    write_queue_length: usize,
    target_window_size: usize,
    source_window_size: usize,
) -> bool {
    write_queue_length
        .saturating_mul(target_window_size)
        .saturating_mul(2)
        >= source_window_size
}
