//! Deterministic mapping of an account id to a shard key and a shard range.
//!
//! `shard_key` projects an account id into a fixed-width hex key space via a
//! uniform hash. `shard_range` partitions that same key space into `count`
//! contiguous inclusive intervals. Every account id maps into exactly one of
//! the `count` ranges produced for a given `count`.

use sha2::{Digest, Sha256};

/// Width, in hex characters, of the shard key space. 16 hex chars (64 bits)
/// is ample resolution for any realistic shard count.
const KEY_HEX_WIDTH: usize = 16;
const KEY_SPACE_MAX: u128 = u64::MAX as u128;

/// Maps an account id to a deterministic shard key in the fixed hex key
/// space `[0x0..0, 0xf..f]`.
pub fn shard_key(account_id: &str) -> String {
    let digest = Sha256::digest(account_id.as_bytes());
    hex::encode(&digest[..KEY_HEX_WIDTH / 2])
}

/// Returns the inclusive interval `[start, end]` of the key space assigned
/// to shard `index` out of `count` total shards. Ranges are contiguous and
/// partition the full key space with no gaps or overlaps.
///
/// `count` must be >= 1 and `index` must be `< count`; both are guaranteed
/// by configuration validation before this is called.
pub fn shard_range(index: u32, count: u32) -> (String, String) {
    assert!(count >= 1, "shard count must be at least 1");
    assert!(index < count, "shard index must be less than shard count");

    let index = u128::from(index);
    let count = u128::from(count);

    // (KEY_SPACE_MAX + 1) may overflow u128 only if KEY_SPACE_MAX == u128::MAX,
    // which it isn't (it's u64::MAX), so this is always safe.
    let span = KEY_SPACE_MAX + 1;
    let start = (span / count) * index;
    let end = if index + 1 == count {
        KEY_SPACE_MAX
    } else {
        (span / count) * (index + 1) - 1
    };

    (format_key(start), format_key(end))
}

fn format_key(value: u128) -> String {
    format!("{:0width$x}", value, width = KEY_HEX_WIDTH)
}

/// Returns true if `key` falls within the inclusive interval `[start, end]`.
pub fn in_range(key: &str, start: &str, end: &str) -> bool {
    key >= start && key <= end
}
