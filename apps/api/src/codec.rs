//! Composite identifier codec.
//!
//! A quiz is addressed by one integer packing the collection id and the
//! partition index: `collection_id * 10 + partition_index`. The packing is only
//! injective while the partition index is a single decimal digit, so anything
//! outside 0..=9 is rejected here instead of silently colliding.

use thiserror::Error;

/// Largest partition index the composite encoding can carry.
pub const MAX_PARTITION_INDEX: i32 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingRangeError {
    #[error("partition index {0} is outside 0..={MAX_PARTITION_INDEX}")]
    PartitionIndex(i32),

    #[error("collection id {0} must not be negative")]
    NegativeCollection(i64),

    #[error("composite identifier {0} must not be negative")]
    NegativeComposite(i64),

    #[error("collection id {0} is too large to encode")]
    Overflow(i64),
}

/// Packs `(collection_id, partition_index)` into one composite identifier.
pub fn encode(collection_id: i64, partition_index: i32) -> Result<i64, EncodingRangeError> {
    if !(0..=MAX_PARTITION_INDEX).contains(&partition_index) {
        return Err(EncodingRangeError::PartitionIndex(partition_index));
    }
    if collection_id < 0 {
        return Err(EncodingRangeError::NegativeCollection(collection_id));
    }
    collection_id
        .checked_mul(10)
        .and_then(|n| n.checked_add(partition_index as i64))
        .ok_or(EncodingRangeError::Overflow(collection_id))
}

/// Unpacks a composite identifier into `(collection_id, partition_index)`.
pub fn decode(composite: i64) -> Result<(i64, i32), EncodingRangeError> {
    if composite < 0 {
        return Err(EncodingRangeError::NegativeComposite(composite));
    }
    Ok((composite / 10, (composite % 10) as i32))
}
