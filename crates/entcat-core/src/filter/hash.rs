//! Canonical content-filter hashing.

use super::ContentFilter;

/// Length of the hex digest returned by [`content_filter_hash`].
pub const CONTENT_FILTER_HASH_LEN: usize = 64;

/// Compute the canonical hash of a content filter.
///
/// The digest is blake3 over the compact JSON text of the filter with fields in
/// their given order. Reordering fields yields a different digest; callers that
/// need stable hashes must build filters with a stable field order.
pub fn content_filter_hash(filter: &ContentFilter) -> String {
    let canonical = filter.canonical_json();
    hex::encode(blake3::hash(canonical.as_bytes()).as_bytes())
}
