//! Position → chapter resolution.
//!
//! Chapters are half-open intervals `[start_i, start_{i+1})`; the last one is
//! unbounded.  The entries of a video must already be sorted by `start`.  This
//! module does not sort and gives no guarantee on unsorted input.

use crate::catalog::{TimestampEntry, Video};

/// The chapter playing at `position` seconds, or `None` when `position` is
/// before the first chapter (or the video has none).
///
/// A position exactly on a boundary belongs to the chapter starting there.
pub fn resolve(video: &Video, position: f64) -> Option<&TimestampEntry> {
    resolve_entries(&video.timestamps, position)
}

/// Same as [`resolve`] over a bare slice.
pub fn resolve_entries(entries: &[TimestampEntry], position: f64) -> Option<&TimestampEntry> {
    // Count of entries with start <= position.  NaN compares false → 0 → None.
    let idx = entries.partition_point(|e| e.start <= position);
    idx.checked_sub(1).map(|i| &entries[i])
}
