//! Work ordering: biggest blobs first so the long exports start early.

use crate::blob::{Blob, ScheduledBlob};
use std::cmp::Ordering;

fn work_order(a: &Blob, b: &Blob) -> Ordering {
    b.size_kb
        .cmp(&a.size_kb)
        .then_with(|| a.table.cmp(&b.table))
        .then_with(|| a.schema.cmp(&b.schema))
        .then_with(|| a.part.cmp(&b.part))
}

/// Sort by size descending, then table name ascending, and number the result
/// `0..N`. Schema and part break the remaining ties so the order depends only
/// on the input multiset.
pub fn schedule(mut blobs: Vec<Blob>) -> Vec<ScheduledBlob> {
    blobs.sort_by(work_order);
    blobs
        .into_iter()
        .enumerate()
        .map(|(i, blob)| ScheduledBlob { id: i as u32, blob })
        .collect()
}
