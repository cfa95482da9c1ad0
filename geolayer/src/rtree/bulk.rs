//! Sort-Tile-Recursive packing.

use itertools::Itertools;
use std::cmp::Ordering;

use super::types::Item;

/// Partitions one level's items into node-sized groups.
///
/// Items are sorted by envelope centre x and cut into `ceil(sqrt(P))`
/// vertical slices (`P` = number of nodes needed), each slice is sorted by
/// centre y and cut into runs of at most `max_entries`. Every cut divides as
/// evenly as possible, so with `min_entries <= max_entries / 2` each group
/// meets the minimum fill whenever there is more than one group.
pub(crate) fn str_partition(items: Vec<Item>, max_entries: usize) -> Vec<Vec<Item>> {
    if items.len() <= max_entries {
        return vec![items];
    }

    let node_count = items.len().div_ceil(max_entries);
    let slice_count = (node_count as f64).sqrt().ceil() as usize;

    let sorted_x = items
        .into_iter()
        .sorted_by(|a, b| compare_centers(a, b, true))
        .collect_vec();

    split_evenly(sorted_x, slice_count)
        .into_iter()
        .flat_map(|slice| {
            let groups = slice.len().div_ceil(max_entries);
            let sorted_y = slice
                .into_iter()
                .sorted_by(|a, b| compare_centers(a, b, false))
                .collect_vec();
            split_evenly(sorted_y, groups)
        })
        .collect()
}

/// Cuts `items` into `parts` consecutive runs whose sizes differ by at most one.
pub(crate) fn split_evenly<T>(items: Vec<T>, parts: usize) -> Vec<Vec<T>> {
    let parts = parts.max(1);
    let base = items.len() / parts;
    let extra = items.len() % parts;

    let mut result = Vec::with_capacity(parts);
    let mut iter = items.into_iter();
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        let run: Vec<T> = iter.by_ref().take(size).collect();
        if !run.is_empty() {
            result.push(run);
        }
    }
    result
}

fn compare_centers(a: &Item, b: &Item, by_x: bool) -> Ordering {
    let ca = a.envelope().center();
    let cb = b.envelope().center();
    let (primary, secondary) = if by_x {
        (ca.x.total_cmp(&cb.x), ca.y.total_cmp(&cb.y))
    } else {
        (ca.y.total_cmp(&cb.y), ca.x.total_cmp(&cb.x))
    };
    primary.then(secondary)
}
