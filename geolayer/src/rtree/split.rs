//! Deterministic node splitting.

use crate::geometry::Envelope;

use super::types::Item;

/// Splits an overflowing node's items into two groups with the quadratic
/// heuristic, guaranteeing each group at least `min_entries` items.
///
/// Seeds are the pair wasting the most area when combined. Remaining items
/// are assigned one at a time, strongest preference first, to the group
/// needing less enlargement (then smaller area, then fewer items, then the
/// first group). Ties always resolve to the lowest index, so equal inputs
/// produce equal splits.
pub(crate) fn quadratic_split(items: Vec<Item>, min_entries: usize) -> (Vec<Item>, Vec<Item>) {
    let (seed_a, seed_b) = pick_seeds(&items);

    let mut group_a = vec![items[seed_a]];
    let mut group_b = vec![items[seed_b]];
    let mut envelope_a = items[seed_a].envelope();
    let mut envelope_b = items[seed_b].envelope();

    let mut remaining: Vec<Item> = items
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i != seed_a && *i != seed_b)
        .map(|(_, item)| item)
        .collect();

    while !remaining.is_empty() {
        if group_a.len() + remaining.len() <= min_entries {
            group_a.append(&mut remaining);
            break;
        }
        if group_b.len() + remaining.len() <= min_entries {
            group_b.append(&mut remaining);
            break;
        }

        let next = pick_next(&remaining, &envelope_a, &envelope_b);
        let item = remaining.remove(next);
        let envelope = item.envelope();
        let grow_a = envelope_a.enlargement(&envelope);
        let grow_b = envelope_b.enlargement(&envelope);

        let to_a = if grow_a != grow_b {
            grow_a < grow_b
        } else if envelope_a.area() != envelope_b.area() {
            envelope_a.area() < envelope_b.area()
        } else {
            group_a.len() <= group_b.len()
        };

        if to_a {
            envelope_a.expand(&envelope);
            group_a.push(item);
        } else {
            envelope_b.expand(&envelope);
            group_b.push(item);
        }
    }

    (group_a, group_b)
}

fn pick_seeds(items: &[Item]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut worst_waste = f64::NEG_INFINITY;
    for i in 0..items.len() {
        let a = items[i].envelope();
        for (j, other) in items.iter().enumerate().skip(i + 1) {
            let b = other.envelope();
            let waste = a.merge(&b).area() - a.area() - b.area();
            if waste > worst_waste {
                worst_waste = waste;
                best = (i, j);
            }
        }
    }
    best
}

fn pick_next(remaining: &[Item], envelope_a: &Envelope, envelope_b: &Envelope) -> usize {
    let mut best = 0;
    let mut best_difference = f64::NEG_INFINITY;
    for (i, item) in remaining.iter().enumerate() {
        let envelope = item.envelope();
        let difference =
            (envelope_a.enlargement(&envelope) - envelope_b.enlargement(&envelope)).abs();
        if difference > best_difference {
            best_difference = difference;
            best = i;
        }
    }
    best
}
