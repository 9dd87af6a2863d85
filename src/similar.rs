/**
 * fmembed
 * Copyright (C) 2018 The fmembed authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use fnv::FnvHashMap;

/// Candidate for the top-k most similar items, kept in a binary heap.
#[derive(PartialEq, Debug)]
pub struct ScoredItem {
    pub item: u32,
    pub score: f64,
}

/// Reversed ordering turns `BinaryHeap` into a min-heap, so its top is the weakest candidate.
/// There is no total order on floating point numbers, incomparable scores count as equal.
fn cmp_reverse(scored_item_a: &ScoredItem, scored_item_b: &ScoredItem) -> Ordering {
    match scored_item_a.score.partial_cmp(&scored_item_b.score) {
        Some(Ordering::Less) => Ordering::Greater,
        Some(Ordering::Greater) => Ordering::Less,
        Some(Ordering::Equal) | None => Ordering::Equal,
    }
}

impl Eq for ScoredItem {}

impl Ord for ScoredItem {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_reverse(self, other)
    }
}

impl PartialOrd for ScoredItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(cmp_reverse(self, other))
    }
}

/// Cosine similarity, NaN if one of the vectors has zero length.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// The `k` items with the highest cosine similarity to `item`, best first. The item itself is
/// included, as it is its own nearest neighbour. `None` if `item` has no vector.
pub fn most_similar(
    item: u32,
    vectors: &FnvHashMap<u32, Vec<f32>>,
    k: usize,
) -> Option<Vec<ScoredItem>> {

    let item_vector = vectors.get(&item)?;
    if k == 0 {
        return Some(Vec::new());
    }

    let mut heap = BinaryHeap::with_capacity(k);

    for (&other_item, other_vector) in vectors.iter() {
        let scored_item = ScoredItem { item: other_item, score: cosine(item_vector, other_vector) };

        if heap.len() < k {
            heap.push(scored_item);
        } else if let Some(mut top) = heap.peek_mut() {
            if scored_item < *top {
                *top = scored_item;
            }
        }
    }

    Some(heap.into_sorted_vec())
}
