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

use std::fmt;
use std::str::FromStr;

use fnv::FnvHashMap;

/// Side features per dense item id, `None` for items without side information.
pub type FeatureTable = Vec<Option<SparseVector>>;

/// Side features keyed by original item id, as read from a feature file.
pub type RawFeatures = FnvHashMap<u32, SparseVector>;

/// A single observed interaction between a context and an item. The rating is a raw interaction
/// weight such as a co-occurrence count.
#[derive(Clone, Copy, Debug, PartialEq, Default, Deserialize, Serialize)]
pub struct DataPoint {
    pub context_id: u32,
    pub item_id: u32,
    pub rating: f32,
}

impl DataPoint {

    pub fn new(context_id: u32, item_id: u32, rating: f32) -> Self {
        DataPoint { context_id, item_id, rating }
    }

    /// The active features of this data point: context and item with value 1, followed by the
    /// side features of the item (if any).
    pub fn to_sparse_vector(&self, features: Option<&SparseVector>) -> SparseVector {
        let num_features = features.map_or(0, |features| features.len());

        let mut sparse_vector = SparseVector::with_capacity(2 + num_features);
        sparse_vector.set(0, self.context_id, 1.0);
        sparse_vector.set(1, self.item_id, 1.0);

        if let Some(features) = features {
            for (slot, entry) in features.iter().enumerate() {
                sparse_vector.set(2 + slot, entry.key, entry.value);
            }
        }

        sparse_vector
    }
}

/// Tab separated `context item rating`, the layout of interaction files.
impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}\t{}\t{:?}", self.context_id, self.item_id, self.rating)
    }
}

impl FromStr for DataPoint {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut columns = line.split('\t');

        let mut next_column = |name: &str| {
            columns.next()
                .map(str::trim)
                .ok_or_else(|| format!("missing {} column", name))
        };

        let context_id = next_column("context")?;
        let item_id = next_column("item")?;
        let rating = next_column("rating")?;

        Ok(DataPoint {
            context_id: context_id.parse().map_err(|_| format!("bad context id '{}'", context_id))?,
            item_id: item_id.parse().map_err(|_| format!("bad item id '{}'", item_id))?,
            rating: rating.parse().map_err(|_| format!("bad rating '{}'", rating))?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SparseEntry {
    pub key: u32,
    pub value: f32,
}

/// Fixed capacity list of feature entries. Entries keep their insertion slot, they are not sorted
/// by key.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct SparseVector {
    keys: Box<[u32]>,
    values: Box<[f32]>,
}

impl SparseVector {

    pub fn with_capacity(capacity: usize) -> Self {
        SparseVector {
            keys: vec![0; capacity].into_boxed_slice(),
            values: vec![0.0; capacity].into_boxed_slice(),
        }
    }

    pub fn from_entries(entries: &[(u32, f32)]) -> Self {
        let mut sparse_vector = SparseVector::with_capacity(entries.len());
        for (slot, &(key, value)) in entries.iter().enumerate() {
            sparse_vector.set(slot, key, value);
        }
        sparse_vector
    }

    /// Overwrites the entry in `slot`, which must be smaller than the capacity.
    #[inline]
    pub fn set(&mut self, slot: usize, key: u32, value: f32) {
        self.keys[slot] = key;
        self.values[slot] = value;
    }

    #[inline]
    pub fn get(&self, slot: usize) -> SparseEntry {
        SparseEntry { key: self.keys[slot], value: self.values[slot] }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter<'a>(&'a self) -> impl Iterator<Item=SparseEntry> + 'a {
        self.keys.iter()
            .zip(self.values.iter())
            .map(|(&key, &value)| SparseEntry { key, value })
    }
}

impl fmt::Display for SparseVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for entry in self.iter() {
            write!(f, "{}:{} ", entry.key, entry.value)?;
        }
        Ok(())
    }
}
