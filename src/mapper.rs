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

use std::io::Write;

use fnv::{FnvHashMap, FnvHashSet};

use crate::dataset::{CompactDataset, Dataset};
use crate::error::Result;
use crate::types::{DataPoint, FeatureTable, RawFeatures, SparseVector};

/// Maps original entity ids into a dense id space so that parameters live in flat arrays.
///
/// Every item gets two neighbouring slots: its item vector at the even index `2k`, its context
/// vector at `2k + 1`. Side features follow after all item slots, at `2 * items` onwards.
/// Contexts that never occur as items have no slot, data points with such a context are
/// dropped when mapping.
#[derive(Debug, Default)]
pub struct DenseMapper {
    contexts: FnvHashSet<u32>,
    items: FnvHashSet<u32>,
    features: FnvHashSet<u32>,
    context_map: FnvHashMap<u32, u32>,
    item_map: FnvHashMap<u32, u32>,
    feature_map: FnvHashMap<u32, u32>,
    num_features: u32,
}

impl DenseMapper {

    pub fn new() -> Self {
        DenseMapper::default()
    }

    pub fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Number of dense ids, two slots per item plus side features.
    pub fn num_features(&self) -> u32 {
        self.num_features
    }

    pub fn context_map(&self) -> &FnvHashMap<u32, u32> {
        &self.context_map
    }

    pub fn item_map(&self) -> &FnvHashMap<u32, u32> {
        &self.item_map
    }

    pub fn feature_map(&self) -> &FnvHashMap<u32, u32> {
        &self.feature_map
    }

    /// Detects all ids of a column based dataset plus its side features and creates the mapping.
    pub fn learn(&mut self, dataset: &dyn Dataset, features: &RawFeatures) -> Result<()> {
        self.detect_dataset(dataset)?;
        self.detect_features(features);
        self.create_map();
        self.log_mapping();
        Ok(())
    }

    /// Detects all ids of a row based dataset plus its side features and creates the mapping.
    pub fn learn_rows(&mut self, rows: &[Vec<u32>], features: &RawFeatures) {
        self.detect_rows(rows);
        self.detect_features(features);
        self.create_map();
        self.log_mapping();
    }

    fn log_mapping(&self) {
        tracing::info!(
            contexts = self.contexts.len(),
            items = self.items.len(),
            features = self.features.len(),
            total = self.num_features,
            "dense mapping created"
        );
    }

    pub fn detect_dataset(&mut self, dataset: &dyn Dataset) -> Result<()> {
        tracing::debug!("detecting contexts and items");

        self.contexts.clear();
        self.items.clear();

        for data_point in dataset.iter()? {
            let data_point = data_point?;
            self.contexts.insert(data_point.context_id);
            self.items.insert(data_point.item_id);
        }

        Ok(())
    }

    /// Within a row every id is both item and context, pairs come from a window over the row.
    pub fn detect_rows(&mut self, rows: &[Vec<u32>]) {
        tracing::debug!("detecting contexts and items of rows");

        self.contexts.clear();
        self.items.clear();

        for row in rows {
            for &id in row {
                self.contexts.insert(id);
                self.items.insert(id);
            }
        }
    }

    pub fn detect_features(&mut self, features: &RawFeatures) {
        tracing::debug!("detecting side features");

        self.features.clear();

        for sparse_vector in features.values() {
            for entry in sparse_vector.iter() {
                self.features.insert(entry.key);
            }
        }
    }

    /// Assigns dense ids to the detected items and features, in ascending order of the original
    /// ids, and returns the total number of dense ids, `2 * items + features`.
    pub fn create_map(&mut self) -> u32 {
        let mut items: Vec<u32> = self.items.iter().cloned().collect();
        items.sort_unstable();

        let mut features: Vec<u32> = self.features.iter().cloned().collect();
        features.sort_unstable();

        self.item_map = FnvHashMap::with_capacity_and_hasher(items.len(), Default::default());
        self.context_map = FnvHashMap::with_capacity_and_hasher(items.len(), Default::default());
        self.feature_map = FnvHashMap::with_capacity_and_hasher(features.len(), Default::default());

        let mut index: u32 = 0;
        for id in items {
            self.item_map.insert(id, index);
            self.context_map.insert(id, index + 1);
            index += 2;
        }

        for id in features {
            self.feature_map.insert(id, index);
            index += 1;
        }

        self.num_features = index;
        index
    }

    #[inline]
    fn map_data_point(&self, data_point: &DataPoint) -> Option<DataPoint> {
        let context_id = self.context_map.get(&data_point.context_id)?;
        let item_id = self.item_map.get(&data_point.item_id)?;
        Some(DataPoint::new(*context_id, *item_id, data_point.rating))
    }

    /// A dense copy of `dataset`. Data points with an id unknown to the mapping are dropped, this
    /// includes contexts that never occur as items.
    pub fn map_dataset(&self, dataset: &dyn Dataset) -> Result<CompactDataset> {
        let mut mapped = CompactDataset::with_capacity(dataset.size() as usize);
        for data_point in dataset.iter()? {
            if let Some(mapped_data_point) = self.map_data_point(&data_point?) {
                mapped.add_datapoint(mapped_data_point)?;
            }
        }
        Ok(mapped)
    }

    /// Rewrites rows to dense item ids in place, unknown ids are removed from their row.
    pub fn map_rows(&self, rows: &mut [Vec<u32>]) {
        tracing::debug!("mapping rows to dense item ids");

        for row in rows.iter_mut() {
            let item_map = &self.item_map;
            row.retain(|id| item_map.contains_key(id));
            for id in row.iter_mut() {
                *id = item_map[&*id];
            }
        }
    }

    /// Side features indexed by dense item id, with dense feature keys. Items unknown to the
    /// mapping are left out, as are feature keys that were never detected.
    pub fn map_features(&self, features: &RawFeatures) -> FeatureTable {
        let mut mapped: FeatureTable = vec![None; self.num_features as usize];

        for (item_id, sparse_vector) in features.iter() {
            if let Some(&dense_item_id) = self.item_map.get(item_id) {
                let entries: Vec<(u32, f32)> = sparse_vector.iter()
                    .filter_map(|entry| {
                        self.feature_map.get(&entry.key).map(|&key| (key, entry.value))
                    })
                    .collect();

                mapped[dense_item_id as usize] = Some(SparseVector::from_entries(&entries));
            }
        }

        mapped
    }

    /// Writes the dense form of `dataset` to `out`, one data point per line.
    pub fn write<W: Write>(&self, dataset: &dyn Dataset, out: &mut W) -> Result<()> {
        tracing::info!("writing dense mapped dataset");

        for data_point in dataset.iter()? {
            if let Some(mapped) = self.map_data_point(&data_point?) {
                writeln!(out, "{}", mapped)?;
            }
        }
        out.flush()?;

        Ok(())
    }
}

/// Inverse of a learned [`DenseMapper`], maps dense ids back to original ones.
pub struct Renaming {
    item_names: FnvHashMap<u32, u32>,
    context_names: FnvHashMap<u32, u32>,
    feature_names: FnvHashMap<u32, u32>,
}

impl Renaming {

    pub fn original_item(&self, dense_id: u32) -> Option<u32> {
        self.item_names.get(&dense_id).cloned()
    }

    pub fn original_context(&self, dense_id: u32) -> Option<u32> {
        self.context_names.get(&dense_id).cloned()
    }

    pub fn original_feature(&self, dense_id: u32) -> Option<u32> {
        self.feature_names.get(&dense_id).cloned()
    }

    pub fn unmap(&self, data_point: &DataPoint) -> Option<DataPoint> {
        let context_id = self.original_context(data_point.context_id)?;
        let item_id = self.original_item(data_point.item_id)?;
        Some(DataPoint::new(context_id, item_id, data_point.rating))
    }
}

fn invert(map: &FnvHashMap<u32, u32>) -> FnvHashMap<u32, u32> {
    let mut inverted = FnvHashMap::with_capacity_and_hasher(map.len(), Default::default());
    for (&original, &dense) in map.iter() {
        inverted.insert(dense, original);
    }
    inverted
}

impl<'a> From<&'a DenseMapper> for Renaming {

    fn from(mapper: &'a DenseMapper) -> Self {
        Renaming {
            item_names: invert(&mapper.item_map),
            context_names: invert(&mapper.context_map),
            feature_names: invert(&mapper.feature_map),
        }
    }
}
