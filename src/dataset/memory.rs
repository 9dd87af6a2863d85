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

use std::cmp;

use crate::dataset::{DataPoints, Dataset};
use crate::error::Result;
use crate::types::DataPoint;

/// Data points held as a plain vector of structs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InMemoryDataset {
    data_points: Vec<DataPoint>,
}

impl InMemoryDataset {

    pub fn with_capacity(capacity: usize) -> Self {
        InMemoryDataset { data_points: Vec::with_capacity(capacity) }
    }

    pub fn data_points(&self) -> &[DataPoint] {
        &self.data_points
    }
}

impl From<Vec<DataPoint>> for InMemoryDataset {
    fn from(data_points: Vec<DataPoint>) -> Self {
        InMemoryDataset { data_points }
    }
}

impl Dataset for InMemoryDataset {

    fn add_datapoint(&mut self, data_point: DataPoint) -> Result<bool> {
        self.data_points.push(data_point);
        Ok(true)
    }

    fn size(&self) -> u64 {
        self.data_points.len() as u64
    }

    fn iter(&self) -> Result<DataPoints<'_>> {
        Ok(Box::new(self.data_points.iter().map(|data_point| Ok(*data_point))))
    }

    fn iter_range(&self, start: u64, len: u64) -> Result<DataPoints<'_>> {
        let (start, end) = clamp_range(start, len, self.data_points.len());
        Ok(Box::new(self.data_points[start..end].iter().map(|data_point| Ok(*data_point))))
    }
}

/// Data points stored column-wise in primitive vectors, which takes far less memory per example
/// than a vector of structs for large train sets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompactDataset {
    context_ids: Vec<u32>,
    item_ids: Vec<u32>,
    ratings: Vec<f32>,
}

impl CompactDataset {

    pub fn with_capacity(capacity: usize) -> Self {
        CompactDataset {
            context_ids: Vec::with_capacity(capacity),
            item_ids: Vec::with_capacity(capacity),
            ratings: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    fn data_point(&self, index: usize) -> DataPoint {
        DataPoint::new(self.context_ids[index], self.item_ids[index], self.ratings[index])
    }
}

impl Dataset for CompactDataset {

    fn add_datapoint(&mut self, data_point: DataPoint) -> Result<bool> {
        self.context_ids.push(data_point.context_id);
        self.item_ids.push(data_point.item_id);
        self.ratings.push(data_point.rating);
        Ok(true)
    }

    fn size(&self) -> u64 {
        self.context_ids.len() as u64
    }

    fn iter(&self) -> Result<DataPoints<'_>> {
        self.iter_range(0, self.size())
    }

    fn iter_range(&self, start: u64, len: u64) -> Result<DataPoints<'_>> {
        let (start, end) = clamp_range(start, len, self.context_ids.len());
        Ok(Box::new((start..end).map(move |index| Ok(self.data_point(index)))))
    }
}

fn clamp_range(start: u64, len: u64, size: usize) -> (usize, usize) {
    let start = cmp::min(start as usize, size);
    let end = cmp::min(start.saturating_add(len as usize), size);
    (start, end)
}
