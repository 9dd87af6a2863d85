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

use crate::dataset::{DataPoints, Dataset};
use crate::error::{Error, Result};
use crate::lcg::Lcg48Rng;
use crate::types::DataPoint;

/// Co-occurrence pairs generated on the fly from sequences of dense item ids (one row per user
/// or session). For every position of a row, all other positions within a window of randomly
/// drawn size `1..=window` become its contexts. Pairs are never materialized, each cursor
/// regenerates them from the seed, so every pass sees the same sequence.
///
/// Rows must already be mapped to dense item ids: the context of an item id `i` is `i + 1`.
pub struct WindowDataset {
    rows: Vec<Vec<u32>>,
    window: u32,
    seed: u64,
    size: u64,
}

impl WindowDataset {

    pub fn new(rows: Vec<Vec<u32>>, window: u32, seed: u64) -> Result<Self> {
        if window == 0 || window > i32::MAX as u32 {
            return Err(Error::Config(format!("the window size must be in 1..={}, got {}", i32::MAX, window)));
        }

        let mut dataset = WindowDataset { rows, window, seed, size: 0 };
        // TODO: derive the size from the row lengths and drawn windows without emitting pairs
        dataset.size = dataset.cursor().count() as u64;

        tracing::info!(size = dataset.size, "number of positive data points");

        Ok(dataset)
    }

    pub fn rows(&self) -> &[Vec<u32>] {
        &self.rows
    }

    fn cursor(&self) -> WindowCursor<'_> {
        WindowCursor::new(&self.rows, self.window, self.seed)
    }
}

impl Dataset for WindowDataset {

    fn add_datapoint(&mut self, _data_point: DataPoint) -> Result<bool> {
        Err(Error::Unsupported("appending to a window generated dataset"))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn iter(&self) -> Result<DataPoints<'_>> {
        Ok(Box::new(self.cursor().map(Ok)))
    }
}

struct WindowCursor<'a> {
    rows: &'a [Vec<u32>],
    window: u32,
    rng: Lcg48Rng,
    row: usize,
    item: usize,
    context: usize,
    sampled_window: usize,
}

impl<'a> WindowCursor<'a> {

    fn new(rows: &'a [Vec<u32>], window: u32, seed: u64) -> Self {
        let mut cursor = WindowCursor {
            rows,
            window,
            rng: Lcg48Rng::new(seed),
            row: 0,
            item: 0,
            context: 1,
            sampled_window: 0,
        };
        cursor.skip_short_rows();
        if cursor.row < rows.len() {
            cursor.sampled_window = cursor.sample_window();
        }
        cursor
    }

    fn sample_window(&mut self) -> usize {
        self.rng.next_below(self.window) as usize + 1
    }

    // rows with less than two ids have no pairs
    fn skip_short_rows(&mut self) {
        while self.row < self.rows.len() && self.rows[self.row].len() < 2 {
            self.row += 1;
        }
    }
}

impl<'a> Iterator for WindowCursor<'a> {
    type Item = DataPoint;

    fn next(&mut self) -> Option<DataPoint> {
        if self.row >= self.rows.len() {
            return None;
        }

        let current = &self.rows[self.row];
        let data_point = DataPoint::new(current[self.context] + 1, current[self.item], 1.0);

        self.context += 1;
        if self.context == self.item {
            self.context += 1;
        }

        // end of the window, move on to the next item. The left edge is clamped at the row
        // start, the right edge is only checked against the row end.
        let past_window = self.context > self.item && self.context - self.item > self.sampled_window;
        if past_window || self.context == current.len() {
            self.item += 1;
            self.sampled_window = self.sample_window();
            self.context = self.item.saturating_sub(self.sampled_window);
        }

        if self.item == current.len() {
            self.row += 1;
            self.skip_short_rows();
            if self.row < self.rows.len() {
                self.item = 0;
                self.context = 1;
                self.sampled_window = self.sample_window();
            }
        }

        Some(data_point)
    }
}
