/*
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

//! Containers and producers of training examples.
//!
//! All variants can be iterated any number of times, every call to [`Dataset::iter`] starts
//! again at the first example. Parallel consumers split a dataset into contiguous ranges by
//! count and open one cursor per range with [`Dataset::iter_range`].

mod disk;
mod memory;
mod window;

pub use self::disk::DiskDataset;
pub use self::memory::{CompactDataset, InMemoryDataset};
pub use self::window::WindowDataset;

use crate::error::Result;
use crate::types::DataPoint;

/// A fresh cursor over data points. Cursors that read from external resources yield errors
/// instead of panicking.
pub type DataPoints<'a> = Box<dyn Iterator<Item=Result<DataPoint>> + 'a>;

pub trait Dataset: Sync {

    /// Appends a data point. Read-only and generated variants fail with
    /// [`Error::Unsupported`](crate::error::Error::Unsupported).
    fn add_datapoint(&mut self, data_point: DataPoint) -> Result<bool>;

    fn size(&self) -> u64;

    fn iter(&self) -> Result<DataPoints<'_>>;

    /// Cursor over the `len` data points following the first `start` ones.
    ///
    /// The default walks a fresh cursor past the first `start` data points, so a pass split into
    /// `n` ranges produces up to `n` times the data. Variants with random access override it.
    fn iter_range(&self, start: u64, len: u64) -> Result<DataPoints<'_>> {
        Ok(Box::new(self.iter()?.skip(start as usize).take(len as usize)))
    }
}

/// Splits `size` examples into at most `parts` contiguous `(start, len)` ranges of nearly equal
/// length. Empty ranges are left out.
pub fn partition(size: u64, parts: usize) -> Vec<(u64, u64)> {
    let parts = parts.max(1) as u64;
    let chunk = size / parts;
    let remainder = size % parts;

    let mut ranges = Vec::with_capacity(parts as usize);
    let mut start = 0;
    for part in 0..parts {
        let len = chunk + if part < remainder { 1 } else { 0 };
        if len > 0 {
            ranges.push((start, len));
        }
        start += len;
    }
    ranges
}
