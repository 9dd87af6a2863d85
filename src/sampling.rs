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

use rand::Rng;

use crate::error::{Error, Result};

/// Builds a table for O(1) sampling from the smoothed distribution `count[id]^alpha`. Ids are
/// laid out in increasing order, each covering a share of the table proportional to its weight,
/// ids with a zero count do not appear.
///
/// For a table of size 3 and counts `[0, 10, 20]` the table is `[1, 2, 2]`.
pub fn sampling_table(counts: &[u32], alpha: f64, table_size: usize) -> Result<Vec<u32>> {

    if table_size == 0 {
        return Err(Error::Config("the sampling table needs at least one slot".to_string()));
    }

    let sum: f64 = counts.iter()
        .filter(|&&count| count > 0)
        .map(|&count| f64::from(count).powf(alpha))
        .sum();

    if sum <= 0.0 {
        return Err(Error::DegenerateDistribution);
    }

    let mut table = Vec::with_capacity(table_size);
    let mut cumulative = 0.0;
    let mut last_id = 0;

    for (id, &count) in counts.iter().enumerate() {
        if count > 0 {
            last_id = id as u32;
            cumulative += f64::from(count).powf(alpha) / sum;
            while table.len() < table_size && cumulative > table.len() as f64 / table_size as f64 {
                table.push(last_id);
            }
        }
    }

    // rounding may leave the last slots uncovered
    table.resize(table_size, last_id);

    Ok(table)
}

/// Draws ids according to a precomputed sampling table. The table is read-only after
/// construction, each worker brings its own random source.
#[derive(Clone, Debug, Default)]
pub struct NegativeSampler {
    table: Vec<u32>,
}

impl NegativeSampler {

    pub fn new(counts: &[u32], alpha: f64, table_size: usize) -> Result<Self> {
        Ok(NegativeSampler { table: sampling_table(counts, alpha, table_size)? })
    }

    pub fn from_table(table: Vec<u32>) -> Self {
        NegativeSampler { table }
    }

    pub fn table(&self) -> &[u32] {
        &self.table
    }

    #[inline]
    pub fn sample<R: Rng>(&self, rng: &mut R) -> u32 {
        self.table[rng.gen_range(0..self.table.len())]
    }
}
