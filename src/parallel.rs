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

use scoped_pool::Pool;

use crate::dataset;
use crate::error::{Error, Result};

/// Fixed size pool of threads which processes contiguous ranges of a dataset side by side.
pub struct WorkerPool {
    pool: Pool,
    threads: usize,
}

impl WorkerPool {

    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        WorkerPool { pool: Pool::new(threads), threads }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Splits `size` examples into one contiguous range per thread and runs
    /// `work(worker, start, len)` for every range concurrently. Returns once all workers are done,
    /// with their results in range order, or the error of the first failing worker.
    pub fn map_ranges<T, F>(&self, size: u64, work: F) -> Result<Vec<T>>
        where T: Send, F: Fn(usize, u64, u64) -> Result<T> + Sync {

        let ranges = dataset::partition(size, self.threads);
        let mut slots: Vec<Option<Result<T>>> = ranges.iter().map(|_| None).collect();

        let work = &work;

        self.pool.scoped(|scope| {
            for (worker, (slot, &(start, len))) in slots.iter_mut().zip(ranges.iter()).enumerate() {
                scope.execute(move || {
                    *slot = Some(work(worker, start, len));
                });
            }
        });

        slots.into_iter()
            .enumerate()
            .map(|(worker, slot)| slot.unwrap_or(Err(Error::WorkerFailed(worker))))
            .collect()
    }
}
