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

//! Flat `f32` storage which all training workers read and write at the same time.
//!
//! Training follows the Hogwild! scheme: workers update shared parameters without any locking.
//! Two workers touching the same entry concurrently may overwrite each other's update, which
//! SGD tolerates because single steps are small. Every cell is an `AtomicU32` holding the bits
//! of an `f32` and is only ever accessed with `Relaxed` loads and stores. These compile to plain
//! loads and stores, there is no read-modify-write and no ordering between cells, so a
//! read-update-write sequence on a cell is racy on purpose. Do not add locks here, they would
//! serialize the workers.

use std::sync::atomic::{AtomicU32, Ordering};

pub struct SharedBuffer {
    cells: Box<[AtomicU32]>,
}

impl SharedBuffer {

    pub fn zeros(len: usize) -> Self {
        SharedBuffer::from_vec(vec![0.0; len])
    }

    pub fn from_vec(values: Vec<f32>) -> Self {
        let cells: Vec<AtomicU32> = values.into_iter()
            .map(|value| AtomicU32::new(value.to_bits()))
            .collect();

        SharedBuffer { cells: cells.into_boxed_slice() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        f32::from_bits(self.cells[index].load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, index: usize, value: f32) {
        self.cells[index].store(value.to_bits(), Ordering::Relaxed);
    }

    /// Copies `out.len()` values starting at `offset` into `out`.
    #[inline]
    pub fn read_into(&self, offset: usize, out: &mut [f32]) {
        for (position, value) in out.iter_mut().enumerate() {
            *value = self.get(offset + position);
        }
    }

    pub fn slice_to_vec(&self, offset: usize, len: usize) -> Vec<f32> {
        let mut values = vec![0.0; len];
        self.read_into(offset, &mut values);
        values
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.slice_to_vec(0, self.len())
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        SharedBuffer::zeros(0)
    }
}

#[cfg(test)]
mod tests {

    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn get_and_set() {
        let buffer = SharedBuffer::from_vec(vec![1.0, 2.0, 3.0]);
        buffer.set(1, -0.5);
        assert_eq!(buffer.get(1), -0.5);
        assert_eq!(buffer.to_vec(), vec![1.0, -0.5, 3.0]);
        assert_eq!(buffer.slice_to_vec(1, 2), vec![-0.5, 3.0]);
    }

    #[test]
    fn shared_between_threads() {
        let buffer = Arc::new(SharedBuffer::zeros(4));

        let handles: Vec<_> = (0..4)
            .map(|index| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || buffer.set(index, index as f32))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(buffer.to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
    }
}
