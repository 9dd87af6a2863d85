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

use rand::{Error, RngCore, SeedableRng};

const MULTIPLIER: u64 = 0x5_DEEC_E66D;
const ADDEND: u64 = 0xB;
const MASK: u64 = (1 << 48) - 1;

/// 48-bit linear congruential generator (the classic `drand48` constants). Window sizes for
/// generated datasets are drawn from it, so a given seed always yields the same sequence of
/// training pairs, also across platforms and versions of the `rand` crate.
#[derive(Clone, Debug)]
pub struct Lcg48Rng {
    state: u64,
}

impl Lcg48Rng {

    pub fn new(seed: u64) -> Self {
        Lcg48Rng { state: (seed ^ MULTIPLIER) & MASK }
    }

    #[inline]
    fn next_bits(&mut self, bits: u32) -> u32 {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(ADDEND) & MASK;
        (self.state >> (48 - bits)) as u32
    }

    /// Uniform value in `[0, bound)`, `bound` must be in `1..=i32::MAX`.
    pub fn next_below(&mut self, bound: u32) -> u32 {
        assert!(bound > 0 && bound <= i32::max_value() as u32, "bound out of range: {}", bound);

        if bound.is_power_of_two() {
            return ((u64::from(bound) * u64::from(self.next_bits(31))) >> 31) as u32;
        }

        // rejects the incomplete last block of values to keep the draw unbiased
        loop {
            let bits = self.next_bits(31);
            let value = bits % bound;
            if u64::from(bits) - u64::from(value) + u64::from(bound - 1) <= i32::max_value() as u64 {
                return value;
            }
        }
    }
}

impl RngCore for Lcg48Rng {

    fn next_u32(&mut self) -> u32 {
        self.next_bits(32)
    }

    fn next_u64(&mut self) -> u64 {
        (u64::from(self.next_u32()) << 32) | u64::from(self.next_u32())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Lcg48Rng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Lcg48Rng::new(u64::from_le_bytes(seed))
    }

    // The seed is used as is, no scrambling.
    fn seed_from_u64(state: u64) -> Self {
        Lcg48Rng::new(state)
    }
}
