// Copyright (C) 2023 Dheatly23
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::ops::Index;

use rand::prelude::*;
use rand_xoshiro::Xoshiro256StarStar;

use crate::error::{Error, Result};
use crate::seed::Seed;

/// Ordering of block positions.
///
/// Scrambled position `i` holds the block whose true position is `self[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permutation(Vec<usize>);

impl Permutation {
    /// Wraps an existing ordering, returns [None] if it is not a permutation.
    pub fn new(indices: Vec<usize>) -> Option<Self> {
        let mut seen = vec![false; indices.len()];
        for &i in &indices {
            match seen.get_mut(i) {
                Some(v) if !*v => *v = true,
                _ => return None,
            }
        }
        Some(Self(indices))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Maps a true position back to its scrambled position.
    pub fn inverse(&self) -> Self {
        let mut ret = vec![0; self.0.len()];
        for (i, &p) in self.0.iter().enumerate() {
            ret[p] = i;
        }
        Self(ret)
    }
}

impl Index<usize> for Permutation {
    type Output = usize;

    fn index(&self, i: usize) -> &usize {
        &self.0[i]
    }
}

impl From<Permutation> for Vec<usize> {
    fn from(p: Permutation) -> Self {
        p.0
    }
}

/// Builds the block permutation for `seed`.
///
/// Fisher-Yates over `0..block_count`, driven by xoshiro256** seeded from
/// the seed. Ranges are drawn as `u32` so the result is the same on 32-bit
/// and 64-bit targets.
pub fn build_permutation(seed: Seed, block_count: usize) -> Result<Permutation> {
    if block_count == 0 || u32::try_from(block_count).is_err() {
        return Err(Error::InvalidBlockCount { block_count });
    }

    let mut random = Xoshiro256StarStar::seed_from_u64(seed.0);
    let mut indices: Vec<_> = (0..block_count).collect();
    for i in (1..block_count).rev() {
        let j = random.gen_range(0..=i as u32) as usize;
        indices.swap(i, j);
    }

    Ok(Permutation(indices))
}
