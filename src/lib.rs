//! Library to reconstruct tile-scrambled page images.
//!
//! Some content services deliver page images with their tiles shuffled.
//! The shuffle is deterministic and keyed by the image locator, so the
//! original can be rebuilt exactly:
//!
//! * [derive_seed] turns a locator into a [Seed].
//! * [build_permutation] expands a seed into a [Permutation] of block positions.
//! * [recompose] moves every scrambled block back to its true position.
//! * [encode] serializes the result as JPEG or PNG.
//!
//! [reconstruct_and_encode] chains the last three steps. Every step is pure,
//! so any number of images can be processed in parallel.

// Copyright (C) 2023 Dheatly23
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//

mod compose;
mod encode;
mod error;
pub mod listing;
mod seed;
mod shuffle;

use image::DynamicImage;

#[doc(inline)]
pub use crate::compose::{recompose, scramble, BlockSize, Grid, PageMetadata};
#[doc(inline)]
pub use crate::encode::{encode, EncodeOptions, OutputFormat, DEFAULT_QUALITY};
#[doc(inline)]
pub use crate::error::{Error, Result};
#[doc(inline)]
pub use crate::seed::{
    derive_seed, verify_fixtures, ChecksumSeed, FixtureMismatch, LocatorToSeed, Seed,
};
#[doc(inline)]
pub use crate::shuffle::{build_permutation, Permutation};

/// Rebuilds one scrambled image and encodes it.
///
/// `source` is the decoded image exactly as fetched, `seed` usually comes
/// from [derive_seed] on the same locator.
pub fn reconstruct_and_encode(
    source: &DynamicImage,
    metadata: &PageMetadata,
    seed: Seed,
    options: &EncodeOptions,
) -> Result<Vec<u8>> {
    // Reject bad options before doing any pixel work.
    options.validate()?;

    let permutation = build_permutation(seed, metadata.block_count as usize)?;
    let image = recompose(source, metadata, &permutation)?;
    encode(&image, options)
}
