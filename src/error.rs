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

use thiserror::Error;

/// Errors produced while reconstructing an image.
///
/// All operations are deterministic, so none of these are worth retrying
/// with the same input.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed locator '{locator}': {reason}")]
    MalformedLocator {
        locator: String,
        reason: &'static str,
    },

    #[error("Invalid block count: {block_count}")]
    InvalidBlockCount { block_count: usize },

    #[error("{block_count} blocks do not tile a {width}x{height} image evenly")]
    UnevenGrid {
        width: u32,
        height: u32,
        block_count: u32,
    },

    #[error("Permutation has {actual} entries, grid has {expected} blocks")]
    PermutationMismatch { expected: usize, actual: usize },

    #[error("Source image {actual_width}x{actual_height} is smaller than declared {width}x{height}")]
    SourceTooSmall {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Unsupported output format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Invalid quality {quality}, expected 1-100")]
    InvalidQuality { quality: u8 },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
