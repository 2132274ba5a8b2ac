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

use std::borrow::Cow;
use std::cmp::Reverse;

use image::{ColorType, DynamicImage, ImageBuffer};
use ndarray::parallel::prelude::*;
use ndarray::prelude::*;
use ndarray::{ErrorKind, ShapeError};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::shuffle::Permutation;

/// Explicit cell size of the scramble grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSize {
    pub width: u32,
    pub height: u32,
}

/// Description of one scrambled image, as served with the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Width of the reconstructed image.
    pub width: u32,
    /// Height of the reconstructed image.
    pub height: u32,
    /// Number of shuffled blocks.
    pub block_count: u32,
    /// Cell size. When absent it is inferred from the other fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockSize>,
}

impl PageMetadata {
    pub fn new(width: u32, height: u32, block_count: u32) -> Self {
        Self {
            width,
            height,
            block_count,
            block: None,
        }
    }

    pub fn with_block(self, width: u32, height: u32) -> Self {
        Self {
            block: Some(BlockSize { width, height }),
            ..self
        }
    }
}

/// Resolved layout of the scramble grid.
///
/// Cells are numbered row-major from the top-left corner. Pixels right of
/// `cols * cell_width` or below `rows * cell_height` are not part of any cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub cols: u32,
    pub rows: u32,
    pub cell_width: u32,
    pub cell_height: u32,
}

impl Grid {
    /// Resolves the grid declared by `metadata`.
    ///
    /// With an explicit block size, columns fill the width and rows are
    /// `block_count / cols`. Otherwise square cells spanning the width are
    /// tried first, covering as much of the height as possible. Failing
    /// that, `block_count` is factored into `cols * rows` cells tiling the
    /// image exactly, preferring the most square cells.
    pub fn resolve(metadata: &PageMetadata) -> Result<Self> {
        let PageMetadata {
            width,
            height,
            block_count,
            block,
        } = *metadata;

        if block_count == 0 {
            return Err(Error::InvalidBlockCount { block_count: 0 });
        }
        let uneven = || Error::UnevenGrid {
            width,
            height,
            block_count,
        };

        let grid = match block {
            Some(BlockSize { width: bw, height: bh }) => {
                if bw == 0 || bh == 0 {
                    return Err(uneven());
                }
                let cols = width / bw;
                if cols == 0 || block_count % cols != 0 {
                    return Err(uneven());
                }
                let rows = block_count / cols;
                if u64::from(rows) * u64::from(bh) > u64::from(height) {
                    return Err(uneven());
                }

                Self {
                    cols,
                    rows,
                    cell_width: bw,
                    cell_height: bh,
                }
            }
            None => Self::square(width, height, block_count)
                .or_else(|| Self::exact(width, height, block_count))
                .ok_or_else(uneven)?,
        };

        log::debug!(
            "{}x{} image, {} blocks: {}x{} grid of {}x{} cells",
            width,
            height,
            block_count,
            grid.cols,
            grid.rows,
            grid.cell_width,
            grid.cell_height,
        );
        Ok(grid)
    }

    fn square(width: u32, height: u32, block_count: u32) -> Option<Self> {
        (1..=block_count.min(width))
            .filter(|&cols| block_count % cols == 0 && width % cols == 0)
            .map(|cols| Self {
                cols,
                rows: block_count / cols,
                cell_width: width / cols,
                cell_height: width / cols,
            })
            .filter(|g| u64::from(g.rows) * u64::from(g.cell_height) <= u64::from(height))
            // Most rows covered, then fewer columns.
            .max_by_key(|g| (g.rows * g.cell_height, Reverse(g.cols)))
    }

    fn exact(width: u32, height: u32, block_count: u32) -> Option<Self> {
        (1..=block_count.min(width))
            .filter(|&cols| block_count % cols == 0 && width % cols == 0)
            .map(|cols| (cols, block_count / cols))
            .filter(|&(_, rows)| rows <= height && height % rows == 0)
            .map(|(cols, rows)| Self {
                cols,
                rows,
                cell_width: width / cols,
                cell_height: height / rows,
            })
            .min_by_key(|g| g.cell_width.abs_diff(g.cell_height))
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Top-left pixel `(y, x)` of cell `i`.
    fn origin(&self, i: usize) -> (usize, usize) {
        let cols = self.cols as usize;
        (
            (i / cols) * self.cell_height as usize,
            (i % cols) * self.cell_width as usize,
        )
    }
}

/// Brings an image to one of the 8-bit layouts the compositor works on.
pub(crate) fn normalize(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => Cow::Borrowed(image),
        _ => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
    }
}

fn from_raw(color: ColorType, width: u32, height: u32, buf: Vec<u8>) -> Option<DynamicImage> {
    Some(match color {
        ColorType::L8 => DynamicImage::ImageLuma8(ImageBuffer::from_raw(width, height, buf)?),
        ColorType::La8 => DynamicImage::ImageLumaA8(ImageBuffer::from_raw(width, height, buf)?),
        ColorType::Rgb8 => DynamicImage::ImageRgb8(ImageBuffer::from_raw(width, height, buf)?),
        _ => DynamicImage::ImageRgba8(ImageBuffer::from_raw(width, height, buf)?),
    })
}

/// Copies `source` into a fresh buffer of the declared size, filling
/// destination cell `i` with source cell `source_block(i)`.
fn remap<F>(
    source: &DynamicImage,
    metadata: &PageMetadata,
    len: usize,
    source_block: F,
) -> Result<DynamicImage>
where
    F: Fn(usize) -> usize + Sync,
{
    let grid = Grid::resolve(metadata)?;
    if len != grid.len() {
        return Err(Error::PermutationMismatch {
            expected: grid.len(),
            actual: len,
        });
    }
    if source.width() < metadata.width || source.height() < metadata.height {
        return Err(Error::SourceTooSmall {
            width: metadata.width,
            height: metadata.height,
            actual_width: source.width(),
            actual_height: source.height(),
        });
    }

    let source = normalize(source);
    let color = source.color();
    let channels = color.channel_count() as usize;
    let (w, h) = (metadata.width as usize, metadata.height as usize);

    let arr = <ArrayView3<u8>>::from_shape(
        (source.height() as usize, source.width() as usize, channels),
        source.as_bytes(),
    )?;
    // Source may be padded past the declared size.
    let arr = arr.slice(s![..h, ..w, ..]);

    // Uncovered pixels are carried over as is.
    let mut out = <Array3<u8>>::zeros((h, w, channels));
    out.assign(&arr);

    let (cw, ch) = (grid.cell_width as usize, grid.cell_height as usize);
    let cols = grid.cols as usize;
    let mut covered = out.slice_mut(s![..grid.rows as usize * ch, ..cols * cw, ..]);
    par_azip!((index (r, c, _), mut block in covered.exact_chunks_mut((ch, cw, channels))) {
        let (y, x) = grid.origin(source_block(r * cols + c));
        block.assign(&arr.slice(s![y..y + ch, x..x + cw, ..]));
    });

    from_raw(color, metadata.width, metadata.height, out.into_raw_vec())
        .ok_or_else(|| ShapeError::from_kind(ErrorKind::IncompatibleShape).into())
}

/// Reconstructs a scrambled image.
///
/// The block at scrambled position `i` in `source` is moved to position
/// `permutation[i]`. Output has exactly the size declared in `metadata`,
/// and keeps the source's colour layout (8-bit).
pub fn recompose(
    source: &DynamicImage,
    metadata: &PageMetadata,
    permutation: &Permutation,
) -> Result<DynamicImage> {
    let inverse = permutation.inverse();
    remap(source, metadata, permutation.len(), |i| inverse[i])
}

/// Scrambles an image, the inverse of [recompose].
pub fn scramble(
    original: &DynamicImage,
    metadata: &PageMetadata,
    permutation: &Permutation,
) -> Result<DynamicImage> {
    remap(original, metadata, permutation.len(), |i| permutation[i])
}

#[cfg(test)]
mod tests {
    use image::{GenericImageView, GrayImage, Luma, Rgb, RgbImage, Rgba};

    use super::*;
    use crate::seed::Seed;
    use crate::shuffle::build_permutation;

    fn pattern(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([x as u8, y as u8, (x * 7 + y * 13) as u8])
        }))
    }

    fn grid(cols: u32, rows: u32, cell_width: u32, cell_height: u32) -> Grid {
        Grid {
            cols,
            rows,
            cell_width,
            cell_height,
        }
    }

    #[test]
    fn infer_square_cells() {
        let g = Grid::resolve(&PageMetadata::new(40, 10, 4)).unwrap();
        assert_eq!(g, grid(4, 1, 10, 10));

        let g = Grid::resolve(&PageMetadata::new(100, 100, 100)).unwrap();
        assert_eq!(g, grid(10, 10, 10, 10));

        // Square cells leave the bottom third uncovered.
        let g = Grid::resolve(&PageMetadata::new(60, 60, 6)).unwrap();
        assert_eq!(g, grid(3, 2, 20, 20));
    }

    #[test]
    fn infer_square_with_remainder() {
        let g = Grid::resolve(&PageMetadata::new(40, 10 * 5 + 7, 20)).unwrap();
        assert_eq!(g, grid(4, 5, 10, 10));
    }

    #[test]
    fn infer_exact_fallback() {
        // No square layout fits: 60x60 or 30x30 cells are taller than the image.
        let g = Grid::resolve(&PageMetadata::new(60, 10, 2)).unwrap();
        assert_eq!(g, grid(2, 1, 30, 10));
    }

    #[test]
    fn infer_uneven() {
        for meta in [
            PageMetadata::new(7, 7, 4),
            PageMetadata::new(10, 10, 7),
            PageMetadata::new(3, 1, 5),
        ] {
            assert!(
                matches!(Grid::resolve(&meta), Err(Error::UnevenGrid { .. })),
                "{meta:?}",
            );
        }
    }

    #[test]
    fn explicit_block() {
        let g = Grid::resolve(&PageMetadata::new(10, 27, 10).with_block(4, 4)).unwrap();
        assert_eq!(g, grid(2, 5, 4, 4));

        // Too many rows for the height.
        let meta = PageMetadata::new(8, 10, 6).with_block(4, 4);
        assert!(matches!(Grid::resolve(&meta), Err(Error::UnevenGrid { .. })));

        // Block count is not a whole number of rows.
        let meta = PageMetadata::new(8, 40, 5).with_block(4, 4);
        assert!(matches!(Grid::resolve(&meta), Err(Error::UnevenGrid { .. })));

        let meta = PageMetadata::new(8, 40, 4).with_block(0, 4);
        assert!(matches!(Grid::resolve(&meta), Err(Error::UnevenGrid { .. })));
    }

    #[test]
    fn zero_blocks() {
        assert!(matches!(
            Grid::resolve(&PageMetadata::new(8, 8, 0)),
            Err(Error::InvalidBlockCount { .. })
        ));
    }

    #[test]
    fn remainder_copied_through() {
        // Height is 5 whole blocks plus 7 rows, width leaves 2 columns over.
        let meta = PageMetadata::new(10, 4 * 5 + 7, 10).with_block(4, 4);
        let source = pattern(10, 27);
        let p = build_permutation(Seed(3), 10).unwrap();
        let out = recompose(&source, &meta, &p).unwrap();

        assert_eq!(out.dimensions(), (10, 27));
        for y in 0..27 {
            for x in 0..10 {
                if y >= 20 || x >= 8 {
                    assert_eq!(out.get_pixel(x, y), source.get_pixel(x, y), "({x}, {y})");
                }
            }
        }

        // Covered blocks follow the permutation.
        for i in 0..10usize {
            let (sy, sx) = ((i / 2) as u32 * 4, (i % 2) as u32 * 4);
            let (dy, dx) = ((p[i] / 2) as u32 * 4, (p[i] % 2) as u32 * 4);
            for oy in 0..4 {
                for ox in 0..4 {
                    assert_eq!(
                        out.get_pixel(dx + ox, dy + oy),
                        source.get_pixel(sx + ox, sy + oy),
                    );
                }
            }
        }
    }

    #[test]
    fn inferred_remainder_copied_through() {
        let meta = PageMetadata::new(40, 10 * 5 + 7, 20);
        let source = pattern(40, 57);
        let p = build_permutation(Seed(11), 20).unwrap();
        let out = recompose(&source, &meta, &p).unwrap();

        for y in 50..57 {
            for x in 0..40 {
                assert_eq!(out.get_pixel(x, y), source.get_pixel(x, y), "({x}, {y})");
            }
        }

        let scrambled = scramble(&source, &meta, &p).unwrap();
        assert_eq!(recompose(&scrambled, &meta, &p).unwrap(), source);
    }

    #[test]
    fn round_trip() {
        let meta = PageMetadata::new(48, 36, 12);
        let original = pattern(48, 36);
        let p = build_permutation(Seed(99), 12).unwrap();

        let scrambled = scramble(&original, &meta, &p).unwrap();
        assert_ne!(scrambled, original);
        assert_eq!(recompose(&scrambled, &meta, &p).unwrap(), original);
    }

    #[test]
    fn padded_source_is_cropped() {
        let meta = PageMetadata::new(20, 20, 4);
        let padded = pattern(32, 25);
        let p = Permutation::new(vec![0, 1, 2, 3]).unwrap();

        let out = recompose(&padded, &meta, &p).unwrap();
        assert_eq!(out, DynamicImage::ImageRgb8(padded.to_rgb8().view(0, 0, 20, 20).to_image()));
    }

    #[test]
    fn source_too_small() {
        let meta = PageMetadata::new(20, 20, 4);
        let p = build_permutation(Seed(1), 4).unwrap();
        assert!(matches!(
            recompose(&pattern(20, 19), &meta, &p),
            Err(Error::SourceTooSmall { .. })
        ));
    }

    #[test]
    fn permutation_length_mismatch() {
        let meta = PageMetadata::new(20, 20, 4);
        let p = build_permutation(Seed(1), 5).unwrap();
        assert!(matches!(
            recompose(&pattern(20, 20), &meta, &p),
            Err(Error::PermutationMismatch {
                expected: 4,
                actual: 5
            })
        ));
    }

    #[test]
    fn keeps_color_layout() {
        let meta = PageMetadata::new(8, 8, 4);
        let p = Permutation::new(vec![3, 2, 1, 0]).unwrap();

        let gray = DynamicImage::ImageLuma8(GrayImage::from_fn(8, 8, |x, y| Luma([(x + y * 8) as u8])));
        let out = recompose(&gray, &meta, &p).unwrap();
        assert_eq!(out.color(), ColorType::L8);
        // Top-left cell of the source ends up bottom-right.
        assert_eq!(out.as_luma8().unwrap().get_pixel(4, 4), &Luma([0]));

        let deep = DynamicImage::ImageRgba16(ImageBuffer::from_pixel(8, 8, Rgba([65535u16, 0, 0, 65535])));
        let out = recompose(&deep, &meta, &p).unwrap();
        assert_eq!(out.color(), ColorType::Rgba8);
        assert_eq!(out.get_pixel(7, 7), Rgba([255, 0, 0, 255]));
    }
}
