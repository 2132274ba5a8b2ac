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

use std::fmt;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, GenericImageView, ImageEncoder};
use serde::{Deserialize, Serialize};

use crate::compose::normalize;
use crate::error::{Error, Result};

/// Quality used for lossy output when none is given.
pub const DEFAULT_QUALITY: u8 = 85;

/// Output image format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossy.
    #[default]
    #[serde(alias = "jpg")]
    Jpeg,
    /// Lossless.
    Png,
}

impl OutputFormat {
    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Jpeg)
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match &*s.to_ascii_lowercase() {
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            _ => Err(Error::UnsupportedFormat {
                format: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOptions {
    pub format: OutputFormat,
    /// 1-100, only used by lossy formats.
    #[serde(default = "default_quality")]
    pub quality: u8,
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::new(OutputFormat::default())
    }
}

impl EncodeOptions {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            quality: DEFAULT_QUALITY,
        }
    }

    pub fn with_quality(self, quality: u8) -> Self {
        Self { quality, ..self }
    }

    pub fn validate(&self) -> Result<()> {
        if self.format.is_lossy() && !(1..=100).contains(&self.quality) {
            return Err(Error::InvalidQuality {
                quality: self.quality,
            });
        }
        Ok(())
    }
}

/// Encodes `image` according to `options`.
///
/// JPEG drops alpha. PNG keeps the 8-bit colour layout and round-trips
/// exactly.
pub fn encode(image: &DynamicImage, options: &EncodeOptions) -> Result<Vec<u8>> {
    options.validate()?;

    let image = normalize(image);
    let (width, height) = image.dimensions();
    let mut buf = Vec::new();

    match options.format {
        OutputFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, options.quality);
            match &*image {
                DynamicImage::ImageLuma8(gray) => {
                    encoder.encode(gray.as_raw(), width, height, ColorType::L8)?
                }
                other => encoder.encode(other.to_rgb8().as_raw(), width, height, ColorType::Rgb8)?,
            }
        }
        OutputFormat::Png => {
            PngEncoder::new(&mut buf).write_image(image.as_bytes(), width, height, image.color())?
        }
    }

    log::debug!(
        "encoded {}x{} {} ({} bytes)",
        width,
        height,
        options.format,
        buf.len(),
    );
    Ok(buf)
}
