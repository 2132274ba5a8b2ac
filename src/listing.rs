//! Page and episode listings scraped from the hosting site.
//!
//! Scraping itself happens outside this crate. These types take the scraped
//! data as plain values and decide what to download and where to save it.

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

use serde::{Deserialize, Serialize};

use crate::compose::PageMetadata;
use crate::encode::OutputFormat;

/// One image entry of the page data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Usually protocol-relative (`//host/...`).
    pub path: String,
    /// Grid description, when the page data carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PageMetadata>,
}

/// Page data embedded in a viewer page.
///
/// A missing page data object usually means the volume was not purchased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageData {
    #[serde(default)]
    pub img: Vec<ImageEntry>,
}

/// A page to download and reconstruct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Zero-based position in the volume.
    pub index: usize,
    /// Fully-qualified locator, also the seed input.
    pub locator: String,
    pub metadata: Option<PageMetadata>,
}

impl Page {
    /// Output file name, numbered from 1.
    pub fn file_name(&self, format: OutputFormat) -> String {
        format!("{}.{}", self.index + 1, format.extension())
    }

    /// Last path segment of the locator, the name a fetched copy is saved as.
    pub fn source_name(&self) -> Option<&str> {
        let path = self.locator.split(['?', '#']).next().unwrap_or_default();
        path.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

impl PageData {
    /// Pages in reading order.
    ///
    /// The last image entry is not a page and is skipped.
    pub fn pages(&self) -> impl Iterator<Item = Page> + '_ {
        let n = self.img.len().saturating_sub(1);
        self.img[..n].iter().enumerate().map(|(index, e)| Page {
            index,
            locator: resolve_locator(&e.path),
            metadata: e.metadata,
        })
    }
}

fn resolve_locator(path: &str) -> String {
    if path.starts_with("//") {
        format!("https:{path}")
    } else {
        path.to_owned()
    }
}

/// Episode row of a product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub name: String,
    /// Readable once for free after waiting.
    #[serde(default)]
    pub wait_free: bool,
    /// Requires points.
    #[serde(default)]
    pub point: bool,
}

/// Episodes that can be read right now.
///
/// Free episodes are always taken. If `use_free` is set, the first
/// wait-free episode is taken as well, and no later one.
pub fn select_episodes(episodes: &[Episode], use_free: bool) -> Vec<&Episode> {
    episodes
        .iter()
        .fold((Vec::new(), use_free), |(mut ret, use_free), ep| {
            if ep.wait_free && use_free {
                ret.push(ep);
                return (ret, false);
            }
            if !ep.wait_free && !ep.point {
                ret.push(ep);
            }
            (ret, use_free)
        })
        .0
}

/// Volume row of a product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    /// Episode id behind the "read for free" button.
    #[serde(default)]
    pub free_id: Option<String>,
    /// Episode id behind the "read" button.
    #[serde(default)]
    pub read_id: Option<String>,
}

/// Readable volumes as `(name, episode id)`.
pub fn select_volumes(volumes: &[Volume]) -> Vec<(&str, &str)> {
    volumes
        .iter()
        .filter_map(|v| {
            let id = v.free_id.as_deref().or(v.read_id.as_deref())?;
            Some((v.name.as_str(), id))
        })
        .collect()
}
