//! Main Program for Descramble
//! Run with `--help` for more instruction

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

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Error};
use clap::{Parser, Subcommand};
use descramble::listing::{select_episodes, select_volumes, Episode, PageData, Volume};
use descramble::{
    derive_seed, reconstruct_and_encode, EncodeOptions, OutputFormat, PageMetadata, Seed,
    DEFAULT_QUALITY,
};
use image::io::Reader as ImageReader;
use image::DynamicImage;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(author, version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the seed derived from an image URL
    Seed {
        /// Image URL
        url: String,
    },

    /// Reconstruct one scrambled image
    Unscramble(UnscrambleArgs),

    /// Reconstruct every page of a volume, in parallel
    Volume {
        /// Page data file (JSON)
        pdata: PathBuf,

        /// Directory of fetched images, named as in their URL
        #[arg(short = 's', long)]
        sources: PathBuf,

        /// Output directory
        #[arg(short = 'o', long)]
        dist: PathBuf,

        #[command(flatten)]
        grid: GridArgs,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Reconstruct every image listed in a JSON manifest, in parallel
    Batch {
        /// Manifest file: list of {input, url, metadata, output}
        manifest: PathBuf,

        #[command(flatten)]
        grid: GridArgs,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Print readable episodes of a scraped episode list (JSON)
    ListEpisodes {
        /// Episode list file
        listing: PathBuf,

        /// Also take the first wait-free episode
        #[arg(long)]
        use_free: bool,
    },

    /// Print readable volumes of a scraped volume list (JSON)
    ListVolumes {
        /// Volume list file
        listing: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct EncodeArgs {
    /// Output format (jpg or png)
    #[arg(short = 'f', long, default_value = "jpg")]
    format: OutputFormat,

    /// JPEG quality (1-100)
    #[arg(short = 'q', long, default_value_t = DEFAULT_QUALITY)]
    quality: u8,

    /// Overwrite existing output
    #[arg(long)]
    force: bool,
}

impl EncodeArgs {
    fn options(&self) -> EncodeOptions {
        EncodeOptions::new(self.format).with_quality(self.quality)
    }
}

/// Grid used for images without metadata. Their size is taken as declared.
#[derive(clap::Args, Debug)]
struct GridArgs {
    /// Number of blocks
    #[arg(long)]
    blocks: Option<u32>,

    /// Block width
    #[arg(long, requires_all = ["blocks", "block_height"])]
    block_width: Option<u32>,

    /// Block height
    #[arg(long, requires_all = ["blocks", "block_width"])]
    block_height: Option<u32>,
}

impl GridArgs {
    fn metadata_for(&self, im: &DynamicImage) -> Result<PageMetadata, Error> {
        let Some(blocks) = self.blocks else {
            bail!("No metadata for image, pass --blocks");
        };
        let mut metadata = PageMetadata::new(im.width(), im.height(), blocks);
        if let (Some(w), Some(h)) = (self.block_width, self.block_height) {
            metadata = metadata.with_block(w, h);
        }
        Ok(metadata)
    }
}

#[derive(clap::Args, Debug)]
struct UnscrambleArgs {
    /// Input file
    input: PathBuf,

    /// Image URL the input was fetched from
    #[arg(long, required_unless_present = "seed", conflicts_with = "seed")]
    url: Option<String>,

    /// Seed, instead of deriving it from the URL
    #[arg(long)]
    seed: Option<u64>,

    /// Page metadata file (JSON)
    #[arg(short = 'm', long, conflicts_with_all = ["width", "height", "blocks"])]
    metadata: Option<PathBuf>,

    /// Image width
    #[arg(long, requires_all = ["height", "blocks"])]
    width: Option<u32>,

    /// Image height
    #[arg(long, requires_all = ["width", "blocks"])]
    height: Option<u32>,

    /// Number of blocks
    #[arg(long, requires_all = ["width", "height"])]
    blocks: Option<u32>,

    /// Block width
    #[arg(long, requires = "block_height")]
    block_width: Option<u32>,

    /// Block height
    #[arg(long, requires = "block_width")]
    block_height: Option<u32>,

    #[command(flatten)]
    encode: EncodeArgs,

    /// Output file
    #[arg(short = 'o', long)]
    output: PathBuf,
}

impl UnscrambleArgs {
    fn metadata(&self) -> Result<PageMetadata, Error> {
        let mut metadata = match (&self.metadata, self.width, self.height, self.blocks) {
            (Some(p), ..) => read_json(p)?,
            (None, Some(w), Some(h), Some(n)) => PageMetadata::new(w, h, n),
            _ => bail!("Either --metadata or --width, --height and --blocks is required"),
        };
        if let (Some(w), Some(h)) = (self.block_width, self.block_height) {
            metadata = metadata.with_block(w, h);
        }
        Ok(metadata)
    }

    fn seed(&self) -> Result<Seed, Error> {
        match (self.seed, &self.url) {
            (Some(s), _) => Ok(Seed(s)),
            (None, Some(url)) => Ok(derive_seed(url)?),
            (None, None) => bail!("Either --url or --seed is required"),
        }
    }
}

#[derive(Deserialize, Debug)]
struct Job {
    input: PathBuf,
    url: String,
    #[serde(default)]
    metadata: Option<PageMetadata>,
    output: PathBuf,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Cannot parse {}", path.display()))
}

fn load_image(path: &Path) -> Result<DynamicImage, Error> {
    let im = ImageReader::new(BufReader::new(
        File::open(path).with_context(|| format!("Cannot open {}", path.display()))?,
    ))
    .with_guessed_format()?
    .decode()
    .with_context(|| format!("Cannot decode {}", path.display()))?;
    Ok(im)
}

fn reconstruct(
    im: &DynamicImage,
    metadata: &PageMetadata,
    seed: Seed,
    options: &EncodeOptions,
    input: &Path,
    output: &Path,
) -> Result<(), Error> {
    let buf = reconstruct_and_encode(im, metadata, seed, options)
        .with_context(|| format!("Cannot reconstruct {}", input.display()))?;
    fs::write(output, buf).with_context(|| format!("Cannot write {}", output.display()))?;

    log::info!("{} -> {}", input.display(), output.display());
    Ok(())
}

fn skip(output: &Path, force: bool) -> bool {
    let ret = !force && output.exists();
    if ret {
        log::info!("{} already exists, skipping", output.display());
    }
    ret
}

fn run_job(job: &Job, grid: &GridArgs, options: &EncodeOptions) -> Result<(), Error> {
    let seed = derive_seed(&job.url)?;
    let im = load_image(&job.input)?;
    let metadata = match job.metadata {
        Some(m) => m,
        None => grid.metadata_for(&im)?,
    };
    reconstruct(&im, &metadata, seed, options, &job.input, &job.output)
}

fn run_jobs(jobs: &[Job], grid: &GridArgs, encode: &EncodeArgs) -> Result<(), Error> {
    let options = encode.options();
    options.validate()?;

    let failed = jobs
        .par_iter()
        .filter(|job| !skip(&job.output, encode.force))
        .map(|job| {
            run_job(job, grid, &options)
                .map_err(|e| log::error!("{}: {e:#}", job.input.display()))
        })
        .filter(Result::is_err)
        .count();

    if failed > 0 {
        bail!("{failed} of {} images failed", jobs.len());
    }
    Ok(())
}

/// Jobs for every page of `pdata`, output named by page number.
fn volume_jobs(
    pdata: &PageData,
    sources: &Path,
    dist: &Path,
    format: OutputFormat,
) -> Result<Vec<Job>, Error> {
    pdata
        .pages()
        .map(|page| -> Result<Job, Error> {
            let name = page
                .source_name()
                .with_context(|| format!("No file name in {}", page.locator))?;
            Ok(Job {
                input: sources.join(name),
                output: dist.join(page.file_name(format)),
                url: page.locator,
                metadata: page.metadata,
            })
        })
        .collect()
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Args::parse().command {
        Command::Seed { url } => println!("{}", derive_seed(&url)?),
        Command::Unscramble(args) => {
            if skip(&args.output, args.encode.force) {
                return Ok(());
            }
            let metadata = args.metadata()?;
            let options = args.encode.options();
            options.validate()?;

            let im = load_image(&args.input)?;
            reconstruct(&im, &metadata, args.seed()?, &options, &args.input, &args.output)?;
        }
        Command::Volume {
            pdata,
            sources,
            dist,
            grid,
            encode,
        } => {
            let Some(data) = read_json::<Option<PageData>>(&pdata)? else {
                log::warn!("{}: no page data, may not have been purchased", pdata.display());
                return Ok(());
            };
            fs::create_dir_all(&dist)
                .with_context(|| format!("Cannot create {}", dist.display()))?;

            let jobs = volume_jobs(&data, &sources, &dist, encode.format)?;
            run_jobs(&jobs, &grid, &encode)?;
        }
        Command::Batch {
            manifest,
            grid,
            encode,
        } => {
            let jobs: Vec<Job> = read_json(&manifest)?;
            run_jobs(&jobs, &grid, &encode)?;
        }
        Command::ListEpisodes { listing, use_free } => {
            let episodes: Vec<Episode> = read_json(&listing)?;
            for ep in select_episodes(&episodes, use_free) {
                println!("{}\t{}", ep.id, ep.name);
            }
        }
        Command::ListVolumes { listing } => {
            let volumes: Vec<Volume> = read_json(&listing)?;
            for (name, id) in select_volumes(&volumes) {
                println!("{id}\t{name}");
            }
        }
    }

    Ok(())
}
