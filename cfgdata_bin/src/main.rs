// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{bail, Context, Result};
use cfgdata::{CfgBlob, RecordSummary};
use cfgdata_areas::Region;
use clap::Parser;
use colored::Colorize;
use log::info;
use serde::Deserialize;
use sha2::{Digest as _, Sha256};
use std::path::{Path, PathBuf};

/// Struct defining the TOML format for `board`, which bundles up a complete
/// flatten job.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct BoardConfig {
    /// Platform to build for
    platform_id: u16,

    /// The live blob, holding the built-in defaults
    live: PathBuf,

    /// Patch blobs, applied in order; later ones win
    #[serde(default)]
    patches: Vec<PathBuf>,

    /// Capacity to give the live blob before patching, if it has no spare
    /// room of its own
    #[serde(default)]
    capacity: Option<u32>,

    /// Where to write the flattened blob
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct LiveArgs {
    #[clap(short = 'i', long = "in", help = "live blob (binary)")]
    src_blob: PathBuf,
    #[clap(short = 'o', long = "out", help = "output file (binary)")]
    dest_blob: PathBuf,
}

#[derive(Debug, Parser)]
enum Command {
    /// List the records of a blob
    Dump {
        src_blob: PathBuf,
        /// Print the listing as JSON
        #[clap(long)]
        json: bool,
    },
    /// Check the structure of a blob
    Verify {
        #[clap(short, long)]
        verbose: bool,
        src_blob: PathBuf,
    },
    /// Print the payload a tag resolves to
    Find {
        src_blob: PathBuf,
        #[arg(long, value_parser = parse_int::parse::<u16>)]
        tag: u16,
        #[arg(long, value_parser = parse_int::parse::<u16>, default_value = "0")]
        platform: u16,
        /// Only search the built-in/default run
        #[clap(long)]
        internal: bool,
    },
    /// Merge patch blobs into a live blob
    Merge {
        #[clap(flatten)]
        live: LiveArgs,
        /// Grow the live blob to this many bytes first
        #[arg(long, value_parser = parse_int::parse::<u32>)]
        capacity: Option<u32>,
        /// Treat the live blob's current records as the built-in defaults
        #[clap(long)]
        partition: bool,
        #[clap(required = true)]
        patches: Vec<PathBuf>,
    },
    /// Print the size of the flattened blob for a platform
    Size {
        src_blob: PathBuf,
        #[arg(long, value_parser = parse_int::parse::<u16>)]
        platform: u16,
    },
    /// Flatten a live blob for one platform
    Build {
        #[clap(flatten)]
        live: LiveArgs,
        #[arg(long, value_parser = parse_int::parse::<u16>)]
        platform: u16,
    },
    /// Run the merge and flatten job described by a TOML file
    Board { cfg: PathBuf },
}

#[derive(Debug, Parser)]
#[clap(name = "cfgdata", max_term_width = 80)]
struct Opts {
    #[clap(subcommand)]
    cmd: Command,
}

fn main() -> Result<()> {
    let cmd = Opts::parse();

    // Verify has a custom logger; everyone else can use the default
    if !matches!(cmd.cmd, Command::Verify { .. }) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match cmd.cmd {
        Command::Dump { src_blob, json } => {
            let blob = load(&src_blob)?;
            let records = blob
                .records()
                .map(|r| r.map(|r| RecordSummary::from(&r)))
                .collect::<Result<Vec<_>, _>>()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                let h = blob.header();
                println!(
                    "header {} bytes, {} of {} bytes used, internal run at {:#x}",
                    h.header_length,
                    h.used_length,
                    h.total_length,
                    usize::from(h.internal_data_offset) * 4
                );
                for r in records {
                    println!(
                        "{:#06x} {:#05x} {:<6} v{} {:>4} {:08x?} {}",
                        r.offset,
                        r.tag,
                        format!("{:?}", r.kind).to_lowercase(),
                        r.version,
                        r.length,
                        r.conditions,
                        r.payload
                    );
                }
            }
        }
        Command::Verify { verbose, src_blob } => {
            let bytes = std::fs::read(&src_blob)
                .with_context(|| format!("could not open {src_blob:?}"))?;
            cfgdata::verify::init_verify_logger(verbose);
            cfgdata::verify::verify_blob(&bytes)?;
        }
        Command::Find {
            src_blob,
            tag,
            platform,
            internal,
        } => {
            let blob = load(&src_blob)?;
            let region = if internal {
                Region::Internal
            } else {
                Region::General
            };
            match blob.find_by_platform(platform, tag, region)? {
                Some(record) => {
                    info!(
                        "tag {tag:#05x} for platform {platform} resolves to record at {:#x}",
                        record.offset()
                    );
                    println!("{}", hex::encode(record.payload()));
                }
                None => bail!("tag {tag:#05x} has no value for platform {platform}"),
            }
        }
        Command::Merge {
            live,
            capacity,
            partition,
            patches,
        } => {
            let mut blob = load(&live.src_blob)?;
            if let Some(capacity) = capacity {
                blob.grow(capacity)?;
            }
            if partition {
                blob.mark_internal()?;
            }
            apply_patches(&mut blob, &patches)?;
            std::fs::write(&live.dest_blob, blob.into_inner())?;
            info!("Merged blob written to {}", live.dest_blob.display());
        }
        Command::Size { src_blob, platform } => {
            let blob = load(&src_blob)?;
            println!("{}", blob.estimate_built_size(&platform)?);
        }
        Command::Build { live, platform } => {
            let blob = load(&live.src_blob)?;
            write_flattened(&blob, platform, &live.dest_blob)?;
        }
        Command::Board { cfg } => {
            let cfg_contents = std::fs::read_to_string(&cfg)
                .with_context(|| format!("could not open {cfg:?}"))?;
            let board: BoardConfig = toml::from_str(&cfg_contents)?;

            let mut blob = load(&board.live)?;
            if let Some(capacity) = board.capacity {
                blob.grow(capacity)?;
            }
            apply_patches(&mut blob, &board.patches)?;
            write_flattened(&blob, board.platform_id, &board.out)?;
        }
    }

    Ok(())
}

fn load(path: &Path) -> Result<CfgBlob<Vec<u8>>> {
    let bytes = std::fs::read(path).with_context(|| format!("could not open {path:?}"))?;
    CfgBlob::load(bytes).with_context(|| format!("could not load blob from {path:?}"))
}

fn apply_patches(blob: &mut CfgBlob<Vec<u8>>, patches: &[PathBuf]) -> Result<()> {
    for path in patches {
        let patch = std::fs::read(path).with_context(|| format!("could not open {path:?}"))?;
        blob.add(&patch)
            .with_context(|| format!("could not merge {}", path.display()))?;
        info!(
            "merged {}; {} of {} bytes used",
            path.display(),
            blob.used_length(),
            blob.total_length()
        );
    }
    Ok(())
}

fn write_flattened(blob: &CfgBlob<Vec<u8>>, platform: u16, dest: &Path) -> Result<()> {
    let out = match blob.build_to_vec(&platform) {
        Ok(out) => out,
        Err(e) => {
            println!("{}: no blob written for platform {platform}", "ERROR".red());
            return Err(e.into());
        }
    };
    std::fs::write(dest, &out)?;
    info!(
        "Flattened blob for platform {platform} ({} bytes) written to {}",
        out.len(),
        dest.display()
    );
    println!("SHA-256: {}", hex::encode(Sha256::digest(&out)));
    Ok(())
}
