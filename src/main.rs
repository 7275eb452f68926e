#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::perf)]
#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![allow(clippy::multiple_crate_versions)]

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use playlist::PlaylistEntry;
use pipeline::{DEFAULT_FETCH_TIMEOUT, DEFAULT_PARALLELISM, Order, Pipeline};
use probe::{DEFAULT_PROBE_TIMEOUT, HttpProber};
use source::Source;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use util::{init_http_client, spawn_ct_watcher, warn_ulimit};

pub mod error;
pub mod pipeline;
pub mod playlist;
pub mod probe;
pub mod source;
pub mod util;

/// Checks the streams of an IPTV M3U playlist and writes filtered, merged or sorted playlists
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Seconds to wait for a single stream to answer
    #[arg(short, long, global = true, default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs(), env = "M3U_SIEVE_TIMEOUT")]
    timeout: u64,

    /// The amount of streams probed in parallel
    #[arg(short, long, global = true, default_value_t = DEFAULT_PARALLELISM, env = "M3U_SIEVE_PARALLELISM")]
    parallelism: usize,

    /// Seconds to wait for a remote playlist to download
    #[arg(long, global = true, default_value_t = DEFAULT_FETCH_TIMEOUT.as_secs(), env = "M3U_SIEVE_FETCH_TIMEOUT")]
    fetch_timeout: u64,

    /// Hide the per-channel progress bar
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keeps only the channels whose stream is available
    Check {
        /// Playlist URL or local file path
        source: Source,

        /// Where to save the available channels
        #[arg(short, long, default_value = "available_channels.m3u")]
        output: PathBuf,
    },

    /// Merges several playlists, dropping channels whose stream URL was already seen
    Combine {
        /// Playlist URLs or local file paths, merged in the given order
        #[arg(required = true)]
        sources: Vec<Source>,

        /// Where to save the combined playlist
        #[arg(short, long, default_value = "combined_playlist.m3u")]
        output: PathBuf,
    },

    /// Drops unavailable channels and sorts the rest
    Categorize {
        /// Playlist URL or local file path
        source: Source,

        /// How to sort the available channels
        #[arg(short, long, value_enum, default_value_t = Order::Latency)]
        by: Order,

        /// Where to save the sorted playlist [default: latency_sorted.m3u or sorted_playlist.m3u]
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let args = Args::parse();
    warn_ulimit(args.parallelism);

    let client = init_http_client()?;
    let ct = CancellationToken::new();
    spawn_ct_watcher(ct.clone());

    let prober = HttpProber::new(client.clone(), Duration::from_secs(args.timeout));
    let pipeline = Pipeline::new(client, prober, args.parallelism, ct)?
        .fetch_timeout(Duration::from_secs(args.fetch_timeout))
        .show_progress(!args.no_progress);

    match args.command {
        Command::Check { source, output } => {
            let entries = pipeline
                .load(&source)
                .await
                .context("Loading playlist")?;
            info!("Checking availability of {} channels", entries.len());

            let availability = pipeline.check_availability(entries).await?;
            println!(
                "{}",
                indoc::formatdoc!(
                    "
                    --- Summary ---
                    Working channels: {}
                    Not working channels: {}",
                    availability.working.len(),
                    availability.not_working
                )
            );

            save(&output, &availability.working).await?;
        }
        Command::Combine { sources, output } => {
            info!("Combining {} playlists", sources.len());
            let combined = pipeline.combine(&sources).await?;
            if !combined.skipped.is_empty() {
                warn!(
                    "Skipped {} of {} sources due to retrieval issues",
                    combined.skipped.len(),
                    sources.len()
                );
            }
            info!("Skipped {} duplicate channels", combined.duplicates);

            save(&output, &combined.entries).await?;
        }
        Command::Categorize { source, by, output } => {
            let entries = pipeline
                .load(&source)
                .await
                .context("Loading playlist")?;
            info!("Categorizing {} channels by {by:?}", entries.len());

            let sorted = pipeline.categorize(entries, by).await?;
            let output = output.unwrap_or_else(|| match by {
                Order::Latency => PathBuf::from("latency_sorted.m3u"),
                Order::Name => PathBuf::from("sorted_playlist.m3u"),
            });

            save(&output, &sorted).await?;
        }
    }

    Ok(())
}

/// Writes a result playlist, or reports that there is nothing to write
async fn save(output: &Path, entries: &[PlaylistEntry]) -> Result<()> {
    if entries.is_empty() {
        println!("No channels to save.");
        return Ok(());
    }

    playlist::save(output, entries).await?;
    println!("Saved {} channels to '{}'.", entries.len(), output.display());

    Ok(())
}
