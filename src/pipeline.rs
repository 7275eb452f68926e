use std::{collections::HashSet, sync::Arc, time::Duration};

use futures_util::{StreamExt as _, stream};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::{select, sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    error::{Error, Result},
    playlist::{self, PlaylistEntry},
    probe::{ProbeMode, ProbeResult, Prober},
    source::{self, Source},
    util::truncate_string,
};

pub const DEFAULT_PARALLELISM: usize = 20;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

/// How `categorize` orders the channels that survive probing
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Order {
    /// Fastest responding stream first
    Latency,
    /// Channel name, A to Z
    Name,
}

/// Result of an availability scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub working: Vec<PlaylistEntry>,
    pub not_working: usize,
}

/// Result of merging several playlists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combined {
    pub entries: Vec<PlaylistEntry>,
    pub duplicates: usize,
    pub skipped: Vec<Source>,
}

/// Keeps the first entry seen for every stream URL
///
/// URLs are compared as exact strings.
#[derive(Debug, Default)]
pub struct Dedup {
    seen: HashSet<String>,
    entries: Vec<PlaylistEntry>,
    duplicates: usize,
}

impl Dedup {
    /// Appends the entries whose URL has not been seen yet, returns how many were added
    pub fn extend(&mut self, entries: impl IntoIterator<Item = PlaylistEntry>) -> usize {
        let before = self.entries.len();
        for entry in entries {
            if self.seen.contains(&entry.url) {
                info!("Duplicate found and skipped: {}", entry.url);
                self.duplicates += 1;
                continue;
            }
            self.seen.insert(entry.url.clone());
            self.entries.push(entry);
        }
        self.entries.len() - before
    }

    #[must_use]
    pub const fn duplicates(&self) -> usize {
        self.duplicates
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<PlaylistEntry> {
        self.entries
    }
}

/// Drives loading and probing of playlists
///
/// Probes run on up to `parallelism` tasks at once. Results always come back
/// in playlist order, whatever order the probes finish in.
pub struct Pipeline<P> {
    client: reqwest::Client,
    prober: Arc<P>,
    parallelism: usize,
    fetch_timeout: Duration,
    ct: CancellationToken,
    show_progress: bool,
}

impl<P: Prober> Pipeline<P> {
    /// # Errors
    /// [`Error::InvalidSelection`] if `parallelism` is zero or more than a semaphore can hold
    pub fn new(
        client: reqwest::Client,
        prober: P,
        parallelism: usize,
        ct: CancellationToken,
    ) -> Result<Self> {
        if parallelism == 0 {
            return Err(Error::InvalidSelection(
                "parallelism must be at least 1".to_string(),
            ));
        }
        if parallelism > Semaphore::MAX_PERMITS {
            return Err(Error::InvalidSelection(format!(
                "parallelism must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }

        Ok(Self {
            client,
            prober: Arc::new(prober),
            parallelism,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            ct,
            show_progress: false,
        })
    }

    #[must_use]
    pub const fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Loads and parses a single playlist
    ///
    /// # Errors
    /// Any [`source::load`] error, [`Error::NoEntriesFound`] for a playlist
    /// without channels and [`Error::Cancelled`] on interruption
    pub async fn load(&self, source: &Source) -> Result<Vec<PlaylistEntry>> {
        let content = select! {
            () = self.ct.cancelled() => return Err(Error::Cancelled),
            c = source::load(&self.client, source, self.fetch_timeout) => c?,
        };

        let entries = playlist::parse(&content);
        if entries.is_empty() {
            return Err(Error::NoEntriesFound);
        }
        info!("Found {} channels in {source}", entries.len());
        Ok(entries)
    }

    /// Splits entries into the ones whose stream answers and a count of the others
    ///
    /// # Errors
    /// [`Error::NoEntriesFound`] for an empty playlist, [`Error::Cancelled`] on interruption
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub async fn check_availability(&self, entries: Vec<PlaylistEntry>) -> Result<Availability> {
        let results = self.scan(entries, ProbeMode::Availability).await?;

        let mut working = Vec::new();
        let mut not_working = 0;
        for result in results {
            if result.available {
                working.push(result.entry);
            } else {
                not_working += 1;
            }
        }

        Ok(Availability {
            working,
            not_working,
        })
    }

    /// Merges every source into one playlist, keeping the first entry for each URL
    ///
    /// Sources that fail to load are logged and skipped.
    ///
    /// # Errors
    /// [`Error::InvalidSelection`] without sources, [`Error::NoEntriesFound`] when
    /// nothing could be merged and [`Error::Cancelled`] on interruption
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub async fn combine(&self, sources: &[Source]) -> Result<Combined> {
        if sources.is_empty() {
            return Err(Error::InvalidSelection(
                "at least one source is required to combine".to_string(),
            ));
        }

        // Fetched concurrently, merged strictly in the given order
        let loaded = stream::iter(sources)
            .map(|source| async move { (source, self.load(source).await) })
            .buffered(self.parallelism)
            .collect::<Vec<_>>()
            .await;

        if self.ct.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut dedup = Dedup::default();
        let mut skipped = Vec::new();
        for (n, (source, entries)) in loaded.into_iter().enumerate() {
            match entries {
                Ok(entries) => {
                    let found = entries.len();
                    let added = dedup.extend(entries);
                    info!("Source #{}: {found} channels, {added} new", n + 1);
                }
                Err(Error::NoEntriesFound) => info!("Source #{}: no channels", n + 1),
                Err(e) => {
                    warn!("Skipping source #{} ({source}): {e}", n + 1);
                    skipped.push(source.clone());
                }
            }
        }

        let duplicates = dedup.duplicates();
        let entries = dedup.into_entries();
        if entries.is_empty() {
            return Err(Error::NoEntriesFound);
        }

        Ok(Combined {
            entries,
            duplicates,
            skipped,
        })
    }

    /// Drops channels that do not answer and sorts the rest
    ///
    /// # Errors
    /// [`Error::NoEntriesFound`] for an empty playlist, [`Error::Cancelled`] on interruption
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn categorize(
        &self,
        entries: Vec<PlaylistEntry>,
        order: Order,
    ) -> Result<Vec<PlaylistEntry>> {
        match order {
            Order::Latency => {
                let results = self.scan(entries, ProbeMode::Latency).await?;
                Ok(order_by_latency(results))
            }
            Order::Name => {
                let results = self.scan(entries, ProbeMode::Availability).await?;
                Ok(order_by_name(results))
            }
        }
    }

    /// Probes every entry and returns the results in entry order
    async fn scan(&self, entries: Vec<PlaylistEntry>, mode: ProbeMode) -> Result<Vec<ProbeResult>> {
        if entries.is_empty() {
            return Err(Error::NoEntriesFound);
        }

        let total = entries.len();
        let pb = self.progress_bar(total);
        let permits = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks = JoinSet::new();

        for (idx, entry) in entries.into_iter().enumerate() {
            let ct = self.ct.clone();
            let permits = permits.clone();
            let prober = self.prober.clone();
            let pb = pb.clone();

            tasks.spawn(async move {
                let permit = select! {
                    () = ct.cancelled() => None,
                    p = permits.acquire_owned() => p.ok(),
                };
                let Some(_permit) = permit else {
                    return (idx, None);
                };

                pb.set_message(truncate_string(&entry.url, 60));
                let result = select! {
                    () = ct.cancelled() => None,
                    r = mode.run(prober.as_ref(), entry) => Some(r),
                };
                pb.inc(1);

                (idx, result)
            });
        }

        let mut slots: Vec<Option<ProbeResult>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (idx, result) = joined?;
            slots[idx] = result;
        }
        pb.finish_and_clear();

        if self.ct.is_cancelled() {
            return Err(Error::Cancelled);
        }
        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(Error::Cancelled)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template(PROGRESS_TEMPLATE) {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    }
}

/// Measured entries, fastest first. Ties keep playlist order.
fn order_by_latency(results: Vec<ProbeResult>) -> Vec<PlaylistEntry> {
    let mut timed = results
        .into_iter()
        .filter_map(|r| {
            let latency = r.latency?;
            info!(
                "{} answered in {:.2} sec",
                r.entry.channel_name(),
                latency.as_secs_f64()
            );
            Some((r.entry, latency))
        })
        .collect::<Vec<_>>();

    timed.sort_by_key(|(_, latency)| *latency);
    timed.into_iter().map(|(entry, _)| entry).collect()
}

/// Available entries sorted by channel name, ignoring case. Ties keep playlist order.
fn order_by_name(results: Vec<ProbeResult>) -> Vec<PlaylistEntry> {
    let mut available = results
        .into_iter()
        .filter(|r| r.available)
        .map(|r| r.entry)
        .collect::<Vec<_>>();
    available.sort_by_cached_key(|e| e.channel_name().to_lowercase());
    available
}
