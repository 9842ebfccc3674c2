use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::dedup::DeduplicationStore;
use crate::discover::{category_url, CategoryDiscoverer};
use crate::error::{CollectError, Result};
use crate::extract::PageExtractor;
use crate::model::{dedup_themes, CollectionRun, Theme, ThemeResult};
use crate::paginate::{PageState, PaginationController};
use crate::readiness::{PageStatus, Readiness, RetryPolicy};
use crate::render::{RenderSession, SessionFactory};
use crate::snapshot::SnapshotSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialReason {
    /// The listing never appeared; whatever rendered was extracted.
    PageNotReady,
    /// Pagination stopped at the configured page cap.
    PageCapReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryStatus {
    Complete,
    Partial(PartialReason),
}

#[derive(Debug)]
pub struct CategoryReport {
    pub theme: Theme,
    pub pages: u32,
    pub status: CategoryStatus,
    pub result: ThemeResult,
}

#[derive(Debug)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub themes_total: usize,
    pub completed: usize,
    pub listings: usize,
    pub partial: Vec<(String, PartialReason)>,
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    fn new(started_at: DateTime<Utc>, themes_total: usize) -> Self {
        Self {
            started_at,
            elapsed: Duration::ZERO,
            themes_total,
            completed: 0,
            listings: 0,
            partial: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn print(&self) {
        println!(
            "Collected {}/{} themes ({} listings) in {:.1}s, started {}",
            self.completed,
            self.themes_total,
            self.listings,
            self.elapsed.as_secs_f64(),
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
        for (name, reason) in &self.partial {
            println!("  partial: {} ({:?})", name, reason);
        }
        for (name, err) in &self.failed {
            println!("  failed:  {} ({})", name, err);
        }
    }
}

/// One finished worker, on its way to the snapshot writer.
struct Finished {
    theme: Theme,
    outcome: Result<CategoryReport>,
}

/// Discovery, then one worker per category, with a single snapshot writer.
pub struct Collector {
    factory: Arc<dyn SessionFactory>,
    settings: Arc<Settings>,
    cancel: CancellationToken,
}

impl Collector {
    pub fn new(factory: Arc<dyn SessionFactory>, settings: Settings) -> Self {
        Self {
            factory,
            settings: Arc::new(settings),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the run: running categories end as cancelled and
    /// queued ones never start.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Discover themes on a session of its own; the session is closed on every path.
    pub async fn discover(&self) -> Result<Vec<Theme>> {
        let mut session = self.factory.open().await?;
        let discoverer = CategoryDiscoverer::new(&self.settings.site, &self.settings.timing);
        let themes = discoverer.discover(session.as_mut()).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close discovery session: {e:#}");
        }
        themes
    }

    /// Collect every theme (discovering them first when `themes` is None),
    /// writing the snapshot after each completed category.
    pub async fn run(
        &self,
        themes: Option<Vec<Theme>>,
        sink: &mut dyn SnapshotSink,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        let t0 = Instant::now();

        let themes = match themes {
            Some(list) => dedup_themes(list),
            None => self.discover().await?,
        };
        let mut summary = RunSummary::new(started_at, themes.len());
        if themes.is_empty() {
            warn!("No themes to collect");
            summary.elapsed = t0.elapsed();
            return Ok(summary);
        }

        let workers = self.settings.collector.workers.max(1);
        info!(
            "Collecting {} themes with {} worker(s) into {}",
            themes.len(),
            workers,
            sink.describe()
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::channel::<Finished>(workers * 2);
        let total = themes.len();
        let mut handles = Vec::with_capacity(total);

        for (i, theme) in themes.into_iter().enumerate() {
            let factory = Arc::clone(&self.factory);
            let settings = Arc::clone(&self.settings);
            let sem = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            let tx = tx.clone();
            let name = theme.name.clone();

            let handle = tokio::spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return;
                };
                let outcome = if cancel.is_cancelled() {
                    Err(CollectError::Cancelled(theme.name.clone()))
                } else {
                    info!("[{}/{}] '{}' collecting...", i + 1, total, theme.name);
                    run_category(factory.as_ref(), &settings, &theme, &cancel).await
                };
                let _ = tx.send(Finished { theme, outcome }).await;
            });
            handles.push((name, handle));
        }

        // rx closes once every worker has sent (or died)
        drop(tx);

        let pb = progress_bar(total);
        let mut run = CollectionRun::new();
        let mut fatal: Option<CollectError> = None;

        while let Some(Finished { theme, outcome }) = rx.recv().await {
            pb.inc(1);
            match outcome {
                Ok(report) => {
                    if fatal.is_some() {
                        continue;
                    }
                    info!(
                        "'{}' done: {} listings over {} page(s)",
                        report.theme.name, report.result.count, report.pages
                    );
                    if let CategoryStatus::Partial(reason) = report.status {
                        summary.partial.push((report.theme.name.clone(), reason));
                    }
                    summary.completed += 1;
                    summary.listings += report.result.count;
                    run.push(report.result);
                    if let Err(e) = sink.write(&run) {
                        warn!("Snapshot write failed, stopping run: {e}");
                        self.cancel.cancel();
                        fatal = Some(e);
                    }
                }
                Err(e) => {
                    warn!("'{}' failed: {}", theme.name, e);
                    summary.failed.push((theme.name.clone(), e.to_string()));
                    if self.settings.collector.fail_fast && fatal.is_none() {
                        self.cancel.cancel();
                        fatal = Some(e);
                    }
                }
            }
        }
        pb.finish_and_clear();

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    warn!("Worker for '{}' panicked", name);
                    summary
                        .failed
                        .push((name.clone(), CollectError::WorkerPanicked(name).to_string()));
                }
            }
        }

        summary.elapsed = t0.elapsed();
        match fatal {
            Some(e) => Err(e),
            None => {
                info!(
                    "Run finished: {}/{} themes, {} listings in {:.1}s",
                    summary.completed,
                    summary.themes_total,
                    summary.listings,
                    summary.elapsed.as_secs_f64()
                );
                Ok(summary)
            }
        }
    }
}

/// Open a session, collect one theme under the timeout and cancellation
/// token, and close the session whatever happened.
async fn run_category(
    factory: &dyn SessionFactory,
    settings: &Settings,
    theme: &Theme,
    cancel: &CancellationToken,
) -> Result<CategoryReport> {
    let mut session = factory.open().await?;
    let limit = settings.collector.category_timeout();

    let outcome = tokio::select! {
        _ = cancel.cancelled() => Err(CollectError::Cancelled(theme.name.clone())),
        r = tokio::time::timeout(limit, collect_theme(session.as_mut(), settings, theme)) => match r {
            Ok(r) => r,
            Err(_) => Err(CollectError::Timeout { theme: theme.name.clone(), elapsed: limit }),
        },
    };

    if let Err(e) = session.close().await {
        warn!("Failed to close session for '{}': {e:#}", theme.name);
    }
    outcome
}

/// Ready the category page, then extract and paginate until exhausted.
pub async fn collect_theme(
    session: &mut dyn RenderSession,
    settings: &Settings,
    theme: &Theme,
) -> Result<CategoryReport> {
    let site = &settings.site;
    let extractor = PageExtractor::new(site)?;
    let retry = RetryPolicy::from_timing(&settings.timing);
    let url = category_url(site, &theme.id);

    let page_status = retry
        .ensure_ready(session, &url, &site.listing_probe_selector)
        .await?;
    match page_status {
        PageStatus::Ready { attempts } => {
            debug!("'{}' ready after {} attempt(s)", theme.name, attempts)
        }
        PageStatus::NotReady => {
            warn!("'{}' never showed listings; extracting what rendered", theme.name)
        }
    }
    let ready = page_status.is_ready();

    let mut store = DeduplicationStore::new();
    let mut pager = PaginationController::new(
        &site.pagination_control_selector,
        extractor.listing_selector(),
        settings.collector.max_pages,
        Readiness::from_timing(&settings.timing),
        settings.timing.settle_timeout(),
    );

    let mut pages = 0;
    while let PageState::AtPage(n) = pager.state() {
        pages = n;
        let added = store.extend(extractor.extract(session).await?);
        debug!("  - page {}: {} added ({} total)", n, added, store.len());
        pager.advance(session).await?;
    }

    let status = if !ready {
        CategoryStatus::Partial(PartialReason::PageNotReady)
    } else if pager.capped() {
        CategoryStatus::Partial(PartialReason::PageCapReached)
    } else {
        CategoryStatus::Complete
    };

    Ok(CategoryReport {
        theme: theme.clone(),
        pages,
        status,
        result: store.into_result(&theme.name),
    })
}

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    match ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} themes (eta {eta})")
    {
        Ok(style) => pb.set_style(style.progress_chars("=> ")),
        Err(e) => debug!("progress template rejected: {e}"),
    }
    pb
}
