// src/pipeline/refresh.rs

//! Catalog refresh pipeline.
//!
//! Decides per source whether the cached snapshot can be reused, scrapes
//! the rest concurrently, and persists the result once.

use std::fmt;

use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result, ScrapeFailure};
use crate::models::{CATALOG_VERSION, Catalog, SourceConfig, SourceSnapshot};
use crate::pipeline::diff::SnapshotDiff;
use crate::services::normalize::reclassify;
use crate::services::scrape::{ScrapeStats, SourceScraper};
use crate::storage::CatalogStorage;
use crate::utils::http::PageFetcher;

/// Why a source is scraped again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeReason {
    NoSnapshot,
    ConfigChanged,
    /// The last attempt failed; the cached snapshot is stale
    Retry,
    Forced,
}

impl fmt::Display for ScrapeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ScrapeReason::NoSnapshot => "not cached",
            ScrapeReason::ConfigChanged => "configuration changed",
            ScrapeReason::Retry => "retrying after failure",
            ScrapeReason::Forced => "forced",
        };
        f.write_str(text)
    }
}

/// What a refresh does with one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePlan {
    /// Cached snapshot is current
    Fresh,
    /// Only the region table changed; classify cached entries again
    Reclassify,
    Scrape(ScrapeReason),
}

/// Plan one source against the catalog.
pub fn plan(catalog: &Catalog, source: &SourceConfig, force: bool) -> SourcePlan {
    let Some(snapshot) = catalog.get(&source.id) else {
        return SourcePlan::Scrape(ScrapeReason::NoSnapshot);
    };
    if force {
        SourcePlan::Scrape(ScrapeReason::Forced)
    } else if !snapshot.matches_scrape(source) {
        SourcePlan::Scrape(ScrapeReason::ConfigChanged)
    } else if !snapshot.matches_regions(source) {
        // A pending retry waits for the next cycle; region edits never fetch.
        SourcePlan::Reclassify
    } else if catalog
        .failure(&source.id)
        .is_some_and(ScrapeFailure::is_retryable)
    {
        SourcePlan::Scrape(ScrapeReason::Retry)
    } else {
        SourcePlan::Fresh
    }
}

/// Options for a refresh cycle.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Scrape every selected source regardless of its plan
    pub force: bool,
    /// Restrict the cycle to these source ids; empty means all
    pub only: Vec<String>,
    /// Upper bound on concurrent fetches
    pub max_concurrent: usize,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            force: false,
            only: Vec::new(),
            max_concurrent: 4,
        }
    }
}

/// A source that was scraped successfully.
#[derive(Debug, Clone)]
pub struct ScrapedSource {
    pub source_id: String,
    pub reason: ScrapeReason,
    pub stats: ScrapeStats,
    pub diff: SnapshotDiff,
}

/// A source whose cached entries were classified again.
#[derive(Debug, Clone)]
pub struct ReclassifiedSource {
    pub source_id: String,
    pub diff: SnapshotDiff,
}

/// Summary of one refresh cycle.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub scraped: Vec<ScrapedSource>,
    pub reclassified: Vec<ReclassifiedSource>,
    /// Sources left as they were
    pub unchanged: Vec<String>,
    /// Sources dropped because they are no longer configured
    pub removed: Vec<String>,
    /// Non-fatal per-source failures; the previous snapshot was kept
    pub failures: Vec<ScrapeFailure>,
    /// Whether the catalog was written
    pub persisted: bool,
}

impl RefreshReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Owns catalog persistence and runs refresh cycles.
pub struct CatalogStore<S> {
    storage: S,
}

impl<S: CatalogStorage> CatalogStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Load the cached catalog. A missing, unreadable or incompatible cache
    /// yields an empty catalog; the latter two log a warning.
    pub async fn load(&self) -> Catalog {
        match self.storage.load().await {
            Ok(Some(catalog)) if catalog.version == CATALOG_VERSION => catalog,
            Ok(Some(catalog)) => {
                log::warn!(
                    "Ignoring catalog cache with version {} (expected {})",
                    catalog.version,
                    CATALOG_VERSION
                );
                Catalog::new()
            }
            Ok(None) => Catalog::new(),
            Err(e) => {
                log::warn!("Ignoring unreadable catalog cache: {}", e);
                Catalog::new()
            }
        }
    }

    /// Bring `catalog` in line with `sources`.
    ///
    /// Per-source failures are recorded in the report and in the catalog's
    /// failure map; they never fail the cycle. The only error is a failed
    /// write, in which case `catalog` and the stored file are both left as
    /// they were. Dropping the returned future before it completes has the
    /// same effect.
    pub async fn refresh<F: PageFetcher>(
        &self,
        catalog: &mut Catalog,
        sources: &[SourceConfig],
        scraper: &SourceScraper<F>,
        options: &RefreshOptions,
    ) -> Result<RefreshReport> {
        if let Some(unknown) = options
            .only
            .iter()
            .find(|id| !sources.iter().any(|s| &s.id == *id))
        {
            return Err(AppError::not_found(format!("source '{unknown}'")));
        }

        let mut next = catalog.clone();
        let mut report = RefreshReport {
            removed: next.retain_sources(sources.iter().map(|s| s.id.as_str())),
            ..RefreshReport::default()
        };
        for id in &report.removed {
            log::info!("[{}] no longer configured, dropped from catalog", id);
        }

        let mut jobs = Vec::new();
        for source in sources {
            if !options.only.is_empty() && !options.only.contains(&source.id) {
                report.unchanged.push(source.id.clone());
                continue;
            }
            match plan(&next, source, options.force) {
                SourcePlan::Fresh => {
                    log::debug!("[{}] up to date", source.id);
                    report.unchanged.push(source.id.clone());
                }
                SourcePlan::Reclassify => {
                    if let Some(change) = reclassify_source(&mut next, source) {
                        report.reclassified.push(change);
                    }
                }
                SourcePlan::Scrape(reason) => {
                    log::info!("[{}] scraping ({})", source.id, reason);
                    jobs.push((source, reason));
                }
            }
        }

        let mut results: Vec<_> = stream::iter(jobs.into_iter().enumerate())
            .map(|(order, (source, reason))| async move {
                (order, source, reason, scraper.scrape(source).await)
            })
            .buffer_unordered(options.max_concurrent.max(1))
            .collect()
            .await;
        results.sort_by_key(|(order, ..)| *order);

        for (_, source, reason, result) in results {
            match result {
                Ok(outcome) => {
                    let diff = SnapshotDiff::between(
                        next.get(&source.id)
                            .map(|s| s.entries.as_slice())
                            .unwrap_or_default(),
                        &outcome.snapshot.entries,
                    );
                    next.replace(outcome.snapshot);
                    next.clear_failure(&source.id);
                    report.scraped.push(ScrapedSource {
                        source_id: source.id.clone(),
                        reason,
                        stats: outcome.stats,
                        diff,
                    });
                }
                Err(failure) => {
                    log::warn!("Failed to refresh {}", failure);
                    next.record_failure(failure.clone());
                    report.failures.push(failure);
                }
            }
        }

        if next != *catalog {
            self.storage.save(&next).await?;
            report.persisted = true;
            *catalog = next;
        }
        Ok(report)
    }
}

fn reclassify_source(catalog: &mut Catalog, source: &SourceConfig) -> Option<ReclassifiedSource> {
    let previous = catalog.get(&source.id)?;
    let snapshot = SourceSnapshot {
        entries: reclassify(&previous.entries, &source.regions),
        region_fingerprint: source.region_fingerprint(),
        regions: source.region_names(),
        ..previous.clone()
    };
    let diff = SnapshotDiff::between(&previous.entries, &snapshot.entries);
    log::info!(
        "[{}] regions changed, reclassified {} entries ({} moved)",
        source.id,
        snapshot.len(),
        diff.moved.len()
    );
    catalog.replace(snapshot);
    Some(ReclassifiedSource {
        source_id: source.id.clone(),
        diff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::models::{FieldSelectors, IgnoreRule, RegionRule};
    use crate::storage::LocalStorage;
    use crate::utils::http::FetchError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Serves canned pages per URL and counts fetches.
    #[derive(Default)]
    struct StubFetcher {
        pages: Mutex<HashMap<String, std::result::Result<String, FetchError>>>,
        calls: AtomicUsize,
        hang: bool,
    }

    impl StubFetcher {
        fn serve(&self, url: &str, page: std::result::Result<String, FetchError>) {
            self.pages.lock().unwrap().insert(url.to_string(), page);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                return std::future::pending().await;
            }
            let page = self.pages.lock().unwrap().get(url).cloned();
            page.unwrap_or(Err(FetchError::Status(404)))
        }
    }

    fn source(id: &str) -> SourceConfig {
        SourceConfig {
            id: id.into(),
            name: String::new(),
            base_url: format!("https://example.com/files/{id}/"),
            entries: "tbody tr".into(),
            link_attr: "href".into(),
            download_folders: vec![],
            fields: FieldSelectors {
                name: "td.link a".into(),
                url: "td.link a".into(),
                size: Some("td.size".into()),
                ..FieldSelectors::default()
            },
            ignore: vec![IgnoreRule::contains("name", "Parent")],
            regions: vec![
                RegionRule::new("USA", &["(USA)"]),
                RegionRule::new("Japan", &["(Japan)"]),
            ],
        }
    }

    fn listing(rows: &[(&str, &str, &str)]) -> String {
        let rows: String = rows
            .iter()
            .map(|(name, size, href)| {
                format!(
                    r#"<tr><td class="link"><a href="{href}">{name}</a></td><td class="size">{size}</td></tr>"#
                )
            })
            .collect();
        format!("<table><tbody>{rows}</tbody></table>")
    }

    fn gb_page() -> String {
        listing(&[
            ("Parent Directory", "-", "../"),
            ("Super Game (USA).zip", "1.2 MB", "/files/a.zip"),
            ("Super Game (Japan).zip", "1.2 MB", "/files/b.zip"),
        ])
    }

    struct Fixture {
        _tmp: TempDir,
        cache: std::path::PathBuf,
        store: CatalogStore<LocalStorage>,
        scraper: SourceScraper<StubFetcher>,
    }

    fn fixture(fetcher: StubFetcher) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("rom_cache.json");
        Fixture {
            store: CatalogStore::new(LocalStorage::new(&cache)),
            scraper: SourceScraper::new(fetcher, Duration::from_secs(5)),
            cache,
            _tmp: tmp,
        }
    }

    fn options() -> RefreshOptions {
        RefreshOptions::default()
    }

    #[test]
    fn test_plan() {
        let gb = source("gb");
        let mut catalog = Catalog::new();
        assert_eq!(
            plan(&catalog, &gb, false),
            SourcePlan::Scrape(ScrapeReason::NoSnapshot)
        );

        let snapshot = crate::services::scrape::build_snapshot(&gb, &gb_page())
            .unwrap()
            .snapshot;
        catalog.replace(snapshot);
        assert_eq!(plan(&catalog, &gb, false), SourcePlan::Fresh);
        assert_eq!(
            plan(&catalog, &gb, true),
            SourcePlan::Scrape(ScrapeReason::Forced)
        );

        let mut regions_changed = gb.clone();
        regions_changed.regions.reverse();
        assert_eq!(plan(&catalog, &regions_changed, false), SourcePlan::Reclassify);

        let mut selectors_changed = gb.clone();
        selectors_changed.entries = "tr".into();
        assert_eq!(
            plan(&catalog, &selectors_changed, false),
            SourcePlan::Scrape(ScrapeReason::ConfigChanged)
        );

        catalog.record_failure(ScrapeFailure::unreachable("gb", "timeout"));
        assert_eq!(
            plan(&catalog, &gb, false),
            SourcePlan::Scrape(ScrapeReason::Retry)
        );
        assert_eq!(plan(&catalog, &regions_changed, false), SourcePlan::Reclassify);

        // Same selectors would fail the same way; wait for a config change.
        catalog.record_failure(ScrapeFailure::parse_failed("gb", "empty response body"));
        assert_eq!(plan(&catalog, &gb, false), SourcePlan::Fresh);
        assert_eq!(
            plan(&catalog, &selectors_changed, false),
            SourcePlan::Scrape(ScrapeReason::ConfigChanged)
        );
    }

    #[tokio::test]
    async fn test_first_refresh_scrapes_and_persists() {
        let fetcher = StubFetcher::default();
        fetcher.serve("https://example.com/files/gb/", Ok(gb_page()));
        let fx = fixture(fetcher);

        let mut catalog = fx.store.load().await;
        let report = fx
            .store
            .refresh(&mut catalog, &[source("gb")], &fx.scraper, &options())
            .await
            .unwrap();

        assert!(report.persisted);
        assert_eq!(report.scraped.len(), 1);
        assert_eq!(report.scraped[0].reason, ScrapeReason::NoSnapshot);
        assert_eq!(report.scraped[0].diff.added.len(), 2);

        let snapshot = catalog.get("gb").unwrap();
        let regions: Vec<_> = snapshot.entries.iter().map(|e| e.region.as_str()).collect();
        assert_eq!(regions, vec!["USA", "Japan"]);
        assert!(snapshot.entries.iter().all(|e| e.size_bytes == Some(1_200_000)));

        let reloaded = fx.store.load().await;
        assert_eq!(reloaded, catalog);
    }

    #[tokio::test]
    async fn test_second_refresh_is_noop() {
        let fetcher = StubFetcher::default();
        fetcher.serve("https://example.com/files/gb/", Ok(gb_page()));
        let fx = fixture(fetcher);
        let sources = [source("gb")];

        let mut catalog = fx.store.load().await;
        fx.store
            .refresh(&mut catalog, &sources, &fx.scraper, &options())
            .await
            .unwrap();
        let written = std::fs::read(&fx.cache).unwrap();

        let report = fx
            .store
            .refresh(&mut catalog, &sources, &fx.scraper, &options())
            .await
            .unwrap();

        assert!(!report.persisted);
        assert_eq!(report.unchanged, vec!["gb"]);
        assert_eq!(fx.scraper.fetcher().calls(), 1);
        assert_eq!(std::fs::read(&fx.cache).unwrap(), written);
    }

    #[tokio::test]
    async fn test_region_change_reclassifies_without_fetch() {
        let fetcher = StubFetcher::default();
        fetcher.serve("https://example.com/files/gb/", Ok(gb_page()));
        let fx = fixture(fetcher);

        let mut catalog = fx.store.load().await;
        fx.store
            .refresh(&mut catalog, &[source("gb")], &fx.scraper, &options())
            .await
            .unwrap();

        let mut changed = source("gb");
        changed.regions.insert(0, RegionRule::new("Asia", &["(Japan)"]));
        let report = fx
            .store
            .refresh(&mut catalog, &[changed.clone()], &fx.scraper, &options())
            .await
            .unwrap();

        assert_eq!(fx.scraper.fetcher().calls(), 1);
        assert!(report.persisted);
        assert_eq!(report.reclassified.len(), 1);
        assert_eq!(report.reclassified[0].diff.moved.len(), 1);

        let snapshot = catalog.get("gb").unwrap();
        assert!(snapshot.matches_regions(&changed));
        assert_eq!(snapshot.regions, vec!["Asia", "USA", "Japan"]);
        assert_eq!(snapshot.entries[1].region, "Asia");
    }

    #[tokio::test]
    async fn test_region_change_while_unreachable_reclassifies_then_retries() {
        let fetcher = StubFetcher::default();
        fetcher.serve("https://example.com/files/gb/", Ok(gb_page()));
        let fx = fixture(fetcher);

        let mut catalog = fx.store.load().await;
        fx.store
            .refresh(&mut catalog, &[source("gb")], &fx.scraper, &options())
            .await
            .unwrap();

        fx.scraper
            .fetcher()
            .serve("https://example.com/files/gb/", Err(FetchError::Status(503)));
        let force = RefreshOptions {
            force: true,
            ..options()
        };
        fx.store
            .refresh(&mut catalog, &[source("gb")], &fx.scraper, &force)
            .await
            .unwrap();
        assert!(catalog.failure("gb").is_some());
        assert_eq!(fx.scraper.fetcher().calls(), 2);

        let mut changed = source("gb");
        changed.regions.insert(0, RegionRule::new("Asia", &["(Japan)"]));
        let report = fx
            .store
            .refresh(&mut catalog, &[changed.clone()], &fx.scraper, &options())
            .await
            .unwrap();

        assert_eq!(fx.scraper.fetcher().calls(), 2);
        assert_eq!(report.reclassified.len(), 1);
        assert!(report.persisted);
        let snapshot = catalog.get("gb").unwrap();
        assert!(snapshot.matches_regions(&changed));
        assert_eq!(snapshot.entries[1].region, "Asia");
        assert!(catalog.failure("gb").is_some());

        let report = fx
            .store
            .refresh(&mut catalog, &[changed], &fx.scraper, &options())
            .await
            .unwrap();
        assert_eq!(fx.scraper.fetcher().calls(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(catalog.get("gb").unwrap().entries[1].region, "Asia");
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_previous_snapshot() {
        let fetcher = StubFetcher::default();
        fetcher.serve("https://example.com/files/gb/", Ok(gb_page()));
        fetcher.serve(
            "https://example.com/files/nes/",
            Ok(listing(&[("Zelda (USA).nes", "128 KB", "z.nes")])),
        );
        let fx = fixture(fetcher);
        let sources = [source("gb"), source("nes")];

        let mut catalog = fx.store.load().await;
        fx.store
            .refresh(&mut catalog, &sources, &fx.scraper, &options())
            .await
            .unwrap();
        let nes_before = catalog.get("nes").unwrap().clone();

        fx.scraper
            .fetcher()
            .serve("https://example.com/files/nes/", Err(FetchError::Status(503)));
        let force = RefreshOptions {
            force: true,
            ..options()
        };
        let report = fx
            .store
            .refresh(&mut catalog, &sources, &fx.scraper, &force)
            .await
            .unwrap();

        assert_eq!(report.scraped.len(), 1);
        assert_eq!(report.scraped[0].source_id, "gb");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::Unreachable);
        assert_eq!(catalog.get("nes"), Some(&nes_before));
        assert!(catalog.failure("nes").is_some());
        assert!(catalog.failure("gb").is_none());
    }

    #[tokio::test]
    async fn test_only_restricts_cycle() {
        let fetcher = StubFetcher::default();
        fetcher.serve("https://example.com/files/gb/", Ok(gb_page()));
        let fx = fixture(fetcher);
        let sources = [source("gb"), source("nes")];

        let mut catalog = fx.store.load().await;
        let only_gb = RefreshOptions {
            only: vec!["gb".into()],
            ..options()
        };
        let report = fx
            .store
            .refresh(&mut catalog, &sources, &fx.scraper, &only_gb)
            .await
            .unwrap();

        assert_eq!(report.unchanged, vec!["nes"]);
        assert!(catalog.get("nes").is_none());

        let unknown = RefreshOptions {
            only: vec!["snes".into()],
            ..options()
        };
        let err = fx
            .store
            .refresh(&mut catalog, &sources, &fx.scraper, &unknown)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_sources_are_dropped() {
        let fetcher = StubFetcher::default();
        fetcher.serve("https://example.com/files/gb/", Ok(gb_page()));
        fetcher.serve("https://example.com/files/nes/", Ok(gb_page()));
        let fx = fixture(fetcher);

        let mut catalog = fx.store.load().await;
        fx.store
            .refresh(&mut catalog, &[source("gb"), source("nes")], &fx.scraper, &options())
            .await
            .unwrap();

        let report = fx
            .store
            .refresh(&mut catalog, &[source("gb")], &fx.scraper, &options())
            .await
            .unwrap();

        assert_eq!(report.removed, vec!["nes"]);
        assert!(report.persisted);
        assert_eq!(catalog.source_ids().collect::<Vec<_>>(), vec!["gb"]);
    }

    #[tokio::test]
    async fn test_cancelled_refresh_writes_nothing() {
        let fetcher = StubFetcher::default();
        fetcher.serve("https://example.com/files/gb/", Ok(gb_page()));
        let fx = fixture(fetcher);

        let mut catalog = fx.store.load().await;
        fx.store
            .refresh(&mut catalog, &[source("gb")], &fx.scraper, &options())
            .await
            .unwrap();
        let written = std::fs::read(&fx.cache).unwrap();
        let before = catalog.clone();

        let hanging = SourceScraper::new(
            StubFetcher {
                hang: true,
                ..StubFetcher::default()
            },
            Duration::from_secs(60),
        );
        let force = RefreshOptions {
            force: true,
            ..options()
        };
        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            fx.store
                .refresh(&mut catalog, &[source("gb")], &hanging, &force),
        )
        .await;

        assert!(cancelled.is_err());
        assert_eq!(catalog, before);
        assert_eq!(std::fs::read(&fx.cache).unwrap(), written);
    }

    #[tokio::test]
    async fn test_corrupt_cache_loads_empty() {
        let fx = fixture(StubFetcher::default());
        std::fs::write(&fx.cache, "{ broken").unwrap();
        assert!(fx.store.load().await.is_empty());
    }
}
