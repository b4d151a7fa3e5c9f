// src/services/scrape.rs

//! Source scraper.
//!
//! Fetches one source's listing page and turns it into a snapshot, or into
//! a [`ScrapeFailure`] describing why it could not.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use scraper::Html;

use crate::error::ScrapeFailure;
use crate::models::{CatalogEntry, RawRow, SourceConfig, SourceSnapshot};
use crate::services::normalize::{EntryNormalizer, RowOutcome};
use crate::services::selectors::{CssSelectors, RowExtractor};
use crate::utils::http::{FetchError, PageFetcher};

/// Per-row counters of one scrape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    pub rows: usize,
    pub kept: usize,
    pub ignored: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub size_unparsable: usize,
}

impl fmt::Display for ScrapeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows, {} kept, {} ignored, {} malformed, {} duplicates, {} without size",
            self.rows, self.kept, self.ignored, self.malformed, self.duplicates, self.size_unparsable
        )
    }
}

/// A successful scrape.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub snapshot: SourceSnapshot,
    pub stats: ScrapeStats,
}

/// Scrapes sources through a [`PageFetcher`].
pub struct SourceScraper<F> {
    fetcher: F,
    timeout: Duration,
}

impl<F: PageFetcher> SourceScraper<F> {
    /// `timeout` bounds each page fetch, on top of whatever the fetcher
    /// enforces itself.
    pub fn new(fetcher: F, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub async fn scrape(&self, source: &SourceConfig) -> Result<ScrapeOutcome, ScrapeFailure> {
        log::debug!("[{}] fetching {}", source.id, source.base_url);

        let body = match tokio::time::timeout(self.timeout, self.fetcher.fetch(&source.base_url))
            .await
        {
            Ok(Ok(body)) => body,
            Ok(Err(error)) => return Err(ScrapeFailure::unreachable(&source.id, error)),
            Err(_) => return Err(ScrapeFailure::unreachable(&source.id, FetchError::Timeout)),
        };

        let outcome = build_snapshot(source, &body)?;
        log::info!(
            "[{}] {} entries ({})",
            source.id,
            outcome.snapshot.len(),
            outcome.stats
        );
        Ok(outcome)
    }
}

/// Parse a fetched listing page into a snapshot.
pub fn build_snapshot(source: &SourceConfig, body: &str) -> Result<ScrapeOutcome, ScrapeFailure> {
    if body.trim().is_empty() {
        return Err(ScrapeFailure::parse_failed(&source.id, "empty response body"));
    }
    let selectors =
        CssSelectors::compile(source).map_err(|e| ScrapeFailure::parse_failed(&source.id, e))?;

    let document = Html::parse_document(body);
    let (entries, stats) = collect_entries(source, selectors.rows(&document));

    let snapshot = SourceSnapshot {
        source_id: source.id.clone(),
        fingerprint: source.scrape_fingerprint(),
        region_fingerprint: source.region_fingerprint(),
        scraped_at: Utc::now(),
        regions: source.region_names(),
        entries,
    };
    Ok(ScrapeOutcome { snapshot, stats })
}

/// Normalize rows in order, keeping the first entry per content key.
pub fn collect_entries(
    source: &SourceConfig,
    rows: impl Iterator<Item = RawRow>,
) -> (Vec<CatalogEntry>, ScrapeStats) {
    let normalizer = EntryNormalizer::new(source);
    let mut stats = ScrapeStats::default();
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for row in rows {
        stats.rows += 1;
        match normalizer.normalize(&row) {
            RowOutcome::Kept {
                entry,
                size_unparsable,
            } => {
                if size_unparsable {
                    stats.size_unparsable += 1;
                }
                if seen.insert(entry.key.clone()) {
                    entries.push(entry);
                } else {
                    stats.duplicates += 1;
                    log::debug!("[{}] duplicate entry {}", source.id, entry.name);
                }
            }
            RowOutcome::Ignored { .. } => stats.ignored += 1,
            RowOutcome::Malformed(reason) => {
                stats.malformed += 1;
                log::debug!("[{}] malformed row ({:?})", source.id, reason);
            }
        }
    }
    stats.kept = entries.len();

    if stats.size_unparsable > 0 {
        log::warn!(
            "[{}] {} entries have an unreadable size",
            source.id,
            stats.size_unparsable
        );
    }
    (entries, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::models::{FieldSelectors, IgnoreRule, RegionRule};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Serves canned bodies; unknown URLs fail with a 404.
    struct StubFetcher {
        pages: HashMap<String, Result<String, FetchError>>,
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.pages
                .get(url)
                .cloned()
                .unwrap_or(Err(FetchError::Status(404)))
        }
    }

    struct HangingFetcher;

    #[async_trait]
    impl PageFetcher for HangingFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            std::future::pending().await
        }
    }

    fn source() -> SourceConfig {
        SourceConfig {
            id: "gb".into(),
            name: "Game Boy".into(),
            base_url: "https://example.com/files/gb/".into(),
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
        format!("<html><body><table><tbody>{rows}</tbody></table></body></html>")
    }

    fn scraper_for(body: Result<String, FetchError>) -> SourceScraper<StubFetcher> {
        let pages = HashMap::from([("https://example.com/files/gb/".to_string(), body)]);
        SourceScraper::new(StubFetcher { pages }, Duration::from_secs(5))
    }

    #[test]
    fn test_example_listing() {
        let rows = vec![
            RawRow::new()
                .with("name", "Parent Directory")
                .with("size", "-")
                .with("url", ""),
            RawRow::new()
                .with("name", "Super Game (USA).zip")
                .with("size", "1.2 MB")
                .with("url", "https://example.com/files/a.zip"),
            RawRow::new()
                .with("name", "Super Game (Japan).zip")
                .with("size", "1.2 MB")
                .with("url", "https://example.com/files/b.zip"),
        ];
        let (entries, stats) = collect_entries(&source(), rows.into_iter());

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].region, "USA");
        assert_eq!(entries[1].region, "Japan");
        assert!(entries.iter().all(|e| e.size_bytes == Some(1_200_000)));
        assert!(entries.iter().all(|e| !e.name.contains("Parent")));
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.kept, 2);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let body = listing(&[
            ("Tetris (World).zip", "32 KB", "a.zip"),
            ("tetris  (world).zip", "32 KB", "mirror/a.zip"),
            ("Tetris (World).zip", "64 KB", "b.zip"),
        ]);
        let outcome = build_snapshot(&source(), &body).unwrap();

        assert_eq!(outcome.stats.duplicates, 1);
        assert_eq!(outcome.snapshot.len(), 2);
        assert_eq!(
            outcome.snapshot.entries[0].url,
            "https://example.com/files/gb/a.zip"
        );
    }

    #[test]
    fn test_zero_entries_is_valid() {
        let body = listing(&[("Parent Directory", "-", "../")]);
        let outcome = build_snapshot(&source(), &body).unwrap();
        assert!(outcome.snapshot.is_empty());
        assert_eq!(outcome.snapshot.regions, vec!["USA", "Japan"]);
    }

    #[test]
    fn test_empty_body_is_parse_failure() {
        let failure = build_snapshot(&source(), "  \n").unwrap_err();
        assert_eq!(failure.kind, FailureKind::ParseFailed);
        assert_eq!(failure.source_id, "gb");
    }

    #[test]
    fn test_bad_selector_is_parse_failure() {
        let mut source = source();
        source.entries = "tr[[".into();
        let failure = build_snapshot(&source, "<p>x</p>").unwrap_err();
        assert_eq!(failure.kind, FailureKind::ParseFailed);
    }

    #[tokio::test]
    async fn test_scrape_success() {
        let scraper = scraper_for(Ok(listing(&[
            ("Parent Directory", "-", "../"),
            ("Super Game (USA).zip", "1.2 MB", "/files/a.zip"),
        ])));
        let outcome = scraper.scrape(&source()).await.unwrap();
        let snapshot = outcome.snapshot;

        assert_eq!(snapshot.source_id, "gb");
        assert_eq!(snapshot.fingerprint, source().scrape_fingerprint());
        assert_eq!(snapshot.entries[0].url, "https://example.com/files/a.zip");
    }

    #[tokio::test]
    async fn test_http_error_is_unreachable() {
        let scraper = scraper_for(Err(FetchError::Status(503)));
        let failure = scraper.scrape(&source()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unreachable);
        assert!(failure.message.contains("503"));
    }

    #[tokio::test]
    async fn test_timeout_is_unreachable() {
        let scraper = SourceScraper::new(HangingFetcher, Duration::from_millis(20));
        let failure = scraper.scrape(&source()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unreachable);
    }
}
