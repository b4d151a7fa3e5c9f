//! romscout CLI
//!
//! Local entry point: refresh the catalog, browse it, download entries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use romscout::{
    error::{AppError, Result},
    models::{Catalog, CatalogEntry, Config},
    pipeline::{BrowseIndex, CatalogStore, RefreshOptions, RefreshReport, SortKey, SourceStatus},
    services::{Downloader, SourceScraper, download},
    storage::LocalStorage,
    utils::{
        console,
        fs::{default_download_dir, download_folders, expand_path, parse_folder_list},
        http::HttpFetcher,
        size::{format_optional_size, format_size},
    },
};

/// romscout - ROM listing catalog
#[derive(Parser, Debug)]
#[command(
    name = "romscout",
    version,
    about = "Scrape, browse and download from HTML file listings"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Scrape sources whose cached snapshot is out of date
    Refresh {
        /// Scrape even if the cache is current
        #[arg(long)]
        force: bool,

        /// Only refresh these sources
        #[arg(long = "source", value_name = "ID")]
        sources: Vec<String>,
    },

    /// List configured sources and their cache status
    Sources,

    /// List the regions of a source
    Regions {
        #[arg(long, value_name = "ID")]
        source: String,
    },

    /// List entries of a source
    List {
        #[arg(long, value_name = "ID")]
        source: String,

        /// Only entries of this region
        #[arg(long)]
        region: Option<String>,

        /// Case-insensitive name filter
        #[arg(long)]
        search: Option<String>,

        /// scrape, name or size
        #[arg(long, default_value = "scrape")]
        sort: SortKey,

        /// Group entries by region
        #[arg(long)]
        grouped: bool,

        /// Show at most this many entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Download one entry by its key
    Download {
        #[arg(long, value_name = "ID")]
        source: String,

        /// Entry key as shown by `list`
        key: String,

        /// Target folder (default: the source's first download folder)
        #[arg(long)]
        to: Option<PathBuf>,
    },

    /// Set download folders, globally or for one source; no folders clears
    SetFolders {
        #[arg(long, value_name = "ID")]
        source: Option<String>,

        folders: Vec<String>,
    },

    /// Show configuration and cache info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(AppError::config(format!(
            "{} not found; run `romscout init` first",
            path.display()
        )));
    }
    let config = Config::load(path)?;
    log::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn catalog_store(config: &Config) -> CatalogStore<LocalStorage> {
    CatalogStore::new(LocalStorage::new(config.cache_path()))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Init { force } => {
            if cli.config.exists() && !force {
                log::warn!(
                    "{} already exists. Use --force to overwrite.",
                    cli.config.display()
                );
                return Ok(());
            }
            Config::sample().save(&cli.config)?;
            console::success(&format!("Wrote {}", cli.config.display()));
        }

        Command::Validate => {
            let config = load_config(&cli.config)?;
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            console::success(&format!("Config OK ({} sources)", config.sources.len()));
            for source in &config.sources {
                console::sub_item(&format!(
                    "{} - {} ({} regions, {} ignore rules)",
                    source.id,
                    source.display_name(),
                    source.regions.len(),
                    source.ignore.len()
                ));
            }
        }

        Command::Refresh { force, sources } => {
            let config = load_config(&cli.config)?;
            config.validate()?;
            run_refresh(&config, force, sources).await?;
        }

        Command::Sources => {
            let config = load_config(&cli.config)?;
            let catalog = catalog_store(&config).load().await;
            let index = BrowseIndex::new(&catalog);

            console::header("Sources");
            for source in &config.sources {
                let status = match index.status(&source.id) {
                    SourceStatus::Fresh => "fresh".to_string(),
                    SourceStatus::Stale(failure) => format!("stale: {}", failure.kind),
                    SourceStatus::Missing(_) => "not scraped".to_string(),
                };
                let entries = index.snapshot(&source.id).map_or(0, |s| s.len());
                println!(
                    "{:<12} {:<32} {:>6} entries  [{}]",
                    source.id,
                    console::truncate(source.display_name(), 32),
                    entries,
                    status
                );
            }
        }

        Command::Regions { source } => {
            let config = load_config(&cli.config)?;
            config.require_source(&source)?;
            let catalog = catalog_store(&config).load().await;
            let index = BrowseIndex::new(&catalog);
            require_snapshot(&index, &source)?;

            for (region, entries) in index.grouped(&source) {
                println!("{region:<20} {:>6}", entries.len());
            }
        }

        Command::List {
            source,
            region,
            search,
            sort,
            grouped,
            limit,
        } => {
            let config = load_config(&cli.config)?;
            config.require_source(&source)?;
            let catalog = catalog_store(&config).load().await;
            let index = BrowseIndex::new(&catalog);
            require_snapshot(&index, &source)?;

            let limit = limit.unwrap_or(usize::MAX);
            if grouped {
                for group in index.regions(&source) {
                    if region.as_deref().is_some_and(|r| r != group) {
                        continue;
                    }
                    let entries = index.list(&source, Some(group), search.as_deref());
                    if entries.is_empty() {
                        continue;
                    }
                    println!("== {group} ({}) ==", entries.len());
                    print_entries(entries, sort, limit);
                }
            } else {
                let entries = index.list(&source, region.as_deref(), search.as_deref());
                print_entries(entries, sort, limit);
            }
        }

        Command::Download { source, key, to } => {
            let config = load_config(&cli.config)?;
            let source_config = config.require_source(&source)?;
            let catalog = catalog_store(&config).load().await;
            let index = BrowseIndex::new(&catalog);
            let entry = index.find(&source, &key).ok_or_else(|| {
                AppError::not_found(format!("no entry with key '{key}' in source '{source}'"))
            })?;

            let folder = match to {
                Some(dir) => expand_path(&dir.to_string_lossy(), &std::env::current_dir()?),
                None => download_folders(&config, source_config)
                    .into_iter()
                    .next()
                    .unwrap_or_else(default_download_dir),
            };
            let dest = download::destination(entry, &folder);

            console::step(1, 1, &format!("Downloading {}", entry.name));
            let downloader = Downloader::from_config(&config.crawler)?;
            let summary = downloader
                .download(&entry.url, &dest, |progress| {
                    let line = match progress.fraction() {
                        Some(ratio) => format!(
                            "{} {:>5.1}% {} / {} {}/s",
                            console::progress_bar(ratio, 30),
                            ratio * 100.0,
                            format_size(progress.downloaded),
                            format_optional_size(progress.total),
                            format_size(progress.speed() as u64)
                        ),
                        None => format!(
                            "{} {}/s",
                            format_size(progress.downloaded),
                            format_size(progress.speed() as u64)
                        ),
                    };
                    console::progress(&line);
                })
                .await;
            console::progress_done();
            let summary = summary?;

            console::success(&format!(
                "Saved {} ({}) in {:.1}s",
                summary.path.display(),
                format_size(summary.bytes),
                summary.elapsed.as_secs_f64()
            ));
        }

        Command::SetFolders { source, folders } => {
            let mut config = load_config(&cli.config)?;
            let folders: Vec<String> = folders
                .iter()
                .flat_map(|arg| parse_folder_list(arg))
                .collect();

            let target = match &source {
                Some(id) => {
                    let source = config.source_mut(id).ok_or_else(|| {
                        AppError::not_found(format!("no source with id '{id}' configured"))
                    })?;
                    &mut source.download_folders
                }
                None => &mut config.download_folders,
            };
            *target = folders.clone();
            config.save(&cli.config)?;

            let scope = source.as_deref().unwrap_or("global");
            if folders.is_empty() {
                console::success(&format!("Cleared {scope} download folders"));
            } else {
                console::success(&format!("Set {scope} download folders:"));
                for folder in &folders {
                    console::sub_item(folder);
                }
            }
        }

        Command::Info => {
            let config = load_config(&cli.config)?;
            let catalog = catalog_store(&config).load().await;
            print_info(&cli.config, &config, &catalog);
        }
    }

    Ok(())
}

async fn run_refresh(config: &Config, force: bool, only: Vec<String>) -> Result<()> {
    console::header("Refreshing catalog");

    let store = catalog_store(config);
    let mut catalog = store.load().await;
    let scraper = SourceScraper::new(
        HttpFetcher::from_config(&config.crawler)?,
        Duration::from_secs(config.crawler.timeout_secs),
    );
    let options = RefreshOptions {
        force,
        only,
        max_concurrent: config.crawler.max_concurrent,
    };

    let report = tokio::select! {
        report = store.refresh(&mut catalog, &config.sources, &scraper, &options) => report?,
        _ = tokio::signal::ctrl_c() => {
            console::warn("Interrupted; catalog left unchanged");
            return Ok(());
        }
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &RefreshReport) {
    for scraped in &report.scraped {
        console::success(&format!(
            "{}: {} ({})",
            scraped.source_id, scraped.stats, scraped.reason
        ));
        if scraped.diff.has_changes() {
            console::sub_item(&format!(
                "+{} -{} ~{}",
                scraped.diff.added.len(),
                scraped.diff.removed.len(),
                scraped.diff.moved.len()
            ));
        }
    }
    for source in &report.reclassified {
        console::success(&format!(
            "{}: reclassified, {} entries moved",
            source.source_id,
            source.diff.moved.len()
        ));
    }
    if report.has_failures() {
        console::warn("Some sources could not be refreshed; their cached entries are kept:");
        for failure in &report.failures {
            console::warn(&format!("  {failure}"));
        }
    }

    console::summary(
        "Refresh",
        &[
            ("Scraped", report.scraped.len().to_string()),
            ("Reclassified", report.reclassified.len().to_string()),
            ("Unchanged", report.unchanged.len().to_string()),
            ("Removed", report.removed.len().to_string()),
            ("Failed", report.failures.len().to_string()),
            (
                "Cache",
                if report.persisted { "written" } else { "untouched" }.to_string(),
            ),
        ],
    );
}

fn print_info(config_path: &Path, config: &Config, catalog: &Catalog) {
    let index = BrowseIndex::new(catalog);
    let total_bytes: u64 = catalog.snapshots.values().map(|s| s.total_bytes()).sum();

    console::summary(
        "romscout",
        &[
            ("Config", config_path.display().to_string()),
            ("Cache", config.cache_path().display().to_string()),
            ("Sources", config.sources.len().to_string()),
            ("Cached sources", index.source_ids().len().to_string()),
            ("Entries", catalog.total_entries().to_string()),
            ("Known size", format_size(total_bytes)),
            ("Failures", catalog.failures.len().to_string()),
            ("Default downloads", default_download_dir().display().to_string()),
        ],
    );
    for source in &config.sources {
        let scraped = index
            .snapshot(&source.id)
            .map_or("never".to_string(), |s| s.scraped_at.to_rfc3339());
        console::sub_item(&format!("{}: last scraped {}", source.id, scraped));
        for folder in download_folders(config, source) {
            console::sub_item(&format!("  -> {}", folder.display()));
        }
    }
}

/// Fail when the source has no snapshot; warn when the snapshot is stale.
fn require_snapshot(index: &BrowseIndex<'_>, source: &str) -> Result<()> {
    if index.snapshot(source).is_none() {
        return Err(AppError::not_found(format!(
            "source '{source}' is not cached yet; run `romscout refresh`"
        )));
    }
    if let Some(note) = index.status(source).staleness_note() {
        console::warn(&format!("[{source}] {note}"));
    }
    Ok(())
}

fn print_entries(entries: Vec<&CatalogEntry>, sort: SortKey, limit: usize) {
    for entry in BrowseIndex::sorted(entries, sort).into_iter().take(limit) {
        println!(
            "{}  {:<14} {:>10}  {}",
            entry.key,
            console::truncate(&entry.region, 14),
            entry.display_size(),
            entry.name
        );
    }
}
