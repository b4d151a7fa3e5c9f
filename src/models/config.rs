//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::source::one_or_many;
use crate::models::{FieldSelectors, IgnoreRule, RegionRule, SourceConfig, UNCLASSIFIED};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Download folders used when a source has none of its own
    #[serde(
        default,
        alias = "download_folder",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub download_folders: Vec<String>,

    /// HTTP and scraping behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Configured listings, in display order
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Directory of the loaded config file; relative paths resolve against it
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Write configuration back to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Starter configuration written by `init`.
    pub fn sample() -> Self {
        Self {
            download_folders: vec!["~/roms".to_string()],
            sources: vec![defaults::sample_source()],
            ..Self::default()
        }
    }

    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn source_mut(&mut self, id: &str) -> Option<&mut SourceConfig> {
        self.sources.iter_mut().find(|s| s.id == id)
    }

    /// Like [`Config::source`] but reports unknown ids as an error.
    pub fn require_source(&self, id: &str) -> Result<&SourceConfig> {
        self.source(id)
            .ok_or_else(|| AppError::not_found(format!("no source with id '{id}' configured")))
    }

    /// Resolve a possibly relative path against the config directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Location of the catalog cache file.
    pub fn cache_path(&self) -> PathBuf {
        self.resolve_path(&self.paths.cache_file)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.paths.cache_file.trim().is_empty() {
            return Err(AppError::validation("paths.cache_file is empty"));
        }
        if self.sources.is_empty() {
            return Err(AppError::validation("No sources defined"));
        }

        let mut ids = HashSet::new();
        for source in &self.sources {
            Self::validate_source(source)?;
            if !ids.insert(source.id.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
        }
        Ok(())
    }

    fn validate_source(source: &SourceConfig) -> Result<()> {
        let id = source.id.trim();
        if id.is_empty() {
            return Err(AppError::validation("source with empty id"));
        }
        let invalid = |message: String| AppError::validation(format!("source '{id}': {message}"));

        url::Url::parse(&source.base_url)
            .map_err(|e| invalid(format!("invalid base_url '{}': {e}", source.base_url)))?;

        if source.entries.trim().is_empty() {
            return Err(invalid("entries selector is empty".into()));
        }
        if source.link_attr.trim().is_empty() {
            return Err(invalid("link_attr is empty".into()));
        }
        for (field, selector) in source.fields.iter() {
            if selector.trim().is_empty() {
                return Err(invalid(format!("selector for field '{field}' is empty")));
            }
        }

        for (i, rule) in source.ignore.iter().enumerate() {
            Self::validate_ignore_rule(rule, &source.fields)
                .map_err(|message| invalid(format!("ignore rule #{}: {message}", i + 1)))?;
        }

        let mut regions = HashSet::new();
        for region in &source.regions {
            Self::validate_region(region).map_err(|message| invalid(message))?;
            if !regions.insert(region.name.as_str()) {
                return Err(invalid(format!("duplicate region '{}'", region.name)));
            }
        }
        Ok(())
    }

    fn validate_ignore_rule(
        rule: &IgnoreRule,
        fields: &FieldSelectors,
    ) -> std::result::Result<(), String> {
        if !fields.has(&rule.field) {
            return Err(format!("unknown field '{}'", rule.field));
        }
        match (&rule.contains, &rule.equals) {
            (Some(token), None) if token.is_empty() => Err("'contains' is empty".into()),
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err("set exactly one of 'contains' or 'equals'".into()),
        }
    }

    fn validate_region(region: &RegionRule) -> std::result::Result<(), String> {
        if region.name.trim().is_empty() {
            return Err("region with empty name".into());
        }
        if region.name == UNCLASSIFIED {
            return Err(format!("region name '{UNCLASSIFIED}' is reserved"));
        }
        if region.tokens.iter().all(|t| t.is_empty()) {
            return Err(format!("region '{}' has no tokens", region.name));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_folders: Vec::new(),
            crawler: CrawlerConfig::default(),
            paths: PathsConfig::default(),
            sources: Vec::new(),
            base_dir: PathBuf::new(),
        }
    }
}

/// HTTP client and scraping behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum sources scraped at the same time
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Catalog cache, relative to the config file
    #[serde(default = "defaults::cache_file")]
    pub cache_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_file: defaults::cache_file(),
        }
    }
}

mod defaults {
    use std::collections::BTreeMap;

    use super::{FieldSelectors, IgnoreRule, RegionRule, SourceConfig};

    // Crawler defaults
    pub fn user_agent() -> String {
        concat!("Mozilla/5.0 (compatible; romscout/", env!("CARGO_PKG_VERSION"), ")").into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Path defaults
    pub fn cache_file() -> String {
        "rom_cache.json".into()
    }

    pub fn sample_source() -> SourceConfig {
        SourceConfig {
            id: "gb".to_string(),
            name: "Nintendo Game Boy".to_string(),
            base_url: "https://myrient.erista.me/files/No-Intro/Nintendo%20-%20Game%20Boy/"
                .to_string(),
            entries: "tbody tr".to_string(),
            link_attr: "href".to_string(),
            download_folders: vec!["~/roms/gameboy".to_string()],
            fields: FieldSelectors {
                name: "td.link a".to_string(),
                url: "td.link a".to_string(),
                size: Some("td.size".to_string()),
                extra: BTreeMap::new(),
            },
            ignore: vec![
                IgnoreRule::equals("size", "-"),
                IgnoreRule::contains("name", "Parent"),
            ],
            regions: vec![
                RegionRule::new("USA", &["(USA)", "(USA, Europe)"]),
                RegionRule::new("Europe", &["(Europe)"]),
                RegionRule::new("Japan", &["(Japan)"]),
                RegionRule::new("World", &["(World)"]),
            ],
        }
    }
}
