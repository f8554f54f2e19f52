use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// The remote as-of document service.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_document_param")]
    pub document_param: String,
    #[serde(default = "default_date_param")]
    pub date_param: String,
    /// Earliest date the source returns data for (`YYYY-MM-DD`).
    #[serde(default = "default_min_date")]
    pub min_date: String,
    /// Request timeout. When unset the transport default applies.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            document_param: default_document_param(),
            date_param: default_date_param(),
            min_date: default_min_date(),
            timeout_secs: None,
            user_agent: None,
        }
    }
}

fn default_base_url() -> String {
    "http://wetten.overheid.nl/xml.php".to_string()
}
fn default_document_param() -> String {
    "regelingID".to_string()
}
fn default_date_param() -> String {
    "geldigheidsdatum".to_string()
}
fn default_min_date() -> String {
    "2002-05-01".to_string()
}

impl SourceConfig {
    /// Parsed `min_date`. Validated by [`load_config`].
    pub fn min_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.min_date, "%Y-%m-%d")
            .with_context(|| format!("source.min_date is not a YYYY-MM-DD date: '{}'", self.min_date))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_coarse_step_days")]
    pub coarse_step_days: i64,
    #[serde(default = "default_fine_step_days")]
    pub fine_step_days: i64,
    /// Only documents of this kind are synced from the catalog.
    #[serde(default = "default_kind")]
    pub kind: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            coarse_step_days: default_coarse_step_days(),
            fine_step_days: default_fine_step_days(),
            kind: default_kind(),
        }
    }
}

impl SyncConfig {
    /// Catalog kind filter. An empty `kind` syncs every catalog document.
    pub fn kind_filter(&self) -> Option<&str> {
        self.kind.as_deref().filter(|k| !k.is_empty())
    }
}

fn default_concurrency() -> usize {
    8
}
fn default_coarse_step_days() -> i64 {
    62
}
fn default_fine_step_days() -> i64 {
    1
}
fn default_kind() -> Option<String> {
    Some("wet".to_string())
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub url: String,
    #[serde(default = "default_catalog_entry")]
    pub entry: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            entry: default_catalog_entry(),
        }
    }
}

fn default_catalog_url() -> String {
    "http://wetten.overheid.nl/BWBIdService/BWBIdList.xml.zip".to_string()
}
fn default_catalog_entry() -> String {
    "BWBIdList.xml".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Largest accepted `sync.coarse_step_days` (about ten years).
pub const MAX_STEP_DAYS: i64 = 3650;

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be > 0");
    }

    // Validate source
    if config.source.base_url.is_empty() {
        anyhow::bail!("source.base_url must not be empty");
    }
    config.source.min_date()?;

    // Validate sync
    if config.sync.concurrency == 0 {
        anyhow::bail!("sync.concurrency must be >= 1");
    }
    if config.sync.fine_step_days < 1 {
        anyhow::bail!("sync.fine_step_days must be >= 1");
    }
    if config.sync.coarse_step_days <= config.sync.fine_step_days {
        anyhow::bail!(
            "sync.coarse_step_days ({}) must be greater than sync.fine_step_days ({})",
            config.sync.coarse_step_days,
            config.sync.fine_step_days
        );
    }
    if config.sync.coarse_step_days > MAX_STEP_DAYS {
        anyhow::bail!(
            "sync.coarse_step_days ({}) must be <= {}",
            config.sync.coarse_step_days,
            MAX_STEP_DAYS
        );
    }

    Ok(config)
}
