use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::UserDirs;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogEntry, CatalogOptions};
use crate::category::{CategoryRule, CategoryRules};
use crate::domain::ResourceKind;
use crate::error::MendError;
use crate::http::ClientSettings;
use crate::transfer::TransferPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "fetchmend.json";
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1500);
const FALLBACK_OUTPUT_DIR: &str = "downloads";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub delay_secs: Option<f64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub by_category: Option<bool>,
    #[serde(default)]
    pub categories: Option<Vec<CategoryRule>>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ResourceEntry {
    Shorthand(String),
    Detailed(CatalogEntry),
}

impl From<ResourceEntry> for CatalogEntry {
    fn from(entry: ResourceEntry) -> Self {
        match entry {
            ResourceEntry::Shorthand(url) => CatalogEntry {
                name: None,
                url,
                kind: None,
                folder: None,
            },
            ResourceEntry::Detailed(entry) => entry,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output: Option<String>,
    pub delay_secs: Option<f64>,
    pub max_retries: Option<u32>,
    pub kinds: Vec<ResourceKind>,
    pub name_filters: Vec<String>,
    pub by_category: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub output_root: Utf8PathBuf,
    pub inter_item_delay: Duration,
    pub transfer: TransferPolicy,
    pub client: ClientSettings,
    pub catalog_options: CatalogOptions,
    pub entries: Vec<CatalogEntry>,
}

impl ResolvedConfig {
    pub fn catalog(&self) -> Result<Catalog, MendError> {
        Catalog::build(self.entries.iter().cloned(), &self.catalog_options)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: &ConfigOverrides,
    ) -> Result<ResolvedConfig, MendError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(MendError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| MendError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| MendError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: &ConfigOverrides,
    ) -> Result<ResolvedConfig, MendError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(MendError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let output_root = match overrides.output.as_deref().or(config.output.as_deref()) {
            Some(output) => absolutize(Utf8PathBuf::from(output))?,
            None => default_output_root()?,
        };

        let inter_item_delay = match overrides.delay_secs.or(config.delay_secs) {
            Some(secs) => delay_from_secs(secs)?,
            None => DEFAULT_DELAY,
        };

        let max_retries = overrides
            .max_retries
            .or(config.max_retries)
            .unwrap_or(TransferPolicy::default().max_retries);
        if max_retries == 0 {
            return Err(MendError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }
        let transfer = TransferPolicy {
            max_retries,
            ..TransferPolicy::default()
        };

        let defaults = ClientSettings::default();
        let client = ClientSettings {
            user_agent: config.user_agent.unwrap_or(defaults.user_agent),
            referer: config.referer,
            connect_timeout: config
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            read_timeout: config
                .read_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_timeout),
        };

        let by_category = overrides.by_category || config.by_category.unwrap_or(false);
        let categories = by_category.then(|| match config.categories {
            Some(rules) if !rules.is_empty() => CategoryRules::new(rules),
            _ => CategoryRules::default(),
        });
        let catalog_options = CatalogOptions {
            kinds: overrides.kinds.clone(),
            name_filters: overrides.name_filters.clone(),
            categories,
        };

        Ok(ResolvedConfig {
            schema_version,
            output_root,
            inter_item_delay,
            transfer,
            client,
            catalog_options,
            entries: config.resources.into_iter().map(CatalogEntry::from).collect(),
        })
    }
}

fn delay_from_secs(secs: f64) -> Result<Duration, MendError> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        MendError::InvalidConfig(format!(
            "delay must be a finite, non-negative number of seconds (got {secs})"
        ))
    })
}

/// `<user download dir>/fetchmend`, or `./downloads` when the platform has none.
pub fn default_output_root() -> Result<Utf8PathBuf, MendError> {
    let download_dir = UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|dir| dir.join("fetchmend")))
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok());
    match download_dir {
        Some(dir) => Ok(dir),
        None => absolutize(Utf8PathBuf::from(FALLBACK_OUTPUT_DIR)),
    }
}

fn absolutize(path: Utf8PathBuf) -> Result<Utf8PathBuf, MendError> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().map_err(|err| MendError::Filesystem(err.to_string()))?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|_| MendError::Filesystem("current directory is not valid UTF-8".to_string()))?;
    Ok(cwd.join(path))
}
