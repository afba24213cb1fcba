use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Region;
use crate::error::KiraError;

pub const DEFAULT_CONFIG_FILE: &str = "kira-pm.json";

/// IPC main groups whose patents are kept.
pub const DEFAULT_IPC_ALLOW_LIST: &[&str] = &[
    "A61K", "A61P", "C07B", "C07C", "C07D", "C07F", "C07H", "C07J", "C07K", "C12N", "C12P",
    "C12Q",
];

pub const DEFAULT_CUTOFF_YEAR: i32 = 2000;
pub const DEFAULT_HARMONIZER_FLUSH_EVERY: usize = 10;
pub const DEFAULT_PATENT_FLUSH_EVERY: usize = 5;
pub const DEFAULT_WEBDRIVER_PORT: u16 = 9515;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub mappings: MappingsEntry,
    #[serde(default)]
    pub harmonizer: HarmonizerEntry,
    #[serde(default)]
    pub patents: PatentsEntry,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct MappingsEntry {
    #[serde(default)]
    pub uniprot_to_chembl: Option<PathBuf>,
    #[serde(default)]
    pub chembl_release: Option<String>,
    #[serde(default)]
    pub hgnc: Option<PathBuf>,
    #[serde(default)]
    pub compound_to_schembl: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct HarmonizerEntry {
    #[serde(default)]
    pub flush_every: Option<usize>,
    #[serde(default)]
    pub synonym_fallback: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PatentsEntry {
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub cutoff_year: Option<i32>,
    #[serde(default)]
    pub webdriver_url: Option<String>,
    #[serde(default)]
    pub chromedriver: Option<PathBuf>,
    #[serde(default)]
    pub ipc_allow_list: Option<Vec<String>>,
    #[serde(default)]
    pub flush_every: Option<usize>,
    #[serde(default)]
    pub delays: DelaysEntry,
}

/// Settle delays in seconds.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DelaysEntry {
    #[serde(default)]
    pub detail: Option<u64>,
    #[serde(default)]
    pub patents_tab: Option<u64>,
    #[serde(default)]
    pub listing: Option<u64>,
    #[serde(default)]
    pub next_page: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct MappingPaths {
    pub uniprot_to_chembl: Option<PathBuf>,
    pub chembl_release: Option<String>,
    pub hgnc: Option<PathBuf>,
    pub compound_to_schembl: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct HarmonizerSettings {
    pub flush_every: usize,
    pub synonym_fallback: bool,
}

impl Default for HarmonizerSettings {
    fn default() -> Self {
        Self {
            flush_every: DEFAULT_HARMONIZER_FLUSH_EVERY,
            synonym_fallback: false,
        }
    }
}

/// Time given to client-side rendering after each navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    pub detail: Duration,
    pub patents_tab: Duration,
    pub listing: Duration,
    pub next_page: Duration,
}

impl SettleDelays {
    pub fn none() -> Self {
        Self {
            detail: Duration::ZERO,
            patents_tab: Duration::ZERO,
            listing: Duration::ZERO,
            next_page: Duration::ZERO,
        }
    }
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            detail: Duration::from_secs(8),
            patents_tab: Duration::from_secs(15),
            listing: Duration::from_secs(2),
            next_page: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatentSettings {
    pub region: Region,
    pub cutoff_year: i32,
    pub webdriver_url: Option<String>,
    pub chromedriver: Option<PathBuf>,
    pub ipc_allow_list: Vec<String>,
    pub flush_every: usize,
    pub delays: SettleDelays,
}

impl Default for PatentSettings {
    fn default() -> Self {
        Self {
            region: Region::Linux,
            cutoff_year: DEFAULT_CUTOFF_YEAR,
            webdriver_url: None,
            chromedriver: None,
            ipc_allow_list: default_ipc_allow_list(),
            flush_every: DEFAULT_PATENT_FLUSH_EVERY,
            delays: SettleDelays::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub mappings: MappingPaths,
    pub harmonizer: HarmonizerSettings,
    pub patents: PatentSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `kira-pm.json` from the working directory. Without an
    /// explicit path a missing file means "all defaults".
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Self::resolve_config(Config::default()));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let defaults = SettleDelays::default();
        let delays = &config.patents.delays;
        let seconds = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            mappings: MappingPaths {
                uniprot_to_chembl: config.mappings.uniprot_to_chembl,
                chembl_release: config.mappings.chembl_release,
                hgnc: config.mappings.hgnc,
                compound_to_schembl: config.mappings.compound_to_schembl,
            },
            harmonizer: HarmonizerSettings {
                flush_every: config
                    .harmonizer
                    .flush_every
                    .unwrap_or(DEFAULT_HARMONIZER_FLUSH_EVERY),
                synonym_fallback: config.harmonizer.synonym_fallback.unwrap_or(false),
            },
            patents: PatentSettings {
                region: config.patents.region.unwrap_or(Region::Linux),
                cutoff_year: config.patents.cutoff_year.unwrap_or(DEFAULT_CUTOFF_YEAR),
                webdriver_url: config.patents.webdriver_url,
                chromedriver: config.patents.chromedriver,
                ipc_allow_list: config
                    .patents
                    .ipc_allow_list
                    .map(|codes| codes.into_iter().map(|code| code.trim().to_uppercase()).collect())
                    .unwrap_or_else(default_ipc_allow_list),
                flush_every: config
                    .patents
                    .flush_every
                    .unwrap_or(DEFAULT_PATENT_FLUSH_EVERY),
                delays: SettleDelays {
                    detail: seconds(delays.detail, defaults.detail),
                    patents_tab: seconds(delays.patents_tab, defaults.patents_tab),
                    listing: seconds(delays.listing, defaults.listing),
                    next_page: seconds(delays.next_page, defaults.next_page),
                },
            },
        }
    }
}

pub fn default_ipc_allow_list() -> Vec<String> {
    DEFAULT_IPC_ALLOW_LIST
        .iter()
        .map(|code| code.to_string())
        .collect()
}
