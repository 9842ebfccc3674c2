use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_CONFIG_FILE: &str = "theme_collector.toml";
const ENV_PREFIX: &str = "THEMES";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub site: SiteProfile,
    pub timing: Timing,
    pub collector: CollectorSettings,
    pub browser: BrowserSettings,
    pub output: OutputSettings,
}

impl Settings {
    /// Defaults, then the optional TOML file, then `THEMES_*` env vars
    /// (`__` separates nested keys, e.g. `THEMES_COLLECTOR__WORKERS=4`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p.to_path_buf()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("site.noise_phrases")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

/// Selectors, patterns and phrases that tie the pipeline to one site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    pub landing_url: String,
    pub content_type: String,
    pub market: String,
    pub category_anchor_selector: String,
    pub listing_anchor_selector: String,
    pub listing_probe_selector: String,
    pub listing_href_pattern: String,
    pub pagination_control_selector: String,
    pub boundary_marker: String,
    pub currency_suffix: String,
    pub noise_phrases: Vec<String>,
    pub landing_tab_selector: String,
    pub landing_tab_label: Option<String>,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            landing_url: "https://www.tossinvest.com/?ranking-type=trending_category".into(),
            content_type: "tics".into(),
            market: "kr".into(),
            category_anchor_selector: r#"a[href*="contentParams"]"#.into(),
            listing_anchor_selector: r#"a[href*="/stocks/"]"#.into(),
            listing_probe_selector: r#"a[href*="/stocks/A"]"#.into(),
            listing_href_pattern: r"/stocks/(A?\d{6})".into(),
            pagination_control_selector: "button".into(),
            boundary_marker: "그 외 회사".into(),
            currency_suffix: "원".into(),
            noise_phrases: vec!["개 종목".into(), "종목 상승".into()],
            landing_tab_selector: "button".into(),
            landing_tab_label: Some("지금 뜨는 카테고리".into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub max_attempts: u32,
    pub base_wait_ms: u64,
    pub poll_interval_ms: u64,
    pub stable_polls: u32,
    pub settle_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_wait_ms: 5_000,
            poll_interval_ms: 250,
            stable_polls: 2,
            settle_timeout_ms: 4_000,
            discovery_timeout_ms: 10_000,
        }
    }
}

impl Timing {
    pub fn base_wait(&self) -> Duration {
        Duration::from_millis(self.base_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    pub workers: usize,
    pub max_pages: u32,
    pub category_timeout_ms: u64,
    pub fail_fast: bool,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            max_pages: 50,
            category_timeout_ms: 300_000,
            fail_fast: false,
        }
    }
}

impl CollectorSettings {
    pub fn category_timeout(&self) -> Duration {
        Duration::from_millis(self.category_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub user_agent: String,
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
            navigation_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub sink: SinkKind,
    pub json_path: PathBuf,
    pub sqlite_path: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            sink: SinkKind::Json,
            json_path: PathBuf::from("data/theme_stocks.json"),
            sqlite_path: PathBuf::from("data/theme_stocks.sqlite"),
        }
    }
}
