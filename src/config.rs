use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::history::DescriptivePolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub official: OfficialConfig,
    #[serde(default)]
    pub specialist: SpecialistConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfficialConfig {
    #[serde(default = "default_official_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistConfig {
    #[serde(default = "default_specialist_url")]
    pub url: String,
    #[serde(default = "default_specialist_referer")]
    pub referer: String,
    #[serde(default = "default_specialist_edition")]
    pub edition: String,
    #[serde(default = "default_specialist_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_institution_key")]
    pub institution_key: String,
    #[serde(default = "default_city_key")]
    pub city_key: String,
    #[serde(default = "default_state_key")]
    pub state_key: String,
    #[serde(default = "default_partial_days")]
    pub partial_days: Vec<PartialDay>,
}

/// Maps one partial-result column of the specialist table onto a calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartialDay {
    pub key: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_true")]
    pub parallel: bool,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_courses")]
    pub courses: Vec<String>,
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub descriptive_policy: DescriptivePolicy,
    #[serde(default = "default_lock_stale_secs")]
    pub lock_stale_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub ledger_enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<String>,
    pub provider: Option<String>,
    pub workers: Option<usize>,
    pub sequential: bool,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/cutoff-tracker/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(data_dir) = overrides.data_dir {
            self.storage.data_dir = data_dir;
        }
        if let Some(provider) = overrides.provider {
            self.sync.provider = provider;
        }
        if let Some(workers) = overrides.workers {
            self.sync.workers = workers;
        }
        if overrides.sequential {
            self.sync.parallel = false;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    pub fn history_dir(&self) -> PathBuf {
        self.resolved_data_dir().join("history")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.resolved_data_dir().join("reports")
    }

    pub fn courses_file(&self) -> PathBuf {
        self.resolved_data_dir().join("mappings").join("courses.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolved_data_dir().join("ledger.db")
    }

    pub fn default_template() -> String {
        let template = r#"[official]
base_url = "https://sisu-api.sisu.mec.gov.br/api/v1/oferta"

[specialist]
url = "https://professorfredao.app.br/_dash-update-component"
referer = "https://professorfredao.app.br/meu-sisu"
edition = "2026_1"
timeout_secs = 20
institution_key = "IES"
city_key = "Município"
state_key = "UF"
partial_days = [
    { key = "DIA 1", date = "2026-01-20" },
    { key = "DIA 2", date = "2026-01-21" },
    { key = "DIA 3", date = "2026-01-22" },
    { key = "DIA 4", date = "2026-01-23" },
]

[http]
user_agent = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
timeout_secs = 10
connect_timeout_secs = 5
pool_size = 10

[sync]
provider = "official"
workers = 10
parallel = true
request_delay_ms = 300

[batch]
courses = ["37", "44", "63", "1806", "1", "4636", "10", "20", "22", "78", "2217", "30", "38", "41", "42", "43", "21"]
pause_ms = 1500

[history]
descriptive_policy = "first_write_wins"
lock_stale_secs = 900

[storage]
data_dir = "~/.local/share/cutoff-tracker"
ledger_enabled = false
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for OfficialConfig {
    fn default() -> Self {
        Self {
            base_url: default_official_base_url(),
        }
    }
}

impl Default for SpecialistConfig {
    fn default() -> Self {
        Self {
            url: default_specialist_url(),
            referer: default_specialist_referer(),
            edition: default_specialist_edition(),
            timeout_secs: default_specialist_timeout_secs(),
            institution_key: default_institution_key(),
            city_key: default_city_key(),
            state_key: default_state_key(),
            partial_days: default_partial_days(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            pool_size: default_pool_size(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            workers: default_workers(),
            parallel: true,
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            courses: default_batch_courses(),
            pause_ms: default_pause_ms(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            descriptive_policy: DescriptivePolicy::default(),
            lock_stale_secs: default_lock_stale_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ledger_enabled: false,
        }
    }
}

fn default_official_base_url() -> String {
    "https://sisu-api.sisu.mec.gov.br/api/v1/oferta".to_string()
}

fn default_specialist_url() -> String {
    "https://professorfredao.app.br/_dash-update-component".to_string()
}

fn default_specialist_referer() -> String {
    "https://professorfredao.app.br/meu-sisu".to_string()
}

fn default_specialist_edition() -> String {
    "2026_1".to_string()
}

fn default_specialist_timeout_secs() -> u64 {
    20
}

fn default_institution_key() -> String {
    "IES".to_string()
}

fn default_city_key() -> String {
    "Município".to_string()
}

fn default_state_key() -> String {
    "UF".to_string()
}

fn default_partial_days() -> Vec<PartialDay> {
    [
        ("DIA 1", 20),
        ("DIA 2", 21),
        ("DIA 3", 22),
        ("DIA 4", 23),
    ]
    .into_iter()
    .filter_map(|(key, day)| {
        NaiveDate::from_ymd_opt(2026, 1, day).map(|date| PartialDay {
            key: key.to_string(),
            date,
        })
    })
    .collect()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_pool_size() -> usize {
    10
}

fn default_provider() -> String {
    "official".to_string()
}

fn default_workers() -> usize {
    10
}

fn default_request_delay_ms() -> u64 {
    300
}

fn default_batch_courses() -> Vec<String> {
    [
        "37", "44", "63", "1806", "1", "4636", "10", "20", "22", "78", "2217", "30", "38", "41",
        "42", "43", "21",
    ]
    .iter()
    .map(|id| id.to_string())
    .collect()
}

fn default_pause_ms() -> u64 {
    1500
}

fn default_lock_stale_secs() -> u64 {
    900
}

fn default_data_dir() -> String {
    "~/.local/share/cutoff-tracker".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use crate::config::{Config, ConfigOverrides};
    use crate::history::DescriptivePolicy;

    #[test]
    fn template_parses_to_defaults() {
        let parsed: Config =
            toml::from_str(&Config::default_template()).expect("template should parse");
        let defaults = Config::default();
        assert_eq!(parsed.official.base_url, defaults.official.base_url);
        assert_eq!(parsed.specialist.partial_days, defaults.specialist.partial_days);
        assert_eq!(parsed.batch.courses, defaults.batch.courses);
        assert_eq!(parsed.sync.workers, 10);
        assert_eq!(
            parsed.history.descriptive_policy,
            DescriptivePolicy::FirstWriteWins
        );
    }

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let parsed: Config = toml::from_str(
            r#"
[sync]
workers = 4

[history]
descriptive_policy = "overwrite"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(parsed.sync.workers, 4);
        assert!(parsed.sync.parallel);
        assert_eq!(parsed.sync.request_delay_ms, 300);
        assert_eq!(parsed.history.descriptive_policy, DescriptivePolicy::Overwrite);
        assert_eq!(parsed.history.lock_stale_secs, 900);
    }

    #[test]
    fn overrides_replace_selected_fields() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            data_dir: Some("/tmp/scores".to_string()),
            provider: None,
            workers: Some(3),
            sequential: true,
        });
        assert_eq!(config.resolved_data_dir().to_string_lossy(), "/tmp/scores");
        assert_eq!(config.sync.provider, "official");
        assert_eq!(config.sync.workers, 3);
        assert!(!config.sync.parallel);
        assert!(config.history_dir().ends_with("history"));
    }
}
