use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default minimum spacing between two sends to the same destination.
pub const DEFAULT_INTERVAL_SECS: u64 = 30;
/// Default total run budget, in minutes.
pub const DEFAULT_DURATION_MINS: u64 = 60;

/// Top-level config (herald.toml + HERALD_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeraldConfig {
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub broadcast: BroadcastDefaults,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            telegram: None,
            broadcast: BroadcastDefaults::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Chat IDs the operator wants Herald to consider as destinations.
    /// Bot identities cannot enumerate their chats, so the universe is
    /// declared here and validated at refresh time.
    #[serde(default)]
    pub chat_ids: Vec<i64>,
}

/// Defaults applied to a broadcast run when the CLI flags are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastDefaults {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_duration_mins")]
    pub duration_mins: u64,
    /// When true the per-destination spacing never drops below 60 s.
    #[serde(default = "bool_true")]
    pub safe_floor: bool,
    /// When true each send expands the spintax template independently.
    #[serde(default)]
    pub variation: bool,
}

impl Default for BroadcastDefaults {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            duration_mins: DEFAULT_DURATION_MINS,
            safe_floor: true,
            variation: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}
fn default_duration_mins() -> u64 {
    DEFAULT_DURATION_MINS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/herald.db", home)
}

impl HeraldConfig {
    /// Load config from a TOML file with HERALD_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.herald/herald.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: HeraldConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("HERALD_").split("_"))
            .extract()
            .map_err(|e| crate::error::HeraldError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/herald.toml", home)
}
