use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Key under `[oracle.providers.*]`, or `"offline"` for the keyword planner.
    pub active_provider: String,
    /// Use the offline planner when the active provider has no credential.
    #[serde(default = "default_true")]
    pub offline_fallback: bool,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert("anthropic".to_string(), ProviderEntry::default());
        Self {
            active_provider: "anthropic".to_string(),
            offline_fallback: true,
            providers,
            timeouts: TimeoutsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Wire protocol; only "anthropic" is understood.
    #[serde(default = "default_adapter")]
    pub adapter: String,
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,
    /// Optional API key stored in config.toml (falls back to env var TABPILOT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ProviderEntry {
    fn default() -> Self {
        Self {
            adapter: default_adapter(),
            api_base: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-3-7-sonnet-20250219".to_string(),
            max_tokens: default_max_tokens(),
            anthropic_version: default_anthropic_version(),
            api_key: None,
        }
    }
}

fn default_adapter() -> String {
    "anthropic".to_string()
}

fn default_max_tokens() -> u32 {
    10_000
}

fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

/// Per-directive request budgets, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_plan_secs")]
    pub plan_secs: u64,
    #[serde(default = "default_replan_secs")]
    pub replan_secs: u64,
    #[serde(default = "default_plan_secs")]
    pub recovery_secs: u64,
}

impl TimeoutsConfig {
    pub fn plan(&self) -> Duration {
        Duration::from_secs(self.plan_secs)
    }

    pub fn replan(&self) -> Duration {
        Duration::from_secs(self.replan_secs)
    }

    pub fn recovery(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            plan_secs: default_plan_secs(),
            replan_secs: default_replan_secs(),
            recovery_secs: default_plan_secs(),
        }
    }
}

fn default_plan_secs() -> u64 {
    60
}

fn default_replan_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Debounce between consecutive steps.
    #[serde(default = "default_step_pause", rename = "step_pause_ms", with = "millis")]
    pub step_pause: Duration,
    /// Fixed delay before each recovery attempt. Not backed off.
    #[serde(default = "default_retry_delay", rename = "retry_delay_ms", with = "millis")]
    pub retry_delay: Duration,
    #[serde(default = "default_navigation_settle", rename = "navigation_settle_ms", with = "millis")]
    pub navigation_settle: Duration,
    #[serde(default = "default_true")]
    pub replan_after_navigation: bool,
}

impl ExecutorConfig {
    /// Same policy with every wait set to zero.
    pub fn without_delays(self) -> Self {
        Self {
            step_pause: Duration::ZERO,
            retry_delay: Duration::ZERO,
            navigation_settle: Duration::ZERO,
            ..self
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            step_pause: default_step_pause(),
            retry_delay: default_retry_delay(),
            navigation_settle: default_navigation_settle(),
            replan_after_navigation: true,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_step_pause() -> Duration {
    Duration::from_millis(1000)
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_navigation_settle() -> Duration {
    Duration::from_millis(2000)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_true")]
    pub record_history: bool,
    /// Overrides the per-user data directory for session files.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            record_history: true,
            directory: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn resolve_config_path() -> PilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("tabpilot").join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config directory");
            return Ok(candidate);
        }
    }

    Err(PilotError::Config(
        "config.toml not found next to executable, in working directory, or in the user config directory".into(),
    ))
}

pub fn parse_config(content: &str) -> PilotResult<AppConfig> {
    Ok(toml::from_str(content)?)
}

pub fn load_config() -> PilotResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), provider = %config.oracle.active_provider, "config loaded");
    Ok(config)
}
