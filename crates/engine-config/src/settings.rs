use crate::{env::EnvManager, error::SettingsError};
use engine_core::retry::RetryPolicy;
use model::core::identifiers::{FarmId, parse_farm_list};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

pub const ENV_WORKERS: &str = "FARMREP_WORKERS";
pub const ENV_ENTITY_TIMEOUT: &str = "FARMREP_ENTITY_TIMEOUT_SECS";
pub const ENV_STATE_PATH: &str = "FARMREP_STATE_PATH";
pub const ENV_STORE_URL: &str = "FARMREP_STORE_URL";
pub const ENV_SOURCE_URL: &str = "FARMREP_SOURCE_URL";
pub const ENV_EXCLUDE_FARMS: &str = "FARMREP_EXCLUDE_FARMS";

/// Where runs, reports and the job log are persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreSettings {
    Sled { path: PathBuf },
    Postgres { url: String },
}

impl Default for StoreSettings {
    fn default() -> Self {
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        StoreSettings::Sled {
            path: base.join(".farmrep").join("state"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Farms processed in parallel.
    pub workers: usize,
    /// Per-farm limit; `None` waits indefinitely.
    pub entity_timeout_secs: Option<u64>,
    pub store: StoreSettings,
    /// Farm operational database. Required for real runs.
    pub source_url: Option<String>,
    pub retry: RetrySettings,
    pub exclude_farms: Vec<FarmId>,
    /// Run upstream collectors before selecting farms.
    pub wait_for_collectors: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            workers: 4,
            entity_timeout_secs: Some(600),
            store: StoreSettings::default(),
            source_url: None,
            retry: RetrySettings::default(),
            exclude_farms: Vec::new(),
            wait_for_collectors: false,
        }
    }
}

impl EngineSettings {
    /// Defaults, then the JSON file (if any), then environment overrides.
    /// The result is validated.
    pub fn load(path: Option<&Path>, env: &EnvManager) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!(path = %path.display(), "Loading engine settings");
                serde_json::from_str(&raw)?
            }
            None => EngineSettings::default(),
        };

        settings.apply_env(env)?;
        settings.validate()?;
        debug!(?settings, "Engine settings resolved");
        Ok(settings)
    }

    pub fn apply_env(&mut self, env: &EnvManager) -> Result<(), SettingsError> {
        if let Some(raw) = env.get(ENV_WORKERS) {
            self.workers = parse_number(ENV_WORKERS, raw)?;
        }
        if let Some(raw) = env.get(ENV_ENTITY_TIMEOUT) {
            let secs: u64 = parse_number(ENV_ENTITY_TIMEOUT, raw)?;
            // 0 here means "no limit"; validation rejects an explicit Some(0) from the file.
            self.entity_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(url) = env.get(ENV_STORE_URL) {
            self.store = StoreSettings::Postgres {
                url: url.to_string(),
            };
        } else if let Some(path) = env.get(ENV_STATE_PATH) {
            self.store = StoreSettings::Sled {
                path: PathBuf::from(path),
            };
        }
        if let Some(url) = env.get(ENV_SOURCE_URL) {
            self.source_url = Some(url.to_string());
        }
        if let Some(raw) = env.get(ENV_EXCLUDE_FARMS) {
            self.exclude_farms = parse_farm_list(raw)
                .map_err(|e| SettingsError::Env(format!("{ENV_EXCLUDE_FARMS}: {e}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let mut errors = Vec::new();

        if self.workers == 0 {
            errors.push("workers must be at least 1".to_string());
        }
        if self.entity_timeout_secs == Some(0) {
            errors.push("entity_timeout_secs must be greater than 0".to_string());
        }
        if self.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be at least 1".to_string());
        }
        if let StoreSettings::Postgres { url } = &self.store
            && url.trim().is_empty()
        {
            errors.push("store url must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Invalid(errors))
        }
    }

    pub fn entity_timeout(&self) -> Option<Duration> {
        self.entity_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, SettingsError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| SettingsError::Env(format!("{key}={raw}: {e}")))
}
