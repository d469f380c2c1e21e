use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::client::DEFAULT_ENDPOINT;

const CONFIG_FILE_NAME: &str = "config.toml";
const STORE_FILE_NAME: &str = "noises.db";
const ENV_CONFIG_PATH: &str = "NOISES_CONFIG_PATH";
const ENV_BACKEND_URL: &str = "NOISES_BACKEND_URL";
const ENV_STORE_PATH: &str = "NOISES_STORE_PATH";
const ENV_GENERATE_TIMEOUT: &str = "NOISES_GENERATE_TIMEOUT_SECS";

/// Application configuration.
///
/// Use [`AppConfig::load()`] to read defaults, the TOML file and the
/// environment, or [`AppConfig::builder()`] to construct one in code.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the generation service.
    pub backend_url: String,
    /// Delay between liveness probes until the backend first answers.
    pub health_interval: Duration,
    /// Give up on a generation after this long (`None` = wait forever).
    pub generate_timeout: Option<Duration>,
    /// SQLite file holding presets. `None` = in-memory (nothing persists).
    pub store_path: Option<PathBuf>,
    /// Start playback as soon as a generation succeeds.
    pub autoplay: bool,
    /// Restart playback at end-of-media.
    pub repeat: bool,
    /// Initial player volume, 0.0-1.0.
    pub volume: f32,
    /// Maximum number of saved presets (`None` = unbounded).
    pub preset_limit: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_ENDPOINT.to_string(),
            health_interval: Duration::from_secs(1),
            generate_timeout: Some(Duration::from_secs(600)),
            store_path: default_store_path(),
            autoplay: true,
            repeat: true,
            volume: 0.8,
            preset_limit: None,
        }
    }
}

impl AppConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Defaults, then the config file (if any), then environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`AppConfig::load()`], reading `path` instead of the usual
    /// location. An explicit path that does not exist is an error.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        match path {
            Some(path) => {
                let partial = read_partial(path)?;
                config.apply_partial(partial);
            }
            None => {
                let path = match config_file_override() {
                    Some(path) => Some(path),
                    None => Self::default_config_path().ok(),
                };
                if let Some(path) = path.filter(|p| p.exists()) {
                    let partial = read_partial(&path)?;
                    config.apply_partial(partial);
                }
            }
        }

        config.apply_env()?;
        Ok(config)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = project_dirs().ok_or_else(|| anyhow!("unable to determine config directory"))?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(url) = partial.backend_url {
            self.backend_url = url;
        }
        if let Some(ms) = partial.health_interval_ms {
            self.health_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(secs) = partial.generate_timeout_secs {
            self.generate_timeout = timeout_from_secs(secs);
        }
        if let Some(path) = partial.store_path {
            self.store_path = Some(path);
        }
        if let Some(autoplay) = partial.autoplay {
            self.autoplay = autoplay;
        }
        if let Some(repeat) = partial.repeat {
            self.repeat = repeat;
        }
        if let Some(volume) = partial.volume {
            self.volume = volume.clamp(0.0, 1.0);
        }
        if let Some(limit) = partial.preset_limit {
            self.preset_limit = Some(limit);
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = env::var(ENV_BACKEND_URL) {
            if !value.trim().is_empty() {
                self.backend_url = value.trim().to_string();
            }
        }
        if let Ok(value) = env::var(ENV_STORE_PATH) {
            if !value.trim().is_empty() {
                self.store_path = Some(PathBuf::from(value));
            }
        }
        if let Ok(value) = env::var(ENV_GENERATE_TIMEOUT) {
            if !value.trim().is_empty() {
                let secs = value
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("{} must be a whole number of seconds", ENV_GENERATE_TIMEOUT))?;
                self.generate_timeout = timeout_from_secs(secs);
            }
        }
        Ok(())
    }
}

/// Builder for [`AppConfig`].
#[derive(Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend_url = url.into();
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.config.health_interval = interval;
        self
    }

    pub fn with_generate_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.generate_timeout = timeout;
        self
    }

    /// Persist presets at `path`. Omit for the platform data directory.
    pub fn with_store_path(mut self, path: PathBuf) -> Self {
        self.config.store_path = Some(path);
        self
    }

    /// Keep presets in memory only.
    pub fn in_memory(mut self) -> Self {
        self.config.store_path = None;
        self
    }

    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.config.autoplay = autoplay;
        self
    }

    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.config.repeat = repeat;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.config.volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn with_preset_limit(mut self, limit: Option<usize>) -> Self {
        self.config.preset_limit = limit;
        self
    }

    /// Build the final [`AppConfig`].
    pub fn build(self) -> AppConfig {
        self.config
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "Noises", "Noises")
}

fn default_store_path() -> Option<PathBuf> {
    Some(
        project_dirs()
            .map(|dirs| dirs.data_dir().join(STORE_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(STORE_FILE_NAME)),
    )
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

fn config_file_override() -> Option<PathBuf> {
    let value = env::var_os(ENV_CONFIG_PATH)?;
    if value.is_empty() {
        return None;
    }
    let path = PathBuf::from(value);
    if path.is_dir() {
        return Some(path.join(CONFIG_FILE_NAME));
    }
    Some(path)
}

pub(crate) fn read_partial(path: &Path) -> Result<PartialConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    parse_partial(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_partial(contents: &str) -> Result<PartialConfig> {
    Ok(toml::from_str(contents)?)
}

#[derive(Deserialize, Default, Debug)]
#[serde(default)]
pub(crate) struct PartialConfig {
    backend_url: Option<String>,
    health_interval_ms: Option<u64>,
    generate_timeout_secs: Option<u64>,
    store_path: Option<PathBuf>,
    autoplay: Option<bool>,
    repeat: Option<bool>,
    volume: Option<f32>,
    preset_limit: Option<usize>,
}
