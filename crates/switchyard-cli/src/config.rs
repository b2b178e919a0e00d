//! Configuration file management for switchyard.
//!
//! Provides a TOML-based config file at `~/.config/switchyard/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use switchyard_core::generation::GenerationConfig;
use switchyard_core::provider::OpenAiConfig;
use switchyard_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub events: EventsSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Left out of generated config files; usually supplied via
    /// `SWITCHYARD_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSection {
    #[serde(default = "default_max_routes")]
    pub max_routes: usize,
    #[serde(default = "default_max_tasks")]
    pub max_tasks_per_route: usize,
    #[serde(default = "default_max_work_packages")]
    pub max_work_packages_per_task: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_routes() -> usize {
    8
}

fn default_max_tasks() -> usize {
    6
}

fn default_max_work_packages() -> usize {
    6
}

fn default_timeout_secs() -> u64 {
    90
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            max_routes: default_max_routes(),
            max_tasks_per_route: default_max_tasks(),
            max_work_packages_per_task: default_max_work_packages(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsSection {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_events_enabled")]
    pub enabled: bool,
}

fn default_buffer_size() -> usize {
    switchyard_core::events::DEFAULT_BUFFER_SIZE
}

fn default_events_enabled() -> bool {
    true
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            enabled: default_events_enabled(),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the switchyard config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/switchyard` or
/// `~/.config/switchyard`. We intentionally ignore the platform-specific
/// `dirs::config_dir()` (which returns `~/Library/Application Support` on
/// macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("switchyard");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("switchyard")
}

/// Return the path to the switchyard config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix (the file may hold an API key).
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct SwitchyardConfig {
    pub db_config: DbConfig,
    /// `None` when no API key is configured; planning is then refused
    /// explicitly instead of degrading silently.
    pub provider: Option<OpenAiConfig>,
    pub generation: GenerationConfig,
    pub events_buffer_size: usize,
    pub events_enabled: bool,
}

impl SwitchyardConfig {
    /// Resolve configuration using the chain:
    /// CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `SWITCHYARD_DATABASE_URL` >
    ///   `config_file.database.url` > `DbConfig::DEFAULT_URL`
    /// - Provider: `SWITCHYARD_API_KEY` / `SWITCHYARD_PROVIDER_URL` /
    ///   `SWITCHYARD_MODEL` override the `[provider]` section; without an
    ///   API key from either source, no provider is configured.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        // DB URL resolution.
        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("SWITCHYARD_DATABASE_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let db_config = DbConfig::new(db_url);

        // Provider resolution.
        let provider_section = file_config
            .as_ref()
            .map(|cfg| cfg.provider.clone())
            .unwrap_or_default();

        let api_key = std::env::var("SWITCHYARD_API_KEY")
            .ok()
            .or_else(|| provider_section.api_key.clone());
        let base_url =
            std::env::var("SWITCHYARD_PROVIDER_URL").unwrap_or(provider_section.base_url);
        let model = std::env::var("SWITCHYARD_MODEL").unwrap_or(provider_section.model);

        let provider = api_key.map(|api_key| OpenAiConfig {
            base_url,
            api_key,
            model,
        });

        // Generation and events settings come from the file (or defaults).
        let generation_section = file_config
            .as_ref()
            .map(|cfg| cfg.generation.clone())
            .unwrap_or_default();
        let events_section = file_config
            .as_ref()
            .map(|cfg| cfg.events.clone())
            .unwrap_or_default();

        let generation = GenerationConfig {
            max_routes: generation_section.max_routes,
            max_tasks_per_route: generation_section.max_tasks_per_route,
            max_work_packages_per_task: generation_section.max_work_packages_per_task,
            provider_timeout: Duration::from_secs(generation_section.timeout_secs),
            max_attempts: generation_section.max_attempts,
        }
        .clamped();

        Ok(Self {
            db_config,
            provider,
            generation,
            events_buffer_size: events_section.buffer_size,
            events_enabled: events_section.enabled,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
