//! Application configuration for the sourcing orchestrator.
//!
//! User config lives at `~/.sourcing/sourcing.toml`.
//! CLI flags override environment variables, which override the config file,
//! which overrides defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SourcingError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sourcing.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sourcing";

// ---------------------------------------------------------------------------
// Config structs (matching sourcing.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend endpoints.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Orchestration tuning.
    #[serde(default)]
    pub workflow: WorkflowSection,
}

/// `[services]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// JSON-RPC endpoint of the identity service.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// JSON-RPC endpoint of the candidate-search service.
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// JSON-RPC endpoint of the storage service.
    #[serde(default = "default_storage_url")]
    pub storage_url: String,

    /// Value sent as the JSON-RPC `id` prefix.
    #[serde(default = "default_request_id")]
    pub request_id: String,

    /// Agent registry. When set, the three endpoints above are looked up
    /// there by agent name instead of being used as written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            search_url: default_search_url(),
            storage_url: default_storage_url(),
            request_id: default_request_id(),
            registry_url: None,
        }
    }
}

fn default_auth_url() -> String {
    "http://localhost:8100/a2a".into()
}
fn default_search_url() -> String {
    "http://localhost:8101/a2a".into()
}
fn default_storage_url() -> String {
    "http://localhost:8102/a2a".into()
}
fn default_request_id() -> String {
    "sourcing-orchestrator".into()
}

/// `[workflow]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSection {
    /// Maximum concurrent save calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Per-call deadline in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Retries after the first attempt for transient save failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay in ms; doubles per retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff ceiling in ms.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_concurrency() -> u32 {
    4
}
fn default_call_timeout_secs() -> u64 {
    20
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    200
}
fn default_backoff_max_ms() -> u64 {
    5_000
}

// ---------------------------------------------------------------------------
// Workflow config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime workflow configuration: merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Size of the persistence worker pool (at least 1).
    pub concurrency: usize,
    /// Deadline applied to every client call.
    pub call_timeout: Duration,
    /// Retries after the first attempt for transient save failures.
    pub max_retries: u32,
    /// First backoff delay.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_max: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for WorkflowConfig {
    fn from(config: &AppConfig) -> Self {
        let w = &config.workflow;
        Self {
            concurrency: (w.concurrency as usize).max(1),
            call_timeout: Duration::from_secs(w.call_timeout_secs),
            max_retries: w.max_retries,
            backoff_base: Duration::from_millis(w.backoff_base_ms),
            backoff_max: Duration::from_millis(w.backoff_max_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sourcing/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SourcingError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sourcing/sourcing.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk, then apply environment overrides.
/// Returns defaults (plus overrides) if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SourcingError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SourcingError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Apply `SOURCING_*` overrides using `lookup` to read variables.
///
/// Taking a lookup function keeps tests away from the process environment.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("SOURCING_AUTH_URL") {
        config.services.auth_url = url;
    }
    if let Some(url) = lookup("SOURCING_SEARCH_URL") {
        config.services.search_url = url;
    }
    if let Some(url) = lookup("SOURCING_STORAGE_URL") {
        config.services.storage_url = url;
    }
    if let Some(url) = lookup("SOURCING_REGISTRY_URL") {
        config.services.registry_url = Some(url);
    }
    if let Some(raw) = lookup("SOURCING_CONCURRENCY") {
        config.workflow.concurrency = raw.trim().parse().map_err(|_| {
            SourcingError::config(format!(
                "SOURCING_CONCURRENCY must be a positive integer, got '{raw}'"
            ))
        })?;
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SourcingError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SourcingError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SourcingError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that every service endpoint is an absolute http(s) URL and that the
/// worker pool is non-empty.
pub fn validate_endpoints(config: &AppConfig) -> Result<()> {
    let services = &config.services;
    let endpoints = [
        ("auth_url", Some(&services.auth_url)),
        ("search_url", Some(&services.search_url)),
        ("storage_url", Some(&services.storage_url)),
        ("registry_url", services.registry_url.as_ref()),
    ];

    for (name, raw) in endpoints.into_iter().filter_map(|(n, raw)| Some((n, raw?))) {
        let url = Url::parse(raw)
            .map_err(|e| SourcingError::config(format!("services.{name} '{raw}' is invalid: {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SourcingError::config(format!(
                "services.{name} must use http or https, got '{}'",
                url.scheme()
            )));
        }
    }

    if config.workflow.concurrency == 0 {
        return Err(SourcingError::config("workflow.concurrency must be at least 1"));
    }

    Ok(())
}
