use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable that overrides `api.url`.
pub const API_URL_ENV: &str = "SPESE_API_URL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub url: String,
  /// Per-request timeout in seconds
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:3001".to_string(),
      timeout_secs: 10,
    }
  }
}

impl ApiConfig {
  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.url).map_err(|e| eyre!("Invalid API url '{}': {}", self.url, e))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Disable to bypass the response cache entirely
  pub enabled: bool,
  /// Bumping the version evicts every older partition on activate
  pub version: String,
  /// App shell paths precached on install
  pub static_assets: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      version: "v1".to_string(),
      static_assets: ["/", "/index.html", "/manifest.json", "/icon-192.svg", "/icon-512.svg"]
        .into_iter()
        .map(String::from)
        .collect(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Delay before the startup drain, in milliseconds
  pub initial_delay_ms: u64,
  /// How often `watch` probes the health endpoint, in seconds
  pub probe_interval_secs: u64,
  /// Health endpoint path, relative to `api.url`
  pub health_path: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      initial_delay_ms: 1000,
      probe_interval_secs: 15,
      health_path: "/health".to_string(),
    }
  }
}

impl SyncConfig {
  pub fn initial_delay(&self) -> Duration {
    Duration::from_millis(self.initial_delay_ms)
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs.max(1))
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite file (default: $XDG_DATA_HOME/spese-sync/offline.db)
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./spese.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/spese-sync/config.yaml
  ///
  /// Falls back to built-in defaults when no file exists. `SPESE_API_URL`
  /// is applied last.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(url) = std::env::var(API_URL_ENV) {
      config.apply_api_url(&url)?;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("spese.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("spese-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  pub fn apply_api_url(&mut self, url: &str) -> Result<()> {
    Url::parse(url).map_err(|e| eyre!("Invalid {} '{}': {}", API_URL_ENV, url, e))?;
    self.api.url = url.to_string();
    Ok(())
  }

  pub fn health_url(&self) -> Result<Url> {
    self
      .api
      .base_url()?
      .join(&self.sync.health_path)
      .map_err(|e| eyre!("Invalid health path {}: {}", self.sync.health_path, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.api.base_url().unwrap().as_str(), "http://localhost:3001/");
    assert!(config.cache.enabled);
    assert_eq!(config.cache.version, "v1");
    assert_eq!(config.cache.static_assets.len(), 5);
    assert_eq!(config.sync.initial_delay(), Duration::from_millis(1000));
    assert!(config.storage.path.is_none());
  }

  #[test]
  fn test_partial_sections_keep_other_defaults() {
    let yaml = r#"
api:
  url: https://spese.example.com
cache:
  version: v2
sync:
  probe_interval_secs: 5
storage:
  path: /tmp/spese.db
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.api.base_url().unwrap().host_str(), Some("spese.example.com"));
    assert_eq!(config.api.timeout_secs, 10);
    assert_eq!(config.cache.version, "v2");
    assert!(config.cache.enabled);
    assert_eq!(config.sync.probe_interval(), Duration::from_secs(5));
    assert_eq!(config.sync.initial_delay_ms, 1000);
    assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/spese.db")));
    assert_eq!(
      config.health_url().unwrap().as_str(),
      "https://spese.example.com/health"
    );
  }

  #[test]
  fn test_invalid_url_is_rejected() {
    let config = Config::parse("api:\n  url: not a url\n").unwrap();
    assert!(config.api.base_url().is_err());

    let mut config = Config::default();
    assert!(config.apply_api_url("::").is_err());
    config.apply_api_url("http://10.0.0.2:3001").unwrap();
    assert_eq!(config.api.base_url().unwrap().port(), Some(3001));
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/spese.yaml"))).unwrap_err();
    assert!(err.to_string().contains("not found"));
  }
}
