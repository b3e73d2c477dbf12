use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the application's assets are served from
  /// (e.g. "https://qr.example.app")
  pub origin: String,
  /// Override for the cache database directory
  pub cache_dir: Option<PathBuf>,
  /// Document substituted when a navigation cannot reach the network
  #[serde(default = "default_fallback_document")]
  pub fallback_document: String,
}

fn default_fallback_document() -> String {
  "/index.html".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./qrcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/qrcache/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/qrcache/config.yaml\n\
                 with at least an `origin:` entry."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("qrcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("qrcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// The parsed application origin.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_applies_defaults() {
    let config: Config = serde_yaml::from_str("origin: https://qr.example.app\n").unwrap();

    assert_eq!(config.origin, "https://qr.example.app");
    assert_eq!(config.fallback_document, "/index.html");
    assert!(config.cache_dir.is_none());
    assert!(config.origin_url().is_ok());
  }

  #[test]
  fn test_full_config_parses() {
    let config: Config = serde_yaml::from_str(
      "origin: https://qr.example.app\n\
       cache_dir: /var/lib/qrcache\n\
       fallback_document: /offline.html\n",
    )
    .unwrap();

    assert_eq!(config.cache_dir, Some(PathBuf::from("/var/lib/qrcache")));
    assert_eq!(config.fallback_document, "/offline.html");
  }
}
