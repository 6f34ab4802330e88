//! Engine configuration: environment first, optional TOML overlay.
//!
//! Env variables:
//!   STORE_BASE_URL      : score store root, e.g. "https://scores.example.com"
//!   CHECKPOINT_PATH     : last-checked file (default "last_check.txt")
//!   STORE_TIMEOUT_SECS  : per-request HTTP timeout (default 20)
//!   ENGINE_CONFIG_PATH  : path to a TOML file carrying the same keys
//!
//! A value set in the environment wins over the TOML file.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
struct FileConfig {
  #[serde(default)]
  store_base_url: Option<String>,
  #[serde(default)]
  checkpoint_path: Option<String>,
  #[serde(default)]
  store_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
  pub store_base_url: String,
  pub checkpoint_path: String,
  pub store_timeout_secs: u64,
}

impl EngineConfig {
  /// Resolve configuration. Fails only when no store URL is available at
  /// all; everything else has a default.
  pub fn from_env() -> Result<Self, String> {
    let file = load_file_config_from_env().unwrap_or_default();

    let store_base_url = std::env::var("STORE_BASE_URL")
      .ok()
      .or(file.store_base_url)
      .ok_or_else(|| "STORE_BASE_URL is not set (env or TOML)".to_string())?;
    let checkpoint_path = std::env::var("CHECKPOINT_PATH")
      .ok()
      .or(file.checkpoint_path)
      .unwrap_or_else(|| "last_check.txt".into());
    let store_timeout_secs = std::env::var("STORE_TIMEOUT_SECS")
      .ok()
      .and_then(|v| v.parse::<u64>().ok())
      .or(file.store_timeout_secs)
      .unwrap_or(20);

    Ok(Self {
      store_base_url: store_base_url.trim_end_matches('/').to_string(),
      checkpoint_path,
      store_timeout_secs,
    })
  }
}

/// Attempt to load the TOML overlay from ENGINE_CONFIG_PATH. On any
/// parsing/IO error, returns None.
fn load_file_config_from_env() -> Option<FileConfig> {
  let path = std::env::var("ENGINE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<FileConfig>(&s) {
      Ok(cfg) => {
        info!(target: "scoring_engine", %path, "loaded engine config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "scoring_engine", %path, error = %e, "failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "scoring_engine", %path, error = %e, "failed to read TOML config file");
      None
    }
  }
}
