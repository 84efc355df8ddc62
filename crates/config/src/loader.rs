use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::WabridgeConfig};

/// Config file extensions tried in order, in each search location.
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Load config from the given path (any supported format), with `${VAR}`
/// substitution applied to the raw text first.
pub fn load_config(path: &Path) -> anyhow::Result<WabridgeConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);

    match path.extension().and_then(|e| e.to_str()).unwrap_or("toml") {
        "toml" => Ok(toml::from_str(&raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(&raw)?),
        "json" => Ok(serde_json::from_str(&raw)?),
        ext => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./wabridge.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/wabridge/wabridge.{toml,yaml,yml,json}` (user-global)
///
/// Returns `WabridgeConfig::default()` if no config file is found.
pub fn discover_and_load() -> WabridgeConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return WabridgeConfig::default();
    };

    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            WabridgeConfig::default()
        },
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = CONFIG_EXTENSIONS
        .iter()
        .map(|ext| PathBuf::from(format!("wabridge.{ext}")))
        .collect();

    if let Some(dirs) = directories::ProjectDirs::from("", "", "wabridge") {
        candidates.extend(
            CONFIG_EXTENSIONS
                .iter()
                .map(|ext| dirs.config_dir().join(format!("wabridge.{ext}"))),
        );
    }

    candidates.into_iter().find(|p| p.exists())
}
