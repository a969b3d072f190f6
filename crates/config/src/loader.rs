use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::ConsoleConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "chatdesk.toml",
    "chatdesk.yaml",
    "chatdesk.yml",
    "chatdesk.json",
];

/// Env var overriding `backend.base_url`.
pub const BACKEND_URL_ENV: &str = "CHATDESK_BACKEND_URL";
/// Env var overriding `backend.api_token`.
pub const API_TOKEN_ENV: &str = "CHATDESK_API_TOKEN";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<ConsoleConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./chatdesk.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/chatdesk/chatdesk.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ConsoleConfig::default()` if no config file is found or the
/// file fails to parse. Env overrides are applied in both cases.
pub fn discover_and_load() -> ConsoleConfig {
    let mut config = ConsoleConfig::default();
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => config = cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    apply_env_overrides(config, |name| std::env::var(name).ok())
}

/// Apply `CHATDESK_*` env overrides on top of a loaded config.
pub fn apply_env_overrides(
    mut config: ConsoleConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ConsoleConfig {
    if let Some(url) = lookup(BACKEND_URL_ENV).filter(|v| !v.trim().is_empty()) {
        debug!(env = BACKEND_URL_ENV, "backend url overridden from environment");
        config.backend.base_url = url.trim().to_string();
    }
    if let Some(token) = lookup(API_TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
        debug!(env = API_TOKEN_ENV, "api token overridden from environment");
        config.backend.api_token = Some(Secret::new(token.trim().to_string()));
    }
    config
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/chatdesk/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "chatdesk").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<ConsoleConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
