use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::HowlConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["howl.toml", "howl.yaml", "howl.yml", "howl.json"];

/// Override for the config directory, set from the CLI.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Use `dir` instead of the platform config directory for discovery.
pub fn set_config_dir(dir: PathBuf) {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner()) = Some(dir);
}

/// Drop a previously set override.
pub fn clear_config_dir() {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner()) = None;
}

/// Returns the config directory: the override if set, else `~/.config/howl/`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
    {
        return Some(dir);
    }
    directories::ProjectDirs::from("", "", "howl").map(|d| d.config_dir().to_path_buf())
}

/// Load config from the given path (any supported format).
///
/// A relative `locale.dir` is resolved against the file's directory.
pub fn load_config(path: &Path) -> anyhow::Result<HowlConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    let mut config = parse_config(&raw, path)?;
    if config.locale.dir.is_relative()
        && let Some(parent) = path.parent()
    {
        config.locale.dir = parent.join(&config.locale.dir);
    }
    Ok(config)
}

/// Discover and load config from standard locations, then apply `HOWL_*`
/// environment overrides.
///
/// Search order:
/// 1. `./howl.{toml,yaml,yml,json}` (project-local)
/// 2. `<config dir>/howl.{toml,yaml,yml,json}`
///
/// Falls back to `HowlConfig::default()` if no file is found or it fails to
/// parse.
pub fn discover_and_load() -> HowlConfig {
    let config = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                HowlConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        HowlConfig::default()
    };
    apply_env_overrides(config)
}

/// Apply `HOWL_*` environment variables on top of a loaded config.
pub fn apply_env_overrides(config: HowlConfig) -> HowlConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: HowlConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> HowlConfig {
    if let Some(token) = lookup("HOWL_TELEGRAM_TOKEN") {
        let section = config
            .channels
            .telegram
            .get_or_insert_with(|| serde_json::json!({}));
        if let Some(obj) = section.as_object_mut() {
            obj.insert("token".into(), serde_json::Value::String(token));
        }
    }
    if let Some(bind) = lookup("HOWL_WORKERS_BIND") {
        config.workers.bind = bind;
    }
    if let Some(port) = lookup("HOWL_WORKERS_PORT") {
        match port.parse() {
            Ok(p) => config.workers.port = p,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid HOWL_WORKERS_PORT"),
        }
    }
    if let Some(max) = lookup("HOWL_MAX_SESSIONS_PER_WORKER") {
        match max.parse() {
            Ok(n) => config.fleet.max_sessions_per_worker = n,
            Err(e) => {
                warn!(value = %max, error = %e, "ignoring invalid HOWL_MAX_SESSIONS_PER_WORKER");
            },
        }
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

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<HowlConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
