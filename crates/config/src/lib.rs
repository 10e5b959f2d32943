//! Configuration loading, validation, and env substitution.
//!
//! Config files: `howl.toml`, `howl.yaml`, or `howl.json`
//! Searched in `./` then `~/.config/howl/` (or the `--config-dir` override).
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw file
//! and `HOWL_*` environment overrides on top of the parsed values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, clear_config_dir, config_dir, discover_and_load, load_config,
        set_config_dir,
    },
    schema::{
        AccessConfig, ChannelsConfig, FleetConfig, HowlConfig, LocaleConfig, MetricsConfig,
        WorkersConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, check_config},
};
