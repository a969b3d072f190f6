//! Console configuration: backend endpoint, credentials and network timeouts.
//!
//! Config files: `chatdesk.toml`, `chatdesk.yaml`, or `chatdesk.json`
//! Searched in `./` then `~/.config/chatdesk/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{BackendConfig, ConsoleConfig, TimeoutsConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
