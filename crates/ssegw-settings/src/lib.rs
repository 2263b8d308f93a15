//! # ssegw-settings
//!
//! Client settings loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ClientSettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `SSEGW_*` overrides (highest priority)
//!
//! [`SettingsPatch`] is the runtime form of the same knobs, applied by the
//! connection manager's `configure` call to change defaults for connections
//! created afterwards.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings_from_path, load_settings_from_str};
pub use types::{ClientSettings, SettingsPatch};
