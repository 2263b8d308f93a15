//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ClientSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `SSEGW_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::ClientSettings;

/// Load settings from `path` (if it exists) with env var overrides.
pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings> {
    let content = if path.exists() {
        debug!(?path, "loading client settings from file");
        Some(std::fs::read_to_string(path)?)
    } else {
        debug!(?path, "settings file not found, using defaults");
        None
    };
    let mut settings = merge_over_defaults(content.as_deref())?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Load settings from a JSON string, without env overrides.
pub fn load_settings_from_str(json: &str) -> Result<ClientSettings> {
    let settings = merge_over_defaults(Some(json))?;
    settings.validate()?;
    Ok(settings)
}

fn merge_over_defaults(content: Option<&str>) -> Result<ClientSettings> {
    let defaults = serde_json::to_value(ClientSettings::default())?;
    let merged = match content {
        Some(text) => deep_merge(defaults, serde_json::from_str(text)?),
        None => defaults,
    };
    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SSEGW_*` environment overrides.
///
/// Invalid values are ignored with a warning (falling back to file/default).
pub fn apply_env_overrides(settings: &mut ClientSettings) {
    if let Some(v) = read_env_u64("SSEGW_BATCH_DELAY_MS", 0, 60_000) {
        settings.batch_config_delay_ms = v;
    }
    if let Some(v) = read_env_bool("SSEGW_SEND_SESSION_ID") {
        settings.send_session_id = v;
    }
    if let Some(v) = read_env_string("SSEGW_SERVER_URL") {
        settings.server_url = Some(v);
    }
    if let Some(v) = read_env_u64("SSEGW_SESSION_RETRY_MS", 1, 60_000) {
        settings.session_retry_delay_ms = v;
    }
    if let Some(v) = read_env_u64("SSEGW_RECONNECT_DELAY_MS", 0, 600_000) {
        settings.reconnect_delay_ms = v;
    }
    if let Some(v) = read_env_u64("SSEGW_REQUEST_TIMEOUT_MS", 1, 600_000) {
        settings.request_timeout_ms = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}
