// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./helplane.toml` > `~/.config/helplane/helplane.toml`
//! > `/etc/helplane/helplane.toml` with environment variable overrides via
//! `HELPLANE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::HelplaneConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/helplane/helplane.toml` (system-wide)
/// 3. `~/.config/helplane/helplane.toml` (user XDG config)
/// 4. `./helplane.toml` (local directory)
/// 5. `HELPLANE_*` environment variables
pub fn load_config() -> Result<HelplaneConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HelplaneConfig::default()))
        .merge(Toml::file("/etc/helplane/helplane.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("helplane/helplane.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("helplane.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<HelplaneConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HelplaneConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<HelplaneConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HelplaneConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `HELPLANE_DELIVERY_MAX_ATTEMPTS`
/// must map to `delivery.max_attempts`, not `delivery.max.attempts`.
fn env_provider() -> Env {
    Env::prefixed("HELPLANE_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: HELPLANE_CONTINUITY_WINDOW_HOURS -> "continuity_window_hours"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("pipeline_", "pipeline.", 1)
            .replacen("continuity_", "continuity.", 1)
            .replacen("escalation_", "escalation.", 1)
            .replacen("responder_", "responder.", 1)
            .replacen("delivery_", "delivery.", 1)
            .replacen("storage_", "storage.", 1);
        mapped.into()
    })
}
