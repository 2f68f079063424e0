// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./mishkat.toml` > `~/.config/mishkat/mishkat.toml` > `/etc/mishkat/mishkat.toml`
//! with environment variable overrides via `MISHKAT_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::MishkatConfig;

/// Section names that env var keys are split on.
const SECTIONS: &[&str] = &[
    "service",
    "escalation",
    "generator",
    "persistence",
    "storage",
    "operators",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/mishkat/mishkat.toml` (system-wide)
/// 3. `~/.config/mishkat/mishkat.toml` (user XDG config)
/// 4. `./mishkat.toml` (local directory)
/// 5. `MISHKAT_*` environment variables
pub fn load_config() -> Result<MishkatConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<MishkatConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MishkatConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MishkatConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MishkatConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the layered Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MishkatConfig::default()))
        .merge(Toml::file("/etc/mishkat/mishkat.toml"))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file("mishkat.toml"))
        .merge(env_provider())
}

/// `$XDG_CONFIG_HOME/mishkat/mishkat.toml`, if a config dir exists.
pub fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("mishkat/mishkat.toml"))
}

/// Env provider mapping `MISHKAT_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Only the first underscore after a known section name is turned into a dot,
/// so `MISHKAT_STORAGE_DATABASE_PATH` maps to `storage.database_path`.
fn env_provider() -> Env {
    Env::prefixed("MISHKAT_").map(|key| {
        let key_str = key.as_str().to_ascii_lowercase();
        for section in SECTIONS {
            if let Some(rest) = key_str
                .strip_prefix(section)
                .and_then(|r| r.strip_prefix('_'))
            {
                return format!("{section}.{rest}").into();
            }
        }
        key_str.into()
    })
}
