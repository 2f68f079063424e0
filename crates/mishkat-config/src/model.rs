// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Mishkat chat core.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Mishkat configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MishkatConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Escalation classifier tuning.
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Automated reply generation.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Retry policy for idempotent writes.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Known human operators.
    #[serde(default)]
    pub operators: OperatorsConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in logs and the shell prompt.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "mishkat".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Escalation classifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationConfig {
    /// Number of prior escalations after which every message escalates.
    #[serde(default = "default_repeat_threshold")]
    pub repeat_threshold: usize,

    /// Maximum escalation reasons retained per user (oldest dropped first).
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            repeat_threshold: default_repeat_threshold(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_repeat_threshold() -> usize {
    2
}

fn default_history_limit() -> usize {
    50
}

/// Reply generator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Upper bound on a single reply generation, in milliseconds.
    #[serde(default = "default_generator_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of cached replies kept by the in-memory cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_generator_timeout_ms(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_generator_timeout_ms() -> u64 {
    8_000
}

fn default_cache_capacity() -> usize {
    1024
}

/// Retry policy for idempotent persistence operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubled on every further retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling for the backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    2_000
}

/// Which chat store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("mishkat").join("mishkat.db"))
        .unwrap_or_else(|| "mishkat.db".into())
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Human operator roster.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorsConfig {
    /// Operator ids allowed to accept sessions. Empty means unrestricted.
    #[serde(default)]
    pub ids: Vec<String>,
}

impl OperatorsConfig {
    pub fn is_allowed(&self, operator_id: &str) -> bool {
        self.ids.is_empty() || self.ids.iter().any(|id| id == operator_id)
    }
}
