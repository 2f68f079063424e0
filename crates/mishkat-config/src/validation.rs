// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{MishkatConfig, StorageBackend};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &MishkatConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        fail(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.escalation.repeat_threshold == 0 {
        fail("escalation.repeat_threshold must be at least 1".to_string());
    }

    if config.escalation.history_limit < config.escalation.repeat_threshold {
        fail(format!(
            "escalation.history_limit ({}) must be >= escalation.repeat_threshold ({})",
            config.escalation.history_limit, config.escalation.repeat_threshold
        ));
    }

    if config.generator.timeout_ms == 0 {
        fail("generator.timeout_ms must be greater than 0".to_string());
    }

    if config.generator.cache_capacity == 0 {
        fail("generator.cache_capacity must be greater than 0".to_string());
    }

    if config.persistence.max_attempts == 0 {
        fail("persistence.max_attempts must be at least 1".to_string());
    }

    if config.persistence.base_delay_ms > config.persistence.max_delay_ms {
        fail(format!(
            "persistence.base_delay_ms ({}) must not exceed persistence.max_delay_ms ({})",
            config.persistence.base_delay_ms, config.persistence.max_delay_ms
        ));
    }

    if config.storage.backend == StorageBackend::Sqlite
        && config.storage.database_path.trim().is_empty()
    {
        fail("storage.database_path must not be empty".to_string());
    }

    let mut seen = HashSet::new();
    for (i, id) in config.operators.ids.iter().enumerate() {
        if id.trim().is_empty() {
            fail(format!("operators.ids[{i}] must not be empty"));
        } else if !seen.insert(id.as_str()) {
            fail(format!("duplicate operator id `{id}` in operators.ids"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &MishkatConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&MishkatConfig::default()).is_ok());
    }

    #[test]
    fn history_limit_below_threshold_fails() {
        let mut config = MishkatConfig::default();
        config.escalation.repeat_threshold = 3;
        config.escalation.history_limit = 2;
        assert!(messages(&config)
            .iter()
            .any(|m| m.contains("history_limit")));
    }

    #[test]
    fn zero_timeout_and_capacity_fail_together() {
        let mut config = MishkatConfig::default();
        config.generator.timeout_ms = 0;
        config.generator.cache_capacity = 0;
        let msgs = messages(&config);
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn empty_database_path_is_fine_for_memory_backend() {
        let mut config = MishkatConfig::default();
        config.storage.database_path = String::new();
        assert!(validate_config(&config).is_err());

        config.storage.backend = StorageBackend::Memory;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn duplicate_operator_ids_fail() {
        let mut config = MishkatConfig::default();
        config.operators.ids = vec!["op-1".into(), "op-1".into()];
        assert!(messages(&config)
            .iter()
            .any(|m| m.contains("duplicate operator id")));
    }

    #[test]
    fn unknown_log_level_fails() {
        let mut config = MishkatConfig::default();
        config.service.log_level = "loud".into();
        assert!(messages(&config).iter().any(|m| m.contains("log_level")));
    }
}
