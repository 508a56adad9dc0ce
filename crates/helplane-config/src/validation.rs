// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Startup validation of loaded configuration values.
//!
//! Figment catches type errors; this pass catches values that parse but
//! cannot work, so misconfiguration fails at startup rather than mid-event.

use helplane_core::HelplaneError;

use crate::model::HelplaneConfig;

/// Validate a loaded configuration.
pub fn validate(config: &HelplaneConfig) -> Result<(), HelplaneError> {
    if config.pipeline.workers == 0 {
        return Err(HelplaneError::Config(
            "pipeline.workers must be at least 1".to_string(),
        ));
    }

    if config.continuity.window_hours < 1 {
        return Err(HelplaneError::Config(format!(
            "continuity.window_hours must be at least 1, got {}",
            config.continuity.window_hours
        )));
    }

    if !(0.0..=1.0).contains(&config.escalation.sentiment_floor) {
        return Err(HelplaneError::Config(format!(
            "escalation.sentiment_floor must be within [0.0, 1.0], got {}",
            config.escalation.sentiment_floor
        )));
    }

    if config.responder.timeout_secs == 0 {
        return Err(HelplaneError::Config(
            "responder.timeout_secs must be at least 1".to_string(),
        ));
    }

    if config.delivery.max_attempts < 1 {
        return Err(HelplaneError::Config(format!(
            "delivery.max_attempts must be at least 1, got {}",
            config.delivery.max_attempts
        )));
    }

    if config.delivery.backoff_cap_ms < config.delivery.backoff_base_ms {
        return Err(HelplaneError::Config(format!(
            "delivery.backoff_cap_ms ({}) must not be below delivery.backoff_base_ms ({})",
            config.delivery.backoff_cap_ms, config.delivery.backoff_base_ms
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        return Err(HelplaneError::Config(
            "storage.database_path must not be empty".to_string(),
        ));
    }

    Ok(())
}
