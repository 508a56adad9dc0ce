// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Helplane support engine.

use thiserror::Error;

use crate::types::IdentifierKind;

/// The primary error type used across all Helplane components.
#[derive(Debug, Error)]
pub enum HelplaneError {
    /// Inbound payload is malformed or missing mandatory fields.
    /// Non-retryable; the dispatcher routes the event to the dead-letter path.
    #[error("normalization error: {0}")]
    Normalization(String),

    /// Transient race while creating a customer for a new identifier.
    /// Retryable; resolved by re-fetching the identifier row.
    #[error("identity conflict on {kind}:{value}")]
    IdentityConflict {
        kind: IdentifierKind,
        value: String,
    },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The responder did not answer within its bounded timeout.
    #[error("responder timed out after {duration:?}")]
    ResponderTimeout { duration: std::time::Duration },

    /// The responder returned an error.
    #[error("responder failure: {message}")]
    ResponderFailure {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transient delivery failure (network, timeout). Retried with backoff.
    #[error("transient delivery failure: {0}")]
    DeliveryTransient(String),

    /// Permanent delivery failure (invalid address, channel rejected).
    /// Recorded as failed, never retried.
    #[error("permanent delivery failure: {0}")]
    DeliveryPermanent(String),

    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HelplaneError {
    /// Whether the dispatcher may retry the event that produced this error.
    ///
    /// Normalization failures, permanent delivery failures, and config or
    /// internal errors never succeed on replay.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HelplaneError::IdentityConflict { .. }
                | HelplaneError::Storage { .. }
                | HelplaneError::ResponderTimeout { .. }
                | HelplaneError::ResponderFailure { .. }
                | HelplaneError::DeliveryTransient(_)
        )
    }
}
