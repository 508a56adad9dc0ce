// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery attempt accounting.
//!
//! Attempts are immutable once written; `(message_id, attempt_number)` is the
//! primary key, so attempt numbers are strictly increasing per message.

use helplane_core::HelplaneError;
use helplane_core::types::{DeliveryAttempt, MessageId};
use rusqlite::params;

use crate::database::Database;
use crate::queries::column_enum;

/// Record one send attempt.
pub async fn record_attempt(
    db: &Database,
    attempt: &DeliveryAttempt,
) -> Result<(), HelplaneError> {
    let a = attempt.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO delivery_attempts
                 (message_id, attempt_number, status, error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    a.message_id,
                    a.attempt_number,
                    a.status.to_string(),
                    a.error,
                    a.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All attempts for a message, in attempt order.
pub async fn attempts_for_message(
    db: &Database,
    message_id: &MessageId,
) -> Result<Vec<DeliveryAttempt>, HelplaneError> {
    let message_id = message_id.0.clone();
    db.connection()
        .call(move |conn| -> Result<Vec<DeliveryAttempt>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT message_id, attempt_number, status, error, created_at
                 FROM delivery_attempts WHERE message_id = ?1
                 ORDER BY attempt_number ASC",
            )?;
            let rows = stmt.query_map(params![message_id], |row| {
                Ok(DeliveryAttempt {
                    message_id: row.get(0)?,
                    attempt_number: row.get(1)?,
                    status: column_enum(2, row.get(2)?)?,
                    error: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            let mut attempts = Vec::new();
            for row in rows {
                attempts.push(row?);
            }
            Ok(attempts)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
