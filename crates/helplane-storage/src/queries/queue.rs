// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations for crash-safe, at-least-once event processing.
//!
//! Entries that exhaust their attempt budget (or are explicitly
//! dead-lettered) land on `status = 'failed'` with `last_error` context and
//! are held for manual inspection.

use helplane_core::HelplaneError;
use helplane_core::types::QueueEntry;
use rusqlite::params;

use crate::database::Database;

const SELECT_COLUMNS: &str = "id, queue_name, payload, status, attempts, max_attempts,
     last_error, created_at, updated_at, locked_until";

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<QueueEntry, rusqlite::Error> {
    Ok(QueueEntry {
        id: row.get(0)?,
        queue_name: row.get(1)?,
        payload: row.get(2)?,
        status: row.get(3)?,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        last_error: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        locked_until: row.get(9)?,
    })
}

/// Enqueue a new item. Returns the auto-generated queue entry ID.
pub async fn enqueue(
    db: &Database,
    queue_name: &str,
    payload: &str,
) -> Result<i64, HelplaneError> {
    let queue_name = queue_name.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO queue (queue_name, payload) VALUES (?1, ?2)",
                params![queue_name, payload],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Dequeue the next pending entry from the named queue.
///
/// Atomically selects the oldest pending entry and marks it as "processing"
/// with a 5-minute lock timeout. Returns `None` if the queue is empty.
pub async fn dequeue(db: &Database, queue_name: &str) -> Result<Option<QueueEntry>, HelplaneError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<QueueEntry>, rusqlite::Error> {
            // Use a transaction to atomically find + update the next pending entry.
            let tx = conn.transaction()?;

            let result = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {SELECT_COLUMNS}
                     FROM queue
                     WHERE queue_name = ?1 AND status = 'pending'
                     ORDER BY id ASC
                     LIMIT 1"
                ))?;
                stmt.query_row(params![queue_name], row_to_entry)
            };

            match result {
                Ok(entry) => {
                    tx.execute(
                        "UPDATE queue SET status = 'processing',
                         locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+5 minutes'),
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![entry.id],
                    )?;
                    tx.commit()?;

                    // Return the entry with updated status.
                    Ok(Some(QueueEntry {
                        status: "processing".to_string(),
                        ..entry
                    }))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Acknowledge successful processing of a queue entry.
///
/// Marks the entry as "completed".
pub async fn ack(db: &Database, id: i64) -> Result<(), HelplaneError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE queue SET status = 'completed',
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark a queue entry as failed, recording the error.
///
/// Increments attempts. If attempts >= max_attempts, sets status to "failed"
/// (the dead-letter path). Otherwise resets to "pending" for retry and
/// clears the lock.
pub async fn fail(db: &Database, id: i64, error: &str) -> Result<(), HelplaneError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            // First get current attempts and max_attempts.
            let (attempts, max_attempts): (i32, i32) = conn.query_row(
                "SELECT attempts, max_attempts FROM queue WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let new_attempts = attempts + 1;
            let next_status = if new_attempts >= max_attempts {
                "failed"
            } else {
                "pending"
            };
            conn.execute(
                "UPDATE queue SET status = ?1, attempts = ?2, last_error = ?3,
                 locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?4",
                params![next_status, new_attempts, error, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Route an entry straight to the dead-letter path, bypassing retries.
///
/// Used for non-retryable failures (malformed payloads) where replaying the
/// event can never succeed.
pub async fn dead_letter(db: &Database, id: i64, reason: &str) -> Result<(), HelplaneError> {
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE queue SET status = 'failed', last_error = ?1,
                 locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![reason, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Dead-lettered entries for a queue, oldest first.
pub async fn list_dead_letters(
    db: &Database,
    queue_name: &str,
) -> Result<Vec<QueueEntry>, HelplaneError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<QueueEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS}
                 FROM queue
                 WHERE queue_name = ?1 AND status = 'failed'
                 ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![queue_name], row_to_entry)?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
