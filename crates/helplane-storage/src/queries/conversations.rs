// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation CRUD operations.

use helplane_core::HelplaneError;
use helplane_core::types::{Conversation, ConversationId, CustomerId};
use rusqlite::params;

use crate::database::Database;
use crate::queries::column_enum;

const SELECT_COLUMNS: &str =
    "id, customer_id, initiating_channel, status, started_at, ended_at, sentiment, resolution";

fn row_to_conversation(row: &rusqlite::Row<'_>) -> Result<Conversation, rusqlite::Error> {
    Ok(Conversation {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        initiating_channel: column_enum(2, row.get(2)?)?,
        status: column_enum(3, row.get(3)?)?,
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
        sentiment: row.get(6)?,
        resolution: row.get(7)?,
    })
}

/// Create a new conversation.
pub async fn create_conversation(
    db: &Database,
    conversation: &Conversation,
) -> Result<(), HelplaneError> {
    let c = conversation.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO conversations
                 (id, customer_id, initiating_channel, status, started_at, ended_at, sentiment, resolution)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    c.id,
                    c.customer_id,
                    c.initiating_channel.to_string(),
                    c.status.to_string(),
                    c.started_at,
                    c.ended_at,
                    c.sentiment,
                    c.resolution,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a conversation by id.
pub async fn get_conversation(
    db: &Database,
    id: &ConversationId,
) -> Result<Option<Conversation>, HelplaneError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| -> Result<Option<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM conversations WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![id], row_to_conversation);
            match result {
                Ok(conversation) => Ok(Some(conversation)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The customer's active conversations, most recently started first.
pub async fn active_conversations(
    db: &Database,
    customer_id: &CustomerId,
) -> Result<Vec<Conversation>, HelplaneError> {
    conversations_filtered(db, customer_id, Some("active")).await
}

/// All conversations for a customer, most recently started first.
pub async fn conversations_for_customer(
    db: &Database,
    customer_id: &CustomerId,
) -> Result<Vec<Conversation>, HelplaneError> {
    conversations_filtered(db, customer_id, None).await
}

async fn conversations_filtered(
    db: &Database,
    customer_id: &CustomerId,
    status: Option<&str>,
) -> Result<Vec<Conversation>, HelplaneError> {
    let customer_id = customer_id.0.clone();
    let status = status.map(String::from);
    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut conversations = Vec::new();
            match &status {
                Some(status_filter) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM conversations
                         WHERE customer_id = ?1 AND status = ?2
                         ORDER BY started_at DESC"
                    ))?;
                    let rows =
                        stmt.query_map(params![customer_id, status_filter], row_to_conversation)?;
                    for row in rows {
                        conversations.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM conversations
                         WHERE customer_id = ?1
                         ORDER BY started_at DESC"
                    ))?;
                    let rows = stmt.query_map(params![customer_id], row_to_conversation)?;
                    for row in rows {
                        conversations.push(row?);
                    }
                }
            }
            Ok(conversations)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Close an active conversation, stamping `ended_at` and the resolution.
///
/// Closed conversations are immutable; the `AND status = 'active'` guard
/// makes a second close a no-op.
pub async fn close_conversation(
    db: &Database,
    id: &ConversationId,
    resolution: &str,
) -> Result<(), HelplaneError> {
    let id = id.0.clone();
    let resolution = resolution.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE conversations
                 SET status = 'closed',
                     ended_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     resolution = ?1
                 WHERE id = ?2 AND status = 'active'",
                params![resolution, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update a conversation's running sentiment score (a reporting field).
pub async fn update_sentiment(
    db: &Database,
    id: &ConversationId,
    sentiment: f64,
) -> Result<(), HelplaneError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE conversations SET sentiment = ?1 WHERE id = ?2",
                params![sentiment, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
