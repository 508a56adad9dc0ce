// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket CRUD operations.
//!
//! A ticket is created at most once per conversation; the UNIQUE constraint
//! on `conversation_id` backs the insert-or-get used here. Transition
//! validation lives in the state machine, not in storage.

use helplane_core::HelplaneError;
use helplane_core::types::{ConversationId, Ticket, TicketId, TicketStatus};
use rusqlite::params;

use crate::database::Database;
use crate::queries::column_enum;

const SELECT_COLUMNS: &str = "id, conversation_id, customer_id, source_channel, category,
     priority, status, resolution_notes, created_at, updated_at";

fn row_to_ticket(row: &rusqlite::Row<'_>) -> Result<Ticket, rusqlite::Error> {
    Ok(Ticket {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        customer_id: row.get(2)?,
        source_channel: column_enum(3, row.get(3)?)?,
        category: row.get(4)?,
        priority: row.get(5)?,
        status: column_enum(6, row.get(6)?)?,
        resolution_notes: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Insert-or-get the ticket for a conversation.
///
/// `INSERT OR IGNORE` against the unique conversation_id, then a re-read:
/// concurrent callers all receive the winning row.
pub async fn ensure_ticket(db: &Database, ticket: &Ticket) -> Result<Ticket, HelplaneError> {
    let t = ticket.clone();
    db.connection()
        .call(move |conn| -> Result<Ticket, rusqlite::Error> {
            conn.execute(
                "INSERT OR IGNORE INTO tickets
                 (id, conversation_id, customer_id, source_channel, category,
                  priority, status, resolution_notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    t.id,
                    t.conversation_id,
                    t.customer_id,
                    t.source_channel.to_string(),
                    t.category,
                    t.priority,
                    t.status.to_string(),
                    t.resolution_notes,
                    t.created_at,
                    t.updated_at,
                ],
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM tickets WHERE conversation_id = ?1"
            ))?;
            stmt.query_row(params![t.conversation_id], row_to_ticket)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get the ticket for a conversation.
pub async fn get_ticket(
    db: &Database,
    conversation_id: &ConversationId,
) -> Result<Option<Ticket>, HelplaneError> {
    let conversation_id = conversation_id.0.clone();
    db.connection()
        .call(move |conn| -> Result<Option<Ticket>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM tickets WHERE conversation_id = ?1"
            ))?;
            let result = stmt.query_row(params![conversation_id], row_to_ticket);
            match result {
                Ok(ticket) => Ok(Some(ticket)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Write a ticket's status (and optional resolution notes), stamping
/// `updated_at`.
pub async fn update_status(
    db: &Database,
    id: &TicketId,
    status: TicketStatus,
    resolution_notes: Option<&str>,
) -> Result<(), HelplaneError> {
    let id = id.0.clone();
    let status = status.to_string();
    let notes = resolution_notes.map(String::from);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            match notes {
                Some(notes) => {
                    conn.execute(
                        "UPDATE tickets SET status = ?1, resolution_notes = ?2,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?3",
                        params![status, notes, id],
                    )?;
                }
                None => {
                    conn.execute(
                        "UPDATE tickets SET status = ?1,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?2",
                        params![status, id],
                    )?;
                }
            }
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
