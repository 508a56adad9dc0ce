// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD operations.
//!
//! Ordering within a conversation is `(created_at, seq)`; seq is the
//! insertion sequence and doubles as the pagination cursor.

use helplane_core::HelplaneError;
use helplane_core::types::{
    Channel, ConversationId, DeliveryStatus, Message, MessageId, MessagePage,
};
use rusqlite::params;

use crate::database::Database;
use crate::queries::{column_enum, column_enum_opt};

const SELECT_COLUMNS: &str = "seq, id, conversation_id, channel, direction, role, content,
     channel_message_id, delivery_status, created_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, rusqlite::Error> {
    Ok(Message {
        seq: row.get(0)?,
        id: row.get(1)?,
        conversation_id: row.get(2)?,
        channel: column_enum(3, row.get(3)?)?,
        direction: column_enum(4, row.get(4)?)?,
        role: column_enum(5, row.get(5)?)?,
        content: row.get(6)?,
        channel_message_id: row.get(7)?,
        delivery_status: column_enum_opt(8, row.get(8)?)?,
        created_at: row.get(9)?,
    })
}

/// Insert a new message. Returns the assigned insertion sequence.
pub async fn insert_message(db: &Database, message: &Message) -> Result<i64, HelplaneError> {
    let m = message.clone();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO messages
                 (id, conversation_id, channel, direction, role, content,
                  channel_message_id, delivery_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    m.id,
                    m.conversation_id,
                    m.channel.to_string(),
                    m.direction.to_string(),
                    m.role.to_string(),
                    m.content,
                    m.channel_message_id,
                    m.delivery_status.map(|s| s.to_string()),
                    m.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Idempotency lookup by `(channel, channel_message_id)`.
pub async fn find_by_channel_id(
    db: &Database,
    channel: Channel,
    channel_message_id: &str,
) -> Result<Option<Message>, HelplaneError> {
    let channel = channel.to_string();
    let channel_message_id = channel_message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM messages
                 WHERE channel = ?1 AND channel_message_id = ?2"
            ))?;
            let result = stmt.query_row(params![channel, channel_message_id], row_to_message);
            match result {
                Ok(message) => Ok(Some(message)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Ordered message history for a conversation.
pub async fn messages_for_conversation(
    db: &Database,
    conversation_id: &ConversationId,
    limit: Option<i64>,
) -> Result<Vec<Message>, HelplaneError> {
    let conversation_id = conversation_id.0.clone();
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut messages = Vec::new();
            match limit {
                Some(lim) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM messages
                         WHERE conversation_id = ?1
                         ORDER BY created_at ASC, seq ASC LIMIT ?2"
                    ))?;
                    let rows = stmt.query_map(params![conversation_id, lim], row_to_message)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM messages
                         WHERE conversation_id = ?1
                         ORDER BY created_at ASC, seq ASC"
                    ))?;
                    let rows = stmt.query_map(params![conversation_id], row_to_message)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
            }
            Ok(messages)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// One page of a conversation's history, keyed by the seq cursor.
///
/// Fetches `limit + 1` rows to decide `has_more` without a second query.
pub async fn message_page(
    db: &Database,
    conversation_id: &ConversationId,
    after: Option<i64>,
    limit: i64,
) -> Result<MessagePage, HelplaneError> {
    let conversation_id = conversation_id.0.clone();
    let cursor = after.unwrap_or(0);
    db.connection()
        .call(move |conn| -> Result<MessagePage, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 AND seq > ?2
                 ORDER BY seq ASC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![conversation_id, cursor, limit + 1], row_to_message)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            let has_more = messages.len() as i64 > limit;
            if has_more {
                messages.truncate(limit as usize);
            }
            let next_cursor = if has_more {
                messages.last().map(|m| m.seq)
            } else {
                None
            };
            Ok(MessagePage {
                messages,
                has_more,
                next_cursor,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update a message's delivery status.
pub async fn set_delivery_status(
    db: &Database,
    message_id: &MessageId,
    status: DeliveryStatus,
) -> Result<(), HelplaneError> {
    let message_id = message_id.0.clone();
    let status = status.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE messages SET delivery_status = ?1 WHERE id = ?2",
                params![status, message_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fill an outbound message's external correlation id from the sender receipt.
pub async fn set_external_id(
    db: &Database,
    message_id: &MessageId,
    external_id: &str,
) -> Result<(), HelplaneError> {
    let message_id = message_id.0.clone();
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE messages SET channel_message_id = ?1 WHERE id = ?2",
                params![external_id, message_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use helplane_core::types::{
        Channel, Conversation, ConversationStatus, Customer, Identifier, IdentifierKind,
        MessageDirection, MessageRole,
    };
    use tempfile::tempdir;

    async fn setup_db_with_conversation() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let customer = Customer {
            id: "cust-1".to_string(),
            email: Some("a@x.com".to_string()),
            phone: None,
            display_name: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        };
        let identifier = Identifier {
            kind: IdentifierKind::Email,
            value: "a@x.com".to_string(),
            customer_id: "cust-1".to_string(),
            verified: false,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        };
        crate::queries::customers::create_customer_with_identifier(&db, &customer, &identifier)
            .await
            .unwrap();

        let conversation = Conversation {
            id: "conv-1".to_string(),
            customer_id: "cust-1".to_string(),
            initiating_channel: Channel::Email,
            status: ConversationStatus::Active,
            started_at: "2026-01-01T00:00:00.000Z".to_string(),
            ended_at: None,
            sentiment: 0.5,
            resolution: None,
        };
        crate::queries::conversations::create_conversation(&db, &conversation)
            .await
            .unwrap();
        (db, dir)
    }

    fn make_msg(id: &str, content: &str, timestamp: &str) -> Message {
        Message {
            seq: 0,
            id: id.to_string(),
            conversation_id: "conv-1".to_string(),
            channel: Channel::Email,
            direction: MessageDirection::Inbound,
            role: MessageRole::Customer,
            content: content.to_string(),
            channel_message_id: Some(format!("ext-{id}")),
            delivery_status: None,
            created_at: timestamp.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_list_messages_in_order() {
        let (db, _dir) = setup_db_with_conversation().await;

        let seq1 = insert_message(&db, &make_msg("m1", "hello", "2026-01-01T00:00:01.000Z"))
            .await
            .unwrap();
        let seq2 = insert_message(&db, &make_msg("m2", "again", "2026-01-01T00:00:02.000Z"))
            .await
            .unwrap();
        assert!(seq2 > seq1, "seq must be strictly increasing");

        let messages = messages_for_conversation(&db, &ConversationId("conv-1".into()), None)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m1");
        assert_eq!(messages[1].id, "m2");
        assert_eq!(messages[0].role, MessageRole::Customer);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn identical_timestamps_order_by_insertion_sequence() {
        let (db, _dir) = setup_db_with_conversation().await;
        let ts = "2026-01-01T00:00:01.000Z";
        insert_message(&db, &make_msg("m1", "first", ts)).await.unwrap();
        insert_message(&db, &make_msg("m2", "second", ts)).await.unwrap();
        insert_message(&db, &make_msg("m3", "third", ts)).await.unwrap();

        let messages = messages_for_conversation(&db, &ConversationId("conv-1".into()), None)
            .await
            .unwrap();
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_channel_message_id_rejected() {
        let (db, _dir) = setup_db_with_conversation().await;
        let mut first = make_msg("m1", "hello", "2026-01-01T00:00:01.000Z");
        first.channel_message_id = Some("ext-dup".to_string());
        insert_message(&db, &first).await.unwrap();

        let mut second = make_msg("m2", "replay", "2026-01-01T00:00:02.000Z");
        second.channel_message_id = Some("ext-dup".to_string());
        let result = insert_message(&db, &second).await;
        assert!(result.is_err(), "unique (channel, channel_message_id) must hold");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn find_by_channel_id_hits_and_misses() {
        let (db, _dir) = setup_db_with_conversation().await;
        insert_message(&db, &make_msg("m1", "hello", "2026-01-01T00:00:01.000Z"))
            .await
            .unwrap();

        let found = find_by_channel_id(&db, Channel::Email, "ext-m1")
            .await
            .unwrap();
        assert!(found.is_some());

        // Same external id on a different channel is a different event.
        let miss = find_by_channel_id(&db, Channel::Chat, "ext-m1")
            .await
            .unwrap();
        assert!(miss.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pagination_walks_the_full_history() {
        let (db, _dir) = setup_db_with_conversation().await;
        for i in 0..7 {
            insert_message(
                &db,
                &make_msg(
                    &format!("m{i}"),
                    &format!("msg {i}"),
                    &format!("2026-01-01T00:00:0{i}.000Z"),
                ),
            )
            .await
            .unwrap();
        }

        let page1 = message_page(&db, &ConversationId("conv-1".into()), None, 3)
            .await
            .unwrap();
        assert_eq!(page1.messages.len(), 3);
        assert!(page1.has_more);
        let cursor = page1.next_cursor.unwrap();

        let page2 = message_page(&db, &ConversationId("conv-1".into()), Some(cursor), 3)
            .await
            .unwrap();
        assert_eq!(page2.messages.len(), 3);
        assert!(page2.has_more);

        let page3 = message_page(
            &db,
            &ConversationId("conv-1".into()),
            page2.next_cursor,
            3,
        )
        .await
        .unwrap();
        assert_eq!(page3.messages.len(), 1);
        assert!(!page3.has_more);
        assert!(page3.next_cursor.is_none());

        let mut all: Vec<String> = Vec::new();
        for page in [&page1, &page2, &page3] {
            all.extend(page.messages.iter().map(|m| m.id.clone()));
        }
        assert_eq!(all, (0..7).map(|i| format!("m{i}")).collect::<Vec<_>>());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn exact_page_boundary_has_no_more() {
        let (db, _dir) = setup_db_with_conversation().await;
        for i in 0..3 {
            insert_message(
                &db,
                &make_msg(
                    &format!("m{i}"),
                    "x",
                    &format!("2026-01-01T00:00:0{i}.000Z"),
                ),
            )
            .await
            .unwrap();
        }

        let page = message_page(&db, &ConversationId("conv-1".into()), None, 3)
            .await
            .unwrap();
        assert_eq!(page.messages.len(), 3);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delivery_status_and_external_id_updates() {
        let (db, _dir) = setup_db_with_conversation().await;
        let mut outbound = make_msg("m1", "reply", "2026-01-01T00:00:01.000Z");
        outbound.direction = MessageDirection::Outbound;
        outbound.role = MessageRole::Agent;
        outbound.channel_message_id = None;
        outbound.delivery_status = Some(DeliveryStatus::Pending);
        insert_message(&db, &outbound).await.unwrap();

        set_delivery_status(&db, &MessageId("m1".into()), DeliveryStatus::Delivered)
            .await
            .unwrap();
        set_external_id(&db, &MessageId("m1".into()), "smtp-789")
            .await
            .unwrap();

        let found = find_by_channel_id(&db, Channel::Email, "smtp-789")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "m1");
        assert_eq!(found.delivery_status, Some(DeliveryStatus::Delivered));

        db.close().await.unwrap();
    }
}
