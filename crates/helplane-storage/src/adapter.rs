// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the SupportStore trait.

use async_trait::async_trait;
use tracing::debug;

use helplane_config::model::StorageConfig;
use helplane_core::types::{
    Channel, ChannelMetrics, Conversation, ConversationId, Customer, CustomerId,
    DeliveryAttempt, DeliveryStatus, Identifier, IdentifierKind, Message, MessageId,
    MessagePage, QueueEntry, Ticket, TicketId, TicketStatus,
};
use helplane_core::{HelplaneError, SupportStore};

use crate::database::Database;
use crate::queries;

/// SQLite-backed support store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. All writes go through the single background writer
/// thread.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Open the store at the configured path, running migrations if needed.
    pub async fn open(config: &StorageConfig) -> Result<Self, HelplaneError> {
        let db = Database::open(&config.database_path).await?;
        debug!(path = %config.database_path, "SQLite store opened");
        Ok(Self { db })
    }

    /// Direct access to the underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl SupportStore for SqliteStore {
    // --- Customers and identifiers ---

    async fn find_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
    ) -> Result<Option<Identifier>, HelplaneError> {
        queries::customers::find_identifier(&self.db, kind, value).await
    }

    async fn create_customer_with_identifier(
        &self,
        customer: &Customer,
        identifier: &Identifier,
    ) -> Result<(), HelplaneError> {
        queries::customers::create_customer_with_identifier(&self.db, customer, identifier).await
    }

    async fn bind_identifier(&self, identifier: &Identifier) -> Result<bool, HelplaneError> {
        queries::customers::bind_identifier(&self.db, identifier).await
    }

    async fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>, HelplaneError> {
        queries::customers::get_customer(&self.db, id).await
    }

    // --- Conversations ---

    async fn active_conversations(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Conversation>, HelplaneError> {
        queries::conversations::active_conversations(&self.db, customer_id).await
    }

    async fn conversations_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Conversation>, HelplaneError> {
        queries::conversations::conversations_for_customer(&self.db, customer_id).await
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, HelplaneError> {
        queries::conversations::get_conversation(&self.db, id).await
    }

    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), HelplaneError> {
        queries::conversations::create_conversation(&self.db, conversation).await
    }

    async fn close_conversation(
        &self,
        id: &ConversationId,
        resolution: &str,
    ) -> Result<(), HelplaneError> {
        queries::conversations::close_conversation(&self.db, id, resolution).await
    }

    async fn update_conversation_sentiment(
        &self,
        id: &ConversationId,
        sentiment: f64,
    ) -> Result<(), HelplaneError> {
        queries::conversations::update_sentiment(&self.db, id, sentiment).await
    }

    // --- Messages ---

    async fn insert_message(&self, message: &Message) -> Result<i64, HelplaneError> {
        queries::messages::insert_message(&self.db, message).await
    }

    async fn find_message_by_channel_id(
        &self,
        channel: Channel,
        channel_message_id: &str,
    ) -> Result<Option<Message>, HelplaneError> {
        queries::messages::find_by_channel_id(&self.db, channel, channel_message_id).await
    }

    async fn conversation_messages(
        &self,
        id: &ConversationId,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, HelplaneError> {
        queries::messages::messages_for_conversation(&self.db, id, limit).await
    }

    async fn message_page(
        &self,
        id: &ConversationId,
        after: Option<i64>,
        limit: i64,
    ) -> Result<MessagePage, HelplaneError> {
        queries::messages::message_page(&self.db, id, after, limit).await
    }

    async fn set_delivery_status(
        &self,
        message_id: &MessageId,
        status: DeliveryStatus,
    ) -> Result<(), HelplaneError> {
        queries::messages::set_delivery_status(&self.db, message_id, status).await
    }

    async fn set_message_external_id(
        &self,
        message_id: &MessageId,
        external_id: &str,
    ) -> Result<(), HelplaneError> {
        queries::messages::set_external_id(&self.db, message_id, external_id).await
    }

    // --- Tickets ---

    async fn ensure_ticket(&self, ticket: &Ticket) -> Result<Ticket, HelplaneError> {
        queries::tickets::ensure_ticket(&self.db, ticket).await
    }

    async fn get_ticket(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Ticket>, HelplaneError> {
        queries::tickets::get_ticket(&self.db, conversation_id).await
    }

    async fn update_ticket_status(
        &self,
        id: &TicketId,
        status: TicketStatus,
        resolution_notes: Option<&str>,
    ) -> Result<(), HelplaneError> {
        queries::tickets::update_status(&self.db, id, status, resolution_notes).await
    }

    // --- Delivery attempts ---

    async fn record_delivery_attempt(
        &self,
        attempt: &DeliveryAttempt,
    ) -> Result<(), HelplaneError> {
        queries::deliveries::record_attempt(&self.db, attempt).await
    }

    async fn delivery_attempts(
        &self,
        message_id: &MessageId,
    ) -> Result<Vec<DeliveryAttempt>, HelplaneError> {
        queries::deliveries::attempts_for_message(&self.db, message_id).await
    }

    // --- Event queue ---

    async fn enqueue(&self, queue_name: &str, payload: &str) -> Result<i64, HelplaneError> {
        queries::queue::enqueue(&self.db, queue_name, payload).await
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, HelplaneError> {
        queries::queue::dequeue(&self.db, queue_name).await
    }

    async fn ack(&self, id: i64) -> Result<(), HelplaneError> {
        queries::queue::ack(&self.db, id).await
    }

    async fn fail(&self, id: i64, error: &str) -> Result<(), HelplaneError> {
        queries::queue::fail(&self.db, id, error).await
    }

    async fn dead_letter(&self, id: i64, reason: &str) -> Result<(), HelplaneError> {
        queries::queue::dead_letter(&self.db, id, reason).await
    }

    async fn list_dead_letters(
        &self,
        queue_name: &str,
    ) -> Result<Vec<QueueEntry>, HelplaneError> {
        queries::queue::list_dead_letters(&self.db, queue_name).await
    }

    // --- Metrics ---

    async fn record_metric(
        &self,
        channel: Channel,
        latency_ms: i64,
        escalated: bool,
        tool_calls: u32,
    ) -> Result<(), HelplaneError> {
        queries::metrics::record_metric(&self.db, channel, latency_ms, escalated, tool_calls).await
    }

    async fn channel_metrics(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<ChannelMetrics>, HelplaneError> {
        queries::metrics::channel_metrics(&self.db, from, to).await
    }

    // --- Lifecycle ---

    async fn close(&self) -> Result<(), HelplaneError> {
        self.db.close().await
    }
}
