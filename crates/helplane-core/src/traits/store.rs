// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repository trait backing the pipeline.
//!
//! Every method is one short, scoped read or write; no method spans a slow
//! external call. The pipeline never holds long-lived mutable collections --
//! all shared state lives behind this seam.

use async_trait::async_trait;

use crate::error::HelplaneError;
use crate::types::{
    Channel, ChannelMetrics, Conversation, ConversationId, Customer, CustomerId,
    DeliveryAttempt, DeliveryStatus, Identifier, IdentifierKind, Message, MessageId,
    MessagePage, QueueEntry, Ticket, TicketId, TicketStatus,
};

/// Transactional storage for customers, identifiers, conversations, messages,
/// tickets, delivery attempts, the event queue, and the metrics table.
#[async_trait]
pub trait SupportStore: Send + Sync {
    // --- Customers and identifiers ---

    /// Exact lookup of an identifier by `(kind, value)`.
    async fn find_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
    ) -> Result<Option<Identifier>, HelplaneError>;

    /// Atomically create a customer together with its first identifier.
    ///
    /// Fails with [`HelplaneError::IdentityConflict`] when the identifier's
    /// `(kind, value)` already exists; callers re-fetch on conflict.
    async fn create_customer_with_identifier(
        &self,
        customer: &Customer,
        identifier: &Identifier,
    ) -> Result<(), HelplaneError>;

    /// Bind an additional identifier to an existing customer.
    ///
    /// Insert-or-ignore semantics: returns `true` when a row was inserted,
    /// `false` when the `(kind, value)` pair already existed.
    async fn bind_identifier(&self, identifier: &Identifier) -> Result<bool, HelplaneError>;

    async fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>, HelplaneError>;

    // --- Conversations ---

    /// The customer's active conversations, most recently started first.
    async fn active_conversations(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Conversation>, HelplaneError>;

    /// All conversations for a customer, most recently started first.
    async fn conversations_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Conversation>, HelplaneError>;

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, HelplaneError>;

    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), HelplaneError>;

    /// Close a conversation with the given resolution, stamping `ended_at`.
    async fn close_conversation(
        &self,
        id: &ConversationId,
        resolution: &str,
    ) -> Result<(), HelplaneError>;

    async fn update_conversation_sentiment(
        &self,
        id: &ConversationId,
        sentiment: f64,
    ) -> Result<(), HelplaneError>;

    // --- Messages ---

    /// Insert a message, returning its insertion sequence number.
    async fn insert_message(&self, message: &Message) -> Result<i64, HelplaneError>;

    /// Idempotency lookup by `(channel, channel_message_id)`.
    async fn find_message_by_channel_id(
        &self,
        channel: Channel,
        channel_message_id: &str,
    ) -> Result<Option<Message>, HelplaneError>;

    /// Ordered message history for a conversation (`created_at`, then seq).
    async fn conversation_messages(
        &self,
        id: &ConversationId,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, HelplaneError>;

    /// Cursor-paginated message history; `after` is a message seq.
    async fn message_page(
        &self,
        id: &ConversationId,
        after: Option<i64>,
        limit: i64,
    ) -> Result<MessagePage, HelplaneError>;

    async fn set_delivery_status(
        &self,
        message_id: &MessageId,
        status: DeliveryStatus,
    ) -> Result<(), HelplaneError>;

    /// Fill an outbound message's external correlation id from the sender
    /// receipt.
    async fn set_message_external_id(
        &self,
        message_id: &MessageId,
        external_id: &str,
    ) -> Result<(), HelplaneError>;

    // --- Tickets ---

    /// Insert-or-get the ticket for a conversation.
    ///
    /// Creation happens at most once per conversation; concurrent callers
    /// all receive the same row.
    async fn ensure_ticket(&self, ticket: &Ticket) -> Result<Ticket, HelplaneError>;

    async fn get_ticket(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Ticket>, HelplaneError>;

    async fn update_ticket_status(
        &self,
        id: &TicketId,
        status: TicketStatus,
        resolution_notes: Option<&str>,
    ) -> Result<(), HelplaneError>;

    // --- Delivery attempts ---

    async fn record_delivery_attempt(
        &self,
        attempt: &DeliveryAttempt,
    ) -> Result<(), HelplaneError>;

    async fn delivery_attempts(
        &self,
        message_id: &MessageId,
    ) -> Result<Vec<DeliveryAttempt>, HelplaneError>;

    // --- Event queue ---

    /// Enqueue a raw event. Returns the queue entry id.
    async fn enqueue(&self, queue_name: &str, payload: &str) -> Result<i64, HelplaneError>;

    /// Atomically claim the next pending entry, or `None` when the queue is
    /// empty.
    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, HelplaneError>;

    /// Acknowledge successful processing.
    async fn ack(&self, id: i64) -> Result<(), HelplaneError>;

    /// Record a processing failure; the entry retries until its attempt
    /// budget is exhausted, then lands on the dead-letter path.
    async fn fail(&self, id: i64, error: &str) -> Result<(), HelplaneError>;

    /// Route an entry straight to the dead-letter path, bypassing retries.
    async fn dead_letter(&self, id: i64, reason: &str) -> Result<(), HelplaneError>;

    /// Dead-lettered entries held for manual inspection.
    async fn list_dead_letters(
        &self,
        queue_name: &str,
    ) -> Result<Vec<QueueEntry>, HelplaneError>;

    // --- Metrics ---

    async fn record_metric(
        &self,
        channel: Channel,
        latency_ms: i64,
        escalated: bool,
        tool_calls: u32,
    ) -> Result<(), HelplaneError>;

    /// Per-channel aggregates for `created_at` in `[from, to)`.
    async fn channel_metrics(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<ChannelMetrics>, HelplaneError>;

    // --- Lifecycle ---

    /// Flush and checkpoint the backing store.
    async fn close(&self) -> Result<(), HelplaneError>;
}
