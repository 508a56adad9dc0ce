// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the Helplane support engine.
//!
//! Timestamps are ISO-8601 strings in stored records (matching the TEXT
//! columns they round-trip through) and `chrono::DateTime<Utc>` on the
//! canonical in-flight [`InboundMessage`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// Unique identifier for a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub String);

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// The closed set of inbound/outbound channels.
///
/// Adding a channel means adding one variant plus a normalizer mapping and a
/// sender adapter; the core control flow never changes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Chat,
    WebForm,
}

/// The kind of a channel-specific address bound to a customer.
///
/// Ordered by identity strength: email over phone over anonymous token.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Email,
    Phone,
    AnonToken,
}

/// Conversation lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Closed,
}

/// Direction of a message relative to the system.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Author role of a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Customer,
    Agent,
    System,
}

/// Ticket lifecycle status. Transitions are validated by the state machine;
/// `Resolved` and `Escalated` are terminal for automated handling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Escalated,
}

/// Delivery status of an outbound message or a single send attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
}

/// Contact evidence carried by an inbound event.
///
/// At least one field must be present for the event to normalize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEvidence {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub anon_token: Option<String>,
}

impl ContactEvidence {
    /// True when no evidence field is present.
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none() && self.anon_token.is_none()
    }

    /// The strongest available evidence: email over phone over anonymous token.
    pub fn strongest(&self) -> Option<(IdentifierKind, &str)> {
        if let Some(email) = self.email.as_deref() {
            return Some((IdentifierKind::Email, email));
        }
        if let Some(phone) = self.phone.as_deref() {
            return Some((IdentifierKind::Phone, phone));
        }
        self.anon_token
            .as_deref()
            .map(|t| (IdentifierKind::AnonToken, t))
    }

    /// All present evidence pairs, strongest first.
    pub fn all(&self) -> Vec<(IdentifierKind, &str)> {
        let mut pairs = Vec::new();
        if let Some(email) = self.email.as_deref() {
            pairs.push((IdentifierKind::Email, email));
        }
        if let Some(phone) = self.phone.as_deref() {
            pairs.push((IdentifierKind::Phone, phone));
        }
        if let Some(token) = self.anon_token.as_deref() {
            pairs.push((IdentifierKind::AnonToken, token));
        }
        pairs
    }
}

/// Canonical, channel-agnostic representation of an inbound communication.
///
/// Produced by the normalizer; the only shape the rest of the pipeline sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: Channel,
    /// External correlation id, unique per channel.
    pub channel_message_id: String,
    pub contact: ContactEvidence,
    pub subject: Option<String>,
    pub body: String,
    pub received_at: DateTime<Utc>,
    /// Channel-specific metadata bag, passed through unmodified.
    pub metadata: Option<String>,
}

/// A unique human/organization contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub display_name: Option<String>,
    pub created_at: String,
}

/// A channel-specific address bound to a customer.
///
/// `(kind, value)` is globally unique; an identifier belongs to exactly one
/// customer at a time. `verified` is informational only and never gates
/// conversation attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    pub kind: IdentifierKind,
    pub value: String,
    pub customer_id: String,
    pub verified: bool,
    pub created_at: String,
}

/// A bounded period of interaction with one customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub customer_id: String,
    pub initiating_channel: Channel,
    pub status: ConversationStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
    /// Running sentiment score in [0.0, 1.0]; 0.5 is neutral.
    pub sentiment: f64,
    pub resolution: Option<String>,
}

/// One inbound or outbound utterance.
///
/// Immutable after creation except `delivery_status` and, for outbound
/// messages, the `channel_message_id` filled from the sender receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Insertion sequence; breaks `created_at` ordering ties and serves as
    /// the pagination cursor. Assigned by storage.
    pub seq: i64,
    pub id: String,
    pub conversation_id: String,
    pub channel: Channel,
    pub direction: MessageDirection,
    pub role: MessageRole,
    pub content: String,
    /// External correlation id; unique per channel when present.
    pub channel_message_id: Option<String>,
    pub delivery_status: Option<DeliveryStatus>,
    pub created_at: String,
}

/// The work-tracking record for a conversation. Created at most once per
/// conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub conversation_id: String,
    pub customer_id: String,
    pub source_channel: Channel,
    pub category: String,
    pub priority: String,
    pub status: TicketStatus,
    pub resolution_notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One try at sending an outbound message via a channel. Immutable once
/// written; `attempt_number` is strictly increasing per message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub message_id: String,
    pub attempt_number: i64,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub created_at: String,
}

/// An entry in the crash-safe event queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub locked_until: Option<String>,
}

/// One page of a conversation's ordered message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
    /// Cursor to pass as `after` for the next page.
    pub next_cursor: Option<i64>,
}

/// Aggregated per-channel metrics for a time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMetrics {
    pub channel: Channel,
    pub events: i64,
    pub avg_latency_ms: f64,
    pub escalations: i64,
}

/// Customer context handed to the responder alongside conversation history.
#[derive(Debug, Clone)]
pub struct CustomerContext {
    pub customer: Customer,
    pub conversation: Conversation,
}

/// The responder's reply for a conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponderReply {
    pub text: String,
    pub escalate: bool,
    pub reason: Option<String>,
    #[serde(default)]
    pub tool_calls: u32,
}

/// Receipt returned by a channel sender on successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub external_id: String,
}

/// Why a ticket escalated. Rendered into `resolution_notes` and the
/// escalation event's `reason` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationReason {
    /// A policy keyword matched the inbound body.
    Keyword(String),
    /// Conversation sentiment dropped below the configured floor.
    SentimentFloor,
    /// The responder explicitly requested escalation.
    ResponderSignal,
    /// Repeated responder failure exhausted the event's retry budget.
    ProcessingFailure,
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationReason::Keyword(word) => write!(f, "keyword:{word}"),
            EscalationReason::SentimentFloor => write!(f, "sentiment_floor"),
            EscalationReason::ResponderSignal => write!(f, "responder_signal"),
            EscalationReason::ProcessingFailure => write!(f, "processing_failure"),
        }
    }
}

impl EscalationReason {
    /// Urgency label carried on the escalation event.
    pub fn urgency(&self) -> &'static str {
        match self {
            EscalationReason::Keyword(_) | EscalationReason::SentimentFloor => "high",
            EscalationReason::ResponderSignal | EscalationReason::ProcessingFailure => "medium",
        }
    }
}
