// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed derived-event bus for the Helplane support engine.
//!
//! The pipeline publishes escalations, delivery outcomes, metrics, and
//! consistency warnings here for downstream observers (human-handoff
//! collaborators, operators). Delivery to observers is best-effort broadcast:
//! slow subscribers may miss events, and processing never blocks on them.
//! The durable record always lives in storage; the bus is a notification
//! surface, not a source of truth.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use helplane_core::types::{Channel, DeliveryStatus, MessageRole};

/// A compact view of one message inside an escalation snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
}

/// Derived events published by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A ticket escalated to human handling.
    Escalated {
        ticket_id: String,
        conversation_id: String,
        reason: String,
        urgency: String,
        /// Recent conversation history for the human taking over.
        snapshot: Vec<SnapshotMessage>,
    },
    /// Terminal (or per-attempt) outcome of an outbound delivery.
    DeliveryOutcome {
        message_id: String,
        channel: Channel,
        status: DeliveryStatus,
        attempt_number: i64,
        error: Option<String>,
    },
    /// Per-processed-event metrics sample.
    Metrics {
        channel: Channel,
        latency_ms: i64,
        escalated: bool,
        tool_calls: u32,
    },
    /// Defensive-path warning: persisted state violated an invariant the
    /// pipeline recovered from (e.g. multiple active conversations).
    Inconsistency {
        customer_id: String,
        detail: String,
    },
    /// An event was routed to the dead-letter path.
    DeadLettered {
        entry_id: i64,
        reason: String,
    },
}

/// Envelope stamped onto every published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    pub at: String,
    pub event: PipelineEvent,
}

/// Broadcast bus handle. Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a bus retaining up to `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Publish an event, returning the number of subscribers that will see it.
    ///
    /// Publishing with no subscribers is not an error; the event is simply
    /// dropped from the bus (it is already durable in storage where it
    /// matters).
    pub fn publish(&self, event: PipelineEvent) -> usize {
        let envelope = EventEnvelope {
            id: uuid::Uuid::new_v4().to_string(),
            at: Utc::now().to_rfc3339(),
            event,
        };
        match self.tx.send(envelope) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("event published with no subscribers");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
