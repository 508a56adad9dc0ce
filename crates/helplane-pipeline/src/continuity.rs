// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation session manager: decides whether an inbound message
//! continues an existing conversation or starts a new one.
//!
//! Continuity is cross-channel: an active conversation within the window is
//! reused regardless of which channel originated it. A stale active
//! conversation is closed with resolution `idle_timeout` when a new one is
//! created, preserving the one-active-conversation invariant.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use helplane_bus::{EventBus, PipelineEvent};
use helplane_core::types::{
    Channel, Conversation, ConversationId, ConversationStatus, CustomerId,
};
use helplane_core::{HelplaneError, SupportStore};

/// Attaches inbound messages to conversations using the continuity window.
pub struct SessionManager {
    store: Arc<dyn SupportStore>,
    bus: EventBus,
    window: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SupportStore>, bus: EventBus, window_hours: i64) -> Self {
        Self {
            store,
            bus,
            window: Duration::hours(window_hours),
        }
    }

    /// Attach an inbound message to the customer's conversation, creating a
    /// new one when no active, in-window conversation exists.
    pub async fn attach(
        &self,
        customer_id: &CustomerId,
        channel: Channel,
        received_at: DateTime<Utc>,
    ) -> Result<ConversationId, HelplaneError> {
        let active = self.store.active_conversations(customer_id).await?;

        if active.len() > 1 {
            // Should not happen under correct locking; recover by picking the
            // most recently started and surfacing the anomaly.
            warn!(
                customer_id = %customer_id.0,
                count = active.len(),
                "multiple active conversations found"
            );
            self.bus.publish(PipelineEvent::Inconsistency {
                customer_id: customer_id.0.clone(),
                detail: format!("{} active conversations at attach time", active.len()),
            });
        }

        // active is ordered most recently started first.
        if let Some(candidate) = active.first() {
            let started_at = parse_timestamp(&candidate.started_at)?;
            if received_at - started_at <= self.window {
                debug!(
                    conversation_id = %candidate.id,
                    channel = %channel,
                    "attached to existing conversation"
                );
                return Ok(ConversationId(candidate.id.clone()));
            }

            // Stale: past the window, nothing can attach to it anymore.
            self.store
                .close_conversation(&ConversationId(candidate.id.clone()), "idle_timeout")
                .await?;
            info!(
                conversation_id = %candidate.id,
                "closed idle conversation past continuity window"
            );
        }

        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            customer_id: customer_id.0.clone(),
            initiating_channel: channel,
            status: ConversationStatus::Active,
            started_at: received_at.to_rfc3339(),
            ended_at: None,
            sentiment: 0.5,
            resolution: None,
        };
        self.store.create_conversation(&conversation).await?;
        info!(
            conversation_id = %conversation.id,
            customer_id = %customer_id.0,
            channel = %channel,
            "created new conversation"
        );
        Ok(ConversationId(conversation.id))
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, HelplaneError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| HelplaneError::Internal(format!("stored timestamp {value:?} unparseable: {e}")))
}
