// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery tracker: outbound sends with retry, backoff, and per-attempt
//! accounting.
//!
//! Transient failures retry with exponential backoff up to a bounded attempt
//! count; permanent failures stop immediately. Every try is recorded as a
//! `DeliveryAttempt` row, and the terminal outcome is published on the bus.
//! Delivery failure never rolls back conversation or ticket state: the
//! interaction happened, only the reply did not arrive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use helplane_bus::{EventBus, PipelineEvent};
use helplane_config::model::DeliveryConfig;
use helplane_core::types::{
    Channel, DeliveryAttempt, DeliveryStatus, Message, MessageId,
};
use helplane_core::{ChannelSender, HelplaneError, SupportStore};

/// Bounded-retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: i64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base_ms: config.backoff_base_ms,
            backoff_cap_ms: config.backoff_cap_ms,
        }
    }

    /// Backoff before retrying after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: i64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.backoff_cap_ms);
        Duration::from_millis(ms)
    }
}

/// Sends outbound messages through per-channel sender adapters and accounts
/// for every attempt.
pub struct DeliveryTracker {
    store: Arc<dyn SupportStore>,
    bus: EventBus,
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    policy: RetryPolicy,
}

impl DeliveryTracker {
    pub fn new(store: Arc<dyn SupportStore>, bus: EventBus, policy: RetryPolicy) -> Self {
        Self {
            store,
            bus,
            senders: HashMap::new(),
            policy,
        }
    }

    /// Register the sender for its channel. One sender per channel; a later
    /// registration replaces the earlier one.
    pub fn register_sender(&mut self, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(sender.channel(), sender);
    }

    /// Deliver an outbound message to `destination`, retrying transient
    /// failures. Returns the terminal delivery status.
    pub async fn deliver(
        &self,
        message: &Message,
        destination: &str,
    ) -> Result<DeliveryStatus, HelplaneError> {
        let message_id = MessageId(message.id.clone());

        let Some(sender) = self.senders.get(&message.channel) else {
            // No adapter for this channel is a permanent condition.
            let error = format!("no sender registered for channel {}", message.channel);
            self.record(&message_id, 1, DeliveryStatus::Failed, Some(&error))
                .await?;
            return self
                .finish_failed(&message_id, message.channel, 1, &error)
                .await;
        };

        // Attempt numbering continues past earlier deliver() calls for the
        // same message, so numbers stay strictly increasing.
        let base = self.store.delivery_attempts(&message_id).await?.len() as i64;
        let budget = self.policy.max_attempts - base;
        if budget <= 0 {
            let error = "delivery attempt budget already exhausted".to_string();
            return self
                .finish_failed(&message_id, message.channel, base, &error)
                .await;
        }

        let mut last_error = String::new();
        for try_number in 1..=budget {
            let attempt_number = base + try_number;
            match sender.send(destination, &message.content).await {
                Ok(receipt) => {
                    self.record(&message_id, attempt_number, DeliveryStatus::Delivered, None)
                        .await?;
                    self.store
                        .set_message_external_id(&message_id, &receipt.external_id)
                        .await?;
                    self.store
                        .set_delivery_status(&message_id, DeliveryStatus::Delivered)
                        .await?;
                    self.bus.publish(PipelineEvent::DeliveryOutcome {
                        message_id: message_id.0.clone(),
                        channel: message.channel,
                        status: DeliveryStatus::Delivered,
                        attempt_number,
                        error: None,
                    });
                    debug!(
                        message_id = %message_id.0,
                        attempt = attempt_number,
                        external_id = %receipt.external_id,
                        "delivered"
                    );
                    return Ok(DeliveryStatus::Delivered);
                }
                Err(HelplaneError::DeliveryPermanent(reason)) => {
                    self.record(
                        &message_id,
                        attempt_number,
                        DeliveryStatus::Failed,
                        Some(&reason),
                    )
                    .await?;
                    warn!(message_id = %message_id.0, error = %reason, "permanent delivery failure");
                    return self
                        .finish_failed(&message_id, message.channel, attempt_number, &reason)
                        .await;
                }
                Err(e) => {
                    // Transient (or unclassified) failure: record and retry.
                    last_error = e.to_string();
                    self.record(
                        &message_id,
                        attempt_number,
                        DeliveryStatus::Failed,
                        Some(&last_error),
                    )
                    .await?;
                    debug!(
                        message_id = %message_id.0,
                        attempt = attempt_number,
                        error = %last_error,
                        "transient delivery failure"
                    );
                    if try_number < budget {
                        tokio::time::sleep(self.policy.backoff(try_number)).await;
                    }
                }
            }
        }

        warn!(
            message_id = %message_id.0,
            attempts = self.policy.max_attempts,
            "delivery retries exhausted"
        );
        self.finish_failed(&message_id, message.channel, base + budget, &last_error)
            .await
    }

    /// Mark a message undeliverable without any send attempt (no usable
    /// destination).
    pub async fn mark_undeliverable(
        &self,
        message: &Message,
        reason: &str,
    ) -> Result<(), HelplaneError> {
        let message_id = MessageId(message.id.clone());
        warn!(message_id = %message_id.0, reason = %reason, "message undeliverable");
        self.finish_failed(&message_id, message.channel, 0, reason)
            .await?;
        Ok(())
    }

    async fn record(
        &self,
        message_id: &MessageId,
        attempt_number: i64,
        status: DeliveryStatus,
        error: Option<&str>,
    ) -> Result<(), HelplaneError> {
        self.store
            .record_delivery_attempt(&DeliveryAttempt {
                message_id: message_id.0.clone(),
                attempt_number,
                status,
                error: error.map(String::from),
                created_at: Utc::now().to_rfc3339(),
            })
            .await
    }

    async fn finish_failed(
        &self,
        message_id: &MessageId,
        channel: Channel,
        attempt_number: i64,
        error: &str,
    ) -> Result<DeliveryStatus, HelplaneError> {
        self.store
            .set_delivery_status(message_id, DeliveryStatus::Failed)
            .await?;
        self.bus.publish(PipelineEvent::DeliveryOutcome {
            message_id: message_id.0.clone(),
            channel,
            status: DeliveryStatus::Failed,
            attempt_number,
            error: Some(error.to_string()),
        });
        Ok(DeliveryStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helplane_core::types::{
        Conversation, ConversationStatus, Customer, Identifier, IdentifierKind,
        MessageDirection, MessageRole, SendReceipt,
    };
    use helplane_test_utils::MockSender;

    async fn setup(
    ) -> (Arc<dyn SupportStore>, EventBus, Message, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = helplane_config::model::StorageConfig {
            database_path: dir.path().join("test.db").to_str().unwrap().to_string(),
            wal_mode: true,
        };
        let store: Arc<dyn SupportStore> =
            Arc::new(helplane_storage::SqliteStore::open(&config).await.unwrap());

        store
            .create_customer_with_identifier(
                &Customer {
                    id: "cust-1".to_string(),
                    email: Some("a@x.com".to_string()),
                    phone: None,
                    display_name: None,
                    created_at: "2026-01-01T00:00:00.000Z".to_string(),
                },
                &Identifier {
                    kind: IdentifierKind::Email,
                    value: "a@x.com".to_string(),
                    customer_id: "cust-1".to_string(),
                    verified: false,
                    created_at: "2026-01-01T00:00:00.000Z".to_string(),
                },
            )
            .await
            .unwrap();
        store
            .create_conversation(&Conversation {
                id: "conv-1".to_string(),
                customer_id: "cust-1".to_string(),
                initiating_channel: Channel::Email,
                status: ConversationStatus::Active,
                started_at: "2026-01-01T00:00:00.000Z".to_string(),
                ended_at: None,
                sentiment: 0.5,
                resolution: None,
            })
            .await
            .unwrap();

        let message = Message {
            seq: 0,
            id: "out-1".to_string(),
            conversation_id: "conv-1".to_string(),
            channel: Channel::Email,
            direction: MessageDirection::Outbound,
            role: MessageRole::Agent,
            content: "Here is how to reset your password.".to_string(),
            channel_message_id: None,
            delivery_status: Some(DeliveryStatus::Pending),
            created_at: "2026-01-01T00:00:01.000Z".to_string(),
        };
        store.insert_message(&message).await.unwrap();

        (store, EventBus::new(32), message, dir)
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_cap_ms: 4,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_base_ms: 100,
            backoff_cap_ms: 350,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(4), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn successful_send_records_one_delivered_attempt() {
        let (store, bus, message, _dir) = setup().await;
        let mut events = bus.subscribe();

        let sender = Arc::new(MockSender::new(Channel::Email));
        let mut tracker = DeliveryTracker::new(store.clone(), bus, fast_policy());
        tracker.register_sender(sender.clone());

        let status = tracker.deliver(&message, "a@x.com").await.unwrap();
        assert_eq!(status, DeliveryStatus::Delivered);

        let attempts = store
            .delivery_attempts(&MessageId("out-1".into()))
            .await
            .unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, DeliveryStatus::Delivered);

        assert_eq!(sender.sent().await.len(), 1);

        let envelope = events.try_recv().unwrap();
        match envelope.event {
            PipelineEvent::DeliveryOutcome { status, .. } => {
                assert_eq!(status, DeliveryStatus::Delivered)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_failures_exhaust_after_exactly_max_attempts() {
        let (store, bus, message, _dir) = setup().await;

        let sender = Arc::new(MockSender::new(Channel::Email));
        sender.always_transient("connection reset").await;

        let mut tracker = DeliveryTracker::new(store.clone(), bus, fast_policy());
        tracker.register_sender(sender.clone());

        let status = tracker.deliver(&message, "a@x.com").await.unwrap();
        assert_eq!(status, DeliveryStatus::Failed);

        let attempts = store
            .delivery_attempts(&MessageId("out-1".into()))
            .await
            .unwrap();
        assert_eq!(attempts.len(), 3, "exactly max_attempts tries recorded");
        assert!(attempts.iter().all(|a| a.status == DeliveryStatus::Failed));
        assert_eq!(attempts[2].attempt_number, 3);

        // Message reached terminal failed status.
        let stored = store
            .find_message_by_channel_id(Channel::Email, "never-assigned")
            .await
            .unwrap();
        assert!(stored.is_none());
        let history = store
            .conversation_messages(
                &helplane_core::types::ConversationId("conv-1".into()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(history[0].delivery_status, Some(DeliveryStatus::Failed));

        // A second deliver() call does not restart the budget.
        let status = tracker.deliver(&message, "a@x.com").await.unwrap();
        assert_eq!(status, DeliveryStatus::Failed);
        let attempts = store
            .delivery_attempts(&MessageId("out-1".into()))
            .await
            .unwrap();
        assert_eq!(attempts.len(), 3, "no further attempts after exhaustion");
    }

    #[tokio::test]
    async fn transient_then_success_stops_retrying() {
        let (store, bus, message, _dir) = setup().await;

        let sender = Arc::new(MockSender::new(Channel::Email));
        sender.transient_times(2, "timeout").await;

        let mut tracker = DeliveryTracker::new(store.clone(), bus, fast_policy());
        tracker.register_sender(sender.clone());

        let status = tracker.deliver(&message, "a@x.com").await.unwrap();
        assert_eq!(status, DeliveryStatus::Delivered);

        let attempts = store
            .delivery_attempts(&MessageId("out-1".into()))
            .await
            .unwrap();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].status, DeliveryStatus::Failed);
        assert_eq!(attempts[1].status, DeliveryStatus::Failed);
        assert_eq!(attempts[2].status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn permanent_failure_stops_immediately() {
        let (store, bus, message, _dir) = setup().await;

        let sender = Arc::new(MockSender::new(Channel::Email));
        sender.always_permanent("mailbox does not exist").await;

        let mut tracker = DeliveryTracker::new(store.clone(), bus, fast_policy());
        tracker.register_sender(sender.clone());

        let status = tracker.deliver(&message, "bad@x.com").await.unwrap();
        assert_eq!(status, DeliveryStatus::Failed);

        let attempts = store
            .delivery_attempts(&MessageId("out-1".into()))
            .await
            .unwrap();
        assert_eq!(attempts.len(), 1, "permanent failures never retry");
        assert_eq!(
            attempts[0].error.as_deref(),
            Some("mailbox does not exist")
        );
    }

    #[tokio::test]
    async fn successful_send_fills_external_correlation_id() {
        let (store, bus, message, _dir) = setup().await;

        let sender = Arc::new(MockSender::new(Channel::Email));
        sender
            .script_success(SendReceipt {
                external_id: "smtp-550e".to_string(),
            })
            .await;

        let mut tracker = DeliveryTracker::new(store.clone(), bus, fast_policy());
        tracker.register_sender(sender);

        tracker.deliver(&message, "a@x.com").await.unwrap();

        let stored = store
            .find_message_by_channel_id(Channel::Email, "smtp-550e")
            .await
            .unwrap();
        assert!(stored.is_some(), "receipt id becomes the correlation id");
    }

    #[tokio::test]
    async fn missing_sender_is_a_permanent_failure() {
        let (store, bus, message, _dir) = setup().await;
        let tracker = DeliveryTracker::new(store.clone(), bus, fast_policy());

        let status = tracker.deliver(&message, "a@x.com").await.unwrap();
        assert_eq!(status, DeliveryStatus::Failed);

        let attempts = store
            .delivery_attempts(&MessageId("out-1".into()))
            .await
            .unwrap();
        assert_eq!(attempts.len(), 1);
    }
}
