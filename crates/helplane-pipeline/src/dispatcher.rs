// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion dispatcher: the worker pool orchestrating normalize ->
//! identity -> continuity -> responder -> ticket -> delivery per inbound
//! event.
//!
//! The event queue delivers at-least-once, so every step is written to be
//! replayed: the `(channel, channel_message_id)` lookup short-circuits
//! redelivered events whose work is already done, and resumes the ones that
//! failed mid-flight (the inbound row is always committed before the
//! responder is invoked, so at worst a response is missing, never a customer
//! message). Identity resolution and conversation attachment run under a
//! per-identifier lock; no lock is held across the responder or sender
//! calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use helplane_bus::{EventBus, PipelineEvent, SnapshotMessage};
use helplane_config::HelplaneConfig;
use helplane_core::types::{
    Channel, ContactEvidence, Conversation, ConversationId, Customer, CustomerContext,
    CustomerId, EscalationReason, InboundMessage, Message, MessageDirection, MessageRole,
    QueueEntry, Ticket, TicketStatus,
};
use helplane_core::{HelplaneError, Responder, SupportStore};

use crate::continuity::SessionManager;
use crate::delivery::DeliveryTracker;
use crate::identity::IdentityResolver;
use crate::ticket::{EscalationPolicy, TicketMachine};
use crate::{normalize, sentiment};

/// Conversation history handed to the responder.
const HISTORY_LIMIT: i64 = 50;

/// Messages included in an escalation snapshot.
const SNAPSHOT_LIMIT: usize = 10;

/// Best-effort reply when processing repeatedly fails; the customer is never
/// left with total silence.
const APOLOGY_TEXT: &str = "We are sorry, but we are having trouble processing your request \
right now. Your ticket has been escalated to our support team and a human agent will follow \
up with you shortly.";

/// How one queue entry was handled.
enum Outcome {
    /// Full pipeline ran; metrics apply.
    Processed {
        channel: Channel,
        escalated: bool,
        tool_calls: u32,
    },
    /// Redelivered event whose work already happened. Ack, zero side effects.
    Duplicate,
    /// Non-retryable: route to the dead-letter path.
    DeadLetter { reason: String },
    /// Retryable failure with attempt budget remaining.
    Retry { error: String },
    /// Retryable failure on the final attempt; the ticket already escalated.
    Exhausted { error: String },
}

/// The orchestrator. Cheap to share behind an `Arc`; `run` spawns the
/// configured number of workers over the same instance.
pub struct Dispatcher {
    store: Arc<dyn SupportStore>,
    bus: EventBus,
    responder: Arc<dyn Responder>,
    identity: Arc<IdentityResolver>,
    sessions: SessionManager,
    tickets: TicketMachine,
    delivery: Arc<DeliveryTracker>,
    policy: EscalationPolicy,
    queue_name: String,
    poll_interval: Duration,
    responder_timeout: Duration,
    workers: usize,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn SupportStore>,
        bus: EventBus,
        responder: Arc<dyn Responder>,
        delivery: Arc<DeliveryTracker>,
        config: &HelplaneConfig,
    ) -> Self {
        Self {
            identity: Arc::new(IdentityResolver::new(store.clone())),
            sessions: SessionManager::new(
                store.clone(),
                bus.clone(),
                config.continuity.window_hours,
            ),
            tickets: TicketMachine::new(store.clone()),
            policy: EscalationPolicy::from_config(&config.escalation),
            queue_name: config.pipeline.inbound_queue.clone(),
            poll_interval: Duration::from_millis(config.pipeline.poll_interval_ms),
            responder_timeout: Duration::from_secs(config.responder.timeout_secs),
            workers: config.pipeline.workers,
            store,
            bus,
            responder,
            delivery,
        }
    }

    /// Run the worker pool until the cancellation token is triggered.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            workers = self.workers,
            queue = %self.queue_name,
            "dispatcher running"
        );

        let mut handles = Vec::new();
        for worker in 0..self.workers {
            let dispatcher = Arc::clone(&self);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.worker_loop(worker, cancel).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        info!("dispatcher stopped");
    }

    async fn worker_loop(&self, worker: usize, cancel: CancellationToken) {
        debug!(worker, "worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.process_next().await {
                // Queue had work; drain without sleeping.
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    error!(worker, error = %e, "worker iteration failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }
        debug!(worker, "worker stopped");
    }

    /// Claim and process one event. Returns `false` when the queue is empty.
    pub async fn process_next(&self) -> Result<bool, HelplaneError> {
        let Some(entry) = self.store.dequeue(&self.queue_name).await? else {
            return Ok(false);
        };
        self.process_entry(&entry).await?;
        Ok(true)
    }

    /// Process one claimed queue entry, then ack/fail/dead-letter it.
    pub async fn process_entry(&self, entry: &QueueEntry) -> Result<(), HelplaneError> {
        let started = Instant::now();
        match self.handle_event(entry).await {
            Ok(Outcome::Processed {
                channel,
                escalated,
                tool_calls,
            }) => {
                let latency_ms = started.elapsed().as_millis() as i64;
                if let Err(e) = self
                    .store
                    .record_metric(channel, latency_ms, escalated, tool_calls)
                    .await
                {
                    warn!(error = %e, "failed to record metric");
                }
                self.bus.publish(PipelineEvent::Metrics {
                    channel,
                    latency_ms,
                    escalated,
                    tool_calls,
                });
                self.store.ack(entry.id).await
            }
            Ok(Outcome::Duplicate) => {
                debug!(entry_id = entry.id, "duplicate event acknowledged");
                self.store.ack(entry.id).await
            }
            Ok(Outcome::DeadLetter { reason }) => {
                warn!(entry_id = entry.id, reason = %reason, "event dead-lettered");
                self.store.dead_letter(entry.id, &reason).await?;
                self.bus.publish(PipelineEvent::DeadLettered {
                    entry_id: entry.id,
                    reason,
                });
                Ok(())
            }
            Ok(Outcome::Retry { error }) => self.store.fail(entry.id, &error).await,
            Ok(Outcome::Exhausted { error }) => self.store.fail(entry.id, &error).await,
            Err(e) if !e.is_retryable() => {
                let reason = e.to_string();
                warn!(entry_id = entry.id, reason = %reason, "non-retryable failure dead-lettered");
                self.store.dead_letter(entry.id, &reason).await?;
                self.bus.publish(PipelineEvent::DeadLettered {
                    entry_id: entry.id,
                    reason,
                });
                Ok(())
            }
            Err(e) => self.store.fail(entry.id, &e.to_string()).await,
        }
    }

    async fn handle_event(&self, entry: &QueueEntry) -> Result<Outcome, HelplaneError> {
        let channel = match normalize::peek_channel(&entry.payload) {
            Ok(channel) => channel,
            Err(e) => {
                return Ok(Outcome::DeadLetter {
                    reason: e.to_string(),
                });
            }
        };
        let inbound = match normalize::normalize(&entry.payload, channel) {
            Ok(inbound) => inbound,
            Err(e) => {
                return Ok(Outcome::DeadLetter {
                    reason: e.to_string(),
                });
            }
        };

        // Idempotency: a redelivered event whose inbound row already exists.
        if let Some(existing) = self
            .store
            .find_message_by_channel_id(channel, &inbound.channel_message_id)
            .await?
        {
            return self.resume_or_skip(entry, &inbound, existing).await;
        }

        // Per-identifier serialization of the resolve-and-attach sequence.
        let guard = self.identity.serialize_on(&inbound.contact).await;
        let customer_id = self.identity.resolve(&inbound.contact).await?;
        let conversation_id = self
            .sessions
            .attach(&customer_id, channel, inbound.received_at)
            .await?;
        drop(guard);

        // Commit the inbound message before anything slow happens.
        let inbound_message = Message {
            seq: 0,
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.0.clone(),
            channel,
            direction: MessageDirection::Inbound,
            role: MessageRole::Customer,
            content: inbound.body.clone(),
            channel_message_id: Some(inbound.channel_message_id.clone()),
            delivery_status: None,
            created_at: inbound.received_at.to_rfc3339(),
        };
        self.store.insert_message(&inbound_message).await?;

        let conversation = self.fetch_conversation(&conversation_id).await?;
        let score = sentiment::blend(
            conversation.sentiment,
            sentiment::score_message(&inbound.body),
        );
        self.store
            .update_conversation_sentiment(&conversation_id, score)
            .await?;

        let ticket = self
            .tickets
            .ensure_open(&conversation, &inbound, score, &self.policy)
            .await?;

        if ticket.status == TicketStatus::Escalated {
            // A human owns this conversation now; record the message, stay
            // out of the way.
            debug!(ticket_id = %ticket.id, "ticket escalated, skipping automated response");
            return Ok(Outcome::Processed {
                channel,
                escalated: false,
                tool_calls: 0,
            });
        }

        // Deterministic hard triggers run before (and independently of) the
        // responder.
        if let Some(reason) = self.policy.hard_trigger(&inbound.body, score) {
            let ticket = self.tickets.escalate(&ticket, &reason, None).await?;
            self.publish_escalation(&ticket, &reason).await?;
            return Ok(Outcome::Processed {
                channel,
                escalated: true,
                tool_calls: 0,
            });
        }

        self.respond_and_deliver(entry, &inbound, &conversation_id, ticket)
            .await
    }

    /// Decide what a redelivered event still owes: nothing (duplicate), or
    /// the responder-and-delivery tail that a crashed worker never ran.
    async fn resume_or_skip(
        &self,
        entry: &QueueEntry,
        inbound: &InboundMessage,
        existing: Message,
    ) -> Result<Outcome, HelplaneError> {
        let conversation_id = ConversationId(existing.conversation_id.clone());
        let conversation = self.fetch_conversation(&conversation_id).await?;

        let ticket = match self.store.get_ticket(&conversation_id).await? {
            Some(ticket) => ticket,
            // Crashed between message insert and ticket creation.
            None => {
                self.tickets
                    .ensure_open(&conversation, inbound, conversation.sentiment, &self.policy)
                    .await?
            }
        };

        if matches!(
            ticket.status,
            TicketStatus::Resolved | TicketStatus::Escalated
        ) {
            return Ok(Outcome::Duplicate);
        }

        // An outbound reply after the inbound row means the work is done.
        let history = self
            .store
            .conversation_messages(&conversation_id, None)
            .await?;
        let answered = history
            .iter()
            .any(|m| m.direction == MessageDirection::Outbound && m.seq > existing.seq);
        if answered {
            return Ok(Outcome::Duplicate);
        }

        debug!(
            entry_id = entry.id,
            conversation_id = %conversation_id.0,
            "resuming redelivered event"
        );

        if let Some(reason) = self
            .policy
            .hard_trigger(&inbound.body, conversation.sentiment)
        {
            let ticket = self.tickets.escalate(&ticket, &reason, None).await?;
            self.publish_escalation(&ticket, &reason).await?;
            return Ok(Outcome::Processed {
                channel: inbound.channel,
                escalated: true,
                tool_calls: 0,
            });
        }

        self.respond_and_deliver(entry, inbound, &conversation_id, ticket)
            .await
    }

    /// The slow tail of the pipeline: responder call, outbound persistence,
    /// ticket transitions, delivery.
    async fn respond_and_deliver(
        &self,
        entry: &QueueEntry,
        inbound: &InboundMessage,
        conversation_id: &ConversationId,
        ticket: Ticket,
    ) -> Result<Outcome, HelplaneError> {
        let conversation = self.fetch_conversation(conversation_id).await?;
        let customer = self
            .store
            .get_customer(&CustomerId(conversation.customer_id.clone()))
            .await?
            .ok_or_else(|| {
                HelplaneError::Internal(format!(
                    "conversation {} references missing customer {}",
                    conversation.id, conversation.customer_id
                ))
            })?;

        let history = self
            .store
            .conversation_messages(conversation_id, Some(HISTORY_LIMIT))
            .await?;
        let context = CustomerContext {
            customer: customer.clone(),
            conversation: conversation.clone(),
        };

        let reply = match tokio::time::timeout(
            self.responder_timeout,
            self.responder.respond(&history, &context),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                return self
                    .handle_responder_failure(entry, &conversation, &ticket, inbound, &customer, e)
                    .await;
            }
            Err(_) => {
                let e = HelplaneError::ResponderTimeout {
                    duration: self.responder_timeout,
                };
                return self
                    .handle_responder_failure(entry, &conversation, &ticket, inbound, &customer, e)
                    .await;
            }
        };

        let channel = inbound.channel;
        let outbound = Message {
            seq: 0,
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.0.clone(),
            channel,
            direction: MessageDirection::Outbound,
            role: MessageRole::Agent,
            content: reply.text.clone(),
            channel_message_id: None,
            delivery_status: Some(helplane_core::types::DeliveryStatus::Pending),
            created_at: Utc::now().to_rfc3339(),
        };
        self.store.insert_message(&outbound).await?;

        // A generated response moves the ticket into in_progress.
        let ticket = self
            .tickets
            .advance(&ticket, TicketStatus::InProgress, None)
            .await?;

        // Delivery failure never rolls the interaction back.
        match destination_for(channel, &inbound.contact, &customer) {
            Some(destination) => {
                if let Err(e) = self.delivery.deliver(&outbound, &destination).await {
                    warn!(message_id = %outbound.id, error = %e, "delivery tracking failed");
                }
            }
            None => {
                self.delivery
                    .mark_undeliverable(&outbound, "no destination for channel")
                    .await?;
            }
        }

        let escalated = if reply.escalate {
            let reason = EscalationReason::ResponderSignal;
            let ticket = self
                .tickets
                .escalate(&ticket, &reason, reply.reason.as_deref())
                .await?;
            self.publish_escalation(&ticket, &reason).await?;
            true
        } else {
            self.tickets
                .advance(&ticket, TicketStatus::Resolved, Some("auto_resolved"))
                .await?;
            false
        };

        Ok(Outcome::Processed {
            channel,
            escalated,
            tool_calls: reply.tool_calls,
        })
    }

    /// Responder failure policy: retry through the queue while budget
    /// remains; on the final attempt escalate with `processing_failure` and
    /// send a best-effort apology so no inquiry is silently dropped.
    async fn handle_responder_failure(
        &self,
        entry: &QueueEntry,
        conversation: &Conversation,
        ticket: &Ticket,
        inbound: &InboundMessage,
        customer: &Customer,
        err: HelplaneError,
    ) -> Result<Outcome, HelplaneError> {
        warn!(
            entry_id = entry.id,
            attempts = entry.attempts,
            error = %err,
            "responder failure"
        );

        if entry.attempts + 1 < entry.max_attempts {
            return Ok(Outcome::Retry {
                error: err.to_string(),
            });
        }

        let reason = EscalationReason::ProcessingFailure;
        let ticket = self
            .tickets
            .escalate(ticket, &reason, Some(&err.to_string()))
            .await?;
        self.publish_escalation(&ticket, &reason).await?;

        let apology = Message {
            seq: 0,
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation.id.clone(),
            channel: inbound.channel,
            direction: MessageDirection::Outbound,
            role: MessageRole::System,
            content: APOLOGY_TEXT.to_string(),
            channel_message_id: None,
            delivery_status: Some(helplane_core::types::DeliveryStatus::Pending),
            created_at: Utc::now().to_rfc3339(),
        };
        match self.store.insert_message(&apology).await {
            Err(e) => warn!(error = %e, "failed to persist apology message"),
            Ok(_) => match destination_for(inbound.channel, &inbound.contact, customer) {
                Some(destination) => {
                    if let Err(e) = self.delivery.deliver(&apology, &destination).await {
                        warn!(error = %e, "apology delivery failed");
                    }
                }
                None => {
                    if let Err(e) = self
                        .delivery
                        .mark_undeliverable(&apology, "no destination for channel")
                        .await
                    {
                        warn!(error = %e, "failed to mark apology undeliverable");
                    }
                }
            },
        }

        Ok(Outcome::Exhausted {
            error: err.to_string(),
        })
    }

    async fn publish_escalation(
        &self,
        ticket: &Ticket,
        reason: &EscalationReason,
    ) -> Result<(), HelplaneError> {
        let conversation_id = ConversationId(ticket.conversation_id.clone());
        let history = self
            .store
            .conversation_messages(&conversation_id, None)
            .await?;
        let tail = history.len().saturating_sub(SNAPSHOT_LIMIT);
        let snapshot: Vec<SnapshotMessage> = history[tail..]
            .iter()
            .map(|m| SnapshotMessage {
                id: m.id.clone(),
                role: m.role,
                content: m.content.clone(),
                created_at: m.created_at.clone(),
            })
            .collect();

        self.bus.publish(PipelineEvent::Escalated {
            ticket_id: ticket.id.clone(),
            conversation_id: conversation_id.0,
            reason: reason.to_string(),
            urgency: reason.urgency().to_string(),
            snapshot,
        });
        info!(ticket_id = %ticket.id, reason = %reason, "escalation published");
        Ok(())
    }

    async fn fetch_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Conversation, HelplaneError> {
        self.store.get_conversation(id).await?.ok_or_else(|| {
            HelplaneError::Internal(format!("conversation {} not found", id.0))
        })
    }
}

/// Where an outbound reply on this channel should be sent, given the inbound
/// evidence and the stored customer record.
fn destination_for(
    channel: Channel,
    contact: &ContactEvidence,
    customer: &Customer,
) -> Option<String> {
    match channel {
        Channel::Email => contact.email.clone().or_else(|| customer.email.clone()),
        Channel::Chat => contact.phone.clone().or_else(|| customer.phone.clone()),
        Channel::WebForm => contact
            .anon_token
            .clone()
            .or_else(|| contact.email.clone())
            .or_else(|| customer.email.clone()),
    }
}
