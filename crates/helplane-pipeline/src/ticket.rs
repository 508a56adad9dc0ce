// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket lifecycle state machine and hard escalation triggers.
//!
//! Transitions are monotonic: `open -> in_progress -> resolved`, with
//! `escalated` reachable from `open` or `in_progress` and terminal for
//! automated handling. Hard triggers are evaluated deterministically and
//! independently of responder output, so a policy keyword always escalates
//! no matter what the responder says.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use helplane_config::model::EscalationConfig;
use helplane_core::types::{
    Conversation, EscalationReason, InboundMessage, Ticket, TicketId, TicketStatus,
};
use helplane_core::{HelplaneError, SupportStore};

/// Whether a ticket may move from `from` to `to`.
pub fn transition_allowed(from: TicketStatus, to: TicketStatus) -> bool {
    matches!(
        (from, to),
        (TicketStatus::Open, TicketStatus::InProgress)
            | (TicketStatus::Open, TicketStatus::Escalated)
            | (TicketStatus::InProgress, TicketStatus::Resolved)
            | (TicketStatus::InProgress, TicketStatus::Escalated)
    )
}

/// Hard escalation policy: keywords and the sentiment floor.
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    sentiment_floor: f64,
    keywords: Vec<String>,
}

impl EscalationPolicy {
    pub fn from_config(config: &EscalationConfig) -> Self {
        Self {
            sentiment_floor: config.sentiment_floor,
            keywords: config
                .keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    /// The first configured keyword present in the body, if any.
    pub fn keyword_trigger(&self, body: &str) -> Option<String> {
        let lower = body.to_lowercase();
        self.keywords.iter().find(|k| lower.contains(k.as_str())).cloned()
    }

    /// Evaluate the hard triggers for an inbound body and the conversation's
    /// running sentiment. Keyword matches take precedence over the floor.
    pub fn hard_trigger(&self, body: &str, sentiment: f64) -> Option<EscalationReason> {
        if let Some(keyword) = self.keyword_trigger(body) {
            return Some(EscalationReason::Keyword(keyword));
        }
        if sentiment < self.sentiment_floor {
            return Some(EscalationReason::SentimentFloor);
        }
        None
    }
}

const BILLING_MARKERS: &[&str] = &[
    "invoice", "charge", "charged", "payment", "billing", "refund", "price", "subscription",
];
const TECHNICAL_MARKERS: &[&str] = &[
    "error", "bug", "crash", "broken", "not working", "doesn't work", "fails", "timeout",
];
const ACCOUNT_MARKERS: &[&str] = &[
    "password", "login", "log in", "sign in", "account", "reset", "2fa", "locked out",
];

/// Coarse category bucket for a new ticket, from subject + body.
pub fn classify_category(subject: Option<&str>, body: &str) -> &'static str {
    let mut text = body.to_lowercase();
    if let Some(subject) = subject {
        text.push(' ');
        text.push_str(&subject.to_lowercase());
    }

    if BILLING_MARKERS.iter().any(|m| text.contains(m)) {
        "billing"
    } else if ACCOUNT_MARKERS.iter().any(|m| text.contains(m)) {
        "account"
    } else if TECHNICAL_MARKERS.iter().any(|m| text.contains(m)) {
        "technical"
    } else {
        "general"
    }
}

/// Priority for a new ticket: policy keywords make it urgent, low sentiment
/// makes it high.
pub fn classify_priority(keyword_hit: bool, sentiment: f64) -> &'static str {
    if keyword_hit {
        "urgent"
    } else if sentiment < 0.35 {
        "high"
    } else {
        "normal"
    }
}

/// Applies validated ticket transitions through the store.
pub struct TicketMachine {
    store: Arc<dyn SupportStore>,
}

impl TicketMachine {
    pub fn new(store: Arc<dyn SupportStore>) -> Self {
        Self { store }
    }

    /// Insert-or-get the ticket for a conversation, classifying category and
    /// priority from the first inbound message.
    pub async fn ensure_open(
        &self,
        conversation: &Conversation,
        inbound: &InboundMessage,
        sentiment: f64,
        policy: &EscalationPolicy,
    ) -> Result<Ticket, HelplaneError> {
        let now = Utc::now().to_rfc3339();
        let keyword_hit = policy.keyword_trigger(&inbound.body).is_some();
        let ticket = Ticket {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation.id.clone(),
            customer_id: conversation.customer_id.clone(),
            source_channel: inbound.channel,
            category: classify_category(inbound.subject.as_deref(), &inbound.body).to_string(),
            priority: classify_priority(keyword_hit, sentiment).to_string(),
            status: TicketStatus::Open,
            resolution_notes: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.ensure_ticket(&ticket).await
    }

    /// Apply a transition if the state machine allows it; otherwise leave the
    /// ticket untouched. Redelivered events can replay transitions, so an
    /// inadmissible move is a debug-level no-op rather than an error.
    pub async fn advance(
        &self,
        ticket: &Ticket,
        to: TicketStatus,
        resolution_notes: Option<&str>,
    ) -> Result<Ticket, HelplaneError> {
        if !transition_allowed(ticket.status, to) {
            debug!(
                ticket_id = %ticket.id,
                from = %ticket.status,
                to = %to,
                "transition not allowed, leaving ticket unchanged"
            );
            return Ok(ticket.clone());
        }

        self.store
            .update_ticket_status(&TicketId(ticket.id.clone()), to, resolution_notes)
            .await?;
        info!(ticket_id = %ticket.id, from = %ticket.status, to = %to, "ticket transition");

        let mut updated = ticket.clone();
        updated.status = to;
        if let Some(notes) = resolution_notes {
            updated.resolution_notes = Some(notes.to_string());
        }
        Ok(updated)
    }

    /// Escalate a ticket with the given reason, optionally annotated with
    /// collaborator-supplied detail. Terminal for automated handling; a
    /// human-handoff collaborator takes over.
    pub async fn escalate(
        &self,
        ticket: &Ticket,
        reason: &EscalationReason,
        detail: Option<&str>,
    ) -> Result<Ticket, HelplaneError> {
        let notes = match detail {
            Some(detail) => format!("{reason}: {detail}"),
            None => reason.to_string(),
        };
        self.advance(ticket, TicketStatus::Escalated, Some(&notes)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_matrix_is_monotonic() {
        use TicketStatus::*;

        assert!(transition_allowed(Open, InProgress));
        assert!(transition_allowed(Open, Escalated));
        assert!(transition_allowed(InProgress, Resolved));
        assert!(transition_allowed(InProgress, Escalated));

        // No going back, no skipping, terminal states stay terminal.
        assert!(!transition_allowed(Open, Resolved));
        assert!(!transition_allowed(Resolved, Open));
        assert!(!transition_allowed(Resolved, InProgress));
        assert!(!transition_allowed(Resolved, Escalated));
        assert!(!transition_allowed(Escalated, Open));
        assert!(!transition_allowed(Escalated, InProgress));
        assert!(!transition_allowed(Escalated, Resolved));
        assert!(!transition_allowed(InProgress, Open));
        assert!(!transition_allowed(Open, Open));
    }

    fn policy() -> EscalationPolicy {
        EscalationPolicy::from_config(&EscalationConfig::default())
    }

    #[test]
    fn keyword_trigger_is_case_insensitive() {
        let policy = policy();
        assert_eq!(
            policy.keyword_trigger("I will get my LAWYER involved"),
            Some("lawyer".to_string())
        );
        assert_eq!(policy.keyword_trigger("just a question"), None);
    }

    #[test]
    fn hard_trigger_prefers_keyword_over_sentiment() {
        let policy = policy();
        assert_eq!(
            policy.hard_trigger("I want a refund", 0.1),
            Some(EscalationReason::Keyword("refund".to_string()))
        );
        assert_eq!(
            policy.hard_trigger("everything is fine", 0.1),
            Some(EscalationReason::SentimentFloor)
        );
        assert_eq!(policy.hard_trigger("everything is fine", 0.5), None);
    }

    #[test]
    fn sentiment_exactly_at_floor_does_not_trigger() {
        let policy = policy();
        assert_eq!(policy.hard_trigger("hello", 0.3), None);
        assert!(policy.hard_trigger("hello", 0.2999).is_some());
    }

    #[test]
    fn category_buckets() {
        assert_eq!(classify_category(None, "I was double charged"), "billing");
        assert_eq!(
            classify_category(None, "How do I reset my password?"),
            "account"
        );
        assert_eq!(classify_category(None, "the app crashes on launch"), "technical");
        assert_eq!(classify_category(None, "hello there"), "general");
        // Subject participates too.
        assert_eq!(classify_category(Some("Invoice issue"), "see above"), "billing");
    }

    #[test]
    fn priority_ladder() {
        assert_eq!(classify_priority(true, 0.9), "urgent");
        assert_eq!(classify_priority(false, 0.2), "high");
        assert_eq!(classify_priority(false, 0.5), "normal");
    }
}
