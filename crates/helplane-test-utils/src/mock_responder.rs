// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock responder with scripted replies and failure injection.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use helplane_core::types::{CustomerContext, Message, ResponderReply};
use helplane_core::{HelplaneError, Responder};

struct State {
    scripted: VecDeque<ResponderReply>,
    fail_remaining: u32,
    always_fail: bool,
    calls: u32,
}

/// A scriptable [`Responder`].
///
/// Replies are served from a queue; when the queue is empty a default
/// non-escalating reply is returned. `fail_times` injects failures before
/// any reply is served, which is how responder-retry paths are exercised.
pub struct MockResponder {
    state: Mutex<State>,
}

impl MockResponder {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                scripted: VecDeque::new(),
                fail_remaining: 0,
                always_fail: false,
                calls: 0,
            }),
        }
    }

    /// Queue a reply to serve on the next call.
    pub async fn push_reply(&self, reply: ResponderReply) {
        self.state.lock().await.scripted.push_back(reply);
    }

    /// Fail the next `n` calls with a `ResponderFailure`.
    pub async fn fail_times(&self, n: u32) {
        self.state.lock().await.fail_remaining = n;
    }

    /// Fail every call.
    pub async fn always_fail(&self) {
        self.state.lock().await.always_fail = true;
    }

    /// Number of `respond` calls made so far.
    pub async fn calls(&self) -> u32 {
        self.state.lock().await.calls
    }

    /// The default reply served when no script is queued.
    pub fn default_reply() -> ResponderReply {
        ResponderReply {
            text: "Thanks for reaching out. Here is what to do.".to_string(),
            escalate: false,
            reason: None,
            tool_calls: 0,
        }
    }
}

impl Default for MockResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for MockResponder {
    async fn respond(
        &self,
        _history: &[Message],
        _context: &CustomerContext,
    ) -> Result<ResponderReply, HelplaneError> {
        let mut state = self.state.lock().await;
        state.calls += 1;

        if state.always_fail {
            return Err(HelplaneError::ResponderFailure {
                message: "scripted permanent failure".to_string(),
                source: None,
            });
        }
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(HelplaneError::ResponderFailure {
                message: "scripted transient failure".to_string(),
                source: None,
            });
        }

        Ok(state
            .scripted
            .pop_front()
            .unwrap_or_else(Self::default_reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helplane_core::types::{
        Channel, Conversation, ConversationStatus, Customer, CustomerContext,
    };

    fn context() -> CustomerContext {
        CustomerContext {
            customer: Customer {
                id: "cust-1".to_string(),
                email: None,
                phone: None,
                display_name: None,
                created_at: "2026-01-01T00:00:00.000Z".to_string(),
            },
            conversation: Conversation {
                id: "conv-1".to_string(),
                customer_id: "cust-1".to_string(),
                initiating_channel: Channel::Chat,
                status: ConversationStatus::Active,
                started_at: "2026-01-01T00:00:00.000Z".to_string(),
                ended_at: None,
                sentiment: 0.5,
                resolution: None,
            },
        }
    }

    #[tokio::test]
    async fn default_reply_when_unscripted() {
        let responder = MockResponder::new();
        let reply = responder.respond(&[], &context()).await.unwrap();
        assert!(!reply.escalate);
        assert_eq!(responder.calls().await, 1);
    }

    #[tokio::test]
    async fn scripted_replies_serve_in_order() {
        let responder = MockResponder::new();
        responder
            .push_reply(ResponderReply {
                text: "first".to_string(),
                escalate: false,
                reason: None,
                tool_calls: 2,
            })
            .await;
        responder
            .push_reply(ResponderReply {
                text: "second".to_string(),
                escalate: true,
                reason: Some("needs human".to_string()),
                tool_calls: 0,
            })
            .await;

        let first = responder.respond(&[], &context()).await.unwrap();
        assert_eq!(first.text, "first");
        assert_eq!(first.tool_calls, 2);

        let second = responder.respond(&[], &context()).await.unwrap();
        assert!(second.escalate);
    }

    #[tokio::test]
    async fn fail_times_fails_then_recovers() {
        let responder = MockResponder::new();
        responder.fail_times(2).await;

        assert!(responder.respond(&[], &context()).await.is_err());
        assert!(responder.respond(&[], &context()).await.is_err());
        assert!(responder.respond(&[], &context()).await.is_ok());
        assert_eq!(responder.calls().await, 3);
    }
}
