// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External responder collaborator producing reply text and an escalation
//! recommendation.

use async_trait::async_trait;

use crate::error::HelplaneError;
use crate::types::{CustomerContext, Message, ResponderReply};

/// Produces a reply for a conversation turn.
///
/// The engine treats response generation as opaque: it hands over the ordered
/// conversation history plus customer context and receives text and an
/// escalation signal back. Calls are made under a bounded timeout; a timeout
/// or error is a processing failure handled by the dispatcher's retry policy,
/// never a crash.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(
        &self,
        history: &[Message],
        context: &CustomerContext,
    ) -> Result<ResponderReply, HelplaneError>;
}
