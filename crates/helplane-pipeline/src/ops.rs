// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator query surface: customer lookup, paginated conversation history,
//! and windowed channel metrics.
//!
//! Read-only composition over the store; collaborators wire these into
//! whatever transport they expose to operators.

use serde::{Deserialize, Serialize};

use helplane_core::HelplaneError;
use helplane_core::types::{
    ChannelMetrics, Conversation, ConversationId, Customer, CustomerId, IdentifierKind,
    MessagePage,
};
use helplane_core::SupportStore;

/// A customer plus their conversation list, as returned by identifier lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerView {
    pub customer: Customer,
    pub conversations: Vec<Conversation>,
}

/// Look up a customer by one of their channel identifiers.
pub async fn lookup_customer(
    store: &dyn SupportStore,
    kind: IdentifierKind,
    value: &str,
) -> Result<Option<CustomerView>, HelplaneError> {
    let Some(identifier) = store.find_identifier(kind, value).await? else {
        return Ok(None);
    };
    let customer_id = CustomerId(identifier.customer_id);
    let Some(customer) = store.get_customer(&customer_id).await? else {
        return Err(HelplaneError::Internal(format!(
            "identifier {kind}:{value} references missing customer {}",
            customer_id.0
        )));
    };
    let conversations = store.conversations_for_customer(&customer_id).await?;
    Ok(Some(CustomerView {
        customer,
        conversations,
    }))
}

/// One page of a conversation's ordered message history.
pub async fn conversation_history(
    store: &dyn SupportStore,
    conversation_id: &ConversationId,
    after: Option<i64>,
    limit: i64,
) -> Result<MessagePage, HelplaneError> {
    store.message_page(conversation_id, after, limit).await
}

/// Channel-segmented metrics for a time window (`[from, to)`, ISO-8601).
pub async fn channel_metrics(
    store: &dyn SupportStore,
    from: &str,
    to: &str,
) -> Result<Vec<ChannelMetrics>, HelplaneError> {
    store.channel_metrics(from, to).await
}
