// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `helplane-core::types` for use across
//! the adapter trait boundary. This module re-exports them for convenience
//! within the storage crate.

pub use helplane_core::types::{
    ChannelMetrics, Conversation, Customer, DeliveryAttempt, Identifier, Message, MessagePage,
    QueueEntry, Ticket,
};
