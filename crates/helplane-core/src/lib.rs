// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Helplane support engine.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types used throughout the Helplane workspace: the closed channel
//! variants, the canonical inbound message, the stored records, and the
//! adapter seams for storage, the responder, and per-channel senders.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::HelplaneError;
pub use traits::{ChannelSender, Responder, SupportStore};
pub use types::{
    Channel, ContactEvidence, ConversationId, CustomerId, IdentifierKind, InboundMessage,
    MessageId, TicketId,
};
