// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion pipeline for the Helplane support engine.
//!
//! The [`dispatcher::Dispatcher`] pulls raw events off the queue and drives
//! them through normalization, identity resolution, conversation continuity,
//! the ticket state machine, the external responder, and outbound delivery,
//! publishing derived events on the bus along the way. Each stage also
//! stands alone for direct use and testing.

pub mod continuity;
pub mod delivery;
pub mod dispatcher;
pub mod identity;
pub mod normalize;
pub mod ops;
pub mod sentiment;
pub mod ticket;

pub use continuity::SessionManager;
pub use delivery::{DeliveryTracker, RetryPolicy};
pub use dispatcher::Dispatcher;
pub use identity::IdentityResolver;
pub use ticket::{EscalationPolicy, TicketMachine};
