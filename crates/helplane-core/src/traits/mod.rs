// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the seams of the support engine.
//!
//! External collaborators (the LLM responder, per-channel senders) and the
//! transactional repository are all consumed through these traits so the
//! pipeline core never depends on a concrete backend.

pub mod responder;
pub mod sender;
pub mod store;

pub use responder::Responder;
pub use sender::ChannelSender;
pub use store::SupportStore;
