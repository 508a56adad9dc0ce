// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Helplane integration tests.
//!
//! Provides mock responder/sender adapters and a [`TestHarness`] that wires
//! the full pipeline over a temp SQLite database.

pub mod harness;
pub mod mock_responder;
pub mod mock_sender;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_responder::MockResponder;
pub use mock_sender::MockSender;
