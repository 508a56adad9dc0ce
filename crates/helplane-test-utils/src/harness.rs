// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `TestHarness` assembles the complete pipeline with mock responder and
//! senders over a temp SQLite database. `ingest()` puts raw events on the
//! queue and `process_one()`/`drain()` drive the dispatcher synchronously,
//! so tests control exactly when work happens.

use std::sync::Arc;

use tokio::sync::broadcast;

use helplane_bus::{EventBus, EventEnvelope};
use helplane_config::HelplaneConfig;
use helplane_core::types::{Channel, ResponderReply};
use helplane_core::{HelplaneError, SupportStore};
use helplane_pipeline::delivery::{DeliveryTracker, RetryPolicy};
use helplane_pipeline::dispatcher::Dispatcher;
use helplane_storage::SqliteStore;

use crate::mock_responder::MockResponder;
use crate::mock_sender::MockSender;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    replies: Vec<ResponderReply>,
    responder_failures: u32,
    responder_always_fails: bool,
    config: HelplaneConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = HelplaneConfig::default();
        // Keep retries fast and polling tight for tests.
        config.delivery.backoff_base_ms = 1;
        config.delivery.backoff_cap_ms = 4;
        config.pipeline.poll_interval_ms = 10;
        config.pipeline.workers = 1;
        config.responder.timeout_secs = 5;
        Self {
            replies: Vec::new(),
            responder_failures: 0,
            responder_always_fails: false,
            config,
        }
    }

    /// Queue a scripted responder reply.
    pub fn with_reply(mut self, reply: ResponderReply) -> Self {
        self.replies.push(reply);
        self
    }

    /// Fail the first `n` responder calls.
    pub fn with_responder_failures(mut self, n: u32) -> Self {
        self.responder_failures = n;
        self
    }

    /// Fail every responder call.
    pub fn with_responder_always_failing(mut self) -> Self {
        self.responder_always_fails = true;
        self
    }

    /// Adjust the configuration before the harness is built.
    pub fn with_config(mut self, adjust: impl FnOnce(&mut HelplaneConfig)) -> Self {
        adjust(&mut self.config);
        self
    }

    /// Build the harness, creating all subsystems over a temp database.
    pub async fn build(mut self) -> Result<TestHarness, HelplaneError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| HelplaneError::Storage {
            source: e.into(),
        })?;
        self.config.storage.database_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();

        let store: Arc<dyn SupportStore> =
            Arc::new(SqliteStore::open(&self.config.storage).await?);
        let bus = EventBus::new(256);

        let responder = Arc::new(MockResponder::new());
        for reply in self.replies {
            responder.push_reply(reply).await;
        }
        if self.responder_always_fails {
            responder.always_fail().await;
        } else if self.responder_failures > 0 {
            responder.fail_times(self.responder_failures).await;
        }

        let email_sender = Arc::new(MockSender::new(Channel::Email));
        let chat_sender = Arc::new(MockSender::new(Channel::Chat));
        let web_sender = Arc::new(MockSender::new(Channel::WebForm));

        let mut delivery = DeliveryTracker::new(
            store.clone(),
            bus.clone(),
            RetryPolicy::from_config(&self.config.delivery),
        );
        delivery.register_sender(email_sender.clone());
        delivery.register_sender(chat_sender.clone());
        delivery.register_sender(web_sender.clone());

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            bus.clone(),
            responder.clone(),
            Arc::new(delivery),
            &self.config,
        ));

        Ok(TestHarness {
            store,
            bus,
            responder,
            email_sender,
            chat_sender,
            web_sender,
            dispatcher,
            config: self.config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    /// The support store backed by a temp SQLite database.
    pub store: Arc<dyn SupportStore>,
    /// The derived-event bus.
    pub bus: EventBus,
    /// The mock responder.
    pub responder: Arc<MockResponder>,
    /// Per-channel mock senders.
    pub email_sender: Arc<MockSender>,
    pub chat_sender: Arc<MockSender>,
    pub web_sender: Arc<MockSender>,
    /// The dispatcher under test.
    pub dispatcher: Arc<Dispatcher>,
    /// The configuration the harness was built with.
    pub config: HelplaneConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Put a raw channel event on the inbound queue.
    pub async fn ingest(&self, payload: serde_json::Value) -> Result<i64, HelplaneError> {
        self.store
            .enqueue(&self.config.pipeline.inbound_queue, &payload.to_string())
            .await
    }

    /// Process one queued event. Returns `false` when the queue was empty.
    pub async fn process_one(&self) -> Result<bool, HelplaneError> {
        self.dispatcher.process_next().await
    }

    /// Process queued events (including retries re-queued along the way)
    /// until the queue is empty. Returns the number of processing passes.
    pub async fn drain(&self) -> Result<usize, HelplaneError> {
        let mut passes = 0;
        while self.process_one().await? {
            passes += 1;
        }
        Ok(passes)
    }

    /// Subscribe to derived events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.bus.subscribe()
    }
}
