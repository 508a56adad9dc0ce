// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel sender with scripted outcomes and send recording.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use helplane_core::types::{Channel, SendReceipt};
use helplane_core::{ChannelSender, HelplaneError};

#[derive(Clone)]
enum Mode {
    Succeed,
    AlwaysTransient(String),
    AlwaysPermanent(String),
}

struct State {
    mode: Mode,
    transient_then_succeed: Option<(u32, String)>,
    scripted_receipts: VecDeque<SendReceipt>,
    sent: Vec<(String, String)>,
    counter: u64,
}

/// A scriptable [`ChannelSender`] that records every send.
///
/// Defaults to succeeding with generated receipt ids. Failure modes cover
/// the delivery tracker's retry matrix: always-transient (exhaustion),
/// transient-then-success (recovery), and permanent (no retry).
pub struct MockSender {
    channel: Channel,
    state: Mutex<State>,
}

impl MockSender {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            state: Mutex::new(State {
                mode: Mode::Succeed,
                transient_then_succeed: None,
                scripted_receipts: VecDeque::new(),
                sent: Vec::new(),
                counter: 0,
            }),
        }
    }

    /// Every send fails with a transient error.
    pub async fn always_transient(&self, message: &str) {
        self.state.lock().await.mode = Mode::AlwaysTransient(message.to_string());
    }

    /// Every send fails with a permanent error.
    pub async fn always_permanent(&self, message: &str) {
        self.state.lock().await.mode = Mode::AlwaysPermanent(message.to_string());
    }

    /// The next `n` sends fail transiently, then sends succeed.
    pub async fn transient_times(&self, n: u32, message: &str) {
        self.state.lock().await.transient_then_succeed = Some((n, message.to_string()));
    }

    /// Queue a specific receipt for the next successful send.
    pub async fn script_success(&self, receipt: SendReceipt) {
        self.state.lock().await.scripted_receipts.push_back(receipt);
    }

    /// Everything sent so far, as `(destination, text)` pairs.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.state.lock().await.sent.clone()
    }
}

#[async_trait]
impl ChannelSender for MockSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, destination: &str, text: &str) -> Result<SendReceipt, HelplaneError> {
        let mut state = self.state.lock().await;
        state.sent.push((destination.to_string(), text.to_string()));

        if let Some((remaining, message)) = state.transient_then_succeed.take() {
            if remaining > 0 {
                state.transient_then_succeed = Some((remaining - 1, message.clone()));
                return Err(HelplaneError::DeliveryTransient(message));
            }
        }

        match state.mode.clone() {
            Mode::AlwaysTransient(message) => Err(HelplaneError::DeliveryTransient(message)),
            Mode::AlwaysPermanent(message) => Err(HelplaneError::DeliveryPermanent(message)),
            Mode::Succeed => {
                if let Some(receipt) = state.scripted_receipts.pop_front() {
                    return Ok(receipt);
                }
                state.counter += 1;
                Ok(SendReceipt {
                    external_id: format!("{}-{}", self.channel, state.counter),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeds_with_generated_receipts_by_default() {
        let sender = MockSender::new(Channel::Email);
        let first = sender.send("a@x.com", "hello").await.unwrap();
        let second = sender.send("a@x.com", "again").await.unwrap();
        assert_eq!(first.external_id, "email-1");
        assert_eq!(second.external_id, "email-2");
        assert_eq!(sender.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn transient_times_recovers_after_n_failures() {
        let sender = MockSender::new(Channel::Chat);
        sender.transient_times(2, "timeout").await;

        assert!(sender.send("+1555", "x").await.is_err());
        assert!(sender.send("+1555", "x").await.is_err());
        assert!(sender.send("+1555", "x").await.is_ok());
    }

    #[tokio::test]
    async fn permanent_mode_fails_with_permanent_variant() {
        let sender = MockSender::new(Channel::WebForm);
        sender.always_permanent("no such visitor").await;
        let err = sender.send("tok-1", "x").await.unwrap_err();
        assert!(matches!(err, HelplaneError::DeliveryPermanent(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn scripted_receipt_takes_priority() {
        let sender = MockSender::new(Channel::Email);
        sender
            .script_success(SendReceipt {
                external_id: "smtp-custom".to_string(),
            })
            .await;
        let receipt = sender.send("a@x.com", "x").await.unwrap();
        assert_eq!(receipt.external_id, "smtp-custom");
    }
}
