// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel sender collaborator for outbound delivery.

use async_trait::async_trait;

use crate::error::HelplaneError;
use crate::types::{Channel, SendReceipt};

/// Performs the physical send of an outbound message on one channel.
///
/// Implementations signal failure through the delivery error variants:
/// [`HelplaneError::DeliveryTransient`] for conditions worth retrying
/// (network, timeout) and [`HelplaneError::DeliveryPermanent`] for
/// conditions that never succeed on replay (invalid address, channel
/// rejected). The delivery tracker's retry policy keys off that split.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The channel this sender delivers to.
    fn channel(&self) -> Channel;

    /// Send `text` to `destination`, returning the channel's external id.
    async fn send(&self, destination: &str, text: &str) -> Result<SendReceipt, HelplaneError>;
}
