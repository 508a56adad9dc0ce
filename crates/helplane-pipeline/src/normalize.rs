// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel normalizer: converts channel-specific inbound payloads into the
//! canonical [`InboundMessage`].
//!
//! Each channel variant is handled exhaustively; adding a channel means
//! adding one mapping here and one sender adapter, never touching the core
//! control flow. Mappings accept both the channel-native field names and the
//! generic envelope names, so adapters that already emit the canonical
//! schema normalize unchanged.
//!
//! Normalization has no side effects. Missing mandatory fields (body, all
//! contact evidence, or the external correlation id that redelivery dedup
//! keys on) fail with a non-retryable error the dispatcher dead-letters.

use chrono::{DateTime, Utc};
use helplane_core::HelplaneError;
use helplane_core::types::{Channel, ContactEvidence, InboundMessage};
use serde_json::Value;

/// Read the channel tag out of a raw event without normalizing it.
pub fn peek_channel(raw: &str) -> Result<Channel, HelplaneError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| HelplaneError::Normalization(format!("payload is not JSON: {e}")))?;
    let tag = value
        .get("channel")
        .and_then(Value::as_str)
        .ok_or_else(|| HelplaneError::Normalization("missing channel tag".to_string()))?;
    tag.parse()
        .map_err(|_| HelplaneError::Normalization(format!("unknown channel: {tag}")))
}

/// Normalize a raw channel event into the canonical inbound message.
pub fn normalize(raw: &str, channel: Channel) -> Result<InboundMessage, HelplaneError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| HelplaneError::Normalization(format!("payload is not JSON: {e}")))?;

    let (contact, subject, body, channel_message_id) = match channel {
        Channel::Email => (
            ContactEvidence {
                email: first_str(&value, &["from", "sender"])
                    .or_else(|| contact_field(&value, "email")),
                phone: contact_field(&value, "phone"),
                anon_token: contact_field(&value, "anon_token"),
            },
            first_str(&value, &["subject"]),
            first_str(&value, &["body", "text"]),
            first_str(&value, &["channel_message_id", "message_id"]),
        ),
        Channel::Chat => (
            ContactEvidence {
                email: contact_field(&value, "email"),
                phone: first_str(&value, &["sender_phone", "from"])
                    .or_else(|| contact_field(&value, "phone")),
                anon_token: contact_field(&value, "anon_token"),
            },
            None,
            first_str(&value, &["body", "text"]),
            first_str(&value, &["channel_message_id", "message_id", "wamid"]),
        ),
        Channel::WebForm => (
            ContactEvidence {
                email: first_str(&value, &["email"]).or_else(|| contact_field(&value, "email")),
                phone: contact_field(&value, "phone"),
                anon_token: first_str(&value, &["visitor_token"])
                    .or_else(|| contact_field(&value, "anon_token")),
            },
            first_str(&value, &["subject", "topic"]),
            first_str(&value, &["body", "message"]),
            first_str(&value, &["channel_message_id", "submission_id", "form_id"]),
        ),
    };

    let body = body
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| HelplaneError::Normalization("missing body text".to_string()))?;

    if contact.is_empty() {
        return Err(HelplaneError::Normalization(
            "missing contact evidence".to_string(),
        ));
    }

    let channel_message_id = channel_message_id.ok_or_else(|| {
        HelplaneError::Normalization("missing external correlation id".to_string())
    })?;

    let received_at = match value.get("received_at").and_then(Value::as_str) {
        Some(ts) => DateTime::parse_from_rfc3339(ts)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                HelplaneError::Normalization(format!("unparseable received_at {ts:?}: {e}"))
            })?,
        None => Utc::now(),
    };

    // The metadata bag is opaque: serialized back out unmodified.
    let metadata = value.get("metadata").map(|m| m.to_string());

    Ok(InboundMessage {
        channel,
        channel_message_id,
        contact,
        subject,
        body,
        received_at,
        metadata,
    })
}

/// First present, non-empty string among the given top-level keys.
fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// A field inside the nested `contact` evidence object.
fn contact_field(value: &Value, field: &str) -> Option<String> {
    value
        .get("contact")
        .and_then(|c| c.get(field))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use helplane_core::types::IdentifierKind;

    #[test]
    fn canonical_envelope_normalizes_on_every_channel() {
        let raw = r#"{
            "channel": "web_form",
            "channel_message_id": "wf-1",
            "contact": {"email": "a@x.com"},
            "body": "How do I reset my password?",
            "received_at": "2026-02-01T09:30:00Z",
            "metadata": {"page": "/pricing"}
        }"#;

        assert_eq!(peek_channel(raw).unwrap(), Channel::WebForm);
        let msg = normalize(raw, Channel::WebForm).unwrap();
        assert_eq!(msg.channel_message_id, "wf-1");
        assert_eq!(msg.body, "How do I reset my password?");
        assert_eq!(msg.contact.email.as_deref(), Some("a@x.com"));
        assert_eq!(
            msg.contact.strongest(),
            Some((IdentifierKind::Email, "a@x.com"))
        );
        assert_eq!(msg.received_at.to_rfc3339(), "2026-02-01T09:30:00+00:00");
        assert_eq!(msg.metadata.as_deref(), Some(r#"{"page":"/pricing"}"#));
    }

    #[test]
    fn email_native_fields_map_to_canonical() {
        let raw = r#"{
            "channel": "email",
            "message_id": "<abc@mail>",
            "from": "a@x.com",
            "subject": "Billing question",
            "text": "I was double charged."
        }"#;
        let msg = normalize(raw, Channel::Email).unwrap();
        assert_eq!(msg.channel_message_id, "<abc@mail>");
        assert_eq!(msg.subject.as_deref(), Some("Billing question"));
        assert_eq!(msg.contact.email.as_deref(), Some("a@x.com"));
    }

    #[test]
    fn chat_native_fields_map_to_phone_evidence() {
        let raw = r#"{
            "channel": "chat",
            "wamid": "wamid.123",
            "sender_phone": "+15550001",
            "text": "where is my order"
        }"#;
        let msg = normalize(raw, Channel::Chat).unwrap();
        assert_eq!(msg.channel_message_id, "wamid.123");
        assert_eq!(
            msg.contact.strongest(),
            Some((IdentifierKind::Phone, "+15550001"))
        );
        assert!(msg.subject.is_none());
    }

    #[test]
    fn web_form_visitor_token_is_anon_evidence() {
        let raw = r#"{
            "channel": "web_form",
            "submission_id": "sub-9",
            "visitor_token": "anon-42",
            "message": "hello?"
        }"#;
        let msg = normalize(raw, Channel::WebForm).unwrap();
        assert_eq!(
            msg.contact.strongest(),
            Some((IdentifierKind::AnonToken, "anon-42"))
        );
    }

    #[test]
    fn missing_body_fails_normalization() {
        let raw = r#"{"channel": "email", "message_id": "m", "from": "a@x.com"}"#;
        let err = normalize(raw, Channel::Email).unwrap_err();
        assert!(matches!(err, HelplaneError::Normalization(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn blank_body_fails_normalization() {
        let raw = r#"{"channel": "email", "message_id": "m", "from": "a@x.com", "body": "   "}"#;
        assert!(normalize(raw, Channel::Email).is_err());
    }

    #[test]
    fn missing_contact_evidence_fails_normalization() {
        let raw = r#"{"channel": "web_form", "submission_id": "s", "body": "hi"}"#;
        let err = normalize(raw, Channel::WebForm).unwrap_err();
        assert!(matches!(err, HelplaneError::Normalization(_)));
    }

    #[test]
    fn missing_correlation_id_fails_normalization() {
        let raw = r#"{"channel": "chat", "sender_phone": "+1555", "text": "hi"}"#;
        let err = normalize(raw, Channel::Chat).unwrap_err();
        assert!(matches!(err, HelplaneError::Normalization(_)));
    }

    #[test]
    fn garbage_payload_fails_peek_and_normalize() {
        assert!(peek_channel("not json at all").is_err());
        assert!(normalize("not json at all", Channel::Email).is_err());
    }

    #[test]
    fn unknown_channel_tag_fails_peek() {
        let err = peek_channel(r#"{"channel": "carrier_pigeon"}"#).unwrap_err();
        assert!(matches!(err, HelplaneError::Normalization(_)));
    }

    #[test]
    fn missing_received_at_defaults_to_now() {
        let raw = r#"{"channel": "email", "message_id": "m", "from": "a@x.com", "body": "hi"}"#;
        let before = Utc::now();
        let msg = normalize(raw, Channel::Email).unwrap();
        assert!(msg.received_at >= before);
    }

    #[test]
    fn unparseable_received_at_fails() {
        let raw = r#"{"channel": "email", "message_id": "m", "from": "a@x.com",
                      "body": "hi", "received_at": "yesterday"}"#;
        assert!(normalize(raw, Channel::Email).is_err());
    }
}
