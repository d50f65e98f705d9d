//! Wire envelope types exchanged with the messaging server.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Source tag stamped on every outbound send.
pub const MESSAGE_SOURCE: &str = "relay-mcp";

/// Outbound envelope: one generic message event of `{type, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "UPPERCASE")]
pub enum OutboundEnvelope {
    /// Join a channel before any sends go through it
    Join(JoinPayload),
    /// Deliver user text to the target agent
    Send(SendPayload),
}

/// Payload for a channel join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    /// Channel being joined
    pub channel_id: String,
    /// Agents addressed through the channel (always a singleton here)
    pub target_ids: Vec<String>,
}

/// Payload for a user message send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    /// Identity the message is sent as
    pub sender_id: String,
    /// Message body
    pub text: String,
    /// Channel the message goes through
    pub channel_id: String,
    /// Agent the message is addressed to
    pub target_id: String,
    /// World scoping the conversation
    pub world_id: String,
    /// Diagnostic correlation id (the platform does not echo it back)
    pub correlation_id: String,
    /// Fixed client source tag
    pub source: String,
}

/// Inbound reply envelope.
///
/// Only the sender identity and text body are load-bearing; every other
/// field the server attaches is preserved untouched in `extra` and passed
/// through to observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplyEnvelope {
    /// Identity that produced the reply
    pub sender_id: String,
    /// Reply body
    pub text: String,
    /// All remaining fields, unvalidated
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ReplyEnvelope {
    /// Convenience constructor for the known fields.
    pub fn new(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            text: text.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// True when the body carries something beyond whitespace.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Directory entry for an agent reachable through the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TargetInfo {
    /// Agent id (doubles as its direct-message channel id)
    pub id: String,
    /// Human-readable agent name
    pub name: String,
}

/// Generate a correlation id: millisecond timestamp plus a random suffix.
///
/// Stamped on outbound sends for log correlation only. Inbound replies do
/// not carry it, so reply matching never uses it.
pub fn new_correlation_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", millis, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_envelope_shape() {
        let envelope = OutboundEnvelope::Join(JoinPayload {
            channel_id: "agent-1".to_string(),
            target_ids: vec!["agent-1".to_string()],
        });
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "JOIN",
                "payload": {
                    "channelId": "agent-1",
                    "targetIds": ["agent-1"],
                }
            })
        );
    }

    #[test]
    fn test_send_envelope_shape() {
        let envelope = OutboundEnvelope::Send(SendPayload {
            sender_id: "user-1".to_string(),
            text: "hello".to_string(),
            channel_id: "agent-1".to_string(),
            target_id: "agent-1".to_string(),
            world_id: "world-1".to_string(),
            correlation_id: "123-abc".to_string(),
            source: MESSAGE_SOURCE.to_string(),
        });
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "SEND");
        assert_eq!(value["payload"]["senderId"], "user-1");
        assert_eq!(value["payload"]["text"], "hello");
        assert_eq!(value["payload"]["worldId"], "world-1");
        assert_eq!(value["payload"]["source"], "relay-mcp");
    }

    #[test]
    fn test_reply_known_fields() {
        let reply: ReplyEnvelope =
            serde_json::from_value(json!({"senderId": "agent-1", "text": "hi"})).unwrap();
        assert_eq!(reply.sender_id, "agent-1");
        assert_eq!(reply.text, "hi");
        assert!(reply.extra.is_empty());
    }

    #[test]
    fn test_reply_preserves_extra_fields() {
        let reply: ReplyEnvelope = serde_json::from_value(json!({
            "senderId": "agent-1",
            "text": "hi",
            "thought": "internal",
            "attachments": [{"url": "x"}],
        }))
        .unwrap();
        assert_eq!(reply.extra.len(), 2);
        assert_eq!(reply.extra["thought"], json!("internal"));
        assert_eq!(reply.extra["attachments"], json!([{"url": "x"}]));

        // Round-trips with the extras intact
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["thought"], json!("internal"));
    }

    #[test]
    fn test_reply_missing_fields_default() {
        let reply: ReplyEnvelope = serde_json::from_value(json!({"id": "m-1"})).unwrap();
        assert!(reply.sender_id.is_empty());
        assert!(reply.text.is_empty());
        assert!(!reply.has_text());
        assert_eq!(reply.extra["id"], json!("m-1"));
    }

    #[test]
    fn test_has_text_rejects_whitespace() {
        assert!(!ReplyEnvelope::new("agent-1", "   \n\t").has_text());
        assert!(ReplyEnvelope::new("agent-1", " ok ").has_text());
    }

    #[test]
    fn test_correlation_id_format() {
        let id = new_correlation_id();
        let (millis, suffix) = id.split_once('-').unwrap();
        assert!(millis.parse::<i64>().unwrap() > 0);
        assert_eq!(suffix.len(), 8);
    }

    #[test]
    fn test_correlation_ids_unique() {
        let a = new_correlation_id();
        let b = new_correlation_id();
        assert_ne!(a, b);
    }
}
