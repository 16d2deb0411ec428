//! Change events and stream payloads
//!
//! Wire forms:
//! - simple stream: `null`
//! - detailed stream: `[{"type": "added", "contactId": "..."}, ...]`
//! - error: `{"code": "permission_denied", "message": "..."}`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of change reported for a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// One contact change inside a coalesced batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(rename = "contactId")]
    pub contact_id: String,
}

impl ContactChangeEvent {
    pub fn new(kind: ChangeKind, contact_id: impl Into<String>) -> Self {
        Self {
            kind,
            contact_id: contact_id.into(),
        }
    }

    pub fn added(contact_id: impl Into<String>) -> Self {
        Self::new(ChangeKind::Added, contact_id)
    }

    pub fn updated(contact_id: impl Into<String>) -> Self {
        Self::new(ChangeKind::Updated, contact_id)
    }

    pub fn removed(contact_id: impl Into<String>) -> Self {
        Self::new(ChangeKind::Removed, contact_id)
    }
}

/// Stream identity. Each kind is a separate subscription slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Bare "something changed" pulses
    Simple,
    /// Per-contact added/updated/removed batches
    Detailed,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Simple, StreamKind::Detailed];

    pub fn is_detailed(self) -> bool {
        matches!(self, StreamKind::Detailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Simple => "simple",
            StreamKind::Detailed => "detailed",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(StreamKind::Simple),
            "detailed" => Ok(StreamKind::Detailed),
            other => Err(format!("unknown stream kind: {}", other)),
        }
    }
}

/// Error payload delivered once at subscribe time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamError {
    pub code: String,
    pub message: String,
}

/// Payload delivered to a stream subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    /// Simple stream pulse: re-fetch whatever you care about
    Changed,
    /// Detailed stream batch. Order inside the batch carries no meaning.
    Changes(Vec<ContactChangeEvent>),
    /// Subscription failed; nothing follows on this stream
    Error(StreamError),
}

impl StreamEvent {
    /// Wire form of this payload
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            StreamEvent::Changed => serde_json::Value::Null,
            other => serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StreamEvent::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_event_wire_form() {
        let event = ContactChangeEvent::updated("42");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"updated","contactId":"42"}"#);
    }

    #[test]
    fn test_change_event_round_trip() {
        for event in [
            ContactChangeEvent::added("a"),
            ContactChangeEvent::updated("b"),
            ContactChangeEvent::removed("c"),
        ] {
            let json = serde_json::to_string(&event).unwrap();
            let back: ContactChangeEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn test_simple_payload_is_null() {
        assert_eq!(StreamEvent::Changed.to_json(), serde_json::Value::Null);
        assert_eq!(serde_json::to_string(&StreamEvent::Changed).unwrap(), "null");
    }

    #[test]
    fn test_detailed_payload_is_array() {
        let payload = StreamEvent::Changes(vec![ContactChangeEvent::removed("7")]);
        assert_eq!(
            payload.to_json(),
            serde_json::json!([{"type": "removed", "contactId": "7"}])
        );
    }

    #[test]
    fn test_error_payload_shape() {
        let payload = StreamEvent::Error(StreamError {
            code: "permission_denied".to_string(),
            message: "no access".to_string(),
        });
        assert!(payload.is_error());
        assert_eq!(
            payload.to_json(),
            serde_json::json!({"code": "permission_denied", "message": "no access"})
        );
    }

    #[test]
    fn test_deserialize_stream_events() {
        let changed: StreamEvent = serde_json::from_str("null").unwrap();
        assert_eq!(changed, StreamEvent::Changed);

        let changes: StreamEvent =
            serde_json::from_str(r#"[{"type":"added","contactId":"1"}]"#).unwrap();
        assert_eq!(
            changes,
            StreamEvent::Changes(vec![ContactChangeEvent::added("1")])
        );

        let error: StreamEvent =
            serde_json::from_str(r#"{"code":"x","message":"y"}"#).unwrap();
        assert!(error.is_error());
    }

    #[test]
    fn test_stream_kind_parse() {
        assert_eq!("Detailed".parse::<StreamKind>(), Ok(StreamKind::Detailed));
        assert_eq!("simple".parse::<StreamKind>(), Ok(StreamKind::Simple));
        assert!("other".parse::<StreamKind>().is_err());
        assert_eq!(StreamKind::Detailed.to_string(), "detailed");
    }
}
