//! Signaling message types exchanged over the WebSocket.
//!
//! Every message is a JSON object with a string `type` field. The relay only
//! looks inside `join`; everything else is forwarded as the exact text the
//! sender produced.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolResult;

/// The `type` discriminator of a signaling message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Join,
    Offer,
    Answer,
    IceCandidate,
    UserJoined,
    Error,
    /// Any type the relay does not know about; still relayed.
    Other(String),
}

impl MessageKind {
    pub fn from_type(value: &str) -> Self {
        match value {
            "join" => Self::Join,
            "offer" => Self::Offer,
            "answer" => Self::Answer,
            "ice-candidate" => Self::IceCandidate,
            "user-joined" => Self::UserJoined,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Join => "join",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
            Self::UserJoined => "user-joined",
            Self::Error => "error",
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to enter the room of an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub username: String,
}

/// A message to be forwarded untouched to the other room members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub kind: MessageKind,
    /// The original JSON text.
    pub text: String,
}

/// A parsed client-to-server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Join(JoinRequest),
    Relay(RelayMessage),
}

impl Inbound {
    /// Parses a text message.
    ///
    /// Fails with [`ProtocolError::Serialization`](crate::ProtocolError::Serialization)
    /// when the text is not a JSON object with a string `type`, or when a
    /// `join` lacks `roomId` or `username`.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .map(MessageKind::from_type)
            .ok_or_else(|| serde_json::Error::custom("missing string `type` field"))?;

        match kind {
            MessageKind::Join => Ok(Self::Join(serde_json::from_value(value)?)),
            kind => Ok(Self::Relay(RelayMessage {
                kind,
                text: text.to_string(),
            })),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Join(_) => MessageKind::Join,
            Self::Relay(relay) => relay.kind.clone(),
        }
    }
}

/// Messages the server originates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Outbound {
    /// Sent to existing room members when someone is admitted.
    UserJoined { username: String },
    /// Sent to a client right before the server closes its connection.
    Error { message: String },
}

impl Outbound {
    pub fn user_joined(username: impl Into<String>) -> Self {
        Self::UserJoined {
            username: username.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::UserJoined { .. } => MessageKind::UserJoined,
            Self::Error { .. } => MessageKind::Error,
        }
    }

    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolError;

    #[test]
    fn kind_wire_names() {
        for name in ["join", "offer", "answer", "ice-candidate", "user-joined", "error"] {
            let kind = MessageKind::from_type(name);
            assert!(!matches!(kind, MessageKind::Other(_)), "{name}");
            assert_eq!(kind.as_str(), name);
        }
        assert_eq!(
            MessageKind::from_type("renegotiate"),
            MessageKind::Other("renegotiate".into())
        );
        assert_eq!(MessageKind::IceCandidate.to_string(), "ice-candidate");
    }

    #[test]
    fn parse_join() {
        let inbound = Inbound::parse(r#"{"type":"join","roomId":"room1","username":"dr.sari"}"#)
            .unwrap();
        assert_eq!(
            inbound,
            Inbound::Join(JoinRequest {
                room_id: "room1".into(),
                username: "dr.sari".into(),
            })
        );
        assert_eq!(inbound.kind(), MessageKind::Join);
    }

    #[test]
    fn join_missing_fields_is_rejected() {
        let err = Inbound::parse(r#"{"type":"join","roomId":"room1"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Serialization(_)));
    }

    #[test]
    fn relay_keeps_exact_text() {
        let text = r#"{"type":"offer", "sdp":{"v":0},"extra":[1,2]}"#;
        match Inbound::parse(text).unwrap() {
            Inbound::Relay(relay) => {
                assert_eq!(relay.kind, MessageKind::Offer);
                assert_eq!(relay.text, text);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_relayed() {
        let inbound = Inbound::parse(r#"{"type":"hang-up"}"#).unwrap();
        assert_eq!(inbound.kind(), MessageKind::Other("hang-up".into()));
    }

    #[test]
    fn decode_failures() {
        for text in [
            "not json",
            r#"{"sdp":"x"}"#,
            r#"{"type":42}"#,
            r#"["offer"]"#,
            r#""offer""#,
        ] {
            assert!(
                matches!(Inbound::parse(text), Err(ProtocolError::Serialization(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn user_joined_shape() {
        insta::assert_json_snapshot!(Outbound::user_joined("dr.sari"), @r#"
        {
          "type": "user-joined",
          "username": "dr.sari"
        }
        "#);
    }

    #[test]
    fn error_shape() {
        let message = Outbound::error("appointment is not active");
        assert_eq!(message.kind(), MessageKind::Error);
        insta::assert_json_snapshot!(message, @r#"
        {
          "type": "error",
          "message": "appointment is not active"
        }
        "#);
    }

    #[test]
    fn outbound_to_json_is_compact() {
        assert_eq!(
            Outbound::user_joined("budi").to_json().unwrap(),
            r#"{"type":"user-joined","username":"budi"}"#
        );
    }
}
