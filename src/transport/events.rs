use crate::models::ParticipantId;
use serde::{Deserialize, Serialize};

pub const SEND_MESSAGE: &str = "send-message";
pub const RECEIVE_MESSAGE: &str = "receive-message";

/// Envelope for every frame on the wire.
#[derive(Debug, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub recipients: Vec<ParticipantId>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub recipients: Vec<ParticipantId>,
    pub text: String,
    pub sender: ParticipantId,
}

#[derive(Debug, PartialEq, Eq)]
pub enum InboundEvent {
    ReceiveMessage(IncomingMessage),
    Unknown(String),
}

pub fn encode_send(message: &OutgoingMessage) -> Result<String, serde_json::Error> {
    encode(SEND_MESSAGE, message)
}

pub fn encode_receive(message: &IncomingMessage) -> Result<String, serde_json::Error> {
    encode(RECEIVE_MESSAGE, message)
}

fn encode<T: Serialize>(event: &str, data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Frame {
        event: event.to_string(),
        data: serde_json::to_value(data)?,
    })
}

pub fn decode_inbound(text: &str) -> Result<InboundEvent, serde_json::Error> {
    let frame: Frame = serde_json::from_str(text)?;
    if frame.event == RECEIVE_MESSAGE {
        Ok(InboundEvent::ReceiveMessage(serde_json::from_value(frame.data)?))
    } else {
        Ok(InboundEvent::Unknown(frame.event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_frame_layout() {
        let raw = encode_send(&OutgoingMessage {
            recipients: vec!["bob".into()],
            text: "hi".into(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "event": "send-message",
                "data": { "recipients": ["bob"], "text": "hi" }
            })
        );
    }

    #[test]
    fn decodes_receive_message() {
        let raw = r#"{"event":"receive-message","data":{"recipients":["carol","bob"],"text":"yo","sender":"bob"}}"#;
        assert_eq!(
            decode_inbound(raw).unwrap(),
            InboundEvent::ReceiveMessage(IncomingMessage {
                recipients: vec!["carol".into(), "bob".into()],
                text: "yo".into(),
                sender: "bob".into(),
            })
        );
    }

    #[test]
    fn other_events_are_reported_by_name() {
        let raw = r#"{"event":"typing","data":{}}"#;
        assert_eq!(
            decode_inbound(raw).unwrap(),
            InboundEvent::Unknown("typing".into())
        );
    }

    #[test]
    fn receive_without_sender_is_rejected() {
        let raw = r#"{"event":"receive-message","data":{"recipients":[],"text":"x"}}"#;
        assert!(decode_inbound(raw).is_err());
    }
}
