//! JSON wire format of the messaging service.
//!
//! Replies share an envelope of `result` (`"success"` or `"error"`) and
//! `msg`. Events are decoded one at a time so a single unknown tag never
//! poisons the rest of a batch.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    traits::{Registration, SourceError},
    types::{Event, EventId, EventKind, Message, QueueId, Recipient, User},
};

const SUCCESS_RESULT: &str = "success";

/// Malformed payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("{kind} message has a mismatched display_recipient")]
    RecipientMismatch { kind: &'static str },
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct Reply<T> {
    result: String,
    #[serde(default)]
    msg: String,
    #[serde(flatten)]
    body: T,
}

impl<T> Reply<T> {
    fn into_body(self) -> Result<T, SourceError> {
        if self.result == SUCCESS_RESULT {
            Ok(self.body)
        } else {
            Err(SourceError::Api {
                result: self.result,
                msg: self.msg,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawQueueId {
    Text(String),
    Number(u64),
}

impl From<RawQueueId> for QueueId {
    fn from(raw: RawQueueId) -> Self {
        match raw {
            RawQueueId::Text(text) => Self::new(text),
            RawQueueId::Number(n) => Self::new(n.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    queue_id: Option<RawQueueId>,
    last_event_id: Option<EventId>,
}

#[derive(Debug, Deserialize)]
struct EventsBody {
    #[serde(default)]
    events: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SendBody {
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: EventId,
    #[serde(rename = "type")]
    tag: String,
    #[serde(default)]
    message: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DisplayRecipient {
    Stream(String),
    Users(Vec<User>),
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: u64,
    #[serde(default)]
    sender_full_name: String,
    #[serde(default)]
    sender_email: String,
    display_recipient: DisplayRecipient,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    timestamp: u64,
    #[serde(rename = "type")]
    kind: String,
}

/// Decode the reply to a queue registration.
///
/// # Errors
/// Returns `SourceError::Api` for a non-success result and
/// `SourceError::Decode` for a malformed body.
pub fn decode_register(body: &str) -> Result<Registration, SourceError> {
    let reply: Reply<RegisterBody> = serde_json::from_str(body).map_err(DecodeError::from)?;
    let body = reply.into_body()?;
    let queue_id = body.queue_id.ok_or(DecodeError::MissingField("queue_id"))?;
    let last_event_id = body
        .last_event_id
        .ok_or(DecodeError::MissingField("last_event_id"))?;
    Ok(Registration {
        queue_id: queue_id.into(),
        last_event_id,
    })
}

/// Decode the reply to an events request.
///
/// # Errors
/// Returns `SourceError::Api` for a non-success result and
/// `SourceError::Decode` when the envelope or any event lacks its id or tag.
pub fn decode_events(body: &str) -> Result<Vec<Event>, SourceError> {
    let reply: Reply<EventsBody> = serde_json::from_str(body).map_err(DecodeError::from)?;
    let events = reply.into_body()?.events;
    events
        .into_iter()
        .map(|value| decode_event(value).map_err(SourceError::from))
        .collect()
}

/// Decode the reply to a send-message request into the new message id.
///
/// # Errors
/// Returns `SourceError::Api` for a non-success result and
/// `SourceError::Decode` for a malformed body.
pub fn decode_send(body: &str) -> Result<u64, SourceError> {
    let reply: Reply<SendBody> = serde_json::from_str(body).map_err(DecodeError::from)?;
    Ok(reply.into_body()?.id.ok_or(DecodeError::MissingField("id"))?)
}

/// Decode one event object.
///
/// Unknown event tags and unknown message types become
/// [`EventKind::Unsupported`] rather than errors.
///
/// # Errors
/// Returns error if the object has no id or tag, or a message payload is
/// malformed.
pub fn decode_event(value: Value) -> Result<Event, DecodeError> {
    let raw: WireEvent = serde_json::from_value(value)?;
    let kind = match raw.tag.as_str() {
        "heartbeat" => EventKind::Heartbeat,
        "message" => {
            let payload = raw.message.ok_or(DecodeError::MissingField("message"))?;
            decode_message(payload)?
        }
        other => EventKind::Unsupported {
            tag: other.to_string(),
        },
    };
    Ok(Event { id: raw.id, kind })
}

fn decode_message(value: Value) -> Result<EventKind, DecodeError> {
    let raw: WireMessage = serde_json::from_value(value)?;
    let recipient = match (raw.kind.as_str(), raw.display_recipient) {
        ("stream", DisplayRecipient::Stream(stream)) => Recipient::Stream {
            stream,
            topic: raw.subject,
        },
        ("private", DisplayRecipient::Users(users)) => Recipient::Private { users },
        ("stream", DisplayRecipient::Users(_)) => {
            return Err(DecodeError::RecipientMismatch { kind: "stream" });
        }
        ("private", DisplayRecipient::Stream(_)) => {
            return Err(DecodeError::RecipientMismatch { kind: "private" });
        }
        (other, _) => {
            return Ok(EventKind::Unsupported {
                tag: format!("message/{other}"),
            });
        }
    };

    Ok(EventKind::Message(Message {
        id: raw.id,
        sender_name: raw.sender_full_name,
        sender_email: raw.sender_email,
        recipient,
        content: raw.content,
        timestamp: raw.timestamp,
    }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_register_reply() {
        let reg = decode_register(
            r#"{"result":"success","msg":"","queue_id":"1375801870:2942","last_event_id":-1}"#,
        )
        .unwrap();
        assert_eq!(reg.queue_id, QueueId::new("1375801870:2942"));
        assert_eq!(reg.last_event_id, -1);
    }

    #[test]
    fn accepts_numeric_queue_id() {
        let reg =
            decode_register(r#"{"result":"success","queue_id":42,"last_event_id":7}"#).unwrap();
        assert_eq!(reg.queue_id.as_str(), "42");
    }

    #[test]
    fn error_result_becomes_api_error() {
        let err = decode_register(r#"{"result":"error","msg":"Invalid API key"}"#).unwrap_err();
        assert_eq!(
            err,
            SourceError::Api {
                result: "error".into(),
                msg: "Invalid API key".into(),
            }
        );
        assert_eq!(err.to_string(), "API call returned error: Invalid API key");
    }

    #[test]
    fn missing_queue_id_is_decode_error() {
        let err = decode_register(r#"{"result":"success","last_event_id":1}"#).unwrap_err();
        assert_eq!(
            err,
            SourceError::Decode(DecodeError::MissingField("queue_id"))
        );
    }

    #[test]
    fn decodes_mixed_event_batch() {
        let body = json!({
            "result": "success",
            "msg": "",
            "events": [
                {"id": 4, "type": "heartbeat"},
                {"id": 5, "type": "message", "message": {
                    "id": 12345678,
                    "type": "stream",
                    "display_recipient": "Denmark",
                    "subject": "Castle",
                    "sender_full_name": "Othello Bot",
                    "sender_email": "othello-bot@example.com",
                    "content": "Something is rotten in the state of Denmark.",
                    "timestamp": 1375978403
                }},
                {"id": 6, "type": "presence"}
            ]
        })
        .to_string();

        let events = decode_events(&body).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], Event::heartbeat(4));
        match &events[1].kind {
            EventKind::Message(msg) => {
                assert_eq!(msg.stream_name(), Some("Denmark"));
                assert_eq!(msg.topic(), Some("Castle"));
                assert_eq!(msg.sender_name, "Othello Bot");
                assert_eq!(msg.timestamp, 1_375_978_403);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
        assert_eq!(events[2], Event::unsupported(6, "presence"));
    }

    #[test]
    fn decodes_private_recipients() {
        let event = decode_event(json!({
            "id": 9,
            "type": "message",
            "message": {
                "id": 1,
                "type": "private",
                "display_recipient": [
                    {
                        "id": 31572,
                        "full_name": "Hamlet of Denmark",
                        "email": "hamlet@example.com",
                        "short_name": "hamlet"
                    }
                ],
                "sender_full_name": "Hamlet of Denmark",
                "content": "to be"
            }
        }))
        .unwrap();

        let EventKind::Message(msg) = event.kind else {
            panic!("expected message");
        };
        match msg.recipient {
            Recipient::Private { users } => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].email, "hamlet@example.com");
            }
            Recipient::Stream { .. } => panic!("expected private recipient"),
        }
    }

    #[test]
    fn unknown_message_type_is_unsupported_not_error() {
        let event = decode_event(json!({
            "id": 3,
            "type": "message",
            "message": {"id": 1, "type": "huddle", "display_recipient": []}
        }))
        .unwrap();
        assert_eq!(event, Event::unsupported(3, "message/huddle"));
    }

    #[test]
    fn decodes_send_reply() {
        assert_eq!(decode_send(r#"{"result":"success","id":77}"#), Ok(77));
        assert_eq!(
            decode_send(r#"{"result":"success"}"#),
            Err(SourceError::Decode(DecodeError::MissingField("id")))
        );
    }

    #[test]
    fn event_without_id_fails_the_batch() {
        let err = decode_events(r#"{"result":"success","events":[{"type":"heartbeat"}]}"#)
            .unwrap_err();
        assert!(matches!(err, SourceError::Decode(DecodeError::Json(_))));
    }
}
