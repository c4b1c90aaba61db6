#![forbid(unsafe_code)]

use euphoria_domain::{Message, ParseIdError, Server, User};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::event::{Event, EventType, Ignored, NickChange, Ping, Snapshot};

#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("invalid json frame: {0}")]
	Json(#[from] serde_json::Error),

	#[error("malformed {event_type} payload: {source}")]
	Payload {
		event_type: &'static str,
		#[source]
		source: serde_json::Error,
	},

	#[error("invalid user id: {0}")]
	InvalidUser(#[from] ParseIdError),
}

#[derive(Debug, Deserialize)]
struct RawUser {
	id: String,
	name: String,
	server_id: String,
	server_era: String,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
	id: String,
	#[serde(default)]
	parent: Option<String>,
	time: i64,
	sender: RawUser,
	content: String,
}

#[derive(Debug, Deserialize)]
struct RawPing {
	time: i64,
	next: i64,
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
	version: String,
	session_id: String,
	listing: Vec<Value>,
	log: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawNick {
	id: String,
	from: String,
	to: String,
}

impl TryFrom<RawUser> for User {
	type Error = ParseIdError;

	fn try_from(raw: RawUser) -> Result<Self, Self::Error> {
		User::from_agent_id(raw.name, &raw.id, Server::new(raw.server_id, raw.server_era))
	}
}

fn payload<'a, T: Deserialize<'a>>(event_type: EventType, data: &'a Value) -> Result<T, DecodeError> {
	T::deserialize(data).map_err(|source| DecodeError::Payload {
		event_type: event_type.as_str(),
		source,
	})
}

/// Decode a raw user object (`{id, name, server_id, server_era}`).
pub fn decode_user(value: &Value) -> Result<User, DecodeError> {
	let raw = RawUser::deserialize(value).map_err(|source| DecodeError::Payload {
		event_type: "user",
		source,
	})?;
	Ok(User::try_from(raw)?)
}

/// Decode a raw message object as found in `send-event` data and snapshot logs.
pub fn decode_message(value: &Value) -> Result<Message, DecodeError> {
	let raw = RawMessage::deserialize(value).map_err(|source| DecodeError::Payload {
		event_type: "message",
		source,
	})?;
	message_from_raw(raw)
}

fn message_from_raw(raw: RawMessage) -> Result<Message, DecodeError> {
	let sender = User::try_from(raw.sender)?;
	Ok(Message::new(
		raw.id,
		raw.time,
		sender,
		raw.parent.unwrap_or_default(),
		raw.content,
	))
}

/// Decode one raw text frame.
pub fn decode_frame(raw: &str) -> Result<Event, DecodeError> {
	let value: Value = serde_json::from_str(raw)?;
	decode_value(&value)
}

/// Decode an already-parsed frame.
///
/// Unknown or missing `type` values are not errors; they decode to
/// [`Event::Ignored`]. A recognized type with a malformed payload is a
/// [`DecodeError`].
pub fn decode_value(value: &Value) -> Result<Event, DecodeError> {
	let Some(type_name) = value.get("type").and_then(Value::as_str) else {
		if value.get("id").is_some() && value.get("name").is_some() {
			return Ok(Event::User(decode_user(value)?));
		}
		return Ok(Event::Ignored(Ignored::Untyped));
	};

	let Some(event_type) = EventType::from_wire(type_name) else {
		debug!(event_type = %type_name, "unsupported event type");
		return Ok(Event::Ignored(Ignored::Unknown(type_name.to_string())));
	};

	// Payloads normally live under `data`; bare payloads are accepted as-is.
	let data = value.get("data").unwrap_or(value);

	let event = match event_type {
		EventType::PingEvent => {
			let raw: RawPing = payload(event_type, data)?;
			Event::Ping(Ping {
				sent_time: raw.time,
				next_time: raw.next,
			})
		}
		EventType::SnapshotEvent => {
			let raw: RawSnapshot = payload(event_type, data)?;
			Event::Snapshot(Box::new(Snapshot::new(raw.version, raw.session_id, raw.listing, raw.log)))
		}
		EventType::SendEvent | EventType::SendReply => {
			let raw: RawMessage = payload(event_type, data)?;
			Event::Message(message_from_raw(raw)?)
		}
		EventType::NickEvent => {
			let raw: RawNick = payload(event_type, data)?;
			Event::NickChange(NickChange {
				agent_id: raw.id,
				from: raw.from,
				to: raw.to,
			})
		}
		EventType::JoinEvent | EventType::PartEvent | EventType::PingReply => Event::Ignored(Ignored::Inert(event_type)),
	};

	Ok(event)
}
