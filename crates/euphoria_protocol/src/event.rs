#![forbid(unsafe_code)]

use std::sync::OnceLock;

use euphoria_domain::{Message, User};
use serde_json::Value;

use crate::decode::{DecodeError, decode_message, decode_user};

/// Wire event types the decoder knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
	PingEvent,
	SnapshotEvent,
	SendEvent,
	SendReply,
	NickEvent,
	JoinEvent,
	PartEvent,
	PingReply,
}

impl EventType {
	/// Stable wire identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::PingEvent => "ping-event",
			Self::SnapshotEvent => "snapshot-event",
			Self::SendEvent => "send-event",
			Self::SendReply => "send-reply",
			Self::NickEvent => "nick-event",
			Self::JoinEvent => "join-event",
			Self::PartEvent => "part-event",
			Self::PingReply => "ping-reply",
		}
	}

	pub fn from_wire(s: &str) -> Option<Self> {
		match s {
			"ping-event" => Some(Self::PingEvent),
			"snapshot-event" => Some(Self::SnapshotEvent),
			"send-event" => Some(Self::SendEvent),
			"send-reply" => Some(Self::SendReply),
			"nick-event" => Some(Self::NickEvent),
			"join-event" => Some(Self::JoinEvent),
			"part-event" => Some(Self::PartEvent),
			"ping-reply" => Some(Self::PingReply),
			_ => None,
		}
	}
}

/// One decoded inbound frame.
#[derive(Debug)]
pub enum Event {
	Ping(Ping),
	Snapshot(Box<Snapshot>),
	/// `send-event` or `send-reply`.
	Message(Message),
	NickChange(NickChange),
	/// Bare user payload (`id` + `name`, no `type`).
	User(User),
	Ignored(Ignored),
}

/// Why a frame decoded to nothing actionable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ignored {
	/// Known type that carries nothing this client acts on.
	Inert(EventType),
	/// Type not in the dispatch table.
	Unknown(String),
	/// No `type` and not a bare user.
	Untyped,
}

/// Server liveness ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
	pub sent_time: i64,
	pub next_time: i64,
}

/// Nick change notice. Decoded, not yet applied anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NickChange {
	pub agent_id: String,
	pub from: String,
	pub to: String,
}

/// Full-state bulk event delivered once after connecting.
///
/// `users` and `messages` decode their raw lists on first access and return
/// the cached value afterwards.
#[derive(Debug)]
pub struct Snapshot {
	pub version: String,
	pub session_id: String,
	listing: Vec<Value>,
	log: Vec<Value>,
	users: OnceLock<Vec<User>>,
	messages: OnceLock<Vec<Message>>,
}

impl Snapshot {
	pub fn new(version: String, session_id: String, listing: Vec<Value>, log: Vec<Value>) -> Self {
		Self {
			version,
			session_id,
			listing,
			log,
			users: OnceLock::new(),
			messages: OnceLock::new(),
		}
	}

	/// Number of raw user entries in the listing.
	pub fn listing_len(&self) -> usize {
		self.listing.len()
	}

	/// Number of raw message entries in the log.
	pub fn log_len(&self) -> usize {
		self.log.len()
	}

	pub fn users(&self) -> Result<&[User], DecodeError> {
		if let Some(users) = self.users.get() {
			return Ok(users);
		}
		let decoded = self.listing.iter().map(decode_user).collect::<Result<Vec<_>, _>>()?;
		Ok(self.users.get_or_init(|| decoded))
	}

	pub fn messages(&self) -> Result<&[Message], DecodeError> {
		if let Some(messages) = self.messages.get() {
			return Ok(messages);
		}
		let decoded = self.log.iter().map(decode_message).collect::<Result<Vec<_>, _>>()?;
		Ok(self.messages.get_or_init(|| decoded))
	}
}
