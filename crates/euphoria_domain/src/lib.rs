#![forbid(unsafe_code)]

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content prefix that marks a message as an emote.
pub const EMOTE_PREFIX: &str = "/me";

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Split a wire agent id of the form `<user_id>-<session>` on the first `-`.
///
/// The part before the dash is stable across connections, the part after is
/// per-connection.
pub fn split_agent_id(raw: &str) -> Result<(&str, &str), ParseIdError> {
	if raw.trim().is_empty() {
		return Err(ParseIdError::Empty);
	}

	let (user_id, session) = raw
		.split_once('-')
		.ok_or_else(|| ParseIdError::InvalidFormat(format!("expected <user_id>-<session>, got {raw}")))?;

	if user_id.is_empty() {
		return Err(ParseIdError::InvalidFormat(format!("missing user id in {raw}")));
	}

	Ok((user_id, session))
}

/// Server identity a user is connected through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Server {
	pub id: String,
	pub era: String,
}

impl Server {
	pub fn new(id: impl Into<String>, era: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			era: era.into(),
		}
	}
}

/// A participant sighting. Equality covers every field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct User {
	pub name: String,
	pub user_id: String,
	pub session: String,
	pub server: Server,
}

impl User {
	pub fn new(
		name: impl Into<String>,
		user_id: impl Into<String>,
		session: impl Into<String>,
		server: Server,
	) -> Self {
		Self {
			name: name.into(),
			user_id: user_id.into(),
			session: session.into(),
			server,
		}
	}

	/// Build a user from the combined wire id (`<user_id>-<session>`).
	pub fn from_agent_id(name: impl Into<String>, agent_id: &str, server: Server) -> Result<Self, ParseIdError> {
		let (user_id, session) = split_agent_id(agent_id)?;
		Ok(Self::new(name, user_id, session, server))
	}
}

impl fmt::Display for User {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}]", self.name)
	}
}

/// A chat message. Immutable once constructed.
///
/// An empty `parent_id` marks a root message (a new thread).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Message {
	message_id: String,
	timestamp: i64,
	sender: User,
	parent_id: String,
	content: String,
}

impl Message {
	pub fn new(
		message_id: impl Into<String>,
		timestamp: i64,
		sender: User,
		parent_id: impl Into<String>,
		content: impl Into<String>,
	) -> Self {
		Self {
			message_id: message_id.into(),
			timestamp,
			sender,
			parent_id: parent_id.into(),
			content: content.into(),
		}
	}

	pub fn message_id(&self) -> &str {
		&self.message_id
	}

	/// Unix seconds. The only ordering key between messages.
	pub fn timestamp(&self) -> i64 {
		self.timestamp
	}

	pub fn sender(&self) -> &User {
		&self.sender
	}

	pub fn parent_id(&self) -> &str {
		&self.parent_id
	}

	pub fn content(&self) -> &str {
		&self.content
	}

	pub fn is_root(&self) -> bool {
		self.parent_id.is_empty()
	}

	pub fn is_emote(&self) -> bool {
		self.content.starts_with(EMOTE_PREFIX)
	}

	/// Content with the leading emote marker removed (unchanged for non-emotes).
	pub fn emote_text(&self) -> &str {
		self.content.strip_prefix(EMOTE_PREFIX).unwrap_or(&self.content)
	}
}
