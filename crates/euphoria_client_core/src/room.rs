#![forbid(unsafe_code)]

use core::fmt;
use std::collections::{HashMap, HashSet};

use euphoria_domain::{Message, User};
use euphoria_protocol::{DecodeError, Event, Ignored, Ping};
use thiserror::Error;
use tracing::{debug, info};

use crate::tree::{MessageTree, TreeContractViolation};

/// Why an event could not be applied.
#[derive(Debug, Error)]
pub enum ApplyError {
	/// Snapshot sub-list failed to materialize. The event is dropped.
	#[error(transparent)]
	Decode(#[from] DecodeError),

	/// Internal tree inconsistency. Fatal for the connection.
	#[error(transparent)]
	Contract(#[from] TreeContractViolation),
}

/// Client-side state of one chat room.
///
/// Owned and mutated by a single consumer; readers only see it between ticks.
#[derive(Debug, Default)]
pub struct Room {
	name: String,
	trees: Vec<MessageTree>,
	unprocessed: Vec<Message>,
	users: HashMap<String, User>,
	seen: HashSet<String>,
	dirty: bool,
}

impl Room {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Self::default()
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Thread roots, sorted by root timestamp.
	pub fn trees(&self) -> &[MessageTree] {
		&self.trees
	}

	/// Messages whose parent has not been placed yet.
	pub fn unprocessed(&self) -> &[Message] {
		&self.unprocessed
	}

	pub fn users(&self) -> &HashMap<String, User> {
		&self.users
	}

	pub fn user(&self, user_id: &str) -> Option<&User> {
		self.users.get(user_id)
	}

	/// Total messages placed in the forest.
	pub fn node_count(&self) -> usize {
		self.trees.iter().map(MessageTree::node_count).sum()
	}

	pub fn is_dirty(&self) -> bool {
		self.dirty
	}

	/// Returns whether the forest changed since the last call, and clears the flag.
	pub fn take_dirty(&mut self) -> bool {
		std::mem::take(&mut self.dirty)
	}

	/// Record a user sighting. Last write wins.
	pub fn upsert_user(&mut self, user: User) {
		self.users.insert(user.user_id.clone(), user);
	}

	/// Apply one decoded event.
	///
	/// Returns the ping when a keepalive reply is due.
	pub fn apply(&mut self, event: Event) -> Result<Option<Ping>, ApplyError> {
		match event {
			Event::Ping(ping) => return Ok(Some(ping)),
			Event::Snapshot(snapshot) => {
				debug!(
					listing = snapshot.listing_len(),
					log = snapshot.log_len(),
					"snapshot received"
				);
				// Both lists materialize before any mutation; a bad log leaves the room untouched.
				let users = snapshot.users()?;
				let messages = snapshot.messages()?;
				info!(
					room = %self.name,
					version = %snapshot.version,
					users = users.len(),
					messages = messages.len(),
					"applying snapshot"
				);
				for user in users {
					self.upsert_user(user.clone());
				}
				for message in messages {
					self.add_message(message.clone())?;
				}
			}
			Event::Message(message) => {
				self.upsert_user(message.sender().clone());
				self.add_message(message)?;
			}
			Event::User(user) => self.upsert_user(user),
			Event::NickChange(nick) => {
				debug!(agent_id = %nick.agent_id, to = %nick.to, "nick change not applied");
			}
			Event::Ignored(Ignored::Unknown(ty)) => debug!(event_type = %ty, "ignored event"),
			Event::Ignored(_) => {}
		}
		Ok(None)
	}

	/// Insert a message into the forest, or buffer it until its parent shows up.
	///
	/// Every call re-sweeps the buffer. Returns whether the forest changed.
	pub fn add_message(&mut self, message: Message) -> Result<bool, TreeContractViolation> {
		if !self.seen.insert(message.message_id().to_string()) {
			debug!(message_id = %message.message_id(), "duplicate message ignored");
			return Ok(false);
		}

		let inserted = if message.is_root() {
			self.push_root(message.clone());
			true
		} else {
			self.insert_reply(&message)?
		};

		let swept = self.resweep()?;

		if !inserted {
			debug!(
				message_id = %message.message_id(),
				parent_id = %message.parent_id(),
				"parent not seen yet; buffering"
			);
			metrics::counter!("euphoria_messages_buffered_total").increment(1);
			self.unprocessed.push(message);
		}

		let changed = inserted || swept > 0;
		if changed {
			self.dirty = true;
		}
		Ok(changed)
	}

	fn push_root(&mut self, message: Message) {
		self.trees.push(MessageTree::root(message));
		self.trees.sort_by_key(|t| t.message().timestamp());
	}

	fn insert_reply(&mut self, message: &Message) -> Result<bool, TreeContractViolation> {
		for tree in &mut self.trees {
			if tree.insert(message)? {
				return Ok(true);
			}
		}
		Ok(false)
	}

	/// Retry buffered messages until a pass places nothing.
	fn resweep(&mut self) -> Result<usize, TreeContractViolation> {
		let mut placed = 0;
		loop {
			let before = placed;
			for message in std::mem::take(&mut self.unprocessed) {
				if self.insert_reply(&message)? {
					placed += 1;
				} else {
					self.unprocessed.push(message);
				}
			}
			if placed == before {
				return Ok(placed);
			}
		}
	}

	/// Pre-order walk of the forest: each node, then its children, roots in order.
	///
	/// Every call starts a fresh walk.
	pub fn element_list(&self) -> Elements<'_> {
		Elements {
			stack: self.trees.iter().rev().collect(),
			next_index: 0,
		}
	}
}

impl fmt::Display for Room {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for tree in &self.trees {
			writeln!(f, "{tree}")?;
		}
		Ok(())
	}
}

/// One display row.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
	pub message: &'a Message,
	pub depth: usize,
	pub index: usize,
}

/// Iterator returned by [`Room::element_list`].
#[derive(Debug)]
pub struct Elements<'a> {
	stack: Vec<&'a MessageTree>,
	next_index: usize,
}

impl<'a> Iterator for Elements<'a> {
	type Item = Element<'a>;

	fn next(&mut self) -> Option<Self::Item> {
		let node = self.stack.pop()?;
		self.stack.extend(node.children().iter().rev());
		let index = self.next_index;
		self.next_index += 1;
		Some(Element {
			message: node.message(),
			depth: node.depth(),
			index,
		})
	}
}

#[cfg(test)]
mod tests {
	use euphoria_domain::Server;
	use euphoria_protocol::{EventType, Ping};

	use super::*;
	use crate::format::clock;

	fn user(id: &str) -> User {
		User::new(id, id, "0001", Server::new("heim.1", "era"))
	}

	fn msg(id: &str, parent: &str, ts: i64) -> Message {
		Message::new(id, ts, user("u"), parent, format!("body {id}"))
	}

	fn ids(room: &Room) -> Vec<&str> {
		room.element_list().map(|e| e.message.message_id()).collect()
	}

	#[test]
	fn child_before_parent_is_buffered_then_placed() {
		let mut room = Room::new("test");
		assert!(!room.add_message(msg("c", "p", 11)).unwrap());
		assert_eq!(room.unprocessed().len(), 1);

		assert!(room.add_message(msg("p", "", 10)).unwrap());
		assert!(room.unprocessed().is_empty());
		assert_eq!(ids(&room), ["p", "c"]);
	}

	#[test]
	fn buffered_chain_settles_in_one_call() {
		let mut room = Room::new("test");
		room.add_message(msg("g", "c", 12)).unwrap();
		room.add_message(msg("c", "p", 11)).unwrap();
		assert_eq!(room.unprocessed().len(), 2);

		room.add_message(msg("p", "", 10)).unwrap();
		assert!(room.unprocessed().is_empty());
		let depths: Vec<_> = room.element_list().map(|e| e.depth).collect();
		assert_eq!(depths, [0, 1, 2]);
	}

	#[test]
	fn duplicate_ids_are_ignored() {
		let mut room = Room::new("test");
		assert!(room.add_message(msg("a", "", 1)).unwrap());
		assert!(!room.add_message(msg("a", "", 1)).unwrap());
		room.add_message(msg("orphan", "x", 2)).unwrap();
		room.add_message(msg("orphan", "x", 2)).unwrap();
		assert_eq!(room.node_count(), 1);
		assert_eq!(room.unprocessed().len(), 1);
	}

	#[test]
	fn element_list_is_preorder_with_running_index() {
		let mut room = Room::new("test");
		room.add_message(msg("r2", "", 20)).unwrap();
		room.add_message(msg("r1", "", 10)).unwrap();
		room.add_message(msg("a", "r1", 11)).unwrap();
		room.add_message(msg("b", "r1", 12)).unwrap();
		room.add_message(msg("a1", "a", 13)).unwrap();

		let rows: Vec<_> = room
			.element_list()
			.map(|e| (e.message.message_id(), e.depth, e.index))
			.collect();
		assert_eq!(
			rows,
			[("r1", 0, 0), ("a", 1, 1), ("a1", 2, 2), ("b", 1, 3), ("r2", 0, 4)]
		);

		assert_eq!(room.element_list().count(), 5);
	}

	#[test]
	fn dirty_flag_tracks_forest_changes() {
		let mut room = Room::new("test");
		assert!(!room.take_dirty());

		room.add_message(msg("c", "p", 2)).unwrap();
		assert!(!room.take_dirty());

		room.add_message(msg("p", "", 1)).unwrap();
		assert!(room.take_dirty());
		assert!(!room.is_dirty());
	}

	#[test]
	fn message_event_upserts_sender() {
		let mut room = Room::new("test");
		let m = Message::new("m", 1, user("alice"), "", "hi");
		assert!(room.apply(Event::Message(m)).unwrap().is_none());
		assert_eq!(room.user("alice").map(|u| u.name.as_str()), Some("alice"));
		assert_eq!(room.node_count(), 1);
	}

	#[test]
	fn ping_requests_reply_without_mutation() {
		let mut room = Room::new("test");
		let ping = Ping {
			sent_time: 1,
			next_time: 31,
		};
		assert_eq!(room.apply(Event::Ping(ping)).unwrap(), Some(ping));
		assert!(!room.is_dirty());
		assert_eq!(room.node_count(), 0);
	}

	#[test]
	fn inert_events_are_noops() {
		let mut room = Room::new("test");
		room.apply(Event::Ignored(Ignored::Inert(EventType::JoinEvent))).unwrap();
		room.apply(Event::Ignored(Ignored::Unknown("who-event".into()))).unwrap();
		assert!(!room.is_dirty());
		assert!(room.users().is_empty());
	}

	#[test]
	fn display_dumps_forest() {
		let mut room = Room::new("test");
		room.add_message(msg("r", "", 1)).unwrap();
		room.add_message(msg("c", "r", 2)).unwrap();
		let expected = format!("{}|[u]: body r\n\t{}|[u]: body c\n", clock(1), clock(2));
		assert_eq!(room.to_string(), expected);
	}

	#[test]
	fn ten_thousand_deep_reply_chain() {
		const DEPTH: usize = 10_000;
		let mut room = Room::new("test");
		room.add_message(msg("m0", "", 0)).unwrap();
		for i in 1..=DEPTH {
			let parent = format!("m{}", i - 1);
			assert!(room.add_message(msg(&format!("m{i}"), &parent, i as i64)).unwrap());
		}

		assert_eq!(room.element_list().count(), DEPTH + 1);
		assert_eq!(room.node_count(), DEPTH + 1);
		let last = room.element_list().last().unwrap();
		assert_eq!(last.depth, DEPTH);
		assert_eq!(last.index, DEPTH);
	}
}
