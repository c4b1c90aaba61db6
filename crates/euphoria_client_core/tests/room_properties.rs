use std::collections::HashMap;

use euphoria_client_core::{MessageTree, Room};
use euphoria_domain::{Message, Server, User};
use euphoria_protocol::{Event, decode_value};
use proptest::prelude::*;
use proptest::sample::Index;
use serde_json::json;

fn sender() -> User {
	User::new("tester", "d47f41e91c10b34a", "00000008", Server::new("heim.1", "00awjcddxlkhs"))
}

fn msg(id: &str, parent: &str, ts: i64) -> Message {
	Message::new(id, ts, sender(), parent, format!("body {id}"))
}

/// A self-contained forest: every parent id refers to an earlier message.
fn forest() -> impl Strategy<Value = Vec<Message>> {
	prop::collection::vec((any::<Index>(), any::<bool>(), 0i64..1_000), 1..40).prop_map(|specs| {
		specs
			.into_iter()
			.enumerate()
			.map(|(i, (pick, is_root, ts))| {
				let parent = if i == 0 || is_root {
					String::new()
				} else {
					format!("m{}", pick.index(i))
				};
				msg(&format!("m{i}"), &parent, ts)
			})
			.collect()
	})
}

fn assert_children_sorted(node: &MessageTree) {
	let ts: Vec<i64> = node.children().iter().map(|c| c.message().timestamp()).collect();
	assert!(ts.windows(2).all(|w| w[0] <= w[1]), "children out of order: {ts:?}");
	for child in node.children() {
		assert_eq!(child.depth(), node.depth() + 1);
		assert_children_sorted(child);
	}
}

proptest! {
	#[test]
	fn roots_sorted_for_any_arrival_order(
		stamps in prop::collection::vec(0i64..10_000, 1..50)
	) {
		let mut room = Room::new("test");
		for (i, ts) in stamps.iter().enumerate() {
			room.add_message(msg(&format!("r{i}"), "", *ts)).unwrap();
		}

		let ts: Vec<i64> = room.trees().iter().map(|t| t.message().timestamp()).collect();
		prop_assert!(ts.windows(2).all(|w| w[0] <= w[1]));
		prop_assert_eq!(room.trees().len(), stamps.len());
	}

	#[test]
	fn shuffled_delivery_converges(
		messages in forest().prop_flat_map(|ms| Just(ms).prop_shuffle())
	) {
		let mut room = Room::new("test");
		for m in &messages {
			room.add_message(m.clone()).unwrap();
		}

		prop_assert!(room.unprocessed().is_empty());
		prop_assert_eq!(room.node_count(), messages.len());

		let mut seen: HashMap<&str, usize> = HashMap::new();
		for e in room.element_list() {
			*seen.entry(e.message.message_id()).or_default() += 1;
		}
		prop_assert_eq!(seen.len(), messages.len());
		prop_assert!(seen.values().all(|n| *n == 1));

		for tree in room.trees() {
			prop_assert_eq!(tree.depth(), 0);
			assert_children_sorted(tree);
		}
	}

	#[test]
	fn siblings_sorted_for_any_arrival_order(
		stamps in prop::collection::vec(0i64..10_000, 1..30)
	) {
		let mut room = Room::new("test");
		room.add_message(msg("p", "", 0)).unwrap();
		for (i, ts) in stamps.iter().enumerate() {
			room.add_message(msg(&format!("c{i}"), "p", *ts)).unwrap();
		}

		let parent = &room.trees()[0];
		prop_assert_eq!(parent.children().len(), stamps.len());
		assert_children_sorted(parent);
	}

	#[test]
	fn element_indices_are_running_ordinals(messages in forest()) {
		let mut room = Room::new("test");
		for m in messages {
			room.add_message(m).unwrap();
		}

		let first: Vec<usize> = room.element_list().map(|e| e.index).collect();
		let expected: Vec<usize> = (0..room.node_count()).collect();
		prop_assert_eq!(&first, &expected);

		// A second walk starts over.
		let again: Vec<usize> = room.element_list().map(|e| e.index).collect();
		prop_assert_eq!(first, again);
	}
}

#[test]
fn late_parent_unblocks_buffered_child() {
	let mut room = Room::new("test");

	room.add_message(msg("c", "p", 20)).unwrap();
	assert_eq!(room.unprocessed().len(), 1);
	assert_eq!(room.node_count(), 0);

	room.add_message(msg("p", "", 10)).unwrap();
	room.add_message(msg("unrelated", "", 30)).unwrap();

	assert!(room.unprocessed().is_empty());
	let parent = &room.trees()[0];
	assert_eq!(parent.message().message_id(), "p");
	assert_eq!(parent.children()[0].message().message_id(), "c");
}

#[test]
fn orphan_stays_buffered() {
	let mut room = Room::new("test");
	room.add_message(msg("a", "", 1)).unwrap();
	room.add_message(msg("lost", "never-delivered", 2)).unwrap();
	room.add_message(msg("b", "a", 3)).unwrap();

	assert_eq!(room.unprocessed().len(), 1);
	assert_eq!(room.unprocessed()[0].message_id(), "lost");
	assert_eq!(room.element_list().count(), 2);
}

fn raw_user(id: &str, name: &str) -> serde_json::Value {
	json!({"id": id, "name": name, "server_id": "heim.1", "server_era": "00awjcddxlkhs"})
}

fn raw_message(id: &str, parent: &str, time: i64, sender: serde_json::Value) -> serde_json::Value {
	json!({"id": id, "parent": parent, "time": time, "sender": sender, "content": format!("body {id}")})
}

#[test]
fn snapshot_bootstrap_builds_full_forest() {
	let alice = raw_user("aaaa0001-00000001", "alice");
	let bob = raw_user("bbbb0002-00000002", "bob");
	let carol = raw_user("cccc0003-00000003", "carol");

	// Log deliberately lists replies before their parents.
	let frame = json!({
		"id": "",
		"type": "snapshot-event",
		"data": {
			"version": "v1",
			"session_id": "aaaa0001-00000001",
			"listing": [alice.clone(), bob.clone(), carol.clone()],
			"log": [
				raw_message("m4", "m2", 14, carol.clone()),
				raw_message("m2", "m1", 12, bob.clone()),
				raw_message("m1", "", 11, alice.clone()),
				raw_message("m3", "m1", 13, alice),
				raw_message("m5", "", 15, bob),
			],
		}
	});

	let event = decode_value(&frame).expect("decode snapshot");
	assert!(matches!(event, Event::Snapshot(_)));

	let mut room = Room::new("test");
	assert!(room.apply(event).expect("apply snapshot").is_none());

	assert_eq!(room.users().len(), 3);
	assert_eq!(room.node_count(), 5);
	assert_eq!(room.element_list().count(), 5);
	assert!(room.unprocessed().is_empty());
	assert!(room.take_dirty());

	let rows: Vec<(&str, usize)> = room
		.element_list()
		.map(|e| (e.message.message_id(), e.depth))
		.collect();
	assert_eq!(rows, [("m1", 0), ("m2", 1), ("m4", 2), ("m3", 1), ("m5", 0)]);
}

#[test]
fn snapshot_with_bad_log_leaves_room_untouched() {
	let frame = json!({
		"id": "",
		"type": "snapshot-event",
		"data": {
			"version": "v1",
			"session_id": "s",
			"listing": [raw_user("aaaa0001-00000001", "alice")],
			"log": [{"id": "broken"}],
		}
	});

	let mut room = Room::new("test");
	let event = decode_value(&frame).expect("decode snapshot");
	assert!(room.apply(event).is_err());
	assert!(room.users().is_empty());
	assert_eq!(room.node_count(), 0);
}
