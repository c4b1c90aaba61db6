#![forbid(unsafe_code)]

use core::fmt;

use euphoria_domain::Message;
use thiserror::Error;

use crate::format::clock;

/// A root-shaped message reached the child insertion path.
///
/// Roots go straight into the forest; seeing this means the forest/child split
/// was bypassed somewhere.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("root message {message_id} passed to child insertion")]
pub struct TreeContractViolation {
	pub message_id: String,
}

/// One node of a reply thread. Owns its children, sorted by timestamp.
///
/// Every walk over the subtree uses an explicit stack, so thread depth is
/// bounded by memory rather than by the call stack.
#[derive(Debug)]
pub struct MessageTree {
	message: Message,
	children: Vec<MessageTree>,
	depth: usize,
}

impl MessageTree {
	/// New thread root at depth 0.
	pub fn root(message: Message) -> Self {
		Self::with_depth(message, 0)
	}

	fn with_depth(message: Message, depth: usize) -> Self {
		Self {
			message,
			children: Vec::new(),
			depth,
		}
	}

	pub fn message(&self) -> &Message {
		&self.message
	}

	pub fn children(&self) -> &[MessageTree] {
		&self.children
	}

	pub fn depth(&self) -> usize {
		self.depth
	}

	/// Number of nodes in this subtree, including this one.
	pub fn node_count(&self) -> usize {
		let mut count = 0;
		let mut stack = vec![self];
		while let Some(node) = stack.pop() {
			count += 1;
			stack.extend(&node.children);
		}
		count
	}

	/// Place `message` under its parent somewhere in this subtree.
	///
	/// Returns `Ok(false)` when the parent is not in this subtree.
	pub fn insert(&mut self, message: &Message) -> Result<bool, TreeContractViolation> {
		if message.is_root() {
			return Err(TreeContractViolation {
				message_id: message.message_id().to_string(),
			});
		}

		let Some(path) = self.path_to(message.parent_id()) else {
			return Ok(false);
		};

		let mut parent = self;
		for index in path {
			parent = &mut parent.children[index];
		}
		let depth = parent.depth + 1;
		parent.children.push(Self::with_depth(message.clone(), depth));
		// Stable: equal timestamps keep arrival order.
		parent.children.sort_by_key(|c| c.message.timestamp());
		Ok(true)
	}

	/// Child indices leading from this node to the first pre-order node with `message_id`.
	fn path_to(&self, message_id: &str) -> Option<Vec<usize>> {
		if self.message.message_id() == message_id {
			return Some(Vec::new());
		}

		// Each frame holds a node and the index of its next unvisited child.
		let mut stack: Vec<(&MessageTree, usize)> = vec![(self, 0)];
		while let Some(frame) = stack.last_mut() {
			let (node, next) = *frame;
			frame.1 += 1;
			let Some(child) = node.children.get(next) else {
				stack.pop();
				continue;
			};
			if child.message.message_id() == message_id {
				return Some(stack.iter().map(|&(_, next)| next - 1).collect());
			}
			stack.push((child, 0));
		}
		None
	}
}

impl Drop for MessageTree {
	fn drop(&mut self) {
		let mut pending = std::mem::take(&mut self.children);
		while let Some(mut node) = pending.pop() {
			pending.append(&mut node.children);
		}
	}
}

impl fmt::Display for MessageTree {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut stack = vec![self];
		let mut first = true;
		while let Some(node) = stack.pop() {
			if !first {
				f.write_str("\n")?;
			}
			first = false;
			for _ in 0..node.depth {
				f.write_str("\t")?;
			}
			write!(
				f,
				"{}|{}: {}",
				clock(node.message.timestamp()),
				node.message.sender(),
				node.message.content()
			)?;
			stack.extend(node.children.iter().rev());
		}
		Ok(())
	}
}
