#![forbid(unsafe_code)]

use serde::Serialize;

use crate::event::EventType;

/// Outbound keepalive reply to a `ping-event`.
///
/// Serializes as `{"type":"ping-reply","data":{"time":<unix secs>},"id":"<n>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingReply {
	#[serde(rename = "type")]
	kind: &'static str,
	data: PingReplyData,
	id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PingReplyData {
	time: i64,
}

impl PingReply {
	pub fn new(id: u64, time: i64) -> Self {
		Self {
			kind: EventType::PingReply.as_str(),
			data: PingReplyData { time },
			id: id.to_string(),
		}
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn time(&self) -> i64 {
		self.data.time
	}

	pub fn to_json(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string(self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn serializes_in_wire_shape() {
		let reply = PingReply::new(3, 1426697161);
		assert_eq!(
			reply.to_json().unwrap(),
			r#"{"type":"ping-reply","data":{"time":1426697161},"id":"3"}"#
		);
	}
}
