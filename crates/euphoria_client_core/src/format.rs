#![forbid(unsafe_code)]

use chrono::{Local, TimeZone as _};
use euphoria_domain::Message;

const THREAD_GUIDE: &str = "| ";

/// Render one display row.
///
/// `[<index>]HH:MM:SS| <guides><sender>: <content>`, or
/// `[<index>]HH:MM:SS| <guides><name<emote text>>` for emotes. The index
/// prefix is omitted when `index` is `None`.
pub fn message_line(message: &Message, depth: usize, index: Option<usize>) -> String {
	let prefix = index.map(|i| format!("[{i}]")).unwrap_or_default();
	let guides = THREAD_GUIDE.repeat(depth);
	let time = clock(message.timestamp());

	if message.is_emote() {
		format!(
			"{prefix}{time}| {guides}<{}{}>",
			message.sender().name,
			message.emote_text()
		)
	} else {
		format!("{prefix}{time}| {guides}{}: {}", message.sender(), message.content())
	}
}

/// Local wall-clock `HH:MM:SS` for a unix timestamp.
pub fn clock(unix_secs: i64) -> String {
	match Local.timestamp_opt(unix_secs, 0).single() {
		Some(t) => t.format("%H:%M:%S").to_string(),
		None => "--:--:--".to_string(),
	}
}
