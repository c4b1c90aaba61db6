#![forbid(unsafe_code)]

pub mod endpoint {
	/// Default server base when none is configured.
	pub const DEFAULT_BASE: &str = "wss://euphoria.io";

	/// A room's websocket endpoint: `<base>/room/<room>/ws`.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct RoomEndpoint {
		pub base: String,
		pub room: String,
	}

	impl RoomEndpoint {
		/// Validate a `ws://host[:port]` or `wss://host[:port]` base and a room name.
		pub fn new(base: &str, room: &str) -> Result<Self, String> {
			let base = validate_base(base)?;
			let room = validate_room(room)?;
			Ok(Self {
				base: base.to_string(),
				room: room.to_string(),
			})
		}

		/// Full websocket URL for this room.
		pub fn url(&self) -> String {
			format!("{}/room/{}/ws", self.base, self.room)
		}

		/// Whether the transport is TLS.
		pub fn is_tls(&self) -> bool {
			self.base.starts_with("wss://")
		}

		/// Parse a full room URL in the form `wss://host/room/<room>/ws`.
		pub fn parse(s: &str) -> Result<Self, String> {
			let s = s.trim();
			if s.is_empty() {
				return Err("endpoint must be non-empty (expected wss://host/room/<room>/ws)".to_string());
			}

			let scheme_len = scheme_prefix(s).ok_or_else(|| format!("invalid endpoint (expected ws:// or wss://): {s}"))?;

			let path_start = s[scheme_len..]
				.find('/')
				.map(|i| i + scheme_len)
				.ok_or_else(|| format!("invalid endpoint (missing /room/<room>/ws path): {s}"))?;
			let (base, path) = s.split_at(path_start);

			let room = path
				.strip_prefix("/room/")
				.and_then(|rest| rest.strip_suffix("/ws"))
				.ok_or_else(|| format!("invalid endpoint path (expected /room/<room>/ws): {s}"))?;

			Self::new(base, room)
		}
	}

	impl std::fmt::Display for RoomEndpoint {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			f.write_str(&self.url())
		}
	}

	fn scheme_prefix(s: &str) -> Option<usize> {
		if s.starts_with("wss://") {
			Some("wss://".len())
		} else if s.starts_with("ws://") {
			Some("ws://".len())
		} else {
			None
		}
	}

	/// Validate a base URL. Returns it with any trailing `/` removed.
	pub fn validate_base(s: &str) -> Result<&str, String> {
		let s = s.trim();
		if s.is_empty() {
			return Err("base must be non-empty (expected wss://host)".to_string());
		}

		let scheme_len = scheme_prefix(s).ok_or_else(|| format!("invalid base (expected ws://host or wss://host): {s}"))?;

		let trimmed = s.strip_suffix('/').unwrap_or(s);
		let host = &trimmed[scheme_len..];
		if host.is_empty() {
			return Err(format!("invalid base host (expected wss://host): {s}"));
		}
		if host.contains('/') || host.contains('?') || host.contains('#') {
			return Err(format!("invalid base (expected wss://host without path/query/fragment): {s}"));
		}

		Ok(trimmed)
	}

	/// Room names are non-empty ASCII alphanumerics.
	pub fn validate_room(s: &str) -> Result<&str, String> {
		let s = s.trim();
		if s.is_empty() {
			return Err("room must be non-empty".to_string());
		}
		if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
			return Err(format!("invalid room name (expected ascii letters and digits): {s}"));
		}
		Ok(s)
	}

}
