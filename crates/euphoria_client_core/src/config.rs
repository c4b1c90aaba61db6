#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use euphoria_util::endpoint::{DEFAULT_BASE, RoomEndpoint};
use serde::Deserialize;
use tracing::info;

use crate::ClientCoreError;

pub const DEFAULT_ROOM: &str = "space";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default config path: `~/.euphoria/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".euphoria").join("config.toml"))
}

/// Load the client config from TOML and env overrides.
pub fn load_client_config() -> anyhow::Result<ClientConfig> {
	let path = default_config_path()?;
	load_client_config_from_path(&path)
}

/// Same as `load_client_config` but with an explicit config path.
pub fn load_client_config_from_path(path: &Path) -> anyhow::Result<ClientConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ClientConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg);

	Ok(cfg)
}

/// Client session config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
	/// `ws://` or `wss://` server base, no path.
	pub ws_base_url: String,
	pub room: String,
	/// Consumer tick period.
	pub poll_interval: Duration,
	/// How long shutdown waits for the reader and writer before aborting them.
	pub shutdown_grace: Duration,
	pub connect_timeout: Duration,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			ws_base_url: DEFAULT_BASE.to_string(),
			room: DEFAULT_ROOM.to_string(),
			poll_interval: DEFAULT_POLL_INTERVAL,
			shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
			connect_timeout: DEFAULT_CONNECT_TIMEOUT,
		}
	}
}

impl ClientConfig {
	/// Validated connection target for the configured room.
	pub fn endpoint(&self) -> Result<RoomEndpoint, ClientCoreError> {
		RoomEndpoint::new(&self.ws_base_url, &self.room).map_err(ClientCoreError::Config)
	}

	fn from_file(file: FileConfig) -> Self {
		let defaults = Self::default();
		Self {
			ws_base_url: file
				.ws_base_url
				.filter(|s| !s.trim().is_empty())
				.unwrap_or(defaults.ws_base_url),
			room: file.room.filter(|s| !s.trim().is_empty()).unwrap_or(defaults.room),
			poll_interval: file
				.poll_interval_ms
				.filter(|v| *v > 0)
				.map(Duration::from_millis)
				.unwrap_or(defaults.poll_interval),
			shutdown_grace: file
				.shutdown_grace_ms
				.map(Duration::from_millis)
				.unwrap_or(defaults.shutdown_grace),
			connect_timeout: file
				.connect_timeout_ms
				.filter(|v| *v > 0)
				.map(Duration::from_millis)
				.unwrap_or(defaults.connect_timeout),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	ws_base_url: Option<String>,
	room: Option<String>,
	poll_interval_ms: Option<u64>,
	shutdown_grace_ms: Option<u64>,
	connect_timeout_ms: Option<u64>,
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut ClientConfig) {
	apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut ClientConfig, var: impl Fn(&str) -> Option<String>) {
	if let Some(v) = var("EUPHORIA_WS_BASE_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.ws_base_url = v;
			info!("client config: ws_base_url overridden by env");
		}
	}

	if let Some(v) = var("EUPHORIA_ROOM") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			info!(room = %v, "client config: room overridden by env");
			cfg.room = v;
		}
	}

	if let Some(v) = var("EUPHORIA_POLL_INTERVAL_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
		&& ms > 0
	{
		cfg.poll_interval = Duration::from_millis(ms);
		info!(ms, "client config: poll_interval overridden by env");
	}

	if let Some(v) = var("EUPHORIA_SHUTDOWN_GRACE_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.shutdown_grace = Duration::from_millis(ms);
		info!(ms, "client config: shutdown_grace overridden by env");
	}

	if let Some(v) = var("EUPHORIA_CONNECT_TIMEOUT_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
		&& ms > 0
	{
		cfg.connect_timeout = Duration::from_millis(ms);
		info!(ms, "client config: connect_timeout overridden by env");
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	#[test]
	fn missing_file_gives_defaults() {
		let path = std::env::temp_dir().join("euphoria-config-that-does-not-exist.toml");
		assert!(read_toml_if_exists(&path).unwrap().is_none());
	}

	#[test]
	fn file_values_and_blank_strings() {
		let file: FileConfig = toml::from_str(
			r#"
ws_base_url = "   "
room = "xkcd"
poll_interval_ms = 0
shutdown_grace_ms = 250
"#,
		)
		.unwrap();
		let cfg = ClientConfig::from_file(file);
		assert_eq!(cfg.ws_base_url, DEFAULT_BASE);
		assert_eq!(cfg.room, "xkcd");
		assert_eq!(cfg.poll_interval, DEFAULT_POLL_INTERVAL);
		assert_eq!(cfg.shutdown_grace, Duration::from_millis(250));
		assert_eq!(cfg.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
	}

	#[test]
	fn env_overrides_file() {
		let env: HashMap<&str, &str> = HashMap::from([
			("EUPHORIA_WS_BASE_URL", "ws://127.0.0.1:9000"),
			("EUPHORIA_ROOM", " test "),
			("EUPHORIA_POLL_INTERVAL_MS", "25"),
			("EUPHORIA_CONNECT_TIMEOUT_MS", "not-a-number"),
		]);
		let mut cfg = ClientConfig::default();
		apply_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));

		assert_eq!(cfg.ws_base_url, "ws://127.0.0.1:9000");
		assert_eq!(cfg.room, "test");
		assert_eq!(cfg.poll_interval, Duration::from_millis(25));
		assert_eq!(cfg.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
		assert_eq!(cfg.endpoint().unwrap().url(), "ws://127.0.0.1:9000/room/test/ws");
	}

	#[test]
	fn invalid_room_is_config_error() {
		let cfg = ClientConfig {
			room: "no spaces".to_string(),
			..ClientConfig::default()
		};
		assert!(matches!(cfg.endpoint(), Err(ClientCoreError::Config(_))));
	}
}
