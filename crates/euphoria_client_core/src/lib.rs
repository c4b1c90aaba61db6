#![forbid(unsafe_code)]

pub mod config;
pub mod format;
pub mod pipeline;
pub mod room;
pub mod session;
pub mod tree;

pub use config::{ClientConfig, default_config_path, load_client_config, load_client_config_from_path};
pub use pipeline::{ConnectionState, Consumer, KeepAlive, ShutdownSignal};
pub use room::{ApplyError, Element, Elements, Room};
pub use session::Session;
pub use tree::{MessageTree, TreeContractViolation};

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ClientCoreError {
	/// Connection establishment failed.
	#[error("failed to connect: {0}")]
	Connect(String),

	/// Receive or send failed outside of shutdown.
	#[error("transport error: {0}")]
	Transport(String),

	/// Message tree invariant broken.
	#[error(transparent)]
	Contract(#[from] TreeContractViolation),

	/// Invalid configuration.
	#[error("invalid config: {0}")]
	Config(String),

	/// Other error.
	#[error("error: {0}")]
	Other(String),
}

impl From<anyhow::Error> for ClientCoreError {
	fn from(e: anyhow::Error) -> Self {
		ClientCoreError::Other(format!("{e:#}"))
	}
}
