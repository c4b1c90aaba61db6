#![forbid(unsafe_code)]

use core::fmt;
use std::sync::Arc;

use euphoria_protocol::{PingReply, decode_frame};
use futures::{Sink, SinkExt as _, Stream, StreamExt as _};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

use crate::ClientCoreError;
use crate::room::{ApplyError, Room};

/// Per-connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Connecting,
	Open,
	Closing,
	Closed,
}

impl ConnectionState {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Connecting => "connecting",
			Self::Open => "open",
			Self::Closing => "closing",
			Self::Closed => "closed",
		}
	}
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Shared one-way shutdown flag. Clones observe the same flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
	tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
	fn default() -> Self {
		Self::new()
	}
}

impl ShutdownSignal {
	pub fn new() -> Self {
		let (tx, _rx) = watch::channel(false);
		Self { tx: Arc::new(tx) }
	}

	pub fn trigger(&self) {
		self.tx.send_replace(true);
	}

	pub fn is_triggered(&self) -> bool {
		*self.tx.borrow()
	}

	/// Resolves once the signal has been triggered.
	pub async fn wait(&self) {
		let mut rx = self.tx.subscribe();
		// The sender outlives this receiver.
		let _ = rx.wait_for(|triggered| *triggered).await;
	}
}

/// Keepalive reply counter. Starts at 0 for each connection.
#[derive(Debug, Default)]
pub struct KeepAlive {
	next_id: u64,
}

impl KeepAlive {
	pub fn new() -> Self {
		Self::default()
	}

	/// Id the next reply will carry.
	pub fn next_id(&self) -> u64 {
		self.next_id
	}

	pub fn reply(&mut self, now_unix_secs: i64) -> PingReply {
		let reply = PingReply::new(self.next_id, now_unix_secs);
		self.next_id += 1;
		reply
	}
}

/// Push every inbound text frame onto `frames`, in arrival order.
///
/// Returns `Ok` once shutdown is observed. A receive failure, close frame or end
/// of stream without shutdown is a transport error.
pub async fn run_reader<S>(
	mut stream: S,
	frames: mpsc::UnboundedSender<String>,
	shutdown: ShutdownSignal,
) -> Result<(), ClientCoreError>
where
	S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
	loop {
		tokio::select! {
			_ = shutdown.wait() => {
				debug!("reader observed shutdown");
				return Ok(());
			}
			msg = stream.next() => {
				let Some(msg) = msg else {
					if shutdown.is_triggered() {
						return Ok(());
					}
					return Err(ClientCoreError::Transport("connection ended".to_string()));
				};

				match msg {
					Ok(Message::Text(text)) => {
						metrics::counter!("euphoria_frames_received_total").increment(1);
						if frames.send(text.as_str().to_owned()).is_err() {
							debug!("frame queue closed; reader exiting");
							return Ok(());
						}
					}
					Ok(Message::Close(frame)) => {
						if shutdown.is_triggered() {
							return Ok(());
						}
						return Err(ClientCoreError::Transport(format!("server closed connection: {frame:?}")));
					}
					Ok(_) => {}
					Err(err) => {
						if shutdown.is_triggered() {
							debug!(error = %err, "receive failed during shutdown");
							return Ok(());
						}
						return Err(ClientCoreError::Transport(format!("receive failed: {err}")));
					}
				}
			}
		}
	}
}

/// Send queued outbound frames in order. Closes the sink once on the way out.
pub async fn run_writer<Si>(
	mut sink: Si,
	mut outbound: mpsc::UnboundedReceiver<String>,
	shutdown: ShutdownSignal,
) -> Result<(), ClientCoreError>
where
	Si: Sink<Message> + Unpin,
	Si::Error: fmt::Display,
{
	let mut failure = None;
	loop {
		tokio::select! {
			biased;

			frame = outbound.recv() => {
				let Some(frame) = frame else {
					break;
				};
				if let Err(err) = sink.send(Message::Text(frame.into())).await {
					if shutdown.is_triggered() {
						debug!(error = %err, "send failed during shutdown");
					} else {
						failure = Some(ClientCoreError::Transport(format!("send failed: {err}")));
					}
					break;
				}
			}
			_ = shutdown.wait() => break,
		}
	}

	if let Err(err) = sink.close().await {
		debug!(error = %err, "closing transport failed");
	}
	failure.map_or(Ok(()), Err)
}

/// Drains the frame queue into the room. The only writer of room state.
#[derive(Debug)]
pub struct Consumer {
	room: Room,
	frames: mpsc::UnboundedReceiver<String>,
	outbound: mpsc::UnboundedSender<String>,
	keepalive: KeepAlive,
}

impl Consumer {
	pub fn new(room: Room, frames: mpsc::UnboundedReceiver<String>, outbound: mpsc::UnboundedSender<String>) -> Self {
		Self {
			room,
			frames,
			outbound,
			keepalive: KeepAlive::new(),
		}
	}

	pub fn room(&self) -> &Room {
		&self.room
	}

	pub fn room_mut(&mut self) -> &mut Room {
		&mut self.room
	}

	pub fn keepalive(&self) -> &KeepAlive {
		&self.keepalive
	}

	pub fn into_room(self) -> Room {
		self.room
	}

	/// Process every frame queued so far, oldest first. Never waits.
	///
	/// Returns the number of frames taken off the queue.
	pub fn tick(&mut self) -> Result<usize, ClientCoreError> {
		let mut taken = 0;
		while let Ok(raw) = self.frames.try_recv() {
			taken += 1;
			self.handle_frame(&raw)?;
		}
		Ok(taken)
	}

	fn handle_frame(&mut self, raw: &str) -> Result<(), ClientCoreError> {
		let event = match decode_frame(raw) {
			Ok(event) => event,
			Err(err) => {
				metrics::counter!("euphoria_frames_dropped_total").increment(1);
				warn!(error = %err, "dropping undecodable frame");
				return Ok(());
			}
		};

		match self.room.apply(event) {
			Ok(Some(ping)) => {
				let now = chrono::Utc::now().timestamp();
				let reply = self.keepalive.reply(now);
				debug!(id = %reply.id(), sent_time = ping.sent_time, next_time = ping.next_time, "replying to ping");
				let text = reply
					.to_json()
					.map_err(|e| ClientCoreError::Other(format!("encode ping reply: {e}")))?;
				self.outbound
					.send(text)
					.map_err(|_| ClientCoreError::Transport("outbound queue closed".to_string()))?;
				metrics::counter!("euphoria_ping_replies_total").increment(1);
			}
			Ok(None) => {}
			Err(ApplyError::Decode(err)) => {
				metrics::counter!("euphoria_frames_dropped_total").increment(1);
				warn!(error = %err, "dropping event that failed to apply");
			}
			Err(ApplyError::Contract(violation)) => return Err(ClientCoreError::Contract(violation)),
		}
		Ok(())
	}
}
