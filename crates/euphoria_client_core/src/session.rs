#![forbid(unsafe_code)]

use core::fmt;
use std::time::Duration;

use euphoria_util::endpoint::RoomEndpoint;
use futures::{Sink, Stream, StreamExt as _};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use crate::ClientCoreError;
use crate::config::ClientConfig;
use crate::pipeline::{Consumer, ConnectionState, ShutdownSignal, run_reader, run_writer};
use crate::room::Room;

/// One connection to one room, from connect to close.
#[derive(Debug)]
pub struct Session {
	config: ClientConfig,
	endpoint: RoomEndpoint,
	shutdown: ShutdownSignal,
	state: ConnectionState,
}

impl Session {
	pub fn new(config: ClientConfig, shutdown: ShutdownSignal) -> Result<Self, ClientCoreError> {
		if config.poll_interval.is_zero() {
			return Err(ClientCoreError::Config("poll_interval must be non-zero".to_string()));
		}
		let endpoint = config.endpoint()?;
		Ok(Self {
			config,
			endpoint,
			shutdown,
			state: ConnectionState::Connecting,
		})
	}

	pub fn endpoint(&self) -> &RoomEndpoint {
		&self.endpoint
	}

	pub fn state(&self) -> ConnectionState {
		self.state
	}

	pub fn shutdown_signal(&self) -> ShutdownSignal {
		self.shutdown.clone()
	}

	fn transition(&mut self, next: ConnectionState) {
		debug!(room = %self.endpoint.room, from = %self.state, to = %next, "connection state");
		self.state = next;
	}

	/// Connect to the room and run until shutdown or a fatal error.
	///
	/// `on_refresh` runs after every tick that changed the visible forest.
	pub async fn run<F>(&mut self, on_refresh: F) -> Result<Room, ClientCoreError>
	where
		F: FnMut(&Room),
	{
		self.transition(ConnectionState::Connecting);
		let url = self.endpoint.url();
		info!(url = %url, tls = self.endpoint.is_tls(), "connecting");

		let connect = tokio_tungstenite::connect_async(url.as_str());
		let (ws, _resp) = tokio::time::timeout(self.config.connect_timeout, connect)
			.await
			.map_err(|_| ClientCoreError::Connect(format!("timeout after {:?} ({url})", self.config.connect_timeout)))?
			.map_err(|e| ClientCoreError::Connect(format!("{url}: {e}")))?;

		let (sink, stream) = ws.split();
		self.run_with_transport(stream, sink, on_refresh).await
	}

	/// Run the ingestion pipeline over an already-open transport.
	pub async fn run_with_transport<S, Si, F>(
		&mut self,
		stream: S,
		sink: Si,
		mut on_refresh: F,
	) -> Result<Room, ClientCoreError>
	where
		S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin + Send + 'static,
		Si: Sink<Message> + Unpin + Send + 'static,
		Si::Error: fmt::Display,
		F: FnMut(&Room),
	{
		self.transition(ConnectionState::Open);
		info!(room = %self.endpoint.room, "connected");

		let (frames_tx, frames_rx) = mpsc::unbounded_channel();
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<ClientCoreError>();

		let reader = {
			let shutdown = self.shutdown.clone();
			let fatal_tx = fatal_tx.clone();
			tokio::spawn(async move {
				if let Err(err) = run_reader(stream, frames_tx, shutdown).await {
					let _ = fatal_tx.send(err);
				}
			})
		};
		let writer = {
			let shutdown = self.shutdown.clone();
			tokio::spawn(async move {
				if let Err(err) = run_writer(sink, outbound_rx, shutdown).await {
					let _ = fatal_tx.send(err);
				}
			})
		};

		let mut consumer = Consumer::new(Room::new(self.endpoint.room.clone()), frames_rx, outbound_tx);
		let mut ticker = tokio::time::interval(self.config.poll_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let outcome: Result<(), ClientCoreError> = loop {
			tokio::select! {
				_ = ticker.tick() => {
					if self.shutdown.is_triggered() {
						break Ok(());
					}
					if let Err(err) = consumer.tick() {
						break Err(err);
					}
					if consumer.room_mut().take_dirty() {
						on_refresh(consumer.room());
					}
				}
				Some(err) = fatal_rx.recv() => break Err(err),
				_ = self.shutdown.wait() => break Ok(()),
			}
		};

		self.transition(ConnectionState::Closing);
		if let Err(err) = &outcome {
			error!(room = %self.endpoint.room, error = %err, "session failed");
		}
		self.shutdown.trigger();

		join_bounded(reader, self.config.shutdown_grace, "reader").await;
		join_bounded(writer, self.config.shutdown_grace, "writer").await;

		self.transition(ConnectionState::Closed);
		info!(room = %self.endpoint.room, "disconnected");

		outcome.map(|()| consumer.into_room())
	}
}

async fn join_bounded(handle: JoinHandle<()>, grace: Duration, task: &'static str) {
	let abort = handle.abort_handle();
	match tokio::time::timeout(grace, handle).await {
		Ok(Ok(())) => debug!(task, "task stopped"),
		Ok(Err(err)) => warn!(task, error = %err, "task ended abnormally"),
		Err(_) => {
			warn!(task, ?grace, "task did not stop in time; aborting");
			abort.abort();
		}
	}
}
