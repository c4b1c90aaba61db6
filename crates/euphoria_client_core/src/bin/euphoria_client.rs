#![forbid(unsafe_code)]

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use euphoria_client_core::format::message_line;
use euphoria_client_core::{Room, Session, ShutdownSignal, load_client_config, load_client_config_from_path};
use euphoria_util::endpoint::{validate_base, validate_room};
use tracing::{info, warn};

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: euphoria_client [room] [--base wss://host] [--config path]\n\
\n\
Options:\n\
	room        Room to join (default: config, then EUPHORIA_ROOM, then space)\n\
	--base      Server base (default: wss://euphoria.io)\n\
	            Format: ws://host[:port] or wss://host[:port]\n\
	--config    Config file (default: ~/.euphoria/config.toml)\n\
	--help      Show this help\n\
\n\
Examples:\n\
	euphoria_client xkcd\n\
	euphoria_client test --base ws://127.0.0.1:8080\n"
	);
	std::process::exit(2)
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,euphoria_client_core=debug".to_string());
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();
}

struct Args {
	room: Option<String>,
	base: Option<String>,
	config: Option<PathBuf>,
}

fn parse_args() -> Args {
	let mut args = Args {
		room: None,
		base: None,
		config: None,
	};

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--base" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if let Err(e) = validate_base(&v) {
					eprintln!("Invalid --base value: {e}");
					usage_and_exit();
				}
				args.base = Some(v);
			}
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				args.config = Some(PathBuf::from(v));
			}
			other if other.starts_with('-') => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
			room => {
				if args.room.is_some() {
					eprintln!("Only one room may be given");
					usage_and_exit();
				}
				if let Err(e) = validate_room(room) {
					eprintln!("Invalid room: {e}");
					usage_and_exit();
				}
				args.room = Some(room.to_string());
			}
		}
	}

	args
}

fn redraw(room: &Room) {
	let mut out = std::io::stdout().lock();
	// Clear screen, cursor home.
	let _ = write!(out, "\x1b[2J\x1b[H");
	let _ = writeln!(out, "Euphoria - {}", room.name());
	for e in room.element_list() {
		let _ = writeln!(out, "{}", message_line(e.message, e.depth, Some(e.index)));
	}
	let _ = out.flush();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let args = parse_args();

	let mut cfg = match &args.config {
		Some(path) => load_client_config_from_path(path)?,
		None => load_client_config()?,
	};
	if let Some(room) = args.room {
		cfg.room = room;
	}
	if let Some(base) = args.base {
		cfg.ws_base_url = base;
	}

	let shutdown = ShutdownSignal::new();
	let mut session = Session::new(cfg, shutdown.clone()).context("configure session")?;

	tokio::spawn(async move {
		if let Err(err) = tokio::signal::ctrl_c().await {
			warn!(error = %err, "failed to listen for ctrl-c");
			return;
		}
		info!("ctrl-c received; shutting down");
		shutdown.trigger();
	});

	let room = session.run(redraw).await.context("session")?;
	info!(
		room = %room.name(),
		messages = room.node_count(),
		users = room.users().len(),
		pending = room.unprocessed().len(),
		"session ended"
	);

	Ok(())
}
