use std::path::PathBuf;

use crate::client;
use crate::paths::DaemonPaths;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
	#[error("daemon already running")]
	AlreadyRunning,
	#[error("daemon not running")]
	NotRunning,
	#[error("failed to start daemon: {0}")]
	Spawn(#[source] std::io::Error),
	#[error("failed to prepare state dir: {0}")]
	StateDir(#[source] std::io::Error),
}

pub struct Daemon {
	pub paths: DaemonPaths,
}

impl Daemon {
	pub fn new(paths: DaemonPaths) -> Self {
		Self { paths }
	}

	/// Create the state dir and write our PID file. The socket itself is
	/// bound by [`crate::server::bind`].
	pub fn prepare(&self) -> Result<(), DaemonError> {
		std::fs::create_dir_all(self.paths.state_dir()).map_err(DaemonError::StateDir)?;
		std::fs::write(self.paths.pid_path(), std::process::id().to_string())
			.map_err(DaemonError::StateDir)?;
		Ok(())
	}

	pub fn cleanup(&self) {
		let _ = std::fs::remove_file(self.paths.socket_path());
		let _ = std::fs::remove_file(self.paths.pid_path());
	}

	/// Re-exec the current binary with `args` detached from the terminal.
	pub fn start_background(&self, args: &[&str]) -> Result<(), DaemonError> {
		if client::is_running(&self.paths) {
			return Err(DaemonError::AlreadyRunning);
		}

		let mut cmd = std::process::Command::new(find_current_binary());
		cmd.args(args)
			.stdin(std::process::Stdio::null())
			.stdout(std::process::Stdio::null())
			.stderr(std::process::Stdio::null());

		cmd.spawn().map_err(DaemonError::Spawn)?;
		Ok(())
	}

	pub fn stop(&self) -> Result<(), DaemonError> {
		let pid = client::read_pid(&self.paths).ok_or(DaemonError::NotRunning)?;

		use nix::sys::signal::{kill, Signal};
		use nix::unistd::Pid;
		if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_err() {
			// Stale PID file from a crashed daemon.
			self.cleanup();
			return Err(DaemonError::NotRunning);
		}
		Ok(())
	}
}

/// Resolves once the process receives SIGINT or SIGTERM.
pub async fn shutdown_signal() {
	use tokio::signal::unix::{signal, SignalKind};

	let mut term = match signal(SignalKind::terminate()) {
		Ok(s) => s,
		Err(e) => {
			tracing::warn!("cannot install SIGTERM handler: {}", e);
			let _ = tokio::signal::ctrl_c().await;
			return;
		}
	};

	tokio::select! {
		_ = tokio::signal::ctrl_c() => {},
		_ = term.recv() => {},
	}
}

fn find_current_binary() -> PathBuf {
	std::env::current_exe().unwrap_or_else(|_| PathBuf::from("supers"))
}
