use clap::Subcommand;

use crate::daemon::{Daemon, DaemonError};

/// Management subcommands shared by every daemon-backed CLI.
///
/// `run` (the foreground server) is application specific, so flatten this
/// into the application's own subcommand enum next to its `Run` variant.
#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
	/// Start the daemon in the background
	Start,
	/// Stop the running daemon
	Stop,
	/// Show daemon status
	Status,
}

impl DaemonCommand {
	/// `run_args` is the argv that makes the current binary run the daemon in
	/// the foreground, e.g. `["daemon", "run"]`.
	pub fn execute(&self, daemon: &Daemon, run_args: &[&str]) -> Result<String, DaemonError> {
		match self {
			DaemonCommand::Start => {
				daemon.start_background(run_args)?;
				Ok("daemon started".to_string())
			}
			DaemonCommand::Stop => {
				daemon.stop()?;
				Ok("daemon stopped".to_string())
			}
			DaemonCommand::Status => {
				if !crate::client::is_running(&daemon.paths) {
					return Ok("daemon not running".to_string());
				}
				Ok(match crate::client::read_pid(&daemon.paths) {
					Some(pid) => format!("daemon running (pid {})", pid),
					None => "daemon running".to_string(),
				})
			}
		}
	}
}
