use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use sockline::clap::DaemonCommand;
use sockline::{ClientError, Daemon, DaemonPaths};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use supers::config;
use supers::protocol::Command;
use supers::APP_NAME;

/// Upper bound on one blocking read from the daemon. Its own waits are
/// shorter, so this only fires when the daemon is wedged.
const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "supers", version, about = "Lightweight process supervisor")]
struct Cli {
	/// Daemon settings file (default: ~/.config/supers/config.toml)
	#[arg(long, global = true)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
	/// List every managed service
	List,
	/// Show one service, or all of them
	Status { name: Option<String> },
	/// Start a service, loading its unit file if needed
	Start { name: String },
	/// Stop a service and keep it stopped
	Stop { name: String },
	/// Stop, then start a service
	Restart { name: String },
	/// Rescan unit files and start/stop the difference
	Reload,
	/// Manage the daemon
	#[command(subcommand)]
	Daemon(DaemonCmd),
}

#[derive(Subcommand)]
enum DaemonCmd {
	/// Run the daemon in the foreground
	Run,
	#[command(flatten)]
	Manage(DaemonCommand),
}

fn main() -> ExitCode {
	let cli = Cli::parse();

	let request = match cli.command {
		Cmd::Daemon(cmd) => return cmd_daemon(cmd, cli.config),
		Cmd::List => Command::List,
		Cmd::Status { name } => Command::Status(name),
		Cmd::Start { name } => Command::Start(name),
		Cmd::Stop { name } => Command::Stop(name),
		Cmd::Restart { name } => Command::Restart(name),
		Cmd::Reload => Command::Reload,
	};
	send(&request)
}

fn send(request: &Command) -> ExitCode {
	let paths = DaemonPaths::new(APP_NAME);
	match sockline::send_line(&paths, &request.to_string(), REPLY_TIMEOUT) {
		Ok(reply) => {
			let mut failed = false;
			for line in reply.lines() {
				if line.starts_with("error:") {
					failed = true;
					eprintln!("{}", line.red());
				} else if line.starts_with("warning:") {
					eprintln!("{}", line.yellow());
				} else {
					println!("{}", line);
				}
			}
			if failed {
				ExitCode::FAILURE
			} else {
				ExitCode::SUCCESS
			}
		}
		Err(ClientError::NotRunning) => {
			eprintln!("{} daemon not running (start it with 'supers daemon start')", "error:".red());
			ExitCode::FAILURE
		}
		Err(e) => {
			eprintln!("{} {}", "error:".red(), e);
			ExitCode::FAILURE
		}
	}
}

fn cmd_daemon(cmd: DaemonCmd, config_path: Option<PathBuf>) -> ExitCode {
	match cmd {
		DaemonCmd::Run => {
			let config = config::load_global_config(config_path.as_deref());
			let runtime = match tokio::runtime::Runtime::new() {
				Ok(rt) => rt,
				Err(e) => {
					eprintln!("{} failed to start runtime: {}", "error:".red(), e);
					return ExitCode::FAILURE;
				}
			};
			match runtime.block_on(supers::daemon::run(config)) {
				Ok(()) => ExitCode::SUCCESS,
				Err(e) => {
					eprintln!("{} {}", "error:".red(), e);
					ExitCode::FAILURE
				}
			}
		}
		DaemonCmd::Manage(cmd) => {
			let mut run_args = vec!["daemon".to_string(), "run".to_string()];
			if let Some(path) = config_path {
				run_args.push("--config".to_string());
				run_args.push(path.display().to_string());
			}
			let run_args: Vec<&str> = run_args.iter().map(String::as_str).collect();

			let daemon = Daemon::new(DaemonPaths::new(APP_NAME));
			match cmd.execute(&daemon, &run_args) {
				Ok(message) => {
					println!("{}", message.green());
					ExitCode::SUCCESS
				}
				Err(e) => {
					eprintln!("{} {}", "error:".red(), e);
					ExitCode::FAILURE
				}
			}
		}
	}
}
