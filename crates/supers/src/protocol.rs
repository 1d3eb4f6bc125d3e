//! Control channel wire format: one `<command> [name]` line in, plain text out.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use warden::{ProcessInfo, ProcessStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	List,
	Status(Option<String>),
	Start(String),
	Stop(String),
	Restart(String),
	Reload,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
	#[error("empty request")]
	Empty,
	#[error("unknown command: {0}")]
	UnknownCommand(String),
	#[error("{0} requires a service name")]
	MissingName(&'static str),
}

impl Command {
	/// Parse a request line. Tokens after the name are ignored.
	pub fn parse(line: &str) -> Result<Self, RequestError> {
		let mut tokens = line.split_whitespace();
		let cmd = tokens.next().ok_or(RequestError::Empty)?;
		let name = tokens.next().map(String::from);

		let named = |cmd: &'static str| name.clone().ok_or(RequestError::MissingName(cmd));
		match cmd {
			"list" => Ok(Command::List),
			"status" => Ok(Command::Status(name.clone())),
			"start" => named("start").map(Command::Start),
			"stop" => named("stop").map(Command::Stop),
			"restart" => named("restart").map(Command::Restart),
			"reload" => Ok(Command::Reload),
			other => Err(RequestError::UnknownCommand(other.to_string())),
		}
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Command::List => f.write_str("list"),
			Command::Status(None) => f.write_str("status"),
			Command::Status(Some(name)) => write!(f, "status {}", name),
			Command::Start(name) => write!(f, "start {}", name),
			Command::Stop(name) => write!(f, "stop {}", name),
			Command::Restart(name) => write!(f, "restart {}", name),
			Command::Reload => f.write_str("reload"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
	Listing { services: Vec<ProcessInfo> },
	Status { service: ProcessInfo },
	Started { name: String, pid: u32 },
	/// No `started`/`start_failed` seen within the wait window.
	Pending { name: String, waited_ms: u64 },
	Stopped { name: String },
	Reloaded {
		started: Vec<String>,
		stopped: Vec<String>,
		errors: Vec<String>,
	},
	Error { message: String },
}

impl Reply {
	pub fn error(message: impl fmt::Display) -> Self {
		Reply::Error { message: message.to_string() }
	}

	pub fn is_error(&self) -> bool {
		matches!(self, Reply::Error { .. })
	}
}

impl fmt::Display for Reply {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Reply::Listing { services } if services.is_empty() => f.write_str("no services"),
			Reply::Listing { services } => {
				let lines: Vec<String> = services.iter().map(format_info).collect();
				f.write_str(&lines.join("\n"))
			}
			Reply::Status { service } => f.write_str(&format_info(service)),
			Reply::Started { name, pid } => write!(f, "started: {} (pid {})", name, pid),
			Reply::Pending { name, waited_ms } => write!(
				f,
				"pending: {} (no confirmation within {})",
				name,
				humantime::format_duration(Duration::from_millis(*waited_ms))
			),
			Reply::Stopped { name } => write!(f, "stopped: {}", name),
			Reply::Reloaded { errors, .. } => {
				f.write_str("reloaded")?;
				for e in errors {
					write!(f, "\nwarning: {}", e)?;
				}
				Ok(())
			}
			Reply::Error { message } => write!(f, "error: {}", message),
		}
	}
}

/// `<name> <status> <pid|-> <uptime|-> <workdir|-> <command line>`
pub fn format_info(info: &ProcessInfo) -> String {
	if info.status == ProcessStatus::NotFound {
		return format!("{} {}", info.name, info.status);
	}
	let dash = || "-".to_string();
	format!(
		"{} {} {} {} {} {}",
		info.name,
		info.status,
		info.pid.map(|p| p.to_string()).unwrap_or_else(dash),
		info.uptime_secs.map(format_uptime).unwrap_or_else(dash),
		info.working_dir.clone().unwrap_or_else(dash),
		info.command,
	)
}

pub fn format_uptime(secs: u64) -> String {
	let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
	if h > 0 {
		format!("{}h{}m{}s", h, m, s)
	} else if m > 0 {
		format!("{}m{}s", m, s)
	} else {
		format!("{}s", s)
	}
}
