use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Rules for respawning a service after its process exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
	/// `-1` means unlimited.
	pub max_retries: i32,
	pub delay: Duration,
	/// When false, exit code 0 counts as intentional completion.
	pub restart_on_zero: bool,
}

impl Default for RestartPolicy {
	fn default() -> Self {
		Self {
			max_retries: -1,
			delay: Duration::from_secs(5),
			restart_on_zero: false,
		}
	}
}

impl RestartPolicy {
	/// `retries` is the number of failure-triggered restarts already performed
	/// in the current supervised run.
	pub fn should_restart(&self, exit_code: i32, retries: u32) -> bool {
		if exit_code == 0 && !self.restart_on_zero {
			return false;
		}
		if self.max_retries >= 0 && retries >= self.max_retries as u32 {
			return false;
		}
		true
	}
}

/// Declarative description of one managed service. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
	pub name: String,
	/// Program and arguments, already tokenized.
	pub command: Vec<String>,
	pub working_dir: Option<PathBuf>,
	/// `KEY=VALUE` overrides merged onto the inherited environment.
	pub env: Vec<String>,
	pub policy: RestartPolicy,
}

impl ServiceDefinition {
	/// Resolve the program to exec and its arguments.
	///
	/// A first token that looks like a path is the program. Otherwise the
	/// service name is the program and every token is passed as an argument.
	pub fn program(&self) -> (String, Vec<String>) {
		match self.command.split_first() {
			Some((first, rest)) if first.contains('/') => (first.clone(), rest.to_vec()),
			_ => (self.name.clone(), self.command.clone()),
		}
	}

	/// Full command line as it will be executed, for display.
	pub fn command_line(&self) -> String {
		let (program, args) = self.program();
		std::iter::once(program).chain(args).collect::<Vec<_>>().join(" ")
	}

	/// Environment overrides split into pairs. Tokens without `=` are skipped.
	pub fn env_pairs(&self) -> Vec<(String, String)> {
		self.env
			.iter()
			.filter_map(|kv| {
				let (key, value) = kv.split_once('=')?;
				if key.is_empty() {
					return None;
				}
				Some((key.to_string(), value.to_string()))
			})
			.collect()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
	NotFound,
	Stopped,
	Running,
	Exited,
}

impl fmt::Display for ProcessStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ProcessStatus::NotFound => "not found",
			ProcessStatus::Stopped => "stopped",
			ProcessStatus::Running => "running",
			ProcessStatus::Exited => "exited",
		})
	}
}

/// Point-in-time view of one registry record, safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
	pub name: String,
	pub status: ProcessStatus,
	pub pid: Option<u32>,
	pub uptime_secs: Option<u64>,
	pub exit_code: Option<i32>,
	pub retries: u32,
	pub command: String,
	pub working_dir: Option<String>,
}

impl ProcessInfo {
	pub fn not_found(name: &str) -> Self {
		Self {
			name: name.to_string(),
			status: ProcessStatus::NotFound,
			pid: None,
			uptime_secs: None,
			exit_code: None,
			retries: 0,
			command: String::new(),
			working_dir: None,
		}
	}
}
