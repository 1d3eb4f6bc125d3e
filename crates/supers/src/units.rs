//! Unit files: one `<name>.service` per managed service.
//!
//! ```text
//! [Service]
//! ExecStart=/usr/bin/python3 -m http.server 8000
//! WorkingDirectory=/srv/www
//! RestartSec=2s
//! Environment="GREETING=hello world" PYTHONUNBUFFERED=1
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use warden::{RestartPolicy, ServiceDefinition};

pub const UNIT_SUFFIX: &str = "service";

const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum UnitError {
	#[error("failed to read {path}: {source}")]
	Read { path: PathBuf, source: std::io::Error },
	#[error("failed to read units directory {path}: {source}")]
	ReadDir { path: PathBuf, source: std::io::Error },
	#[error("no ExecStart in {0}")]
	MissingExecStart(PathBuf),
	#[error("{path}: invalid RestartSec '{value}'")]
	InvalidRestartSec { path: PathBuf, value: String },
	#[error("{path}: unterminated quote in Environment")]
	UnterminatedQuote { path: PathBuf },
	#[error("invalid service name: '{0}'")]
	InvalidName(String),
}

/// Parse a unit file body. `Ok(None)` when there is no `ExecStart`.
pub fn parse_unit(name: &str, path: &Path, content: &str) -> Result<Option<ServiceDefinition>, UnitError> {
	let mut exec_start: Option<Vec<String>> = None;
	let mut working_dir = None;
	let mut delay = DEFAULT_RESTART_DELAY;
	let mut env = Vec::new();

	for line in content.lines() {
		let line = line.trim();
		if line.is_empty() || line.starts_with('#') || line.starts_with(';') || line.starts_with('[') {
			continue;
		}
		let Some((key, value)) = line.split_once('=') else {
			continue;
		};
		let value = value.trim();
		match key.trim() {
			"ExecStart" => {
				let tokens: Vec<String> = value.split_whitespace().map(String::from).collect();
				exec_start = (!tokens.is_empty()).then_some(tokens);
			}
			"WorkingDirectory" if !value.is_empty() => working_dir = Some(PathBuf::from(value)),
			"RestartSec" => {
				delay = parse_restart_sec(value).ok_or_else(|| UnitError::InvalidRestartSec {
					path: path.to_path_buf(),
					value: value.to_string(),
				})?;
			}
			"Environment" => env.extend(split_environment(value).ok_or_else(|| {
				UnitError::UnterminatedQuote { path: path.to_path_buf() }
			})?),
			_ => {}
		}
	}

	Ok(exec_start.map(|command| ServiceDefinition {
		name: name.to_string(),
		command,
		working_dir,
		env,
		policy: RestartPolicy {
			max_retries: -1,
			delay,
			restart_on_zero: false,
		},
	}))
}

/// Every unit in `dir`, keyed by service name. Units without `ExecStart` are
/// skipped; any other problem fails the whole load.
pub fn load_all(dir: &Path) -> Result<BTreeMap<String, ServiceDefinition>, UnitError> {
	let read_dir_err = |source| UnitError::ReadDir { path: dir.to_path_buf(), source };
	let entries = std::fs::read_dir(dir).map_err(read_dir_err)?;

	let mut units = BTreeMap::new();
	for entry in entries {
		let path = entry.map_err(read_dir_err)?.path();
		if path.extension().and_then(|e| e.to_str()) != Some(UNIT_SUFFIX) || !path.is_file() {
			continue;
		}
		let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
			continue;
		};

		let content = read(&path)?;
		match parse_unit(&name, &path, &content)? {
			Some(def) => {
				units.insert(name, def);
			}
			None => tracing::warn!("skipping {}: no ExecStart", path.display()),
		}
	}
	Ok(units)
}

/// Load a single unit by name for an on-demand start.
pub fn load_one(dir: &Path, name: &str) -> Result<ServiceDefinition, UnitError> {
	if !is_valid_name(name) {
		return Err(UnitError::InvalidName(name.to_string()));
	}
	let path = dir.join(format!("{}.{}", name, UNIT_SUFFIX));
	let content = read(&path)?;
	let def = parse_unit(name, &path, &content)?.ok_or(UnitError::MissingExecStart(path))?;
	tracing::info!(service = name, command = %def.command_line(), "loaded unit");
	Ok(def)
}

pub fn is_valid_name(name: &str) -> bool {
	!name.is_empty() && !name.contains('/') && !name.starts_with('.')
}

fn read(path: &Path) -> Result<String, UnitError> {
	std::fs::read_to_string(path).map_err(|source| UnitError::Read { path: path.to_path_buf(), source })
}

/// Bare integers are seconds; anything else goes through humantime.
fn parse_restart_sec(value: &str) -> Option<Duration> {
	if let Ok(secs) = value.parse::<u64>() {
		return Some(Duration::from_secs(secs));
	}
	humantime::parse_duration(value).ok()
}

/// Split `"A=b c" D=e` into tokens. Quotes group, they are not kept.
/// `None` on an unterminated quote.
fn split_environment(raw: &str) -> Option<Vec<String>> {
	let mut tokens = Vec::new();
	let mut current = String::new();
	let mut in_quotes = false;
	let mut has_token = false;

	for c in raw.chars() {
		match c {
			'"' => {
				in_quotes = !in_quotes;
				has_token = true;
			}
			c if c.is_whitespace() && !in_quotes => {
				if has_token {
					tokens.push(std::mem::take(&mut current));
					has_token = false;
				}
			}
			c => {
				current.push(c);
				has_token = true;
			}
		}
	}
	if in_quotes {
		return None;
	}
	if has_token {
		tokens.push(current);
	}
	Some(tokens)
}
