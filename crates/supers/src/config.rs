use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::APP_NAME;

// ── Daemon settings (~/.config/supers/config.toml) ──────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
	#[serde(default)]
	pub daemon: DaemonConfig,
	#[serde(default)]
	pub http: HttpConfig,
	#[serde(default)]
	pub logs: LogsConfig,
	#[serde(default)]
	pub events: EventsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
	#[serde(default = "default_units_dir")]
	pub units_dir: String,
	#[serde(default = "default_timeout_secs")]
	pub start_timeout_secs: u64,
	#[serde(default = "default_timeout_secs")]
	pub stop_timeout_secs: u64,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

impl Default for DaemonConfig {
	fn default() -> Self {
		Self {
			units_dir: default_units_dir(),
			start_timeout_secs: default_timeout_secs(),
			stop_timeout_secs: default_timeout_secs(),
			log_level: default_log_level(),
		}
	}
}

impl DaemonConfig {
	pub fn units_dir(&self) -> PathBuf {
		expand_tilde(&self.units_dir)
	}

	pub fn start_timeout(&self) -> Duration {
		Duration::from_secs(self.start_timeout_secs)
	}

	pub fn stop_timeout(&self) -> Duration {
		Duration::from_secs(self.stop_timeout_secs)
	}
}

fn default_units_dir() -> String { "~/.config/supers/units".into() }
fn default_timeout_secs() -> u64 { 5 }
fn default_log_level() -> String { "info".into() }

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_bind")]
	pub bind: String,
	#[serde(default = "default_port")]
	pub port: u16,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self { enabled: false, bind: default_bind(), port: default_port() }
	}
}

fn default_bind() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 13370 }

#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
	/// Defaults to `<state_dir>/logs`.
	pub dir: Option<String>,
	#[serde(default = "default_max_size")]
	pub max_size_bytes: u64,
	#[serde(default = "default_max_age_days")]
	pub max_age_days: u32,
	#[serde(default = "default_max_files")]
	pub max_files: u32,
}

impl Default for LogsConfig {
	fn default() -> Self {
		Self {
			dir: None,
			max_size_bytes: default_max_size(),
			max_age_days: default_max_age_days(),
			max_files: default_max_files(),
		}
	}
}

impl LogsConfig {
	pub fn dir(&self) -> PathBuf {
		match &self.dir {
			Some(dir) => expand_tilde(dir),
			None => sockline::DaemonPaths::new(APP_NAME).state_dir().join("logs"),
		}
	}
}

fn default_max_size() -> u64 { 10 * 1024 * 1024 }
fn default_max_age_days() -> u32 { 7 }
fn default_max_files() -> u32 { 5 }

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
	#[serde(default)]
	pub webhooks: Vec<String>,
	#[serde(default = "default_webhook_timeout")]
	pub timeout_secs: u64,
}

impl Default for EventsConfig {
	fn default() -> Self {
		Self { webhooks: Vec::new(), timeout_secs: default_webhook_timeout() }
	}
}

fn default_webhook_timeout() -> u64 { 10 }

pub fn default_config_path() -> PathBuf {
	sockline::DaemonPaths::new(APP_NAME).config_dir().join("config.toml")
}

/// Load settings from `path` (or the default location). A missing file gives
/// the defaults; a broken one is reported and also gives the defaults.
pub fn load_global_config(path: Option<&Path>) -> GlobalConfig {
	let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
	if path.exists() {
		match std::fs::read_to_string(&path) {
			Ok(content) => match toml::from_str(&content) {
				Ok(config) => return config,
				Err(e) => eprintln!("warning: failed to parse {}: {}", path.display(), e),
			},
			Err(e) => eprintln!("warning: failed to read {}: {}", path.display(), e),
		}
	}
	GlobalConfig::default()
}

pub fn expand_tilde(path: &str) -> PathBuf {
	if let Some(rest) = path.strip_prefix("~/") {
		if let Ok(home) = std::env::var("HOME") {
			return PathBuf::from(home).join(rest);
		}
	} else if path == "~" {
		if let Ok(home) = std::env::var("HOME") {
			return PathBuf::from(home);
		}
	}
	PathBuf::from(path)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_when_empty() {
		let config: GlobalConfig = toml::from_str("").unwrap();
		assert_eq!(config.daemon.start_timeout(), Duration::from_secs(5));
		assert_eq!(config.daemon.stop_timeout(), Duration::from_secs(5));
		assert_eq!(config.daemon.log_level, "info");
		assert!(config.daemon.units_dir().ends_with(".config/supers/units"));
		assert!(!config.http.enabled);
		assert_eq!(config.http.port, 13370);
		assert_eq!(config.logs.max_size_bytes, 10 * 1024 * 1024);
		assert_eq!(config.logs.max_files, 5);
		assert!(config.events.webhooks.is_empty());
		assert_eq!(config.events.timeout_secs, 10);
	}

	#[test]
	fn partial_sections() {
		let config: GlobalConfig = toml::from_str(
			r#"
			[daemon]
			units_dir = "/etc/super"
			start_timeout_secs = 2

			[http]
			enabled = true

			[logs]
			dir = "/var/log/supers"

			[events]
			webhooks = ["http://127.0.0.1:9000/hook"]
			"#,
		)
		.unwrap();
		assert_eq!(config.daemon.units_dir(), PathBuf::from("/etc/super"));
		assert_eq!(config.daemon.start_timeout_secs, 2);
		assert_eq!(config.daemon.stop_timeout_secs, 5);
		assert!(config.http.enabled);
		assert_eq!(config.http.bind, "127.0.0.1");
		assert_eq!(config.logs.dir(), PathBuf::from("/var/log/supers"));
		assert_eq!(config.events.webhooks.len(), 1);
	}

	#[test]
	fn missing_file_gives_defaults() {
		let path = std::env::temp_dir().join(format!("supers-no-config-{}.toml", std::process::id()));
		let config = load_global_config(Some(&path));
		assert_eq!(config.http.port, 13370);
	}

	#[test]
	fn tilde_expansion() {
		if let Ok(home) = std::env::var("HOME") {
			assert_eq!(expand_tilde("~/units"), PathBuf::from(&home).join("units"));
			assert_eq!(expand_tilde("~"), PathBuf::from(&home));
		}
		assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
	}
}
