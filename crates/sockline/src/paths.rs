use std::path::PathBuf;

/// Filesystem locations for one daemon instance.
///
/// Follows XDG conventions unless a state directory is pinned explicitly,
/// which tests and packaged installs (`/run/<app>`) use.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
	pub app_name: String,
	state_override: Option<PathBuf>,
}

impl DaemonPaths {
	pub fn new(app_name: impl Into<String>) -> Self {
		Self {
			app_name: app_name.into(),
			state_override: None,
		}
	}

	pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.state_override = Some(dir.into());
		self
	}

	pub fn state_dir(&self) -> PathBuf {
		if let Some(dir) = &self.state_override {
			dir.clone()
		} else if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".local").join("state").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name)
		}
	}

	pub fn config_dir(&self) -> PathBuf {
		if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".config").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name).join("config")
		}
	}

	pub fn socket_path(&self) -> PathBuf {
		self.state_dir().join("daemon.sock")
	}

	pub fn pid_path(&self) -> PathBuf {
		self.state_dir().join("daemon.pid")
	}
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}
