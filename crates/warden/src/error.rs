use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("no such process: {0}")]
	NotFound(String),

	#[error("{name}: already running (pid {pid})")]
	AlreadyRunning { name: String, pid: u32 },

	#[error("{0}: already starting")]
	AlreadyStarting(String),

	#[error("{name}: spawn failed: {source}")]
	Spawn {
		name: String,
		#[source]
		source: std::io::Error,
	},

	#[error("{0}: stopped while starting")]
	StoppedDuringStart(String),

	#[error("{name}: no exit observed within {}s", .timeout.as_secs_f64())]
	StopTimeout { name: String, timeout: Duration },

	#[error("{name}: signal failed: {source}")]
	Signal {
		name: String,
		#[source]
		source: nix::errno::Errno,
	},
}

pub type Result<T> = std::result::Result<T, Error>;
