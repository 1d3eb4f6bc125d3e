use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::paths::DaemonPaths;

/// Errors from daemon client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
	/// Daemon is not running (socket missing or refusing connections).
	#[error("daemon not running")]
	NotRunning,
	#[error("io error: {0}")]
	Io(#[from] io::Error),
	#[error("reply is not valid utf-8")]
	InvalidReply,
}

/// Send one request line and return the daemon's full reply.
///
/// The daemon closes the connection after replying, so the reply is read to EOF.
/// `timeout` bounds each blocking read; the server's own waits are bounded too,
/// so this only fires when the daemon is wedged.
pub fn send_line(paths: &DaemonPaths, line: &str, timeout: Duration) -> Result<String, ClientError> {
	let mut stream = UnixStream::connect(paths.socket_path()).map_err(|_| ClientError::NotRunning)?;
	stream.set_read_timeout(Some(timeout))?;

	let mut request = line.trim().to_string();
	request.push('\n');
	stream.write_all(request.as_bytes())?;
	stream.shutdown(Shutdown::Write)?;

	let mut reply = Vec::new();
	stream.read_to_end(&mut reply)?;
	String::from_utf8(reply).map_err(|_| ClientError::InvalidReply)
}

/// Check if a daemon is running (socket is connectable).
pub fn is_running(paths: &DaemonPaths) -> bool {
	UnixStream::connect(paths.socket_path()).is_ok()
}

/// Read the PID of a running daemon from its PID file.
pub fn read_pid(paths: &DaemonPaths) -> Option<u32> {
	std::fs::read_to_string(paths.pid_path())
		.ok()
		.and_then(|s| s.trim().parse().ok())
}
