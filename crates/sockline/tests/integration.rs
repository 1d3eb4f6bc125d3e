use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use sockline::client::{self, ClientError};
use sockline::{Daemon, DaemonPaths};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_paths(name: &str) -> DaemonPaths {
	let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
	// Keep socket paths short (SUN_LEN limit ~104)
	let dir = std::path::PathBuf::from("/tmp").join(format!("slt{}{}-{}", n, name, std::process::id()));
	let _ = std::fs::create_dir_all(&dir);
	DaemonPaths::new("sockline-test").with_state_dir(dir)
}

fn cleanup_paths(paths: &DaemonPaths) {
	let _ = std::fs::remove_dir_all(paths.state_dir());
}

async fn spawn_echo_server(paths: &DaemonPaths) -> tokio::task::JoinHandle<()> {
	let listener = sockline::server::bind(&paths.socket_path()).unwrap();
	tokio::spawn(async move {
		sockline::server::serve(listener, |line: String| async move {
			match line.split_whitespace().next() {
				Some("ping") => "pong".to_string(),
				Some("echo") => line.trim_start_matches("echo").trim().to_string(),
				Some(other) => format!("error: unknown command {}\n", other),
				None => "error: empty request".to_string(),
			}
		})
		.await;
	})
}

// --- Paths ---

#[test]
fn paths_pinned_state_dir() {
	let paths = DaemonPaths::new("testapp").with_state_dir("/run/testapp");
	assert_eq!(paths.state_dir(), std::path::PathBuf::from("/run/testapp"));
	assert_eq!(paths.socket_path(), std::path::PathBuf::from("/run/testapp/daemon.sock"));
	assert_eq!(paths.pid_path(), std::path::PathBuf::from("/run/testapp/daemon.pid"));
}

#[test]
fn paths_socket_and_pid_under_state() {
	let paths = DaemonPaths::new("myapp");
	let state = paths.state_dir();
	assert!(paths.socket_path().starts_with(&state));
	assert!(paths.pid_path().starts_with(&state));
	assert!(state.ends_with("myapp"));
}

// --- Client helpers ---

#[test]
fn is_running_false_when_no_socket() {
	let paths = temp_paths("nosock");
	assert!(!client::is_running(&paths));
	cleanup_paths(&paths);
}

#[test]
fn read_pid_parses_file_and_rejects_garbage() {
	let paths = temp_paths("pid");
	assert_eq!(client::read_pid(&paths), None);

	std::fs::write(paths.pid_path(), "12345\n").unwrap();
	assert_eq!(client::read_pid(&paths), Some(12345));

	std::fs::write(paths.pid_path(), "not-a-number").unwrap();
	assert_eq!(client::read_pid(&paths), None);
	cleanup_paths(&paths);
}

#[test]
fn send_line_reports_not_running() {
	let paths = temp_paths("noserver");
	match sockline::send_line(&paths, "ping", Duration::from_secs(1)) {
		Err(ClientError::NotRunning) => {}
		other => panic!("expected NotRunning, got {:?}", other),
	}
	cleanup_paths(&paths);
}

// --- Client + Server ---

#[tokio::test]
async fn one_request_per_connection() {
	let paths = temp_paths("roundtrip");
	let server = spawn_echo_server(&paths).await;

	let client_paths = paths.clone();
	tokio::task::spawn_blocking(move || {
		let reply = sockline::send_line(&client_paths, "ping", Duration::from_secs(2)).unwrap();
		assert_eq!(reply, "pong\n");

		let reply = sockline::send_line(&client_paths, "echo hello world", Duration::from_secs(2)).unwrap();
		assert_eq!(reply, "hello world\n");

		let reply = sockline::send_line(&client_paths, "bogus", Duration::from_secs(2)).unwrap();
		assert_eq!(reply, "error: unknown command bogus\n");
	})
	.await
	.unwrap();

	server.abort();
	cleanup_paths(&paths);
}

#[tokio::test]
async fn server_closes_after_reply() {
	let paths = temp_paths("close");
	let server = spawn_echo_server(&paths).await;

	let client_paths = paths.clone();
	tokio::task::spawn_blocking(move || {
		let mut stream = UnixStream::connect(client_paths.socket_path()).unwrap();
		stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
		// No shutdown of the write half: the newline alone ends the request.
		stream.write_all(b"ping\n").unwrap();

		let mut reply = String::new();
		stream.read_to_string(&mut reply).unwrap();
		assert_eq!(reply, "pong\n");
	})
	.await
	.unwrap();

	server.abort();
	cleanup_paths(&paths);
}

#[tokio::test]
async fn invalid_utf8_request_still_gets_one_reply() {
	let paths = temp_paths("utf8");
	let server = spawn_echo_server(&paths).await;

	let client_paths = paths.clone();
	tokio::task::spawn_blocking(move || {
		let mut stream = UnixStream::connect(client_paths.socket_path()).unwrap();
		stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
		stream.write_all(b"st\xffatus\n").unwrap();

		let mut reply = Vec::new();
		stream.read_to_end(&mut reply).unwrap();
		let reply = String::from_utf8(reply).unwrap();
		assert!(reply.starts_with("error: unknown command st"), "got {:?}", reply);
		assert!(reply.ends_with('\n'));
		assert_eq!(reply.lines().count(), 1);
	})
	.await
	.unwrap();

	server.abort();
	cleanup_paths(&paths);
}

#[tokio::test]
async fn idle_client_is_disconnected() {
	let paths = temp_paths("idle");
	let listener = sockline::server::bind(&paths.socket_path()).unwrap();
	let server = tokio::spawn(sockline::server::serve_with_read_timeout(
		listener,
		Duration::from_millis(200),
		|_line: String| async move { "unreachable".to_string() },
	));

	let client_paths = paths.clone();
	tokio::task::spawn_blocking(move || {
		let mut stream = UnixStream::connect(client_paths.socket_path()).unwrap();
		stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
		// Half a line, never terminated.
		stream.write_all(b"sta").unwrap();

		let started = std::time::Instant::now();
		let mut reply = Vec::new();
		let n = stream.read_to_end(&mut reply).unwrap();
		assert_eq!(n, 0);
		assert!(started.elapsed() < Duration::from_secs(3));
	})
	.await
	.unwrap();

	server.abort();
	cleanup_paths(&paths);
}

#[tokio::test]
async fn server_handles_concurrent_clients() {
	let paths = temp_paths("multi");
	let server = spawn_echo_server(&paths).await;

	let mut handles = vec![];
	for i in 0..5 {
		let cp = paths.clone();
		handles.push(tokio::task::spawn_blocking(move || {
			let reply = sockline::send_line(&cp, &format!("echo {}", i), Duration::from_secs(2)).unwrap();
			assert_eq!(reply, format!("{}\n", i));
		}));
	}
	for h in handles {
		h.await.unwrap();
	}

	server.abort();
	cleanup_paths(&paths);
}

#[tokio::test]
async fn socket_is_owner_only() {
	use std::os::unix::fs::PermissionsExt;

	let paths = temp_paths("perms");
	let server = spawn_echo_server(&paths).await;

	let mode = std::fs::metadata(paths.socket_path()).unwrap().permissions().mode();
	assert_eq!(mode & 0o777, 0o600);

	server.abort();
	cleanup_paths(&paths);
}

// --- Daemon ---

#[test]
fn daemon_prepare_and_cleanup() {
	let paths = temp_paths("cleanup");
	let daemon = Daemon::new(paths.clone());
	daemon.prepare().unwrap();
	assert_eq!(client::read_pid(&paths), Some(std::process::id()));

	std::fs::write(paths.socket_path(), "fake").unwrap();
	daemon.cleanup();

	assert!(!paths.socket_path().exists());
	assert!(!paths.pid_path().exists());
	cleanup_paths(&paths);
}

#[test]
fn daemon_stop_without_pid_file() {
	let paths = temp_paths("stop");
	let daemon = Daemon::new(paths.clone());
	assert!(matches!(daemon.stop(), Err(sockline::DaemonError::NotRunning)));
	cleanup_paths(&paths);
}

#[test]
fn client_error_display() {
	assert_eq!(format!("{}", ClientError::NotRunning), "daemon not running");
	assert_eq!(format!("{}", ClientError::InvalidReply), "reply is not valid utf-8");
}
