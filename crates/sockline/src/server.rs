use std::future::Future;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Longest request line accepted from a client. Anything past it is dropped.
pub const MAX_REQUEST_LEN: u64 = 4096;

/// How long a connection may stay open without completing its request line.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Bind the control socket, replacing a stale one, and restrict it to the owner.
pub fn bind(socket_path: &Path) -> io::Result<UnixListener> {
	if socket_path.exists() {
		std::fs::remove_file(socket_path)?;
	}
	let listener = UnixListener::bind(socket_path)?;
	std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
	tracing::info!("listening on {}", socket_path.display());
	Ok(listener)
}

/// Accept connections forever. Each connection carries exactly one request
/// line; the handler's reply is written back and the connection is closed.
pub async fn serve<F, Fut>(listener: UnixListener, handler: F)
where
	F: Fn(String) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = String> + Send,
{
	serve_with_read_timeout(listener, READ_TIMEOUT, handler).await
}

/// Like [`serve`], but drops clients that have not sent a full request line
/// within `read_timeout`.
pub async fn serve_with_read_timeout<F, Fut>(listener: UnixListener, read_timeout: Duration, handler: F)
where
	F: Fn(String) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = String> + Send,
{
	let handler = Arc::new(handler);

	loop {
		let (stream, _) = match listener.accept().await {
			Ok(s) => s,
			Err(e) => {
				tracing::error!("accept error: {}", e);
				continue;
			}
		};

		let handler = Arc::clone(&handler);
		tokio::spawn(async move {
			if let Err(e) = handle_connection(stream, read_timeout, handler).await {
				tracing::warn!("control connection error: {}", e);
			}
		});
	}
}

async fn handle_connection<F, Fut>(stream: UnixStream, read_timeout: Duration, handler: Arc<F>) -> io::Result<()>
where
	F: Fn(String) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = String> + Send,
{
	let (reader, mut writer) = stream.into_split();
	let mut reader = BufReader::new(reader.take(MAX_REQUEST_LEN));

	let mut buf = Vec::new();
	match tokio::time::timeout(read_timeout, reader.read_until(b'\n', &mut buf)).await {
		// Liveness checks connect and hang up without a request.
		Ok(Ok(0)) => return Ok(()),
		Ok(Ok(_)) => {}
		Ok(Err(e)) => return Err(e),
		Err(_) => {
			tracing::debug!("dropping idle control connection");
			return Ok(());
		}
	}

	// Invalid UTF-8 still gets a reply; the handler sees replacement chars.
	let line = String::from_utf8_lossy(&buf);
	let mut reply = handler(line.trim().to_string()).await;
	if !reply.ends_with('\n') {
		reply.push('\n');
	}

	writer.write_all(reply.as_bytes()).await?;
	writer.shutdown().await
}
