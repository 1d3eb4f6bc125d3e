use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;

use crate::logs;

const RING_BUFFER_SIZE: usize = 64 * 1024;

/// Combined stdout/stderr sink for one service: a size-rotated log file plus
/// an in-memory tail of recent output.
#[derive(Clone)]
pub struct OutputCapture {
	ring: Arc<Mutex<VecDeque<u8>>>,
	writer: Arc<Mutex<RotatingFile>>,
}

struct RotatingFile {
	file: Option<File>,
	path: PathBuf,
	dir: PathBuf,
	service: String,
	bytes_written: u64,
	max_size: u64,
}

impl OutputCapture {
	/// Opens (or appends to) today's log file. A sink whose file cannot be
	/// opened still keeps the in-memory tail; the failure is logged once.
	pub fn open(log_dir: &Path, service: &str, max_size: u64) -> Self {
		let dir = logs::service_log_dir(log_dir, service);
		if let Err(e) = fs::create_dir_all(&dir) {
			tracing::warn!(service, "cannot create log dir {}: {}", dir.display(), e);
		}

		let path = dir.join(logs::current_log_name(service));
		let file = open_append(&path);
		let bytes_written = file
			.as_ref()
			.and_then(|f| f.metadata().ok())
			.map(|m| m.len())
			.unwrap_or(0);

		Self {
			ring: Arc::new(Mutex::new(VecDeque::with_capacity(RING_BUFFER_SIZE))),
			writer: Arc::new(Mutex::new(RotatingFile {
				file,
				path,
				dir,
				service: service.to_string(),
				bytes_written,
				max_size,
			})),
		}
	}

	pub async fn write(&self, data: &[u8]) {
		{
			let mut ring = self.ring.lock().await;
			let overflow = (ring.len() + data.len()).saturating_sub(RING_BUFFER_SIZE);
			let len = ring.len();
			ring.drain(..overflow.min(len));
			let start = data.len().saturating_sub(RING_BUFFER_SIZE);
			ring.extend(&data[start..]);
		}

		self.writer.lock().await.write(data);
	}

	/// Write a supervisor marker line, e.g. `[warden] web exited (code 1)`.
	pub async fn note(&self, message: &str) {
		self.write(format!("[warden] {}\n", message).as_bytes()).await;
	}

	pub async fn snapshot(&self) -> Vec<u8> {
		self.ring.lock().await.iter().copied().collect()
	}

	/// Copy everything from `reader` into the sink until EOF.
	pub async fn pipe<R: AsyncRead + Unpin>(self, mut reader: R) {
		let mut buf = [0u8; 4096];
		loop {
			match reader.read(&mut buf).await {
				Ok(0) | Err(_) => break,
				Ok(n) => self.write(&buf[..n]).await,
			}
		}
	}
}

impl RotatingFile {
	fn write(&mut self, data: &[u8]) {
		let Some(file) = self.file.as_mut() else {
			return;
		};
		if file.write_all(data).is_err() {
			return;
		}
		self.bytes_written += data.len() as u64;
		if self.bytes_written >= self.max_size {
			self.rotate();
		}
	}

	fn rotate(&mut self) {
		drop(self.file.take());

		let rotated = self.dir.join(logs::rotated_log_name(&self.dir, &self.service));
		if let Err(e) = fs::rename(&self.path, &rotated) {
			tracing::warn!(service = %self.service, "log rotation failed: {}", e);
		}

		self.path = self.dir.join(logs::current_log_name(&self.service));
		self.file = open_append(&self.path);
		self.bytes_written = 0;
	}
}

fn open_append(path: &Path) -> Option<File> {
	match OpenOptions::new().create(true).append(true).open(path) {
		Ok(f) => Some(f),
		Err(e) => {
			tracing::warn!("cannot open log file {}: {}", path.display(), e);
			None
		}
	}
}
