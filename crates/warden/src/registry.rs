//! Runtime state of every managed service.
//!
//! One record per name, guarded by one lock that is only ever held for the map
//! operation itself. Process I/O, signalling and waiting all happen outside.
//!
//! Each explicit start gets a fresh generation. Monitors carry the generation
//! they were launched with and every monitor-side mutation is conditional on
//! it, so a superseded monitor can never touch its successor's record.

use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::output::OutputCapture;
use crate::types::{ProcessInfo, ProcessStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
	/// Record created, spawn in flight.
	Starting,
	Running { pid: u32 },
	Exited { code: i32 },
	SpawnFailed { error: String },
}

impl RunState {
	fn is_live(&self) -> bool {
		matches!(self, RunState::Starting | RunState::Running { .. })
	}
}

pub struct ProcessRecord {
	pub state: RunState,
	pub manual_stop: bool,
	pub started_at: Option<Instant>,
	pub retries: u32,
	pub command_line: String,
	pub working_dir: Option<String>,
	pub output: OutputCapture,
	generation: u64,
}

impl ProcessRecord {
	pub fn status(&self) -> ProcessStatus {
		if self.manual_stop {
			ProcessStatus::Stopped
		} else if self.state.is_live() {
			ProcessStatus::Running
		} else {
			ProcessStatus::Exited
		}
	}

	fn info(&self, name: &str) -> ProcessInfo {
		let (pid, exit_code) = match &self.state {
			RunState::Running { pid } => (Some(*pid), None),
			RunState::Exited { code } => (None, Some(*code)),
			RunState::Starting | RunState::SpawnFailed { .. } => (None, None),
		};
		ProcessInfo {
			name: name.to_string(),
			status: self.status(),
			pid,
			uptime_secs: pid.and(self.started_at).map(|t| t.elapsed().as_secs()),
			exit_code,
			retries: self.retries,
			command: self.command_line.clone(),
			working_dir: self.working_dir.clone(),
		}
	}
}

/// What a stop request has to do after the manual-stop flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTarget {
	/// Signal this pid and wait for its exit.
	Running(u32),
	/// A spawn is in flight; its owner will kill it and report the exit.
	Starting,
	/// Nothing is running; the flag alone is enough.
	Idle,
}

#[derive(Default)]
struct Inner {
	records: HashMap<String, ProcessRecord>,
	next_generation: u64,
}

#[derive(Default)]
pub struct Registry {
	inner: RwLock<Inner>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replace the record for `name` with a fresh `Starting` one and clear the
	/// manual-stop flag. Refused while a live process is registered, which is
	/// what keeps a name down to a single monitor. Returns the new generation.
	pub async fn record_start(
		&self,
		name: &str,
		command_line: String,
		working_dir: Option<String>,
		output: OutputCapture,
	) -> Result<u64> {
		let mut inner = self.inner.write().await;
		if let Some(existing) = inner.records.get(name) {
			match existing.state {
				RunState::Running { pid } => {
					return Err(Error::AlreadyRunning { name: name.to_string(), pid })
				}
				RunState::Starting => return Err(Error::AlreadyStarting(name.to_string())),
				_ => {}
			}
		}

		inner.next_generation += 1;
		let generation = inner.next_generation;
		inner.records.insert(
			name.to_string(),
			ProcessRecord {
				state: RunState::Starting,
				manual_stop: false,
				started_at: None,
				retries: 0,
				command_line,
				working_dir,
				output,
				generation,
			},
		);
		Ok(generation)
	}

	/// Stamp pid and start time once the OS process exists. Returns false when
	/// the start has been overtaken (manual stop or a newer generation); the
	/// caller then owns killing the orphan.
	pub async fn record_spawned(&self, name: &str, generation: u64, pid: u32) -> bool {
		let mut inner = self.inner.write().await;
		match inner.records.get_mut(name) {
			Some(rec) if rec.generation == generation && !rec.manual_stop => {
				rec.state = RunState::Running { pid };
				rec.started_at = Some(Instant::now());
				true
			}
			_ => false,
		}
	}

	pub async fn record_spawn_failed(&self, name: &str, generation: u64, error: String) {
		self.update(name, generation, |rec| {
			rec.state = RunState::SpawnFailed { error };
		})
		.await;
	}

	pub async fn record_exit(&self, name: &str, generation: u64, code: i32) {
		self.update(name, generation, |rec| {
			rec.state = RunState::Exited { code };
		})
		.await;
	}

	/// Claim the record for an automatic restart. Fails if the service was
	/// stopped by hand or restarted explicitly in the meantime.
	pub async fn begin_respawn(&self, name: &str, generation: u64, retries: u32) -> bool {
		let mut inner = self.inner.write().await;
		match inner.records.get_mut(name) {
			Some(rec) if rec.generation == generation && !rec.manual_stop => {
				rec.state = RunState::Starting;
				rec.retries = retries;
				true
			}
			_ => false,
		}
	}

	/// True while the monitor of `generation` may keep acting on `name`.
	pub async fn is_current(&self, name: &str, generation: u64) -> bool {
		let inner = self.inner.read().await;
		inner
			.records
			.get(name)
			.is_some_and(|rec| rec.generation == generation && !rec.manual_stop)
	}

	/// Set the manual-stop flag. Idempotent. `None` for unknown names.
	pub async fn mark_manual_stop(&self, name: &str) -> Option<StopTarget> {
		let mut inner = self.inner.write().await;
		let rec = inner.records.get_mut(name)?;
		rec.manual_stop = true;
		Some(match rec.state {
			RunState::Running { pid } => StopTarget::Running(pid),
			RunState::Starting => StopTarget::Starting,
			RunState::Exited { .. } | RunState::SpawnFailed { .. } => StopTarget::Idle,
		})
	}

	pub async fn contains(&self, name: &str) -> bool {
		self.inner.read().await.records.contains_key(name)
	}

	pub async fn get(&self, name: &str) -> Option<ProcessInfo> {
		let inner = self.inner.read().await;
		inner.records.get(name).map(|rec| rec.info(name))
	}

	pub async fn status(&self, name: &str) -> ProcessStatus {
		let inner = self.inner.read().await;
		inner
			.records
			.get(name)
			.map(|rec| rec.status())
			.unwrap_or(ProcessStatus::NotFound)
	}

	pub async fn output(&self, name: &str) -> Option<OutputCapture> {
		let inner = self.inner.read().await;
		inner.records.get(name).map(|rec| rec.output.clone())
	}

	/// Sorted names, taken under one read lock.
	pub async fn snapshot_names(&self) -> Vec<String> {
		let inner = self.inner.read().await;
		let mut names: Vec<String> = inner.records.keys().cloned().collect();
		names.sort();
		names
	}

	/// Names whose process may still exist, manual stop or not. Sorted.
	pub async fn live_names(&self) -> Vec<String> {
		let inner = self.inner.read().await;
		let mut names: Vec<String> = inner
			.records
			.iter()
			.filter(|(_, rec)| rec.state.is_live())
			.map(|(name, _)| name.clone())
			.collect();
		names.sort();
		names
	}

	/// Every record, sorted by name, taken under one read lock.
	pub async fn snapshot(&self) -> Vec<ProcessInfo> {
		let inner = self.inner.read().await;
		let mut all: Vec<ProcessInfo> = inner
			.records
			.iter()
			.map(|(name, rec)| rec.info(name))
			.collect();
		all.sort_by(|a, b| a.name.cmp(&b.name));
		all
	}

	async fn update(&self, name: &str, generation: u64, f: impl FnOnce(&mut ProcessRecord)) {
		let mut inner = self.inner.write().await;
		if let Some(rec) = inner.records.get_mut(name) {
			if rec.generation == generation {
				f(rec);
			}
		}
	}
}
