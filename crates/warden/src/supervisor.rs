use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use nix::sys::signal::Signal;
use tokio::process::{Child, Command};

use crate::error::{Error, Result};
use crate::events::{Dispatcher, Event, EventKind};
use crate::output::OutputCapture;
use crate::registry::{Registry, StopTarget};
use crate::types::ServiceDefinition;

/// How long shutdown waits for a SIGKILLed group to be reaped.
const KILL_WAIT: Duration = Duration::from_secs(2);

pub struct SupervisorConfig {
	pub log_dir: PathBuf,
	pub max_log_size: u64,
	/// How long `stop` waits for the exit to be observed.
	pub stop_timeout: Duration,
}

pub struct Supervisor {
	pub registry: Registry,
	pub events: Dispatcher,
	pub config: SupervisorConfig,
}

impl Supervisor {
	pub fn new(config: SupervisorConfig) -> Arc<Self> {
		Arc::new(Self {
			registry: Registry::new(),
			events: Dispatcher::new(),
			config,
		})
	}

	/// Spawn `def` and hand it to a fresh monitor task.
	///
	/// Returns once the OS process exists (with its pid) or spawning failed.
	/// A failed spawn is reported as `start_failed` and is not retried.
	pub async fn start(self: &Arc<Self>, def: &ServiceDefinition) -> Result<u32> {
		let output = OutputCapture::open(&self.config.log_dir, &def.name, self.config.max_log_size);
		let working_dir = def.working_dir.as_ref().map(|d| d.display().to_string());
		let generation = self
			.registry
			.record_start(&def.name, def.command_line(), working_dir, output.clone())
			.await?;

		let child = self.launch(def, generation, &output).await?;
		let pid = child.id().unwrap_or(0);

		let sup = Arc::clone(self);
		let def = def.clone();
		tokio::spawn(async move {
			sup.monitor(def, generation, child, output).await;
		});

		Ok(pid)
	}

	/// Stop `name` and keep it stopped until the next explicit start.
	///
	/// Waits up to `stop_timeout` for the exit. On timeout the manual-stop flag
	/// stays set, so a late exit still won't be restarted.
	pub async fn stop(&self, name: &str) -> Result<()> {
		if !self.registry.contains(name).await {
			return Err(Error::NotFound(name.to_string()));
		}

		// Subscribe before flagging so the exit can't slip between the two.
		let exited = self.events.subscribe_once(name, EventKind::Exited).await;
		let failed = self.events.subscribe_once(name, EventKind::StartFailed).await;

		let target = self
			.registry
			.mark_manual_stop(name)
			.await
			.ok_or_else(|| Error::NotFound(name.to_string()))?;

		match target {
			StopTarget::Idle => return Ok(()),
			StopTarget::Starting => {}
			StopTarget::Running(pid) => terminate_group(pid).map_err(|source| Error::Signal {
				name: name.to_string(),
				source,
			})?,
		}

		let timeout = self.config.stop_timeout;
		let observed = tokio::time::timeout(timeout, async {
			tokio::select! {
				r = exited => r.is_ok(),
				r = failed => r.is_ok(),
			}
		})
		.await;

		match observed {
			Ok(true) => Ok(()),
			_ => Err(Error::StopTimeout { name: name.to_string(), timeout }),
		}
	}

	/// Stop every live service in parallel. Used on daemon shutdown.
	///
	/// Includes services already flagged stopped whose process is still
	/// around. Whatever outlives `stop_timeout` gets SIGKILL.
	pub async fn shutdown(self: &Arc<Self>) {
		let mut tasks = tokio::task::JoinSet::new();
		for name in self.registry.live_names().await {
			let sup = Arc::clone(self);
			tasks.spawn(async move {
				match sup.stop(&name).await {
					Ok(()) => {}
					Err(Error::StopTimeout { .. }) => sup.kill(&name).await,
					Err(e) => tracing::warn!("shutdown: {}", e),
				}
			});
		}
		while tasks.join_next().await.is_some() {}
	}

	async fn kill(&self, name: &str) {
		let exited = self.events.subscribe_once(name, EventKind::Exited).await;
		let Some(pid) = self.registry.get(name).await.and_then(|info| info.pid) else {
			return;
		};

		tracing::warn!(service = name, pid, "did not stop in time, sending SIGKILL");
		if let Err(e) = kill_group(pid) {
			tracing::warn!(service = name, "SIGKILL failed: {}", e);
			return;
		}
		if tokio::time::timeout(KILL_WAIT, exited).await.is_err() {
			tracing::warn!(service = name, pid, "still not reaped after SIGKILL");
		}
	}

	async fn launch(&self, def: &ServiceDefinition, generation: u64, output: &OutputCapture) -> Result<Child> {
		let name = def.name.as_str();

		let mut child = match spawn_process(def) {
			Ok(c) => c,
			Err(e) => {
				tracing::error!(service = name, "spawn failed: {}", e);
				output.note(&format!("{} failed to start: {}", name, e)).await;
				self.registry.record_spawn_failed(name, generation, e.to_string()).await;
				self.events.emit(Event::start_failed(name, e.to_string())).await;
				return Err(Error::Spawn { name: name.to_string(), source: e });
			}
		};

		let pid = child.id().unwrap_or(0);
		if let Some(stdout) = child.stdout.take() {
			tokio::spawn(output.clone().pipe(stdout));
		}
		if let Some(stderr) = child.stderr.take() {
			tokio::spawn(output.clone().pipe(stderr));
		}

		let owned = self.registry.record_spawned(name, generation, pid).await;
		self.events.emit(Event::started(name, pid)).await;

		if !owned {
			// Stopped while the spawn was in flight: take it straight back down.
			tracing::info!(service = name, pid, "stopped during start, terminating");
			let _ = terminate_group(pid);
			let code = exit_code(child.wait().await);
			self.registry.record_exit(name, generation, code).await;
			self.events.emit(Event::exited(name, code)).await;
			return Err(Error::StoppedDuringStart(name.to_string()));
		}

		Ok(child)
	}

	/// Owns the service's lifecycle for one generation: wait, classify, restart.
	async fn monitor(
		self: Arc<Self>,
		def: ServiceDefinition,
		generation: u64,
		mut child: Child,
		output: OutputCapture,
	) {
		let name = def.name.as_str();
		let mut retries: u32 = 0;

		loop {
			let code = exit_code(child.wait().await);
			output.note(&format!("{} exited (code {})", name, code)).await;
			self.registry.record_exit(name, generation, code).await;
			self.events.emit(Event::exited(name, code)).await;

			if !self.registry.is_current(name, generation).await {
				tracing::debug!(service = name, "stopped or superseded, monitor done");
				return;
			}
			if !def.policy.should_restart(code, retries) {
				tracing::info!(service = name, exit_code = code, retries, "not restarting");
				return;
			}

			self.events.emit(Event::restarted(name, code)).await;
			retries += 1;
			tracing::info!(
				service = name,
				exit_code = code,
				"restarting in {:?} (retry {})",
				def.policy.delay,
				retries
			);
			tokio::time::sleep(def.policy.delay).await;

			if !self.registry.begin_respawn(name, generation, retries).await {
				tracing::info!(service = name, "stopped during restart delay");
				return;
			}
			child = match self.launch(&def, generation, &output).await {
				Ok(c) => c,
				Err(e) => {
					tracing::warn!(service = name, "restart abandoned: {}", e);
					return;
				}
			};
		}
	}
}

fn spawn_process(def: &ServiceDefinition) -> std::io::Result<Child> {
	let (program, args) = def.program();
	let mut cmd = Command::new(&program);
	cmd.args(&args)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.process_group(0);

	if let Some(dir) = &def.working_dir {
		cmd.current_dir(dir);
	}
	for kv in def.env.iter().filter(|kv| !kv.contains('=')) {
		tracing::warn!(service = %def.name, "ignoring environment entry without '=': {}", kv);
	}
	for (key, value) in def.env_pairs() {
		cmd.env(key, value);
	}

	cmd.spawn()
}

/// Exit code of a finished child; `-1` when killed by a signal or unknown.
fn exit_code(status: std::io::Result<ExitStatus>) -> i32 {
	match status {
		Ok(s) => s.code().unwrap_or(-1),
		Err(e) => {
			tracing::warn!("wait failed: {}", e);
			-1
		}
	}
}

/// SIGTERM the child's process group (children are spawned as group leaders).
pub fn terminate_group(pid: u32) -> std::result::Result<(), nix::errno::Errno> {
	signal_group(pid, Signal::SIGTERM)
}

/// SIGKILL the child's process group.
pub fn kill_group(pid: u32) -> std::result::Result<(), nix::errno::Errno> {
	signal_group(pid, Signal::SIGKILL)
}

fn signal_group(pid: u32, signal: Signal) -> std::result::Result<(), nix::errno::Errno> {
	use nix::errno::Errno;
	use nix::sys::signal::killpg;
	use nix::unistd::Pid;

	if pid == 0 {
		return Ok(());
	}
	match killpg(Pid::from_raw(pid as i32), signal) {
		Ok(()) | Err(Errno::ESRCH) => Ok(()),
		Err(e) => Err(e),
	}
}
