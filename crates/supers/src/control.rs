//! Request handling shared by the control socket and the HTTP surface.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use warden::{Error, EventKind, ProcessInfo, ServiceDefinition, Supervisor};

use crate::protocol::{Command, Reply};
use crate::reconcile::reconcile;
use crate::units;

pub struct Controller {
	pub supervisor: Arc<Supervisor>,
	units_dir: PathBuf,
	/// Services currently managed by configuration.
	declared: Mutex<BTreeMap<String, ServiceDefinition>>,
	/// Serializes reloads. `declared` itself is only held for map access.
	reload_lock: Mutex<()>,
	start_timeout: Duration,
}

impl Controller {
	pub fn new(supervisor: Arc<Supervisor>, units_dir: PathBuf, start_timeout: Duration) -> Self {
		Self {
			supervisor,
			units_dir,
			declared: Mutex::new(BTreeMap::new()),
			reload_lock: Mutex::new(()),
			start_timeout,
		}
	}

	/// One request line in, one reply out. Never fails.
	pub async fn handle_line(&self, line: &str) -> String {
		let reply = match Command::parse(line) {
			Ok(cmd) => self.execute(cmd).await,
			Err(e) => Reply::error(e),
		};
		reply.to_string()
	}

	pub async fn execute(&self, cmd: Command) -> Reply {
		tracing::debug!("control: {}", cmd);
		match cmd {
			Command::List | Command::Status(None) => self.list().await,
			Command::Status(Some(name)) => self.status(&name).await,
			Command::Start(name) => self.start(&name).await,
			Command::Stop(name) => self.stop(&name).await,
			Command::Restart(name) => self.restart(&name).await,
			Command::Reload => self.reload().await,
		}
	}

	pub async fn list(&self) -> Reply {
		Reply::Listing { services: self.supervisor.registry.snapshot().await }
	}

	pub async fn status(&self, name: &str) -> Reply {
		let service = self
			.supervisor
			.registry
			.get(name)
			.await
			.unwrap_or_else(|| ProcessInfo::not_found(name));
		Reply::Status { service }
	}

	/// Start `name`, loading its unit on demand when it isn't declared yet, and
	/// wait (bounded) for the supervisor to confirm the outcome.
	pub async fn start(&self, name: &str) -> Reply {
		let def = match self.definition(name).await {
			Ok(def) => def,
			Err(e) => return Reply::error(format!("load config failed: {}", e)),
		};

		let started = self.supervisor.events.subscribe_once(name, EventKind::Started).await;
		let failed = self.supervisor.events.subscribe_once(name, EventKind::StartFailed).await;

		let pid = match self.supervisor.start(&def).await {
			Ok(pid) => pid,
			Err(e) => return Reply::error(e),
		};

		let outcome = tokio::time::timeout(self.start_timeout, async {
			tokio::select! {
				Ok(event) = started => Some(Ok(event)),
				Ok(event) = failed => Some(Err(event)),
				else => None,
			}
		})
		.await;

		match outcome {
			Ok(Some(Ok(event))) => Reply::Started {
				name: name.to_string(),
				pid: event.pid.unwrap_or(pid),
			},
			Ok(Some(Err(event))) => Reply::error(format!(
				"{} failed to start: {}",
				name,
				event.error.unwrap_or_default()
			)),
			Ok(None) | Err(_) => {
				tracing::warn!(service = name, "no start confirmation within {:?}", self.start_timeout);
				Reply::Pending {
					name: name.to_string(),
					waited_ms: self.start_timeout.as_millis() as u64,
				}
			}
		}
	}

	pub async fn stop(&self, name: &str) -> Reply {
		match self.supervisor.stop(name).await {
			Ok(()) => Reply::Stopped { name: name.to_string() },
			Err(e) => Reply::error(e),
		}
	}

	/// Blocking stop, then start. A failed stop aborts the start.
	pub async fn restart(&self, name: &str) -> Reply {
		if let Err(e) = self.supervisor.stop(name).await {
			return Reply::error(e);
		}
		self.start(name).await
	}

	/// Rescan the units directory and start/stop the difference. A load error
	/// leaves the previous declared set in force.
	pub async fn reload(&self) -> Reply {
		let _guard = self.reload_lock.lock().await;

		let new = match units::load_all(&self.units_dir) {
			Ok(units) => units,
			Err(e) => {
				tracing::error!("reload failed: {}", e);
				return Reply::error(format!("reload failed: {}", e));
			}
		};

		let plan = {
			let mut declared = self.declared.lock().await;
			let plan = reconcile(&declared, &new);
			*declared = new.clone();
			plan
		};
		if plan.is_empty() {
			tracing::debug!("reload: nothing to reconcile");
		} else {
			tracing::info!(start = ?plan.to_start, stop = ?plan.to_stop, "reconciling");
		}

		let mut errors = Vec::new();
		for name in &plan.to_stop {
			match self.supervisor.stop(name).await {
				Ok(()) | Err(Error::NotFound(_)) => {}
				Err(e) => errors.push(e.to_string()),
			}
		}
		for name in &plan.to_start {
			let Some(def) = new.get(name) else { continue };
			match self.supervisor.start(def).await {
				Ok(_) | Err(Error::AlreadyRunning { .. }) | Err(Error::AlreadyStarting(_)) => {}
				Err(e) => errors.push(e.to_string()),
			}
		}
		for e in &errors {
			tracing::warn!("reload: {}", e);
		}

		Reply::Reloaded {
			started: plan.to_start,
			stopped: plan.to_stop,
			errors,
		}
	}

	pub async fn declared_names(&self) -> Vec<String> {
		self.declared.lock().await.keys().cloned().collect()
	}

	/// True if `name` is registered, declared, or has a unit file on disk.
	pub async fn knows(&self, name: &str) -> bool {
		if self.supervisor.registry.contains(name).await || self.declared.lock().await.contains_key(name) {
			return true;
		}
		units::is_valid_name(name)
			&& self.units_dir.join(format!("{}.{}", name, units::UNIT_SUFFIX)).is_file()
	}

	/// Recent combined output of `name`, if it has ever been started.
	pub async fn output(&self, name: &str) -> Option<String> {
		let capture = self.supervisor.registry.output(name).await?;
		Some(String::from_utf8_lossy(&capture.snapshot().await).into_owned())
	}

	async fn definition(&self, name: &str) -> Result<ServiceDefinition, units::UnitError> {
		if let Some(def) = self.declared.lock().await.get(name) {
			return Ok(def.clone());
		}
		let def = units::load_one(&self.units_dir, name)?;
		self.declared.lock().await.insert(name.to_string(), def.clone());
		Ok(def)
	}
}
