//! Lifecycle event fan-out.
//!
//! Two kinds of consumers:
//! - persistent [`EventHandler`]s (webhooks, audit logging), registered once and
//!   run concurrently on every event;
//! - one-shot waiters from [`Dispatcher::subscribe_once`], keyed by exact
//!   `(name, kind)` and woken at most once.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
	#[serde(rename = "process.started")]
	Started,
	#[serde(rename = "process.start_failed")]
	StartFailed,
	#[serde(rename = "process.exited")]
	Exited,
	#[serde(rename = "process.restarted")]
	Restarted,
}

impl EventKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			EventKind::Started => "process.started",
			EventKind::StartFailed => "process.start_failed",
			EventKind::Exited => "process.exited",
			EventKind::Restarted => "process.restarted",
		}
	}
}

/// Immutable fact about one service. Serializes to the webhook payload
/// `{name, type, exit_code?, pid?, error?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
	pub name: String,
	#[serde(rename = "type")]
	pub kind: EventKind,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub exit_code: Option<i32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pid: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl Event {
	fn new(name: &str, kind: EventKind) -> Self {
		Self {
			name: name.to_string(),
			kind,
			exit_code: None,
			pid: None,
			error: None,
		}
	}

	pub fn started(name: &str, pid: u32) -> Self {
		Self { pid: Some(pid), ..Self::new(name, EventKind::Started) }
	}

	pub fn start_failed(name: &str, error: impl Into<String>) -> Self {
		Self { error: Some(error.into()), ..Self::new(name, EventKind::StartFailed) }
	}

	pub fn exited(name: &str, exit_code: i32) -> Self {
		Self { exit_code: Some(exit_code), ..Self::new(name, EventKind::Exited) }
	}

	pub fn restarted(name: &str, exit_code: i32) -> Self {
		Self { exit_code: Some(exit_code), ..Self::new(name, EventKind::Restarted) }
	}
}

/// A persistent consumer of every event. Runs on its own task per event, so a
/// slow handler never delays the emitter or other handlers.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
	async fn handle(&self, event: &Event);
}

/// Logs every event through `tracing`.
pub struct EventLog;

#[async_trait]
impl EventHandler for EventLog {
	async fn handle(&self, event: &Event) {
		match event.kind {
			EventKind::Started => {
				tracing::info!(service = %event.name, pid = ?event.pid, "{}", event.kind.as_str())
			}
			EventKind::StartFailed => tracing::warn!(
				service = %event.name,
				error = event.error.as_deref().unwrap_or(""),
				"{}",
				event.kind.as_str()
			),
			EventKind::Exited | EventKind::Restarted => {
				tracing::info!(service = %event.name, exit_code = ?event.exit_code, "{}", event.kind.as_str())
			}
		}
	}
}

type WaiterKey = (String, EventKind);

#[derive(Default)]
pub struct Dispatcher {
	handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
	waiters: Mutex<HashMap<WaiterKey, Vec<oneshot::Sender<Event>>>>,
}

impl Dispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append a persistent handler. Handlers live as long as the dispatcher.
	pub async fn register(&self, handler: Arc<dyn EventHandler>) {
		self.handlers.write().await.push(handler);
	}

	/// Wait for the next event matching exactly `(name, kind)`.
	///
	/// The receiver gets at most one event; the subscription is removed when it
	/// is delivered. Dropping the receiver early is fine.
	pub async fn subscribe_once(&self, name: &str, kind: EventKind) -> oneshot::Receiver<Event> {
		let (tx, rx) = oneshot::channel();
		let mut waiters = self.waiters.lock().await;
		let slot = waiters.entry((name.to_string(), kind)).or_default();
		// Waiters that gave up (timed out) are pruned here rather than on emit.
		slot.retain(|w| !w.is_closed());
		slot.push(tx);
		rx
	}

	pub async fn emit(&self, event: Event) {
		let handlers = self.handlers.read().await.clone();

		let waiters = self
			.waiters
			.lock()
			.await
			.remove(&(event.name.clone(), event.kind))
			.unwrap_or_default();
		for waiter in waiters {
			let _ = waiter.send(event.clone());
		}

		for handler in handlers {
			let event = event.clone();
			tokio::spawn(async move {
				handler.handle(&event).await;
			});
		}
	}

	#[cfg(test)]
	async fn pending_waiters(&self) -> usize {
		self.waiters.lock().await.values().map(Vec::len).sum()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;
	use tokio::sync::mpsc;

	struct Collect(mpsc::UnboundedSender<Event>);

	#[async_trait]
	impl EventHandler for Collect {
		async fn handle(&self, event: &Event) {
			let _ = self.0.send(event.clone());
		}
	}

	struct Stuck;

	#[async_trait]
	impl EventHandler for Stuck {
		async fn handle(&self, _event: &Event) {
			std::future::pending::<()>().await;
		}
	}

	#[tokio::test]
	async fn one_shot_is_exact_match() {
		let d = Dispatcher::new();
		let mut exited = d.subscribe_once("web", EventKind::Exited).await;

		d.emit(Event::started("web", 10)).await;
		d.emit(Event::exited("api", 1)).await;
		assert!(exited.try_recv().is_err());

		d.emit(Event::exited("web", 3)).await;
		assert_eq!(exited.await.unwrap(), Event::exited("web", 3));
	}

	#[tokio::test]
	async fn one_shot_delivered_once_then_removed() {
		let d = Dispatcher::new();
		let first = d.subscribe_once("web", EventKind::Started).await;
		let second = d.subscribe_once("web", EventKind::Started).await;
		assert_eq!(d.pending_waiters().await, 2);

		d.emit(Event::started("web", 1)).await;
		d.emit(Event::started("web", 2)).await;

		assert_eq!(first.await.unwrap().pid, Some(1));
		assert_eq!(second.await.unwrap().pid, Some(1));
		assert_eq!(d.pending_waiters().await, 0);
	}

	#[tokio::test]
	async fn abandoned_waiters_are_pruned() {
		let d = Dispatcher::new();
		drop(d.subscribe_once("web", EventKind::Exited).await);
		let _live = d.subscribe_once("web", EventKind::Exited).await;
		assert_eq!(d.pending_waiters().await, 1);
	}

	#[tokio::test]
	async fn stuck_handler_does_not_block_others() {
		let d = Dispatcher::new();
		let (tx, mut rx) = mpsc::unbounded_channel();
		d.register(Arc::new(Stuck)).await;
		d.register(Arc::new(Collect(tx))).await;

		d.emit(Event::started("web", 7)).await;
		d.emit(Event::exited("web", 0)).await;

		let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
		let second = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
		let mut kinds = vec![first.kind, second.kind];
		kinds.sort_by_key(|k| k.as_str());
		assert_eq!(kinds, vec![EventKind::Exited, EventKind::Started]);
	}

	#[test]
	fn payload_shape() {
		let json = serde_json::to_value(Event::started("web", 42)).unwrap();
		assert_eq!(json, serde_json::json!({"name": "web", "type": "process.started", "pid": 42}));

		let json = serde_json::to_value(Event::exited("web", 0)).unwrap();
		assert_eq!(json, serde_json::json!({"name": "web", "type": "process.exited", "exit_code": 0}));

		let json = serde_json::to_value(Event::start_failed("web", "no such file")).unwrap();
		assert_eq!(
			json,
			serde_json::json!({"name": "web", "type": "process.start_failed", "error": "no such file"})
		);
	}
}
