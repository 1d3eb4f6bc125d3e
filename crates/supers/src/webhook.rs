use async_trait::async_trait;
use std::time::Duration;
use warden::{Event, EventHandler};

/// POSTs every lifecycle event as JSON to each configured URL. Best effort:
/// failures are logged and dropped.
pub struct WebhookHandler {
	client: reqwest::Client,
	urls: Vec<String>,
}

impl WebhookHandler {
	pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.user_agent(concat!("supers/", env!("CARGO_PKG_VERSION")))
			.build()?;
		Ok(Self { client, urls })
	}

	pub fn urls(&self) -> &[String] {
		&self.urls
	}
}

#[async_trait]
impl EventHandler for WebhookHandler {
	async fn handle(&self, event: &Event) {
		for url in &self.urls {
			match self.client.post(url).json(event).send().await {
				Ok(resp) if !resp.status().is_success() => {
					tracing::warn!(
						service = %event.name,
						event = event.kind.as_str(),
						"webhook {} answered {}",
						url,
						resp.status()
					);
				}
				Ok(_) => {}
				Err(e) => {
					tracing::warn!(service = %event.name, event = event.kind.as_str(), "webhook {} failed: {}", url, e);
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn unreachable_url_is_not_fatal() {
		let handler = WebhookHandler::new(
			vec!["http://127.0.0.1:9/hook".to_string()],
			Duration::from_millis(500),
		)
		.unwrap();
		assert_eq!(handler.urls().len(), 1);
		handler.handle(&Event::started("web", 42)).await;
	}

	#[tokio::test]
	async fn posts_event_json() {
		use axum::routing::post;
		use axum::{Json, Router};
		use std::sync::{Arc, Mutex};

		let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
		let sink = Arc::clone(&received);
		let app = Router::new().route(
			"/hook",
			post(move |Json(body): Json<serde_json::Value>| {
				let sink = Arc::clone(&sink);
				async move {
					sink.lock().unwrap().push(body);
				}
			}),
		);
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			let _ = axum::serve(listener, app).await;
		});

		let handler =
			WebhookHandler::new(vec![format!("http://{}/hook", addr)], Duration::from_secs(5)).unwrap();
		handler.handle(&Event::exited("web", 3)).await;

		let bodies = received.lock().unwrap().clone();
		assert_eq!(
			bodies,
			vec![serde_json::json!({"name": "web", "type": "process.exited", "exit_code": 3})]
		);
	}
}
