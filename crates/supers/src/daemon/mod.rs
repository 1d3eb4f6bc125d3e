pub mod api;

use std::sync::Arc;
use std::time::Duration;
use sockline::{Daemon, DaemonError, DaemonPaths};
use warden::{EventLog, Supervisor, SupervisorConfig};

use crate::config::GlobalConfig;
use crate::control::Controller;
use crate::protocol::Reply;
use crate::webhook::WebhookHandler;
use crate::APP_NAME;

const LOG_EXPIRY_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
pub enum RunError {
	#[error(transparent)]
	Daemon(#[from] DaemonError),
	#[error("failed to bind control socket: {0}")]
	Bind(#[source] std::io::Error),
}

/// Foreground daemon entry point (`supers daemon run`).
pub async fn run(config: GlobalConfig) -> Result<(), RunError> {
	init_tracing(&config.daemon.log_level);
	serve(config, Daemon::new(DaemonPaths::new(APP_NAME))).await
}

fn init_tracing(level: &str) {
	let level = level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
	let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

/// Run until SIGINT/SIGTERM, then stop every child and remove socket and PID file.
pub async fn serve(config: GlobalConfig, daemon: Daemon) -> Result<(), RunError> {
	daemon.prepare()?;
	let listener = match sockline::server::bind(&daemon.paths.socket_path()) {
		Ok(l) => l,
		Err(e) => {
			daemon.cleanup();
			return Err(RunError::Bind(e));
		}
	};

	let log_dir = config.logs.dir();
	warden::logs::expire_logs(&log_dir, config.logs.max_age_days, config.logs.max_files);

	let supervisor = Supervisor::new(SupervisorConfig {
		log_dir: log_dir.clone(),
		max_log_size: config.logs.max_size_bytes,
		stop_timeout: config.daemon.stop_timeout(),
	});
	supervisor.events.register(Arc::new(EventLog)).await;
	if !config.events.webhooks.is_empty() {
		let timeout = Duration::from_secs(config.events.timeout_secs);
		match WebhookHandler::new(config.events.webhooks.clone(), timeout) {
			Ok(handler) => {
				tracing::info!("delivering events to {} webhook(s)", handler.urls().len());
				supervisor.events.register(Arc::new(handler)).await;
			}
			Err(e) => tracing::error!("webhooks disabled: {}", e),
		}
	}

	let controller = Arc::new(Controller::new(
		Arc::clone(&supervisor),
		config.daemon.units_dir(),
		config.daemon.start_timeout(),
	));

	if let Reply::Error { message } = controller.reload().await {
		tracing::error!("initial load failed: {}", message);
	}

	{
		let logs = config.logs.clone();
		tokio::spawn(async move {
			loop {
				tokio::time::sleep(LOG_EXPIRY_INTERVAL).await;
				warden::logs::expire_logs(&log_dir, logs.max_age_days, logs.max_files);
			}
		});
	}

	let socket_controller = Arc::clone(&controller);
	let socket_handle = tokio::spawn(sockline::server::serve(listener, move |line: String| {
		let controller = Arc::clone(&socket_controller);
		async move { controller.handle_line(&line).await }
	}));

	// The HTTP surface is optional: if it fails, supervision carries on.
	let http_handle = config.http.enabled.then(|| {
		let addr = format!("{}:{}", config.http.bind, config.http.port);
		let controller = Arc::clone(&controller);
		tokio::spawn(async move { run_http_server(controller, addr).await })
	});

	tracing::info!("daemon started (pid {})", std::process::id());

	tokio::select! {
		_ = socket_handle => tracing::error!("control socket server stopped"),
		_ = sockline::shutdown_signal() => tracing::info!("shutting down"),
	}

	if let Some(handle) = http_handle {
		handle.abort();
	}
	supervisor.shutdown().await;
	daemon.cleanup();
	Ok(())
}

async fn run_http_server(controller: Arc<Controller>, addr: String) {
	let app = api::router(controller);
	let listener = match tokio::net::TcpListener::bind(&addr).await {
		Ok(l) => l,
		Err(e) => {
			tracing::error!("failed to bind HTTP on {}: {} (control socket still serving)", addr, e);
			return;
		}
	};
	tracing::info!("HTTP listening on {}", addr);
	if let Err(e) = axum::serve(listener, app).await {
		tracing::error!("HTTP server error: {}", e);
	}
}
