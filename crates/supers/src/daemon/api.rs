use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use warden::{ProcessInfo, ProcessStatus};

use crate::control::Controller;
use crate::protocol::Reply;

#[derive(Clone)]
pub struct AppState {
	pub controller: Arc<Controller>,
}

pub fn router(controller: Arc<Controller>) -> Router {
	let state = AppState { controller };

	Router::new()
		.route("/deploy/status", get(liveness))
		.route("/api/services", get(list_services))
		.route("/api/services/{name}", get(service_detail))
		.route("/api/services/{name}/start", post(start_service))
		.route("/api/services/{name}/stop", post(stop_service))
		.route("/api/services/{name}/restart", post(restart_service))
		.route("/api/services/{name}/logs", get(service_logs))
		.route("/api/reload", post(reload))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

async fn liveness() -> &'static str {
	"OK"
}

async fn list_services(State(state): State<AppState>) -> Json<Vec<ProcessInfo>> {
	Json(state.controller.supervisor.registry.snapshot().await)
}

async fn service_detail(
	State(state): State<AppState>,
	Path(name): Path<String>,
) -> Result<Json<ProcessInfo>, (StatusCode, Json<Reply>)> {
	match state.controller.status(&name).await {
		Reply::Status { service } if service.status != ProcessStatus::NotFound => Ok(Json(service)),
		_ => Err((
			StatusCode::NOT_FOUND,
			Json(Reply::error(format!("service not found: {}", name))),
		)),
	}
}

async fn start_service(State(state): State<AppState>, Path(name): Path<String>) -> Response {
	let reply = state.controller.start(&name).await;
	respond(&state, &name, reply).await
}

async fn stop_service(State(state): State<AppState>, Path(name): Path<String>) -> Response {
	let reply = state.controller.stop(&name).await;
	respond(&state, &name, reply).await
}

async fn restart_service(State(state): State<AppState>, Path(name): Path<String>) -> Response {
	let reply = state.controller.restart(&name).await;
	respond(&state, &name, reply).await
}

async fn reload(State(state): State<AppState>) -> Response {
	let reply = state.controller.reload().await;
	let status = if reply.is_error() { StatusCode::BAD_REQUEST } else { StatusCode::OK };
	(status, Json(reply)).into_response()
}

async fn service_logs(
	State(state): State<AppState>,
	Path(name): Path<String>,
) -> Result<String, (StatusCode, Json<Reply>)> {
	state.controller.output(&name).await.ok_or_else(|| {
		(
			StatusCode::NOT_FOUND,
			Json(Reply::error(format!("service not found: {}", name))),
		)
	})
}

async fn respond(state: &AppState, name: &str, reply: Reply) -> Response {
	let unknown = reply.is_error() && !state.controller.knows(name).await;
	let status = match &reply {
		Reply::Pending { .. } => StatusCode::ACCEPTED,
		Reply::Error { .. } if unknown => StatusCode::NOT_FOUND,
		Reply::Error { .. } => StatusCode::BAD_REQUEST,
		_ => StatusCode::OK,
	};
	(status, Json(reply)).into_response()
}
