use super::protocol::{
    ActivateResponse, CreateRequest, MountRequest, NameRequest, PLUGIN_CONTENT_TYPE,
    PluginResponse,
};
use crate::driver::{DriverMetrics, VolumeDriver};
use anyhow::{Context, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct PluginState {
    driver: Arc<dyn VolumeDriver>,
    metrics: Option<Arc<DriverMetrics>>,
}

/// Docker volume plugin endpoint
pub struct PluginServer {
    driver: Arc<dyn VolumeDriver>,
    metrics: Option<Arc<DriverMetrics>>,
}

impl PluginServer {
    pub fn new(driver: Arc<dyn VolumeDriver>) -> Self {
        Self { driver, metrics: None }
    }

    /// Also expose `GET /metrics`
    pub fn with_metrics(mut self, metrics: Arc<DriverMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn router(&self) -> Router {
        let state = PluginState { driver: self.driver.clone(), metrics: self.metrics.clone() };

        Router::new()
            .route("/Plugin.Activate", post(activate))
            .route("/VolumeDriver.Create", post(create))
            .route("/VolumeDriver.Remove", post(remove))
            .route("/VolumeDriver.Path", post(path))
            .route("/VolumeDriver.Get", post(get_volume))
            .route("/VolumeDriver.List", post(list))
            .route("/VolumeDriver.Mount", post(mount))
            .route("/VolumeDriver.Unmount", post(unmount))
            .route("/VolumeDriver.Capabilities", post(capabilities))
            .route("/metrics", get(metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serve on a unix socket until `shutdown` resolves
    pub async fn serve(
        &self,
        socket: &Path,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        // Remove existing socket if it exists
        if socket.exists() {
            std::fs::remove_file(socket).context("Failed to remove existing socket")?;
        }

        if let Some(parent) = socket.parent() {
            std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
        }

        let listener =
            tokio::net::UnixListener::bind(socket).context("Failed to bind Unix socket")?;

        tracing::info!("Volume plugin listening on {}", socket.display());

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("Plugin server error")?;

        remove_socket(socket);
        Ok(())
    }
}

fn remove_socket(socket: &Path) {
    match std::fs::remove_file(socket) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove socket {}: {}", socket.display(), e),
    }
}

fn reply(status: StatusCode, body: impl Serialize) -> Response {
    let body = match serde_json::to_vec(&body) {
        Ok(body) => body,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };
    (status, [(header::CONTENT_TYPE, PLUGIN_CONTENT_TYPE)], body).into_response()
}

fn respond(result: Result<PluginResponse, String>) -> Response {
    match result {
        Ok(resp) => reply(StatusCode::OK, resp),
        Err(message) => reply(StatusCode::INTERNAL_SERVER_ERROR, PluginResponse::error(message)),
    }
}

/// Decode a request body; an empty body is the default request
#[allow(clippy::result_large_err)]
fn decode<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!("Rejecting malformed plugin request: {}", e);
        reply(StatusCode::BAD_REQUEST, PluginResponse::error(format!("Invalid request: {}", e)))
    })
}

async fn activate() -> Response {
    reply(StatusCode::OK, ActivateResponse::volume_driver())
}

async fn create(State(state): State<PluginState>, body: Bytes) -> Response {
    let req: CreateRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let result = state.driver.create(&req.name, req.opts.unwrap_or_default()).await;
    respond(result.map(|_| PluginResponse::ok()).map_err(|e| e.to_string()))
}

async fn remove(State(state): State<PluginState>, body: Bytes) -> Response {
    let req: NameRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let result = state.driver.remove(&req.name).await;
    respond(result.map(|_| PluginResponse::ok()).map_err(|e| e.to_string()))
}

async fn path(State(state): State<PluginState>, body: Bytes) -> Response {
    let req: NameRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let mountpoint = state.driver.path(&req.name);
    respond(Ok(PluginResponse::mountpoint(mountpoint.display().to_string())))
}

async fn get_volume(State(state): State<PluginState>, body: Bytes) -> Response {
    let req: NameRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    respond(Ok(PluginResponse::volume(state.driver.get(&req.name).await)))
}

async fn list(State(state): State<PluginState>) -> Response {
    respond(Ok(PluginResponse::volumes(state.driver.list().await)))
}

async fn mount(State(state): State<PluginState>, body: Bytes) -> Response {
    let req: MountRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    tracing::debug!(volume = %req.name, id = %req.id, "Mount request");
    let result = state.driver.mount(&req.name).await;
    respond(
        result
            .map(|mountpoint| PluginResponse::mountpoint(mountpoint.display().to_string()))
            .map_err(|e| e.to_string()),
    )
}

async fn unmount(State(state): State<PluginState>, body: Bytes) -> Response {
    let req: MountRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    tracing::debug!(volume = %req.name, id = %req.id, "Unmount request");
    let result = state.driver.unmount(&req.name).await;
    respond(result.map(|_| PluginResponse::ok()).map_err(|e| e.to_string()))
}

async fn capabilities(State(state): State<PluginState>) -> Response {
    respond(Ok(PluginResponse::capabilities(state.driver.capabilities())))
}

async fn metrics(State(state): State<PluginState>) -> Response {
    let Some(metrics) = state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match metrics.render() {
        Ok(text) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text)
                .into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
