use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backends::ServerState;
use crate::config::{MountConfig, MountKind};
use crate::handler::descriptor::METHOD_TOKEN;
use crate::handler::result::error_object;
use crate::http::server::AppState;
use crate::mount::{MountError, MountInfo, MountOrigin, UnmountTarget, MOUNT_TOKEN};
use crate::routing::entry::HANDLER_ID_TOKEN;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub mounts: usize,
    pub routes: usize,
    pub table_version: u64,
    pub initialized: bool,
    pub sealed: bool,
}

#[derive(Serialize)]
pub struct RouteStatus {
    pub template: String,
    pub name: Option<String>,
    pub mount: Option<Value>,
    pub method: Option<Value>,
    pub handler_id: Option<String>,
    pub constrained: bool,
}

#[derive(Debug, Deserialize)]
pub struct MountRequest {
    pub path: String,
    pub kind: MountKind,
}

/// A mount failure reported to the admin caller.
pub struct AdminError(MountError);

impl From<MountError> for AdminError {
    fn from(e: MountError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MountError::AlreadyMounted(_) | MountError::DuplicateName(_) => StatusCode::CONFLICT,
            MountError::UnknownTarget(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        error_object(status, [self.0.to_string()]).into_response()
    }
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let snapshot = state.table.snapshot();
    let server: &ServerState = state.backends.state();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        mounts: state.mounts.mounts().len(),
        routes: snapshot.len(),
        table_version: snapshot.version(),
        initialized: server.is_initialized(),
        sealed: server.is_sealed(),
    })
}

pub async fn get_mounts(State(state): State<AppState>) -> Json<Vec<MountInfo>> {
    Json(state.mounts.mounts())
}

pub async fn get_routes(State(state): State<AppState>) -> Json<Vec<RouteStatus>> {
    let snapshot = state.table.snapshot();
    let routes = snapshot
        .entries()
        .iter()
        .map(|e| RouteStatus {
            template: e.template().to_string(),
            name: e.name().map(str::to_string),
            mount: e.data_tokens().get(MOUNT_TOKEN).cloned(),
            method: e.data_tokens().get(METHOD_TOKEN).cloned(),
            handler_id: e.data_tokens().get(HANDLER_ID_TOKEN).and_then(Value::as_str).map(str::to_string),
            constrained: e.constraint().is_some(),
        })
        .collect();
    Json(routes)
}

pub async fn create_mount(
    State(state): State<AppState>,
    Json(request): Json<MountRequest>,
) -> Result<(StatusCode, Json<MountInfo>), AdminError> {
    let config = MountConfig {
        path: request.path,
        kind: request.kind,
    };
    let handler = state.backends.build(&config)?;
    let info = state
        .mounts
        .mount_as(&config.path, handler, config.kind.as_str(), MountOrigin::Admin)?;
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn delete_mount(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, AdminError> {
    let removed = state.mounts.unmount(UnmountTarget::Prefix(path))?;
    Ok(Json(json!({ "removed": removed })))
}
