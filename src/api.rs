use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use crate::models::{is_check_id, Check, Status};
use crate::store::{self, RecordStore, StoreError, CHECKS};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSummary {
    pub id: String,
    pub method: String,
    pub url: String,
    pub state: Status,
    pub last_checked: Option<i64>,
}

impl From<Check> for CheckSummary {
    fn from(check: Check) -> Self {
        Self {
            id: check.id,
            method: check.method,
            url: check.url,
            state: check.state,
            last_checked: check.last_checked,
        }
    }
}

type ApiState = State<Arc<dyn RecordStore>>;

pub async fn list_checks(State(store): ApiState) -> Result<Json<Vec<CheckSummary>>, StatusCode> {
    let ids = store.list(CHECKS).await.map_err(|e| {
        error!(error = %e, "Could not list checks");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let mut checks = Vec::with_capacity(ids.len());
    for id in ids {
        match store::read_as::<Check>(store.as_ref(), CHECKS, &id).await {
            Ok(check) => checks.push(check.into()),
            Err(e) => error!(check_id = %id, error = %e, "Could not read check"),
        }
    }
    Ok(Json(checks))
}

pub async fn get_check(State(store): ApiState, Path(id): Path<String>) -> Result<Json<CheckSummary>, StatusCode> {
    if !is_check_id(&id) {
        return Err(StatusCode::BAD_REQUEST);
    }
    match store::read_as::<Check>(store.as_ref(), CHECKS, &id).await {
        Ok(check) => Ok(Json(check.into())),
        Err(StoreError::NotFound { .. }) => Err(StatusCode::NOT_FOUND),
        Err(StoreError::InvalidId(_)) => Err(StatusCode::BAD_REQUEST),
        Err(e) => {
            error!(check_id = %id, error = %e, "Could not read check");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub fn create_router(store: Arc<dyn RecordStore>) -> Router {
    Router::new()
        .route("/api/checks", get(list_checks))
        .route("/api/checks/:id", get(get_check))
        .with_state(store)
}

pub async fn start_server(port: u16, store: Arc<dyn RecordStore>) -> anyhow::Result<()> {
    let app = create_router(store);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Status API: http://localhost:{}/api/checks", addr.port());
    axum::serve(listener, app).await?;
    Ok(())
}
