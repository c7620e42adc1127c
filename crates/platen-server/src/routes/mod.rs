use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router, middleware};
use platen_core::Error;
use platen_db::entities::jobs::Model as JobModel;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::identity::Principal;
use crate::security;
use crate::state::AppState;
use crate::ws;

pub mod files;
pub mod jobs;
pub mod printer;

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
    version: &'static str,
}

async fn healthz() -> impl IntoResponse {
    Json(HealthzResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/jobs", get(jobs::list).post(jobs::create))
        .route("/jobs/not_done", get(jobs::not_done))
        .route(
            "/jobs/:id",
            get(jobs::get_one).put(jobs::update).delete(jobs::delete),
        )
        .route("/jobs/:id/reorder", put(jobs::reorder))
        .route("/jobs/:id/reprint", put(jobs::reprint))
        .route("/jobs/:id/assign", put(jobs::assign))
        .route("/files/:id", get(files::download))
        .route("/files/:id/info", get(files::info))
        .route("/printer", get(printer::list))
        .route("/printer/materials", get(printer::materials))
        .route("/printer/extruder_types", get(printer::extruder_types))
        .route("/printer/:id", get(printer::get_one));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws/client", get(ws::client::client_ws))
        .route("/ws/printer", get(ws::printer::printer_ws))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), security::cors))
        .with_state(state)
}

/// Authenticate a REST request into a principal.
pub async fn require_principal(state: &AppState, headers: &HeaderMap) -> ApiResult<Principal> {
    Ok(state.identity.authenticate(headers).await.map_err(Error::Auth)?)
}

/// Authenticated user of any rank.
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> ApiResult<(Uuid, bool)> {
    match require_principal(state, headers).await? {
        Principal::User { id, is_admin } => Ok((id, is_admin)),
        Principal::Printer { .. } => Err(ApiError(Error::Auth(
            platen_core::error::AuthError::AuthenticationFailed,
        ))),
    }
}

pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> ApiResult<Uuid> {
    let (id, is_admin) = require_user(state, headers).await?;
    if !is_admin {
        return Err(ApiError(Error::Auth(
            platen_core::error::AuthError::AuthenticationFailed,
        )));
    }
    Ok(id)
}

/// Mutating job operations require ownership unless the caller is an admin.
pub fn ensure_job_access(user_id: Uuid, is_admin: bool, job: &JobModel) -> ApiResult<()> {
    if is_admin || job.user_id == user_id {
        Ok(())
    } else {
        Err(ApiError(Error::Auth(
            platen_core::error::AuthError::AuthenticationFailed,
        )))
    }
}
