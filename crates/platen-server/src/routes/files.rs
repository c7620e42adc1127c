use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use platen_core::Error;
use platen_db::entities::jobs;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

use crate::dto::FileDto;
use crate::error::{ApiError, ApiResult, json_error};
use crate::identity;
use crate::repo::{self, map_db_err};
use crate::routes::require_user;
use crate::state::AppState;

const PRINTER_ACCESS_DENIED: &str = "This printer can't access to the requested file.";

/// `GET /api/files/{id}` — hands the g-code to the printer assigned to one
/// of this file's jobs; everyone else gets a 401. Depending on deployment
/// the bytes are streamed directly or delegated to the front proxy via
/// X-Accel-Redirect.
pub async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let file = repo::files::find_by_id(&*state.db, id)
        .await?
        .ok_or_else(|| ApiError(Error::NotFound("file".to_string())))?;

    let printer = match identity::authenticate_printer(&state.identity, &state.db, &headers).await
    {
        Ok(p) => p,
        Err(Error::Auth(_)) => {
            return Ok(json_error(StatusCode::UNAUTHORIZED, PRINTER_ACCESS_DENIED));
        }
        Err(err) => return Err(ApiError(err)),
    };

    let assigned = jobs::Entity::find()
        .filter(jobs::Column::FileId.eq(file.id))
        .filter(jobs::Column::AssignedPrinterId.eq(printer.id))
        .count(&*state.db)
        .await
        .map_err(map_db_err)?;
    if assigned == 0 {
        return Ok(json_error(StatusCode::UNAUTHORIZED, PRINTER_ACCESS_DENIED));
    }

    let disposition = format!("attachment; filename=\"{}\"", file.name.replace('"', ""));

    if state.cfg.accel_redirect {
        let resp = Response::builder()
            .status(StatusCode::OK)
            .header("X-Accel-Redirect", format!("/files/download/{}", file.id))
            .header(header::CONTENT_DISPOSITION, disposition)
            .body(Body::empty())
            .map_err(|e| ApiError(Error::Repository(e.to_string())))?;
        return Ok(resp);
    }

    let bytes = state.store.read(&file.storage_path).await?;
    let resp = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/x-gcode")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(bytes))
        .map_err(|e| ApiError(Error::Repository(e.to_string())))?;
    Ok(resp)
}

#[derive(Debug, serde::Serialize)]
pub struct FileInfo {
    #[serde(flatten)]
    pub file: FileDto,
    /// Size on disk; absent if the stored bytes went missing.
    pub size_bytes: Option<u64>,
}

/// `GET /api/files/{id}/info`
pub async fn info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FileInfo>> {
    require_user(&state, &headers).await?;
    let file = repo::files::get(&*state.db, id).await?;
    let size_bytes = state.store.size(&file.storage_path).await.ok();
    Ok(Json(FileInfo {
        file: FileDto::from(file),
        size_bytes,
    }))
}
