use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use platen_core::Error;
use platen_core::states::JobState;
use sea_orm::TransactionTrait;
use serde::Deserialize;
use uuid::Uuid;

use crate::bus::ClientEvent;
use crate::dto::JobDto;
use crate::error::{ApiError, ApiResult};
use crate::repo::{self, jobs::JobFilter, map_db_err};
use crate::routes::{ensure_job_access, require_admin, require_user};
use crate::state::AppState;
use crate::transitions;

/// Raw query input for `GET /jobs`; unknown fields are rejected before any
/// repository call.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobQuery {
    pub id: Option<Uuid>,
    pub state: Option<String>,
    pub file_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub name: Option<String>,
    pub can_be_printed: Option<bool>,
    pub order_by_priority: Option<bool>,
}

impl JobQuery {
    fn into_filter(self) -> ApiResult<JobFilter> {
        let state = match self.state {
            None => None,
            Some(raw) => {
                let parsed = JobState::parse(&raw);
                if parsed == JobState::Unknown && raw != "Unknown" {
                    return Err(ApiError(Error::invalid_parameter(
                        "state",
                        format!("unknown job state {raw:?}"),
                    )));
                }
                Some(parsed)
            }
        };
        Ok(JobFilter {
            id: self.id,
            state,
            file_id: self.file_id,
            user_id: self.user_id,
            name: self.name,
            can_be_printed: self.can_be_printed,
            order_by_priority: self.order_by_priority.unwrap_or(false),
        })
    }
}

/// `GET /api/jobs` — list with filters; a single object when queried by id,
/// 404 when that id matches nothing.
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<JobQuery>,
) -> ApiResult<Response> {
    require_user(&state, &headers).await?;
    let by_id = query.id.is_some();
    let filter = query.into_filter()?;
    let jobs = repo::jobs::find(&*state.db, &filter).await?;

    if by_id {
        let Some(job) = jobs.into_iter().next() else {
            return Err(ApiError(Error::NotFound("job".to_string())));
        };
        return Ok(Json(JobDto::from(job)).into_response());
    }
    Ok(Json(jobs.into_iter().map(JobDto::from).collect::<Vec<_>>()).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotDoneQuery {
    pub order_by_priority: Option<bool>,
}

/// `GET /api/jobs/not_done` — everything still moving through the pipeline.
pub async fn not_done(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NotDoneQuery>,
) -> ApiResult<Json<Vec<JobDto>>> {
    require_user(&state, &headers).await?;
    let jobs = repo::jobs::not_done(&*state.db, query.order_by_priority.unwrap_or(false)).await?;
    Ok(Json(jobs.into_iter().map(JobDto::from).collect()))
}

/// `POST /api/jobs` — multipart upload (`name`, `gcode`). Creates the file
/// and the job in state Created; analysis and enqueueing happen over the
/// event channel.
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let (user_id, is_admin) = require_user(&state, &headers).await?;

    let mut name: Option<String> = None;
    let mut gcode: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(Error::invalid_parameter("body", e.to_string())))?
    {
        match field.name() {
            Some("name") => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError(Error::invalid_parameter("name", e.to_string())))?,
                );
            }
            Some("gcode") => {
                let file_name = field
                    .file_name()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "upload.gcode".to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError(Error::invalid_parameter("gcode", e.to_string())))?;
                gcode = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let Some(name) = name.filter(|n| !n.trim().is_empty()) else {
        return Err(ApiError(Error::invalid_parameter("name", "field is required")));
    };
    let Some((file_name, bytes)) = gcode else {
        return Err(ApiError(Error::invalid_parameter("gcode", "field is required")));
    };

    let file_id = Uuid::new_v4();
    let storage_name = state.store.storage_name(file_id);
    state.store.save(&storage_name, &bytes).await?;

    let job = {
        let txn = state.db.begin().await.map_err(map_db_err)?;
        let result: Result<_, Error> = async {
            repo::users::ensure(&txn, user_id, is_admin).await?;
            repo::files::insert(&txn, file_id, user_id, &file_name, &storage_name).await?;
            let job = repo::jobs::insert(&txn, Uuid::new_v4(), &name, file_id, user_id).await?;
            Ok(job)
        }
        .await;

        match result {
            Ok(job) => {
                txn.commit().await.map_err(map_db_err)?;
                job
            }
            Err(err) => {
                // Compensate: the stored bytes must not outlive the rows.
                drop(txn);
                let _ = state.store.delete(&storage_name).await;
                return Err(err.into());
            }
        }
    };

    state.bus.emit_clients(ClientEvent::JobsUpdated {});
    Ok((StatusCode::CREATED, Json(JobDto::from(job))).into_response())
}

/// `GET /api/jobs/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobDto>> {
    require_user(&state, &headers).await?;
    let job = repo::jobs::get(&*state.db, id).await?;
    Ok(Json(JobDto::from(job)))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateJobBody {
    pub name: String,
}

/// `PUT /api/jobs/{id}` — edit; duplicate names are a 409.
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateJobBody>,
) -> ApiResult<Json<JobDto>> {
    let (user_id, is_admin) = require_user(&state, &headers).await?;
    if body.name.trim().is_empty() {
        return Err(ApiError(Error::invalid_parameter("name", "must not be empty")));
    }
    let job = repo::jobs::get(&*state.db, id).await?;
    ensure_job_access(user_id, is_admin, &job)?;

    let job = repo::jobs::rename(&*state.db, job, body.name.trim()).await?;
    state.bus.emit_clients(ClientEvent::JobsUpdated {});
    Ok(Json(JobDto::from(job)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteJobQuery {
    pub delete_file: Option<bool>,
}

/// `DELETE /api/jobs/{id}?delete_file` — removes the job; the file goes too
/// (by default) once no other job references it.
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteJobQuery>,
) -> ApiResult<StatusCode> {
    let (user_id, is_admin) = require_user(&state, &headers).await?;
    let job = repo::jobs::get(&*state.db, id).await?;
    ensure_job_access(user_id, is_admin, &job)?;

    if transitions::state_of(&job) == JobState::Printing {
        return Err(ApiError(Error::InvalidTransition {
            from: JobState::Printing,
            to: JobState::Done,
        }));
    }

    let delete_file = query.delete_file.unwrap_or(true);
    let file_id = job.file_id;
    let assigned_printer = job.assigned_printer_id;

    let removed_storage_path = {
        let txn = state.db.begin().await.map_err(map_db_err)?;
        if let Some(printer_id) = assigned_printer {
            repo::printers::set_current_job(&txn, printer_id, None).await?;
        }
        repo::jobs::delete(&txn, job.id).await?;

        let mut removed = None;
        if delete_file && repo::files::referencing_jobs(&txn, file_id).await? == 0 {
            if let Some(file) = repo::files::find_by_id(&txn, file_id).await? {
                repo::files::delete(&txn, file.id).await?;
                removed = Some(file.storage_path);
            }
        }
        txn.commit().await.map_err(map_db_err)?;
        removed
    };

    if let Some(storage_path) = removed_storage_path {
        if let Err(err) = state.store.delete(&storage_path).await {
            tracing::warn!(%err, storage_path, "orphaned g-code file left on disk");
        }
    }

    state.bus.emit_clients(ClientEvent::JobsUpdated {});
    Ok(StatusCode::OK)
}

/// `previous_job_id` on the wire: a job id, `null`, or the legacy `-1`
/// sentinel, both meaning "move to head".
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PreviousJob {
    Sentinel(i64),
    Id(Uuid),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReorderBody {
    pub previous_job_id: Option<PreviousJob>,
}

/// `PUT /api/jobs/{id}/reorder`
pub async fn reorder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<ReorderBody>,
) -> ApiResult<StatusCode> {
    let (user_id, is_admin) = require_user(&state, &headers).await?;
    let job = repo::jobs::get(&*state.db, id).await?;
    ensure_job_access(user_id, is_admin, &job)?;

    let pivot = match body.previous_job_id {
        None | Some(PreviousJob::Sentinel(-1)) => None,
        Some(PreviousJob::Sentinel(other)) => {
            return Err(ApiError(Error::invalid_parameter(
                "previous_job_id",
                format!("expected a job id or -1, got {other}"),
            )));
        }
        Some(PreviousJob::Id(pivot_id)) => Some(pivot_id),
    };

    state.dispatcher.reorder_job(id, pivot).await?;
    Ok(StatusCode::OK)
}

/// `PUT /api/jobs/{id}/reprint` — re-enqueue a Done job at the tail.
pub async fn reprint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobDto>> {
    let (user_id, is_admin) = require_user(&state, &headers).await?;
    let job = repo::jobs::get(&*state.db, id).await?;
    ensure_job_access(user_id, is_admin, &job)?;

    let job = state.dispatcher.reprint_job(id).await?;
    Ok(Json(JobDto::from(job)))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignBody {
    pub printer_id: Uuid,
}

/// `PUT /api/jobs/{id}/assign` — admin override binding a waiting job to a
/// specific printer.
pub async fn assign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<AssignBody>,
) -> ApiResult<StatusCode> {
    require_admin(&state, &headers).await?;
    state.dispatcher.assign_manual(id, body.printer_id).await?;
    Ok(StatusCode::OK)
}
