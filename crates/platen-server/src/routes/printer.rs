use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use platen_db::entities::{extruder_types, materials};
use sea_orm::EntityTrait;
use uuid::Uuid;

use crate::dto::{self, ExtruderTypeDto, MaterialDto, PrinterDto};
use crate::error::{ApiResult, map_db_err_api};
use crate::repo;
use crate::routes::require_user;
use crate::state::AppState;

/// `GET /api/printer` — the fleet with current state and extruder
/// configuration.
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PrinterDto>>> {
    require_user(&state, &headers).await?;
    let printers = repo::printers::find_all(&*state.db).await?;
    let mut out = Vec::with_capacity(printers.len());
    for printer in printers {
        out.push(dto::printer_dto(&*state.db, &state.catalog, printer).await?);
    }
    Ok(Json(out))
}

/// `GET /api/printer/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PrinterDto>> {
    require_user(&state, &headers).await?;
    let printer = repo::printers::get(&*state.db, id).await?;
    Ok(Json(dto::printer_dto(&*state.db, &state.catalog, printer).await?))
}

/// `GET /api/printer/materials` — the material catalog.
pub async fn materials(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<MaterialDto>>> {
    require_user(&state, &headers).await?;
    let rows = materials::Entity::find()
        .all(&*state.db)
        .await
        .map_err(map_db_err_api)?;
    Ok(Json(rows.into_iter().map(MaterialDto::from).collect()))
}

/// `GET /api/printer/extruder_types` — the extruder-type catalog.
pub async fn extruder_types(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ExtruderTypeDto>>> {
    require_user(&state, &headers).await?;
    let rows = extruder_types::Entity::find()
        .all(&*state.db)
        .await
        .map_err(map_db_err_api)?;
    Ok(Json(rows.into_iter().map(ExtruderTypeDto::from).collect()))
}
