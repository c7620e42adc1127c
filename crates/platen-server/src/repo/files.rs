use chrono::Utc;
use platen_core::Error;
use platen_db::entities::{files, jobs};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use uuid::Uuid;

use super::{map_db_err, map_unique};

pub async fn find_by_id<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<Option<files::Model>, Error> {
    files::Entity::find_by_id(id).one(conn).await.map_err(map_db_err)
}

pub async fn get<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<files::Model, Error> {
    find_by_id(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound("file".to_string()))
}

pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    user_id: Uuid,
    name: &str,
    storage_path: &str,
) -> Result<files::Model, Error> {
    let now = Utc::now();
    let model = files::ActiveModel {
        id: Set(id),
        user_id: Set(user_id),
        name: Set(name.to_string()),
        storage_path: Set(storage_path.to_string()),
        estimated_time: Set(None),
        estimated_material: Set(None),
        raw_metadata: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    files::Entity::insert(model)
        .exec_with_returning(conn)
        .await
        .map_err(|e| map_unique(e, "file", "storage_path"))
}

pub async fn set_estimates<C: ConnectionTrait>(
    conn: &C,
    file: files::Model,
    estimated_time: f64,
    estimated_material: f64,
    raw_metadata: serde_json::Value,
) -> Result<files::Model, Error> {
    let mut active: files::ActiveModel = file.into();
    active.estimated_time = Set(Some(estimated_time));
    active.estimated_material = Set(Some(estimated_material));
    active.raw_metadata = Set(Some(raw_metadata));
    active.updated_at = Set(Utc::now().into());
    sea_orm::ActiveModelTrait::update(active, conn)
        .await
        .map_err(map_db_err)
}

pub async fn delete<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<(), Error> {
    files::Entity::delete_by_id(id)
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// How many jobs still reference this file. Drives delete-when-unreferenced
/// for both explicit deletes and job teardown.
pub async fn referencing_jobs<C: ConnectionTrait>(conn: &C, file_id: Uuid) -> Result<u64, Error> {
    jobs::Entity::find()
        .filter(jobs::Column::FileId.eq(file_id))
        .count(conn)
        .await
        .map_err(map_db_err)
}
