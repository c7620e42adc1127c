use chrono::Utc;
use platen_db::entities::users;
use platen_core::Error;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use super::{map_db_err, map_unique};

pub async fn find_by_id<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<Option<users::Model>, Error> {
    users::Entity::find_by_id(id).one(conn).await.map_err(map_db_err)
}

pub async fn find_by_username<C: ConnectionTrait>(
    conn: &C,
    username: &str,
) -> Result<Option<users::Model>, Error> {
    users::Entity::find()
        .filter(users::Column::Username.eq(username))
        .one(conn)
        .await
        .map_err(map_db_err)
}

pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    username: &str,
    is_admin: bool,
) -> Result<users::Model, Error> {
    let model = users::ActiveModel {
        id: Set(id),
        username: Set(username.to_string()),
        is_admin: Set(is_admin),
        created_at: Set(Utc::now().into()),
    };
    users::Entity::insert(model)
        .exec_with_returning(conn)
        .await
        .map_err(|e| map_unique(e, "user", "username"))
}

/// Fetch-or-create for identities arriving from the gateway that the
/// database has not seen yet.
pub async fn ensure<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    is_admin: bool,
) -> Result<users::Model, Error> {
    if let Some(existing) = find_by_id(conn, id).await? {
        return Ok(existing);
    }
    insert(conn, id, &format!("user-{id}"), is_admin).await
}
