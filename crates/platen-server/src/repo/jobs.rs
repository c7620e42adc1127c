use chrono::Utc;
use platen_core::Error;
use platen_core::feasibility::JobRequirements;
use platen_core::states::JobState;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use platen_db::entities::{job_allowed_extruders, job_allowed_materials, job_extruder_data, jobs};
use uuid::Uuid;

use super::{map_db_err, map_unique};

/// Explicit filter over jobs; the REST layer validates raw query input into
/// this before any query runs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub id: Option<Uuid>,
    pub state: Option<JobState>,
    pub file_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub name: Option<String>,
    pub can_be_printed: Option<bool>,
    pub order_by_priority: bool,
}

fn apply_filter(mut query: sea_orm::Select<jobs::Entity>, filter: &JobFilter) -> sea_orm::Select<jobs::Entity> {
    if let Some(id) = filter.id {
        query = query.filter(jobs::Column::Id.eq(id));
    }
    if let Some(state) = filter.state {
        query = query.filter(jobs::Column::State.eq(state.as_str()));
    }
    if let Some(file_id) = filter.file_id {
        query = query.filter(jobs::Column::FileId.eq(file_id));
    }
    if let Some(user_id) = filter.user_id {
        query = query.filter(jobs::Column::UserId.eq(user_id));
    }
    if let Some(name) = &filter.name {
        query = query.filter(jobs::Column::Name.eq(name.clone()));
    }
    if let Some(can) = filter.can_be_printed {
        query = query.filter(jobs::Column::CanBePrinted.eq(can));
    }
    if filter.order_by_priority {
        query = query.order_by_asc(jobs::Column::PriorityIndex);
    } else {
        query = query.order_by_asc(jobs::Column::CreatedAt);
    }
    query
}

pub async fn find<C: ConnectionTrait>(conn: &C, filter: &JobFilter) -> Result<Vec<jobs::Model>, Error> {
    apply_filter(jobs::Entity::find(), filter)
        .all(conn)
        .await
        .map_err(map_db_err)
}

pub async fn find_by_id<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<Option<jobs::Model>, Error> {
    jobs::Entity::find_by_id(id).one(conn).await.map_err(map_db_err)
}

pub async fn get<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<jobs::Model, Error> {
    find_by_id(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound("job".to_string()))
}

pub async fn not_done<C: ConnectionTrait>(
    conn: &C,
    order_by_priority: bool,
) -> Result<Vec<jobs::Model>, Error> {
    let mut query = jobs::Entity::find().filter(jobs::Column::State.ne(JobState::Done.as_str()));
    if order_by_priority {
        query = query.order_by_asc(jobs::Column::PriorityIndex);
    } else {
        query = query.order_by_asc(jobs::Column::CreatedAt);
    }
    query.all(conn).await.map_err(map_db_err)
}

pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    name: &str,
    file_id: Uuid,
    user_id: Uuid,
) -> Result<jobs::Model, Error> {
    let now = Utc::now();
    let model = jobs::ActiveModel {
        id: Set(id),
        name: Set(name.to_string()),
        state: Set(JobState::Created.as_str().to_string()),
        file_id: Set(file_id),
        user_id: Set(user_id),
        can_be_printed: Set(None),
        priority_index: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        started_at: Set(None),
        retries: Set(0),
        succeeded: Set(None),
        interrupted: Set(false),
        analyzed: Set(false),
        progress: Set(0.0),
        estimated_time_left: Set(None),
        assigned_printer_id: Set(None),
    };
    jobs::Entity::insert(model)
        .exec_with_returning(conn)
        .await
        .map_err(|e| map_unique(e, "job", "name"))
}

pub async fn rename<C: ConnectionTrait>(
    conn: &C,
    job: jobs::Model,
    name: &str,
) -> Result<jobs::Model, Error> {
    let mut active: jobs::ActiveModel = job.into();
    active.name = Set(name.to_string());
    active.updated_at = Set(Utc::now().into());
    sea_orm::ActiveModelTrait::update(active, conn)
        .await
        .map_err(|e| map_unique(e, "job", "name"))
}

pub async fn delete<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<(), Error> {
    // Requirement rows cascade via foreign keys; delete explicitly anyway so
    // sqlite builds without foreign_keys pragma behave the same.
    delete_requirements(conn, id).await?;
    jobs::Entity::delete_by_id(id)
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

// --- waiting queue -------------------------------------------------------

fn waiting() -> sea_orm::Select<jobs::Entity> {
    jobs::Entity::find().filter(jobs::Column::State.eq(JobState::Waiting.as_str()))
}

pub async fn min_priority<C: ConnectionTrait>(conn: &C) -> Result<Option<i64>, Error> {
    Ok(waiting()
        .order_by_asc(jobs::Column::PriorityIndex)
        .one(conn)
        .await
        .map_err(map_db_err)?
        .and_then(|j| j.priority_index))
}

pub async fn max_priority<C: ConnectionTrait>(conn: &C) -> Result<Option<i64>, Error> {
    Ok(waiting()
        .order_by_desc(jobs::Column::PriorityIndex)
        .one(conn)
        .await
        .map_err(map_db_err)?
        .and_then(|j| j.priority_index))
}

/// Waiting jobs with `can_be_printed = true` and no assigned printer, in
/// priority order. This is the dispatcher's candidate list.
pub async fn waiting_feasible_unassigned<C: ConnectionTrait>(
    conn: &C,
) -> Result<Vec<jobs::Model>, Error> {
    waiting()
        .filter(jobs::Column::CanBePrinted.eq(true))
        .filter(jobs::Column::AssignedPrinterId.is_null())
        .order_by_asc(jobs::Column::PriorityIndex)
        .all(conn)
        .await
        .map_err(map_db_err)
}

pub async fn first_feasible<C: ConnectionTrait>(conn: &C) -> Result<Option<jobs::Model>, Error> {
    waiting()
        .filter(jobs::Column::CanBePrinted.eq(true))
        .filter(jobs::Column::AssignedPrinterId.is_null())
        .order_by_asc(jobs::Column::PriorityIndex)
        .one(conn)
        .await
        .map_err(map_db_err)
}

pub async fn count_feasible<C: ConnectionTrait>(conn: &C) -> Result<u64, Error> {
    waiting()
        .filter(jobs::Column::CanBePrinted.eq(true))
        .filter(jobs::Column::AssignedPrinterId.is_null())
        .count(conn)
        .await
        .map_err(map_db_err)
}

pub async fn all_waiting<C: ConnectionTrait>(conn: &C) -> Result<Vec<jobs::Model>, Error> {
    waiting()
        .order_by_asc(jobs::Column::PriorityIndex)
        .all(conn)
        .await
        .map_err(map_db_err)
}

/// Shift by +1 every waiting job with priority strictly inside
/// `(above, below)`.
pub async fn shift_up_exclusive<C: ConnectionTrait>(
    conn: &C,
    above: i64,
    below: i64,
) -> Result<(), Error> {
    jobs::Entity::update_many()
        .col_expr(
            jobs::Column::PriorityIndex,
            Expr::col(jobs::Column::PriorityIndex).add(1),
        )
        .filter(jobs::Column::State.eq(JobState::Waiting.as_str()))
        .filter(jobs::Column::PriorityIndex.gt(above))
        .filter(jobs::Column::PriorityIndex.lt(below))
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Shift by -1 every waiting job with priority in `[from, to]`.
pub async fn shift_down_inclusive<C: ConnectionTrait>(
    conn: &C,
    from: i64,
    to: i64,
) -> Result<(), Error> {
    jobs::Entity::update_many()
        .col_expr(
            jobs::Column::PriorityIndex,
            Expr::col(jobs::Column::PriorityIndex).sub(1),
        )
        .filter(jobs::Column::State.eq(JobState::Waiting.as_str()))
        .filter(jobs::Column::PriorityIndex.gte(from))
        .filter(jobs::Column::PriorityIndex.lte(to))
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

pub async fn set_priority<C: ConnectionTrait>(
    conn: &C,
    job_id: Uuid,
    priority_index: i64,
) -> Result<(), Error> {
    jobs::Entity::update_many()
        .col_expr(jobs::Column::PriorityIndex, Expr::value(priority_index))
        .col_expr(jobs::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(jobs::Column::Id.eq(job_id))
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

pub async fn set_can_be_printed<C: ConnectionTrait>(
    conn: &C,
    job_id: Uuid,
    can_be_printed: bool,
) -> Result<(), Error> {
    jobs::Entity::update_many()
        .col_expr(jobs::Column::CanBePrinted, Expr::value(can_be_printed))
        .filter(jobs::Column::Id.eq(job_id))
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

// --- allowed configuration ----------------------------------------------

pub async fn load_requirements<C: ConnectionTrait>(
    conn: &C,
    job_id: Uuid,
) -> Result<JobRequirements, Error> {
    let materials = job_allowed_materials::Entity::find()
        .filter(job_allowed_materials::Column::JobId.eq(job_id))
        .all(conn)
        .await
        .map_err(map_db_err)?;
    let extruder_types = job_allowed_extruders::Entity::find()
        .filter(job_allowed_extruders::Column::JobId.eq(job_id))
        .all(conn)
        .await
        .map_err(map_db_err)?;

    Ok(JobRequirements {
        allowed_materials: materials
            .into_iter()
            .map(|m| (m.extruder_index as u32, m.material_id))
            .collect(),
        allowed_extruder_types: extruder_types
            .into_iter()
            .map(|t| (t.extruder_index as u32, t.extruder_type_id))
            .collect(),
    })
}

pub async fn delete_requirements<C: ConnectionTrait>(conn: &C, job_id: Uuid) -> Result<(), Error> {
    job_allowed_materials::Entity::delete_many()
        .filter(job_allowed_materials::Column::JobId.eq(job_id))
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    job_allowed_extruders::Entity::delete_many()
        .filter(job_allowed_extruders::Column::JobId.eq(job_id))
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    job_extruder_data::Entity::delete_many()
        .filter(job_extruder_data::Column::JobId.eq(job_id))
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

pub struct ExtruderDataRow {
    pub extruder_index: u32,
    pub used_material_id: Option<i32>,
    pub used_extruder_type_id: Option<i32>,
    pub estimated_material_weight: f64,
}

/// Replace all analysis-derived rows of a job in one sweep.
pub async fn replace_requirements<C: ConnectionTrait>(
    conn: &C,
    job_id: Uuid,
    requirements: &JobRequirements,
    extruder_data: &[ExtruderDataRow],
) -> Result<(), Error> {
    delete_requirements(conn, job_id).await?;

    if !requirements.allowed_materials.is_empty() {
        let rows = requirements.allowed_materials.iter().map(|(index, material_id)| {
            job_allowed_materials::ActiveModel {
                job_id: Set(job_id),
                material_id: Set(*material_id),
                extruder_index: Set(*index as i32),
                ..Default::default()
            }
        });
        job_allowed_materials::Entity::insert_many(rows)
            .exec(conn)
            .await
            .map_err(map_db_err)?;
    }

    if !requirements.allowed_extruder_types.is_empty() {
        let rows = requirements
            .allowed_extruder_types
            .iter()
            .map(|(index, extruder_type_id)| job_allowed_extruders::ActiveModel {
                job_id: Set(job_id),
                extruder_type_id: Set(*extruder_type_id),
                extruder_index: Set(*index as i32),
                ..Default::default()
            });
        job_allowed_extruders::Entity::insert_many(rows)
            .exec(conn)
            .await
            .map_err(map_db_err)?;
    }

    if !extruder_data.is_empty() {
        let rows = extruder_data.iter().map(|row| job_extruder_data::ActiveModel {
            job_id: Set(job_id),
            extruder_index: Set(row.extruder_index as i32),
            used_material_id: Set(row.used_material_id),
            used_extruder_type_id: Set(row.used_extruder_type_id),
            estimated_material_weight: Set(row.estimated_material_weight),
            ..Default::default()
        });
        job_extruder_data::Entity::insert_many(rows)
            .exec(conn)
            .await
            .map_err(map_db_err)?;
    }

    Ok(())
}
