use platen_core::Error;
use platen_core::reorder::{self, ReorderPlan};
use platen_core::states::JobState;
use platen_db::entities::jobs;
use sea_orm::ConnectionTrait;
use uuid::Uuid;

use crate::feasibility;
use crate::repo;
use crate::repo::printers::StateCatalog;
use crate::transitions;

/// Queue operations over the waiting set. Every function here must run
/// inside a transaction with the global queue lock held; the lock is what
/// makes the min/max reads and the renumbering atomic with respect to each
/// other.

async fn tail_index<C: ConnectionTrait>(conn: &C) -> Result<i64, Error> {
    Ok(match repo::jobs::max_priority(conn).await? {
        Some(max) => max + 1,
        None => 1,
    })
}

async fn head_index<C: ConnectionTrait>(conn: &C) -> Result<i64, Error> {
    Ok(match repo::jobs::min_priority(conn).await? {
        Some(min) => min - 1,
        None => 1,
    })
}

async fn enqueue_at<C: ConnectionTrait>(
    conn: &C,
    catalog: &StateCatalog,
    job: jobs::Model,
    priority: i64,
    bump_retries: bool,
) -> Result<jobs::Model, Error> {
    let result = feasibility::evaluate_job(conn, catalog, job.id).await?;
    transitions::to_waiting(conn, job, priority, result.can_be_printed, bump_retries).await
}

/// Into the queue at the tail (initial enqueue and reprints).
pub async fn enqueue_tail<C: ConnectionTrait>(
    conn: &C,
    catalog: &StateCatalog,
    job: jobs::Model,
) -> Result<jobs::Model, Error> {
    let priority = tail_index(conn).await?;
    enqueue_at(conn, catalog, job, priority, false).await
}

/// Into the queue at the head, ahead of everything waiting.
pub async fn enqueue_head<C: ConnectionTrait>(
    conn: &C,
    catalog: &StateCatalog,
    job: jobs::Model,
) -> Result<jobs::Model, Error> {
    let priority = head_index(conn).await?;
    enqueue_at(conn, catalog, job, priority, false).await
}

/// Finished -> Waiting at the head (failed print, operator wants it next).
pub async fn reenqueue_head<C: ConnectionTrait>(
    conn: &C,
    catalog: &StateCatalog,
    job: jobs::Model,
) -> Result<jobs::Model, Error> {
    let priority = head_index(conn).await?;
    enqueue_at(conn, catalog, job, priority, true).await
}

/// Finished -> Waiting at the tail (failed print, retry later).
pub async fn reenqueue_tail<C: ConnectionTrait>(
    conn: &C,
    catalog: &StateCatalog,
    job: jobs::Model,
) -> Result<jobs::Model, Error> {
    let priority = tail_index(conn).await?;
    enqueue_at(conn, catalog, job, priority, true).await
}

/// Done -> Waiting at the tail: print the same job again.
pub async fn reprint<C: ConnectionTrait>(
    conn: &C,
    catalog: &StateCatalog,
    job: jobs::Model,
) -> Result<jobs::Model, Error> {
    transitions::guard(transitions::state_of(&job), JobState::Waiting)?;
    enqueue_tail(conn, catalog, job).await
}

/// Place `job` immediately after `pivot` in priority order; `None` pivot
/// means head. Both must be Waiting. The shifted run and the moved job are
/// written in the caller's transaction, so other readers observe the
/// renumbering atomically.
pub async fn reorder_after<C: ConnectionTrait>(
    conn: &C,
    job_id: Uuid,
    pivot_id: Option<Uuid>,
) -> Result<(), Error> {
    let job = repo::jobs::get(conn, job_id).await?;
    let job_state = transitions::state_of(&job);
    if job_state != JobState::Waiting {
        return Err(Error::InvalidTransition {
            from: job_state,
            to: JobState::Waiting,
        });
    }
    let Some(job_index) = job.priority_index else {
        return Err(Error::Repository(format!(
            "waiting job {job_id} has no priority index"
        )));
    };

    let pivot_index = match pivot_id {
        None => None,
        Some(pivot_id) if pivot_id == job_id => {
            // Reordering a job after itself returns silently.
            return Ok(());
        }
        Some(pivot_id) => {
            let pivot = repo::jobs::get(conn, pivot_id).await?;
            let pivot_state = transitions::state_of(&pivot);
            if pivot_state != JobState::Waiting {
                return Err(Error::InvalidTransition {
                    from: pivot_state,
                    to: JobState::Waiting,
                });
            }
            Some(pivot.priority_index.ok_or_else(|| {
                Error::Repository(format!("waiting job {pivot_id} has no priority index"))
            })?)
        }
    };

    let queue_min = repo::jobs::min_priority(conn).await?.unwrap_or(1);
    match reorder::plan(job_index, pivot_index, queue_min) {
        ReorderPlan::Noop => Ok(()),
        ReorderPlan::MoveToHead { new_index } => {
            repo::jobs::set_priority(conn, job_id, new_index).await
        }
        ReorderPlan::ShiftUp {
            shift_above,
            shift_below,
            new_index,
        } => {
            repo::jobs::shift_up_exclusive(conn, shift_above, shift_below).await?;
            repo::jobs::set_priority(conn, job_id, new_index).await
        }
        ReorderPlan::ShiftDown {
            shift_from,
            shift_to,
            new_index,
        } => {
            repo::jobs::shift_down_inclusive(conn, shift_from, shift_to).await?;
            repo::jobs::set_priority(conn, job_id, new_index).await
        }
    }
}

/// The job with the smallest priority index that is feasible and not yet
/// bound to a printer; `None` when nothing can be dispatched.
pub async fn peek_first_feasible<C: ConnectionTrait>(
    conn: &C,
) -> Result<Option<jobs::Model>, Error> {
    repo::jobs::first_feasible(conn).await
}

pub async fn count_feasible<C: ConnectionTrait>(conn: &C) -> Result<u64, Error> {
    repo::jobs::count_feasible(conn).await
}
