use chrono::Utc;
use platen_core::Error;
use platen_core::states::JobState;
use platen_db::entities::jobs;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};

use crate::repo::map_db_err;

/// The single gate for every job transition. Fails without touching state.
pub fn guard(from: JobState, to: JobState) -> Result<(), Error> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { from, to })
    }
}

pub fn state_of(job: &jobs::Model) -> JobState {
    JobState::parse(&job.state)
}

/// Move a job into the waiting queue at the given priority index. Serves
/// initial enqueue (Created), retry re-enqueue (Finished) and reprint
/// (Done); the caller has already computed the slot under the queue lock.
pub async fn to_waiting<C: ConnectionTrait>(
    conn: &C,
    job: jobs::Model,
    priority_index: i64,
    can_be_printed: bool,
    bump_retries: bool,
) -> Result<jobs::Model, Error> {
    let from = state_of(&job);
    guard(from, JobState::Waiting)?;

    let retries = job.retries;
    let mut active: jobs::ActiveModel = job.into();
    active.state = Set(JobState::Waiting.as_str().to_string());
    active.priority_index = Set(Some(priority_index));
    active.can_be_printed = Set(Some(can_be_printed));
    active.assigned_printer_id = Set(None);
    active.progress = Set(0.0);
    active.estimated_time_left = Set(None);
    active.started_at = Set(None);
    active.succeeded = Set(None);
    if bump_retries {
        active.retries = Set(retries + 1);
    }
    if from == JobState::Done {
        // A reprint starts clean; an interrupted retry keeps its flag so the
        // operator can see the history until the next terminal state.
        active.interrupted = Set(false);
    }
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await.map_err(map_db_err)
}

/// Waiting -> Printing on the printer's start report. Clears the priority
/// index; from here the job no longer occupies a queue slot.
pub async fn to_printing<C: ConnectionTrait>(
    conn: &C,
    job: jobs::Model,
) -> Result<jobs::Model, Error> {
    guard(state_of(&job), JobState::Printing)?;

    if job.can_be_printed != Some(true) {
        return Err(Error::invalid_parameter(
            "job_id",
            "job is not currently printable",
        ));
    }
    if job.assigned_printer_id.is_none() {
        return Err(Error::invalid_parameter(
            "job_id",
            "job has no assigned printer",
        ));
    }

    let mut active: jobs::ActiveModel = job.into();
    active.state = Set(JobState::Printing.as_str().to_string());
    active.priority_index = Set(None);
    active.started_at = Set(Some(Utc::now().into()));
    active.progress = Set(0.0);
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await.map_err(map_db_err)
}

/// Printing -> Finished. `interrupted` marks an abnormal end (cancel,
/// power loss, firmware restart).
pub async fn to_finished<C: ConnectionTrait>(
    conn: &C,
    job: jobs::Model,
    interrupted: bool,
) -> Result<jobs::Model, Error> {
    guard(state_of(&job), JobState::Finished)?;

    let mut active: jobs::ActiveModel = job.into();
    active.state = Set(JobState::Finished.as_str().to_string());
    active.interrupted = Set(interrupted);
    active.estimated_time_left = Set(None);
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await.map_err(map_db_err)
}

/// Finished -> Done, the terminal state.
pub async fn to_done<C: ConnectionTrait>(
    conn: &C,
    job: jobs::Model,
    succeeded: bool,
) -> Result<jobs::Model, Error> {
    guard(state_of(&job), JobState::Done)?;

    let mut active: jobs::ActiveModel = job.into();
    active.state = Set(JobState::Done.as_str().to_string());
    active.succeeded = Set(Some(succeeded));
    active.assigned_printer_id = Set(None);
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await.map_err(map_db_err)
}

/// Record progress as the printer reports it; no state change.
pub async fn report_progress<C: ConnectionTrait>(
    conn: &C,
    job: jobs::Model,
    progress: f64,
    estimated_time_left: Option<f64>,
) -> Result<jobs::Model, Error> {
    let mut active: jobs::ActiveModel = job.into();
    active.progress = Set(progress.clamp(0.0, 100.0));
    active.estimated_time_left = Set(estimated_time_left);
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await.map_err(map_db_err)
}
