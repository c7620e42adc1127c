use platen_core::Error;
use platen_core::feasibility::{self, Feasibility};
use platen_db::entities::jobs;
use sea_orm::ConnectionTrait;

use crate::repo;
use crate::repo::printers::StateCatalog;

/// Evaluate `canBePrinted` for one job against the current fleet.
pub async fn evaluate_job<C: ConnectionTrait>(
    conn: &C,
    catalog: &StateCatalog,
    job_id: uuid::Uuid,
) -> Result<Feasibility, Error> {
    let requirements = repo::jobs::load_requirements(conn, job_id).await?;
    let printers = repo::printers::snapshot_all(conn, catalog).await?;
    Ok(feasibility::evaluate(&requirements, &printers))
}

/// Recompute `can_be_printed` for every waiting job. Called whenever a
/// printer's extruder configuration changes or its state crosses the
/// operational boundary, before the next dispatch decision.
pub async fn refresh_all_waiting<C: ConnectionTrait>(
    conn: &C,
    catalog: &StateCatalog,
) -> Result<u64, Error> {
    let printers = repo::printers::snapshot_all(conn, catalog).await?;
    let waiting: Vec<jobs::Model> = repo::jobs::all_waiting(conn).await?;

    let mut changed = 0;
    for job in waiting {
        let requirements = repo::jobs::load_requirements(conn, job.id).await?;
        let result = feasibility::evaluate(&requirements, &printers);
        if job.can_be_printed != Some(result.can_be_printed) {
            repo::jobs::set_can_be_printed(conn, job.id, result.can_be_printed).await?;
            changed += 1;
        }
    }
    if changed > 0 {
        tracing::debug!(changed, "feasibility refresh updated waiting jobs");
    }
    Ok(changed)
}
