use std::collections::HashMap;
use std::sync::Arc;

use platen_core::Error;
use platen_core::feasibility::{self as feas_core};
use platen_core::states::{JobState, PrinterState};
use platen_db::entities::{jobs, printers};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::bus::{ClientEvent, EventBus, PrinterEvent};
use crate::feasibility;
use crate::queue;
use crate::repo::{self, map_db_err, printers::StateCatalog};
use crate::transitions;
use crate::ws::frames::{ExtruderInfo, Feedback};

/// Keeps at most one job bound to each operational printer, in priority
/// order, consistent with feasibility. Every entry point below serialises
/// through the global queue lock and the per-printer lock, in that order;
/// the reverse order never occurs.
pub struct Dispatcher {
    db: Arc<DatabaseConnection>,
    bus: EventBus,
    catalog: Arc<StateCatalog>,
    queue_lock: Mutex<()>,
    printer_locks: std::sync::Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

/// Data needed for the fan-out after an assignment commits.
struct Assignment {
    job_id: Uuid,
    job_name: String,
    file_id: Uuid,
    printer_id: Uuid,
}

enum Recovery {
    None,
    ReemitPrintJob(jobs::Model),
    Recovered { job: jobs::Model, notify_printer: bool },
}

impl Dispatcher {
    pub fn new(db: Arc<DatabaseConnection>, bus: EventBus, catalog: Arc<StateCatalog>) -> Arc<Self> {
        Arc::new(Dispatcher {
            db,
            bus,
            catalog,
            queue_lock: Mutex::new(()),
            printer_locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    fn printer_lock(&self, printer_id: Uuid) -> Arc<Mutex<()>> {
        let mut map = self
            .printer_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        map.entry(printer_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // --- queue entry points ----------------------------------------------

    /// Created -> Waiting at the tail; triggers the single-feasible-job
    /// assignment policy afterwards.
    pub async fn enqueue_job(&self, job_id: Uuid) -> Result<jobs::Model, Error> {
        let job = {
            let _q = self.queue_lock.lock().await;
            let txn = self.db.begin().await.map_err(map_db_err)?;
            let job = repo::jobs::get(&txn, job_id).await?;
            if !job.analyzed {
                return Err(Error::invalid_parameter("job_id", "job is not analyzed yet"));
            }
            let job = queue::enqueue_tail(&txn, &self.catalog, job).await?;
            txn.commit().await.map_err(map_db_err)?;
            job
        };
        tracing::info!(job_id = %job.id, priority = ?job.priority_index, "job enqueued");
        self.bus.emit_clients(ClientEvent::JobsUpdated {});
        self.on_job_enqueued(&job).await;
        Ok(job)
    }

    /// Done -> Waiting at the tail.
    pub async fn reprint_job(&self, job_id: Uuid) -> Result<jobs::Model, Error> {
        let job = {
            let _q = self.queue_lock.lock().await;
            let txn = self.db.begin().await.map_err(map_db_err)?;
            let job = repo::jobs::get(&txn, job_id).await?;
            let job = queue::reprint(&txn, &self.catalog, job).await?;
            txn.commit().await.map_err(map_db_err)?;
            job
        };
        self.bus.emit_clients(ClientEvent::JobsUpdated {});
        self.on_job_enqueued(&job).await;
        Ok(job)
    }

    pub async fn reorder_job(&self, job_id: Uuid, pivot_id: Option<Uuid>) -> Result<(), Error> {
        {
            let _q = self.queue_lock.lock().await;
            let txn = self.db.begin().await.map_err(map_db_err)?;
            queue::reorder_after(&txn, job_id, pivot_id).await?;
            txn.commit().await.map_err(map_db_err)?;
        }
        self.bus.emit_clients(ClientEvent::JobsUpdated {});
        Ok(())
    }

    /// Assignment policy 2: when the waiting queue has exactly one feasible
    /// unassigned job, push it at an idle printer right away.
    pub async fn on_job_enqueued(&self, job: &jobs::Model) {
        let count = {
            let _q = self.queue_lock.lock().await;
            match queue::count_feasible(&*self.db).await {
                Ok(n) => n,
                Err(err) => {
                    tracing::error!(%err, "count_feasible failed");
                    return;
                }
            }
        };
        if count == 1 {
            if let Err(err) = self.try_assign_for_job(job.id).await {
                tracing::error!(%err, job_id = %job.id, "try_assign_for_job failed");
            }
        }
    }

    // --- assignment ------------------------------------------------------

    /// Assignment policy 1: a Ready printer with no current job takes the
    /// first feasible job it can actually print. Returns the assigned job
    /// id, or `None` when there is nothing to do.
    pub async fn try_assign(&self, printer_id: Uuid) -> Result<Option<Uuid>, Error> {
        let assignment = {
            let _q = self.queue_lock.lock().await;
            self.try_assign_locked(printer_id).await?
        };
        match assignment {
            Some(a) => {
                self.emit_assignment(&a).await;
                Ok(Some(a.job_id))
            }
            None => Ok(None),
        }
    }

    async fn try_assign_locked(&self, printer_id: Uuid) -> Result<Option<Assignment>, Error> {
        let plock = self.printer_lock(printer_id);
        let _p = plock.lock().await;

        let txn = self.db.begin().await.map_err(map_db_err)?;
        let printer = repo::printers::get(&txn, printer_id).await?;
        if printer.current_job_id.is_some() {
            return Ok(None);
        }
        if self.catalog.state_of(printer.state_id) != PrinterState::Ready {
            return Ok(None);
        }

        let snapshot = repo::printers::snapshot(&txn, &printer, &self.catalog).await?;
        let candidates = repo::jobs::waiting_feasible_unassigned(&txn).await?;
        for job in candidates {
            let requirements = repo::jobs::load_requirements(&txn, job.id).await?;
            if !feas_core::printer_is_usable(&requirements, &snapshot) {
                continue;
            }
            let assignment = bind(&txn, &job, &printer).await?;
            txn.commit().await.map_err(map_db_err)?;
            tracing::info!(job_id = %assignment.job_id, %printer_id, "job assigned");
            return Ok(Some(assignment));
        }
        Ok(None)
    }

    /// Assignment policy 2 body: bind this specific job to the first usable
    /// printer that has no current job.
    async fn try_assign_for_job(&self, job_id: Uuid) -> Result<Option<Uuid>, Error> {
        let assignment = {
            let _q = self.queue_lock.lock().await;
            self.try_assign_for_job_locked(job_id).await?
        };
        match assignment {
            Some(a) => {
                let printer_id = a.printer_id;
                self.emit_assignment(&a).await;
                Ok(Some(printer_id))
            }
            None => Ok(None),
        }
    }

    async fn try_assign_for_job_locked(&self, job_id: Uuid) -> Result<Option<Assignment>, Error> {
        let usable = {
            let txn = self.db.begin().await.map_err(map_db_err)?;
            let requirements = repo::jobs::load_requirements(&txn, job_id).await?;
            let snapshots = repo::printers::snapshot_all(&txn, &self.catalog).await?;
            feas_core::evaluate(&requirements, &snapshots).usable
        };

        for printer_id in usable {
            let plock = self.printer_lock(printer_id);
            let _p = plock.lock().await;

            let txn = self.db.begin().await.map_err(map_db_err)?;
            let printer = repo::printers::get(&txn, printer_id).await?;
            if printer.current_job_id.is_some() {
                continue;
            }
            let job = repo::jobs::get(&txn, job_id).await?;
            if transitions::state_of(&job) != JobState::Waiting || job.assigned_printer_id.is_some()
            {
                return Ok(None);
            }
            let assignment = bind(&txn, &job, &printer).await?;
            txn.commit().await.map_err(map_db_err)?;
            tracing::info!(%job_id, %printer_id, "job assigned (single feasible)");
            return Ok(Some(assignment));
        }
        Ok(None)
    }

    /// Admin override: bind a specific waiting job to a specific printer.
    /// Skips the priority order but not feasibility on that printer.
    pub async fn assign_manual(&self, job_id: Uuid, printer_id: Uuid) -> Result<(), Error> {
        let assignment = {
            let _q = self.queue_lock.lock().await;
            let plock = self.printer_lock(printer_id);
            let _p = plock.lock().await;

            let txn = self.db.begin().await.map_err(map_db_err)?;
            let job = repo::jobs::get(&txn, job_id).await?;
            let job_state = transitions::state_of(&job);
            if job_state != JobState::Waiting {
                return Err(Error::InvalidTransition {
                    from: job_state,
                    to: JobState::Printing,
                });
            }
            if job.assigned_printer_id.is_some() {
                return Err(Error::invalid_parameter(
                    "job_id",
                    "job is already assigned to a printer",
                ));
            }
            let printer = repo::printers::get(&txn, printer_id).await?;
            if printer.current_job_id.is_some() {
                return Err(Error::invalid_parameter(
                    "printer_id",
                    "printer already has a job",
                ));
            }
            let snapshot = repo::printers::snapshot(&txn, &printer, &self.catalog).await?;
            let requirements = repo::jobs::load_requirements(&txn, job.id).await?;
            if !feas_core::printer_is_usable(&requirements, &snapshot) {
                return Err(Error::invalid_parameter(
                    "printer_id",
                    "printer configuration cannot print this job",
                ));
            }
            let assignment = bind(&txn, &job, &printer).await?;
            txn.commit().await.map_err(map_db_err)?;
            assignment
        };
        self.emit_assignment(&assignment).await;
        Ok(())
    }

    async fn emit_assignment(&self, a: &Assignment) {
        self.bus
            .emit_printer(
                a.printer_id,
                &PrinterEvent::PrintJob {
                    id: a.job_id,
                    name: a.job_name.clone(),
                    file_id: a.file_id,
                },
            )
            .await;
        self.bus.emit_clients(ClientEvent::JobsUpdated {});
        self.bus.emit_clients(ClientEvent::PrinterDataUpdated {
            printer_id: a.printer_id,
        });
    }

    // --- printer-reported events -----------------------------------------

    /// The printer confirmed it began the assigned job: Waiting -> Printing.
    pub async fn on_print_started(&self, printer_id: Uuid, job_id: Uuid) -> Result<(), Error> {
        {
            let _q = self.queue_lock.lock().await;
            let plock = self.printer_lock(printer_id);
            let _p = plock.lock().await;

            let txn = self.db.begin().await.map_err(map_db_err)?;
            let job = repo::jobs::get(&txn, job_id).await?;
            if transitions::state_of(&job) == JobState::Printing
                && job.assigned_printer_id == Some(printer_id)
            {
                // Duplicate start report.
                return Ok(());
            }
            if job.assigned_printer_id != Some(printer_id) {
                return Err(Error::invalid_parameter(
                    "job_id",
                    "job is not assigned to this printer",
                ));
            }
            transitions::to_printing(&txn, job).await?;
            txn.commit().await.map_err(map_db_err)?;
        }
        self.bus.emit_clients(ClientEvent::JobsUpdated {});
        Ok(())
    }

    /// Printing -> Finished. A duplicate report is a no-op.
    pub async fn on_print_finished(
        &self,
        printer_id: Uuid,
        job_id: Uuid,
        cancelled: bool,
    ) -> Result<(), Error> {
        {
            let plock = self.printer_lock(printer_id);
            let _p = plock.lock().await;

            let txn = self.db.begin().await.map_err(map_db_err)?;
            let job = repo::jobs::get(&txn, job_id).await?;
            match transitions::state_of(&job) {
                JobState::Finished | JobState::Done => return Ok(()),
                _ => {}
            }
            if job.assigned_printer_id != Some(printer_id) {
                return Err(Error::invalid_parameter(
                    "job_id",
                    "job is not assigned to this printer",
                ));
            }
            transitions::to_finished(&txn, job, cancelled).await?;
            txn.commit().await.map_err(map_db_err)?;
        }
        self.bus.emit_clients(ClientEvent::JobsUpdated {});
        Ok(())
    }

    /// Terminal report for a print: Done, or back into the queue for a
    /// retry. Updates printer totals either way and frees the printer.
    pub async fn on_print_feedback(
        &self,
        printer_id: Uuid,
        job_id: Uuid,
        feedback: Feedback,
    ) -> Result<(), Error> {
        {
            let _q = self.queue_lock.lock().await;
            let plock = self.printer_lock(printer_id);
            let _p = plock.lock().await;

            let txn = self.db.begin().await.map_err(map_db_err)?;
            let job = repo::jobs::get(&txn, job_id).await?;
            let job_state = transitions::state_of(&job);
            if job_state != JobState::Finished {
                return Err(Error::InvalidTransition {
                    from: job_state,
                    to: JobState::Done,
                });
            }
            let printer = repo::printers::get(&txn, printer_id).await?;

            // A retry is only requested with success = false and an explicit
            // queue position; absent max_priority means the print is over.
            match (feedback.success, feedback.max_priority) {
                (true, _) | (false, None) => {
                    transitions::to_done(&txn, job, feedback.success).await?;
                }
                (false, Some(true)) => {
                    queue::reenqueue_head(&txn, &self.catalog, job).await?;
                }
                (false, Some(false)) => {
                    queue::reenqueue_tail(&txn, &self.catalog, job).await?;
                }
            }

            repo::printers::add_print_outcome(
                &txn,
                printer,
                feedback.success,
                feedback.printing_seconds,
            )
            .await?;
            repo::printers::set_current_job(&txn, printer_id, None).await?;
            txn.commit().await.map_err(map_db_err)?;
        }
        tracing::info!(%job_id, %printer_id, success = feedback.success, "print feedback recorded");
        self.bus.emit_clients(ClientEvent::JobsUpdated {});
        self.bus
            .emit_clients(ClientEvent::PrinterDataUpdated { printer_id });
        let _ = self.try_assign(printer_id).await?;
        Ok(())
    }

    pub async fn on_printer_state_changed(
        &self,
        printer_id: Uuid,
        new_state: PrinterState,
    ) -> Result<(), Error> {
        let (refreshed, current_job_id) = {
            let _q = self.queue_lock.lock().await;
            let plock = self.printer_lock(printer_id);
            let _p = plock.lock().await;

            let txn = self.db.begin().await.map_err(map_db_err)?;
            let printer = repo::printers::get(&txn, printer_id).await?;
            let was_operational = self.catalog.is_operational(printer.state_id);
            let state_id = self.catalog.id_of(new_state)?;
            let printer = repo::printers::set_state(&txn, printer, state_id).await?;

            let mut refreshed = 0;
            if was_operational != new_state.is_operational() {
                refreshed = feasibility::refresh_all_waiting(&txn, &self.catalog).await?;
            }
            txn.commit().await.map_err(map_db_err)?;
            (refreshed, printer.current_job_id)
        };

        self.bus
            .emit_clients(ClientEvent::PrinterDataUpdated { printer_id });
        if refreshed > 0 {
            self.bus.emit_clients(ClientEvent::JobsUpdated {});
        }
        if new_state == PrinterState::Ready && current_job_id.is_none() {
            let _ = self.try_assign(printer_id).await?;
        }
        Ok(())
    }

    pub async fn on_printer_extruders_changed(
        &self,
        printer_id: Uuid,
        extruders_info: &[ExtruderInfo],
    ) -> Result<(), Error> {
        let (state, current_job_id) = {
            let _q = self.queue_lock.lock().await;
            let plock = self.printer_lock(printer_id);
            let _p = plock.lock().await;

            let txn = self.db.begin().await.map_err(map_db_err)?;
            let printer = repo::printers::get(&txn, printer_id).await?;
            let reported = resolve_extruder_info(&txn, extruders_info).await?;
            repo::printers::apply_extruder_config(&txn, printer_id, &reported).await?;
            feasibility::refresh_all_waiting(&txn, &self.catalog).await?;
            txn.commit().await.map_err(map_db_err)?;
            (self.catalog.state_of(printer.state_id), printer.current_job_id)
        };

        self.bus
            .emit_clients(ClientEvent::PrinterDataUpdated { printer_id });
        self.bus.emit_clients(ClientEvent::JobsUpdated {});
        if state == PrinterState::Ready && current_job_id.is_none() {
            let _ = self.try_assign(printer_id).await?;
        }
        Ok(())
    }

    /// Recovery pass for a printer that reconnected. Reconciles the
    /// configuration it reports against whatever job we believe it holds.
    pub async fn on_printer_initial_data(
        &self,
        printer_id: Uuid,
        state: PrinterState,
        extruders_info: &[ExtruderInfo],
    ) -> Result<(), Error> {
        let (recovery, current_job_id) = {
            let _q = self.queue_lock.lock().await;
            let plock = self.printer_lock(printer_id);
            let _p = plock.lock().await;

            let txn = self.db.begin().await.map_err(map_db_err)?;
            let printer = repo::printers::get(&txn, printer_id).await?;
            let reported = resolve_extruder_info(&txn, extruders_info).await?;
            repo::printers::apply_extruder_config(&txn, printer_id, &reported).await?;
            let state_id = self.catalog.id_of(state)?;
            let printer = repo::printers::set_state(&txn, printer, state_id).await?;

            let mut recovery = Recovery::None;
            if let Some(job_id) = printer.current_job_id {
                let job = repo::jobs::get(&txn, job_id).await?;
                match (transitions::state_of(&job), state) {
                    (JobState::Waiting, PrinterState::Ready) => {
                        recovery = Recovery::ReemitPrintJob(job);
                    }
                    (JobState::Printing, s) if s != PrinterState::Printing => {
                        let interrupted = s != PrinterState::PrintFinished;
                        let job = transitions::to_finished(&txn, job, interrupted).await?;
                        recovery = Recovery::Recovered {
                            job,
                            notify_printer: interrupted,
                        };
                    }
                    // Finished + Print finished: feedback is on its way.
                    _ => {}
                }
            }

            feasibility::refresh_all_waiting(&txn, &self.catalog).await?;
            txn.commit().await.map_err(map_db_err)?;
            (recovery, printer.current_job_id)
        };

        self.bus
            .emit_clients(ClientEvent::PrinterDataUpdated { printer_id });
        self.bus.emit_clients(ClientEvent::JobsUpdated {});

        match recovery {
            Recovery::None => {}
            Recovery::ReemitPrintJob(job) => {
                self.bus
                    .emit_printer(
                        printer_id,
                        &PrinterEvent::PrintJob {
                            id: job.id,
                            name: job.name.clone(),
                            file_id: job.file_id,
                        },
                    )
                    .await;
            }
            Recovery::Recovered { job, notify_printer } => {
                self.bus.emit_clients(ClientEvent::JobProgressUpdated {
                    id: job.id,
                    progress: job.progress,
                    estimated_seconds_left: None,
                });
                if notify_printer {
                    self.bus
                        .emit_printer(
                            printer_id,
                            &PrinterEvent::JobRecovered {
                                id: job.id,
                                name: job.name.clone(),
                                started_at: job.started_at.map(|t| t.to_utc()),
                                interrupted: job.interrupted,
                            },
                        )
                        .await;
                }
            }
        }

        if state == PrinterState::Ready && current_job_id.is_none() {
            let _ = self.try_assign(printer_id).await?;
        }
        Ok(())
    }

    /// Progress report; persisted so UIs joining later see it.
    pub async fn on_job_progress(
        &self,
        printer_id: Uuid,
        job_id: Uuid,
        progress: f64,
        estimated_seconds_left: Option<f64>,
    ) -> Result<(), Error> {
        {
            let txn = self.db.begin().await.map_err(map_db_err)?;
            let job = repo::jobs::get(&txn, job_id).await?;
            if job.assigned_printer_id != Some(printer_id) {
                return Err(Error::invalid_parameter(
                    "id",
                    "job is not assigned to this printer",
                ));
            }
            transitions::report_progress(&txn, job, progress, estimated_seconds_left).await?;
            txn.commit().await.map_err(map_db_err)?;
        }
        self.bus.emit_clients(ClientEvent::JobProgressUpdated {
            id: job_id,
            progress,
            estimated_seconds_left,
        });
        Ok(())
    }

    /// Session teardown: clear the session, go Offline, re-evaluate the
    /// queue. The session id must still match; a superseded socket closing
    /// late must not knock the live session offline.
    pub async fn on_printer_disconnected(
        &self,
        printer_id: Uuid,
        session_id: Uuid,
    ) -> Result<(), Error> {
        let cleared = {
            let _q = self.queue_lock.lock().await;
            let plock = self.printer_lock(printer_id);
            let _p = plock.lock().await;

            let txn = self.db.begin().await.map_err(map_db_err)?;
            let printer = repo::printers::get(&txn, printer_id).await?;
            if printer.session_id != Some(session_id) {
                return Ok(());
            }
            let printer = repo::printers::set_session(&txn, printer, None, None).await?;
            let offline = self.catalog.id_of(PrinterState::Offline)?;
            repo::printers::set_state(&txn, printer, offline).await?;
            feasibility::refresh_all_waiting(&txn, &self.catalog).await?;
            txn.commit().await.map_err(map_db_err)?;
            true
        };
        if cleared {
            tracing::info!(%printer_id, "printer disconnected");
            self.bus
                .emit_clients(ClientEvent::PrinterDataUpdated { printer_id });
            self.bus.emit_clients(ClientEvent::JobsUpdated {});
        }
        Ok(())
    }

    /// Printers that could take a job right now; the watchdog sweeps these.
    pub async fn ready_idle_printers(&self) -> Result<Vec<Uuid>, Error> {
        let printers = repo::printers::find_all(&*self.db).await?;
        Ok(printers
            .into_iter()
            .filter(|p| {
                p.current_job_id.is_none()
                    && self.catalog.state_of(p.state_id) == PrinterState::Ready
            })
            .map(|p| p.id)
            .collect())
    }
}

/// Bind job and printer inside the caller's transaction. The job stays
/// Waiting until the printer reports `print_started`.
async fn bind<C: sea_orm::ConnectionTrait>(
    conn: &C,
    job: &jobs::Model,
    printer: &printers::Model,
) -> Result<Assignment, Error> {
    use sea_orm::{ActiveModelTrait, Set};

    let mut active: jobs::ActiveModel = job.clone().into();
    active.assigned_printer_id = Set(Some(printer.id));
    active.updated_at = Set(chrono::Utc::now().into());
    active.update(conn).await.map_err(map_db_err)?;

    repo::printers::set_current_job(conn, printer.id, Some(job.id)).await?;

    Ok(Assignment {
        job_id: job.id,
        job_name: job.name.clone(),
        file_id: job.file_id,
        printer_id: printer.id,
    })
}

/// Resolve reported extruder info against the catalogs. A value that does
/// not resolve leaves the slot unset, which conservatively matches no
/// requirement.
async fn resolve_extruder_info<C: sea_orm::ConnectionTrait>(
    conn: &C,
    reported: &[ExtruderInfo],
) -> Result<Vec<(u32, Option<i32>, Option<i32>)>, Error> {
    use platen_db::entities::{extruder_types, materials};
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

    let mut out = Vec::with_capacity(reported.len());
    for info in reported {
        let extruder_type_id = match info.nozzle_diameter {
            Some(diameter) => extruder_types::Entity::find()
                .filter(extruder_types::Column::NozzleDiameter.eq(diameter))
                .one(conn)
                .await
                .map_err(map_db_err)?
                .map(|t| t.id),
            None => None,
        };

        let material_id = match (&info.material_guid, &info.material_type) {
            (Some(guid), _) => materials::Entity::find()
                .filter(materials::Column::Guid.eq(guid.clone()))
                .one(conn)
                .await
                .map_err(map_db_err)?
                .map(|m| m.id),
            (None, Some(material_type)) => materials::Entity::find()
                .filter(materials::Column::MaterialType.eq(material_type.clone()))
                .one(conn)
                .await
                .map_err(map_db_err)?
                .map(|m| m.id),
            (None, None) => None,
        };

        out.push((info.index, extruder_type_id, material_id));
    }
    Ok(out)
}
