//! End-to-end exercises of the job lifecycle against an in-memory database:
//! enqueue, feasibility, assignment, the print lifecycle, retry feedback and
//! queue reordering.

use std::sync::Arc;

use platen_core::feasibility::JobRequirements;
use platen_core::states::{JobState, PrinterState};
use platen_db::entities::{extruder_types, jobs, materials, printers};
use platen_server::bootstrap;
use platen_server::bus::EventBus;
use platen_server::dispatcher::Dispatcher;
use platen_server::repo::{self, printers::StateCatalog};
use platen_server::ws::frames::Feedback;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

struct Harness {
    db: Arc<DatabaseConnection>,
    catalog: Arc<StateCatalog>,
    dispatcher: Arc<Dispatcher>,
    user_id: Uuid,
}

async fn harness() -> Harness {
    let mut opts = sea_orm::ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1);
    let db = sea_orm::Database::connect(opts).await.unwrap();
    platen_migration::Migrator::up(&db, None).await.unwrap();
    let catalog = Arc::new(bootstrap::run(&db).await.unwrap());

    let db = Arc::new(db);
    let dispatcher = Dispatcher::new(db.clone(), EventBus::new(), catalog.clone());

    let user = repo::users::insert(&*db, Uuid::new_v4(), "operator", false)
        .await
        .unwrap();

    Harness {
        db,
        catalog,
        dispatcher,
        user_id: user.id,
    }
}

impl Harness {
    async fn material_id(&self, material_type: &str) -> i32 {
        materials::Entity::find()
            .filter(materials::Column::MaterialType.eq(material_type))
            .one(&*self.db)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    async fn extruder_type_id(&self, nozzle_diameter: f64) -> i32 {
        extruder_types::Entity::find()
            .filter(extruder_types::Column::NozzleDiameter.eq(nozzle_diameter))
            .one(&*self.db)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    /// A provisioned printer with the given loaded extruders.
    async fn add_printer(
        &self,
        name: &str,
        state: PrinterState,
        extruders: &[(&str, f64)],
    ) -> printers::Model {
        let model = platen_db::entities::printer_models::Entity::find()
            .one(&*self.db)
            .await
            .unwrap()
            .unwrap();
        let now = chrono::Utc::now();
        let printer = printers::ActiveModel {
            id: Set(Uuid::new_v4()),
            model_id: Set(model.id),
            state_id: Set(self.catalog.id_of(state).unwrap()),
            name: Set(name.to_string()),
            serial: Set(format!("SN-{name}")),
            ip: Set(None),
            api_key_hash: Set(bootstrap::hash_api_key(name)),
            current_job_id: Set(None),
            session_id: Set(None),
            total_success_prints: Set(0),
            total_failed_prints: Set(0),
            total_printing_seconds: Set(0.0),
            last_seen_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        let printer = printer.insert(&*self.db).await.unwrap();

        let mut reported = Vec::new();
        for (index, (material_type, nozzle)) in extruders.iter().enumerate() {
            reported.push((
                index as u32,
                Some(self.extruder_type_id(*nozzle).await),
                Some(self.material_id(material_type).await),
            ));
        }
        repo::printers::apply_extruder_config(&*self.db, printer.id, &reported)
            .await
            .unwrap();
        printer
    }

    /// An analyzed job ready to enqueue, optionally with allowed-material /
    /// allowed-extruder-type constraints.
    async fn add_job(&self, name: &str, requirements: Option<JobRequirements>) -> jobs::Model {
        let file_id = Uuid::new_v4();
        repo::files::insert(
            &*self.db,
            file_id,
            self.user_id,
            &format!("{name}.gcode"),
            &format!("{file_id}.gcode"),
        )
        .await
        .unwrap();
        let job = repo::jobs::insert(&*self.db, Uuid::new_v4(), name, file_id, self.user_id)
            .await
            .unwrap();

        if let Some(requirements) = requirements {
            repo::jobs::replace_requirements(&*self.db, job.id, &requirements, &[])
                .await
                .unwrap();
        }

        let mut active: jobs::ActiveModel = job.into();
        active.analyzed = Set(true);
        active.update(&*self.db).await.unwrap()
    }

    async fn job(&self, id: Uuid) -> jobs::Model {
        repo::jobs::get(&*self.db, id).await.unwrap()
    }

    async fn printer(&self, id: Uuid) -> printers::Model {
        repo::printers::get(&*self.db, id).await.unwrap()
    }

    async fn waiting_order(&self) -> Vec<String> {
        repo::jobs::all_waiting(&*self.db)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.name)
            .collect()
    }
}

fn dual_requirements(pla: i32, abs: i32, nozzle_06: i32, nozzle_04: i32) -> JobRequirements {
    JobRequirements {
        allowed_materials: vec![(0, pla), (1, abs)],
        allowed_extruder_types: vec![(0, nozzle_06), (1, nozzle_04)],
    }
}

#[tokio::test]
async fn enqueue_feasible_job_is_assigned_to_ready_printer() {
    let h = harness().await;
    let printer = h
        .add_printer("alpha", PrinterState::Ready, &[("PLA", 0.6), ("ABS", 0.4)])
        .await;

    let req = dual_requirements(
        h.material_id("PLA").await,
        h.material_id("ABS").await,
        h.extruder_type_id(0.6).await,
        h.extruder_type_id(0.4).await,
    );
    let job = h.add_job("benchy", Some(req)).await;

    let job = h.dispatcher.enqueue_job(job.id).await.unwrap();
    assert_eq!(job.state, "Waiting");
    assert_eq!(job.can_be_printed, Some(true));
    assert_eq!(job.priority_index, Some(1));

    // Single feasible job, idle Ready printer: bound immediately.
    let job = h.job(job.id).await;
    assert_eq!(job.assigned_printer_id, Some(printer.id));
    assert_eq!(h.printer(printer.id).await.current_job_id, Some(job.id));
    // Still Waiting until the printer confirms the start.
    assert_eq!(job.state, "Waiting");
    assert!(job.priority_index.is_some());
}

#[tokio::test]
async fn mismatched_configuration_is_not_printable() {
    let h = harness().await;
    h.add_printer("alpha", PrinterState::Ready, &[("PLA", 0.4)]).await;

    // Needs ABS at extruder 1; the single-extruder PLA printer cannot help.
    let req = JobRequirements {
        allowed_materials: vec![(1, h.material_id("ABS").await)],
        allowed_extruder_types: vec![],
    };
    let job = h.add_job("impossible", Some(req)).await;
    let job = h.dispatcher.enqueue_job(job.id).await.unwrap();

    assert_eq!(job.can_be_printed, Some(false));
    assert_eq!(h.job(job.id).await.assigned_printer_id, None);
}

#[tokio::test]
async fn full_print_lifecycle_with_retry_feedback() {
    let h = harness().await;
    let printer = h
        .add_printer("alpha", PrinterState::Ready, &[("PLA", 0.6), ("ABS", 0.4)])
        .await;

    let job = h.add_job("benchy", None).await;
    let job = h.dispatcher.enqueue_job(job.id).await.unwrap();
    assert_eq!(h.job(job.id).await.assigned_printer_id, Some(printer.id));

    h.dispatcher
        .on_print_started(printer.id, job.id)
        .await
        .unwrap();
    let printing = h.job(job.id).await;
    assert_eq!(printing.state, "Printing");
    assert_eq!(printing.priority_index, None);
    assert!(printing.started_at.is_some());

    // Duplicate start report is a no-op.
    h.dispatcher
        .on_print_started(printer.id, job.id)
        .await
        .unwrap();

    h.dispatcher
        .on_print_finished(printer.id, job.id, false)
        .await
        .unwrap();
    assert_eq!(h.job(job.id).await.state, "Finished");

    // Double print_finished is a no-op after the first.
    h.dispatcher
        .on_print_finished(printer.id, job.id, true)
        .await
        .unwrap();
    assert!(!h.job(job.id).await.interrupted);

    h.dispatcher
        .on_printer_state_changed(printer.id, PrinterState::PrintFinished)
        .await
        .unwrap();

    // Failed print, retry at the tail.
    h.dispatcher
        .on_print_feedback(
            printer.id,
            job.id,
            Feedback {
                success: false,
                max_priority: Some(false),
                printing_seconds: 112.1,
            },
        )
        .await
        .unwrap();

    let retried = h.job(job.id).await;
    assert_eq!(retried.state, "Waiting");
    assert_eq!(retried.retries, 1);
    assert!(retried.priority_index.is_some());
    assert_eq!(retried.assigned_printer_id, None);

    let printer = h.printer(printer.id).await;
    assert_eq!(printer.current_job_id, None);
    assert_eq!(printer.total_failed_prints, 1);
    assert_eq!(printer.total_success_prints, 0);
    assert!((printer.total_printing_seconds - 112.1).abs() < 1e-9);
}

#[tokio::test]
async fn successful_feedback_reaches_done() {
    let h = harness().await;
    let printer = h
        .add_printer("alpha", PrinterState::Ready, &[("PLA", 0.6)])
        .await;

    let job = h.add_job("vase", None).await;
    let job = h.dispatcher.enqueue_job(job.id).await.unwrap();
    h.dispatcher
        .on_print_started(printer.id, job.id)
        .await
        .unwrap();
    h.dispatcher
        .on_print_finished(printer.id, job.id, false)
        .await
        .unwrap();
    h.dispatcher
        .on_printer_state_changed(printer.id, PrinterState::PrintFinished)
        .await
        .unwrap();
    h.dispatcher
        .on_print_feedback(
            printer.id,
            job.id,
            Feedback {
                success: true,
                max_priority: None,
                printing_seconds: 3600.0,
            },
        )
        .await
        .unwrap();

    let done = h.job(job.id).await;
    assert_eq!(done.state, "Done");
    assert_eq!(done.succeeded, Some(true));
    assert_eq!(done.priority_index, None);

    let printer = h.printer(printer.id).await;
    assert_eq!(printer.total_success_prints, 1);
    assert_eq!(printer.current_job_id, None);

    // A Done job can be reprinted; it re-enters at the tail.
    let reprinted = h.dispatcher.reprint_job(done.id).await.unwrap();
    assert_eq!(reprinted.state, "Waiting");
    assert_eq!(reprinted.succeeded, None);
}

#[tokio::test]
async fn reorder_matches_specified_shifts() {
    let h = harness().await;
    // No operational printer: jobs stay queued and unassigned.
    let mut ids = Vec::new();
    for name in ["A", "B", "C", "D"] {
        let job = h.add_job(name, None).await;
        let job = h.dispatcher.enqueue_job(job.id).await.unwrap();
        ids.push((name, job.id));
    }
    assert_eq!(h.waiting_order().await, vec!["A", "B", "C", "D"]);

    let id_of = |name: &str| ids.iter().find(|(n, _)| *n == name).unwrap().1;

    // reorder_after(A, C): indices become {B:1, C:2, A:3, D:4}.
    h.dispatcher
        .reorder_job(id_of("A"), Some(id_of("C")))
        .await
        .unwrap();
    assert_eq!(h.waiting_order().await, vec!["B", "C", "A", "D"]);
    assert_eq!(h.job(id_of("B")).await.priority_index, Some(1));
    assert_eq!(h.job(id_of("C")).await.priority_index, Some(2));
    assert_eq!(h.job(id_of("A")).await.priority_index, Some(3));
    assert_eq!(h.job(id_of("D")).await.priority_index, Some(4));

    // Head move: reorder_after(D, null).
    h.dispatcher.reorder_job(id_of("D"), None).await.unwrap();
    assert_eq!(h.waiting_order().await, vec!["D", "B", "C", "A"]);
    assert_eq!(h.job(id_of("D")).await.priority_index, Some(0));

    // Reorder onto itself returns silently and changes nothing.
    h.dispatcher
        .reorder_job(id_of("B"), Some(id_of("B")))
        .await
        .unwrap();
    assert_eq!(h.waiting_order().await, vec!["D", "B", "C", "A"]);

    // Indices stay pairwise distinct throughout.
    let waiting = repo::jobs::all_waiting(&*h.db).await.unwrap();
    let mut seen = std::collections::BTreeSet::new();
    for job in waiting {
        assert!(seen.insert(job.priority_index.unwrap()));
    }
}

#[tokio::test]
async fn enqueue_head_takes_the_front_slot() {
    let h = harness().await;
    for name in ["first", "second"] {
        let job = h.add_job(name, None).await;
        h.dispatcher.enqueue_job(job.id).await.unwrap();
    }

    let urgent = h.add_job("urgent", None).await;
    let urgent = platen_server::queue::enqueue_head(&*h.db, &h.catalog, urgent)
        .await
        .unwrap();
    assert_eq!(urgent.priority_index, Some(0));
    assert_eq!(h.waiting_order().await, vec!["urgent", "first", "second"]);
}

#[tokio::test]
async fn peek_first_feasible_respects_priority_and_feasibility() {
    let h = harness().await;
    // Enqueue against a non-operational fleet so nothing is auto-assigned.
    let printer = h
        .add_printer("alpha", PrinterState::Error, &[("PLA", 0.6)])
        .await;

    // "picky" is first in the queue but needs ABS; the others run anywhere.
    let picky_req = JobRequirements {
        allowed_materials: vec![(0, h.material_id("ABS").await)],
        allowed_extruder_types: vec![],
    };
    for (name, req) in [
        ("picky", Some(picky_req)),
        ("easy1", None),
        ("easy2", None),
    ] {
        let job = h.add_job(name, req).await;
        h.dispatcher.enqueue_job(job.id).await.unwrap();
    }
    assert!(
        platen_server::queue::peek_first_feasible(&*h.db)
            .await
            .unwrap()
            .is_none()
    );

    // Busy is operational but takes no work, so the queue stays intact.
    h.dispatcher
        .on_printer_state_changed(printer.id, PrinterState::Busy)
        .await
        .unwrap();

    let peeked = platen_server::queue::peek_first_feasible(&*h.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(peeked.name, "easy1");
    assert_eq!(platen_server::queue::count_feasible(&*h.db).await.unwrap(), 2);
}

#[tokio::test]
async fn reordering_a_non_waiting_job_is_rejected() {
    let h = harness().await;
    let queued = h.add_job("queued", None).await;
    let queued = h.dispatcher.enqueue_job(queued.id).await.unwrap();
    let fresh = h.add_job("fresh", None).await;

    let err = h
        .dispatcher
        .reorder_job(fresh.id, Some(queued.id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        platen_core::Error::InvalidTransition { from: JobState::Created, .. }
    ));

    let err = h
        .dispatcher
        .reorder_job(queued.id, Some(fresh.id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        platen_core::Error::InvalidTransition { from: JobState::Created, .. }
    ));
}

#[tokio::test]
async fn state_changes_across_operational_boundary_refresh_feasibility() {
    let h = harness().await;
    // Starts in Error: the job enqueues as not printable and stays loose.
    let printer = h
        .add_printer("alpha", PrinterState::Error, &[("PLA", 0.6)])
        .await;

    let req = JobRequirements {
        allowed_materials: vec![(0, h.material_id("PLA").await)],
        allowed_extruder_types: vec![],
    };
    let job = h.add_job("benchy", Some(req)).await;
    let job = h.dispatcher.enqueue_job(job.id).await.unwrap();
    assert_eq!(job.can_be_printed, Some(false));
    assert_eq!(h.job(job.id).await.assigned_printer_id, None);

    // Busy is operational: feasible again, but Busy printers take no work.
    h.dispatcher
        .on_printer_state_changed(printer.id, PrinterState::Busy)
        .await
        .unwrap();
    let job = h.job(job.id).await;
    assert_eq!(job.can_be_printed, Some(true));
    assert_eq!(job.assigned_printer_id, None);

    h.dispatcher
        .on_printer_state_changed(printer.id, PrinterState::Error)
        .await
        .unwrap();
    assert_eq!(h.job(job.id).await.can_be_printed, Some(false));

    // Ready: feasible once more, and this time it is taken.
    h.dispatcher
        .on_printer_state_changed(printer.id, PrinterState::Ready)
        .await
        .unwrap();
    let job = h.job(job.id).await;
    assert_eq!(job.can_be_printed, Some(true));
    assert_eq!(job.assigned_printer_id, Some(printer.id));
}

#[tokio::test]
async fn recovery_marks_interrupted_print_finished() {
    let h = harness().await;
    let printer = h
        .add_printer("alpha", PrinterState::Ready, &[("PLA", 0.6)])
        .await;

    let job = h.add_job("benchy", None).await;
    let job = h.dispatcher.enqueue_job(job.id).await.unwrap();
    h.dispatcher
        .on_print_started(printer.id, job.id)
        .await
        .unwrap();
    assert_eq!(h.job(job.id).await.state, "Printing");

    // The printer comes back Ready while we believed it was printing: the
    // print died mid-way.
    h.dispatcher
        .on_printer_initial_data(printer.id, PrinterState::Ready, &[])
        .await
        .unwrap();

    let recovered = h.job(job.id).await;
    assert_eq!(recovered.state, "Finished");
    assert!(recovered.interrupted);
}
