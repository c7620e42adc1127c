use chrono::Utc;
use platen_core::Error;
use platen_core::feasibility::{ExtruderSnapshot, PrinterSnapshot};
use platen_core::states::PrinterState;
use platen_db::entities::{printer_extruders, printer_states, printers};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use super::map_db_err;

/// Two-way mapping between `PrinterState` and its catalog row id, loaded
/// once after bootstrap. The catalog is seed data and never changes at
/// runtime.
#[derive(Debug, Clone)]
pub struct StateCatalog {
    entries: Vec<(PrinterState, i32, bool)>,
}

impl StateCatalog {
    pub async fn load<C: ConnectionTrait>(conn: &C) -> Result<StateCatalog, Error> {
        let rows = printer_states::Entity::find()
            .all(conn)
            .await
            .map_err(map_db_err)?;
        let entries = rows
            .into_iter()
            .map(|r| (PrinterState::parse(&r.name), r.id, r.is_operational))
            .collect();
        Ok(StateCatalog { entries })
    }

    pub fn id_of(&self, state: PrinterState) -> Result<i32, Error> {
        self.entries
            .iter()
            .find(|(s, _, _)| *s == state)
            .map(|(_, id, _)| *id)
            .ok_or_else(|| Error::Repository(format!("printer state {state} not seeded")))
    }

    pub fn state_of(&self, id: i32) -> PrinterState {
        self.entries
            .iter()
            .find(|(_, sid, _)| *sid == id)
            .map(|(s, _, _)| *s)
            .unwrap_or(PrinterState::Unknown)
    }

    pub fn is_operational(&self, id: i32) -> bool {
        self.entries
            .iter()
            .find(|(_, sid, _)| *sid == id)
            .map(|(_, _, op)| *op)
            .unwrap_or(false)
    }
}

pub async fn find_by_id<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<Option<printers::Model>, Error> {
    printers::Entity::find_by_id(id).one(conn).await.map_err(map_db_err)
}

pub async fn get<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<printers::Model, Error> {
    find_by_id(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound("printer".to_string()))
}

pub async fn find_all<C: ConnectionTrait>(conn: &C) -> Result<Vec<printers::Model>, Error> {
    printers::Entity::find()
        .order_by_asc(printers::Column::Name)
        .all(conn)
        .await
        .map_err(map_db_err)
}

pub async fn find_by_api_key_hash<C: ConnectionTrait>(
    conn: &C,
    api_key_hash: &str,
) -> Result<Option<printers::Model>, Error> {
    printers::Entity::find()
        .filter(printers::Column::ApiKeyHash.eq(api_key_hash))
        .one(conn)
        .await
        .map_err(map_db_err)
}

pub async fn extruders_of<C: ConnectionTrait>(
    conn: &C,
    printer_id: Uuid,
) -> Result<Vec<printer_extruders::Model>, Error> {
    printer_extruders::Entity::find()
        .filter(printer_extruders::Column::PrinterId.eq(printer_id))
        .order_by_asc(printer_extruders::Column::Index)
        .all(conn)
        .await
        .map_err(map_db_err)
}

fn snapshot_from(
    printer: &printers::Model,
    extruders: &[printer_extruders::Model],
    catalog: &StateCatalog,
) -> PrinterSnapshot {
    PrinterSnapshot {
        id: printer.id,
        operational: catalog.is_operational(printer.state_id),
        extruders: extruders
            .iter()
            .map(|e| ExtruderSnapshot {
                extruder_type_id: e.extruder_type_id,
                material_id: e.material_id,
            })
            .collect(),
    }
}

/// Current configuration of one printer as the feasibility evaluator sees
/// it.
pub async fn snapshot<C: ConnectionTrait>(
    conn: &C,
    printer: &printers::Model,
    catalog: &StateCatalog,
) -> Result<PrinterSnapshot, Error> {
    let extruders = extruders_of(conn, printer.id).await?;
    Ok(snapshot_from(printer, &extruders, catalog))
}

/// Snapshots of the whole fleet, printers ordered by name so the
/// "first usable printer" pick is deterministic.
pub async fn snapshot_all<C: ConnectionTrait>(
    conn: &C,
    catalog: &StateCatalog,
) -> Result<Vec<PrinterSnapshot>, Error> {
    let all = find_all(conn).await?;
    let mut out = Vec::with_capacity(all.len());
    for printer in &all {
        out.push(snapshot(conn, printer, catalog).await?);
    }
    Ok(out)
}

pub async fn set_state<C: ConnectionTrait>(
    conn: &C,
    printer: printers::Model,
    state_id: i32,
) -> Result<printers::Model, Error> {
    let mut active: printers::ActiveModel = printer.into();
    active.state_id = Set(state_id);
    active.last_seen_at = Set(Some(Utc::now().into()));
    active.updated_at = Set(Utc::now().into());
    sea_orm::ActiveModelTrait::update(active, conn)
        .await
        .map_err(map_db_err)
}

pub async fn set_session<C: ConnectionTrait>(
    conn: &C,
    printer: printers::Model,
    session_id: Option<Uuid>,
    ip: Option<String>,
) -> Result<printers::Model, Error> {
    let mut active: printers::ActiveModel = printer.into();
    active.session_id = Set(session_id);
    if ip.is_some() {
        active.ip = Set(ip);
    }
    active.last_seen_at = Set(Some(Utc::now().into()));
    active.updated_at = Set(Utc::now().into());
    sea_orm::ActiveModelTrait::update(active, conn)
        .await
        .map_err(map_db_err)
}

pub async fn set_current_job<C: ConnectionTrait>(
    conn: &C,
    printer_id: Uuid,
    job_id: Option<Uuid>,
) -> Result<(), Error> {
    printers::Entity::update_many()
        .col_expr(printers::Column::CurrentJobId, Expr::value(job_id))
        .col_expr(printers::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(printers::Column::Id.eq(printer_id))
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Fold one finished print into the printer's lifetime totals.
pub async fn add_print_outcome<C: ConnectionTrait>(
    conn: &C,
    printer: printers::Model,
    succeeded: bool,
    printing_seconds: f64,
) -> Result<printers::Model, Error> {
    let mut active: printers::ActiveModel = printer.clone().into();
    if succeeded {
        active.total_success_prints = Set(printer.total_success_prints + 1);
    } else {
        active.total_failed_prints = Set(printer.total_failed_prints + 1);
    }
    active.total_printing_seconds = Set(printer.total_printing_seconds + printing_seconds);
    active.updated_at = Set(Utc::now().into());
    sea_orm::ActiveModelTrait::update(active, conn)
        .await
        .map_err(map_db_err)
}

/// Reconcile the extruder rows of a printer with a reported configuration:
/// rows beyond the reported count are removed, missing ones created.
pub async fn apply_extruder_config<C: ConnectionTrait>(
    conn: &C,
    printer_id: Uuid,
    reported: &[(u32, Option<i32>, Option<i32>)],
) -> Result<(), Error> {
    let existing = extruders_of(conn, printer_id).await?;

    let max_index = reported.iter().map(|(i, _, _)| *i as i32).max();
    for row in &existing {
        let stale = match max_index {
            Some(max) => row.index > max,
            None => true,
        };
        if stale {
            printer_extruders::Entity::delete_by_id(row.id)
                .exec(conn)
                .await
                .map_err(map_db_err)?;
        }
    }

    for (index, extruder_type_id, material_id) in reported {
        match existing.iter().find(|e| e.index == *index as i32) {
            Some(row) => {
                let mut active: printer_extruders::ActiveModel = row.clone().into();
                active.extruder_type_id = Set(*extruder_type_id);
                active.material_id = Set(*material_id);
                sea_orm::ActiveModelTrait::update(active, conn)
                    .await
                    .map_err(map_db_err)?;
            }
            None => {
                let row = printer_extruders::ActiveModel {
                    printer_id: Set(printer_id),
                    index: Set(*index as i32),
                    extruder_type_id: Set(*extruder_type_id),
                    material_id: Set(*material_id),
                    ..Default::default()
                };
                printer_extruders::Entity::insert(row)
                    .exec(conn)
                    .await
                    .map_err(map_db_err)?;
            }
        }
    }

    Ok(())
}
