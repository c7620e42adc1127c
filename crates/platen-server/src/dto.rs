use chrono::{DateTime, FixedOffset};
use platen_core::Error;
use platen_db::entities::{extruder_types, files, jobs, materials, printer_extruders, printers};
use sea_orm::ConnectionTrait;
use serde::Serialize;
use uuid::Uuid;

use crate::repo;
use crate::repo::printers::StateCatalog;

#[derive(Debug, Serialize)]
pub struct JobDto {
    pub id: Uuid,
    pub name: String,
    pub state: String,
    pub file_id: Uuid,
    pub user_id: Uuid,
    pub can_be_printed: Option<bool>,
    pub priority_index: Option<i64>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    pub started_at: Option<DateTime<FixedOffset>>,
    pub retries: i32,
    pub succeeded: Option<bool>,
    pub interrupted: bool,
    pub analyzed: bool,
    pub progress: f64,
    pub estimated_time_left: Option<f64>,
    pub assigned_printer_id: Option<Uuid>,
}

impl From<jobs::Model> for JobDto {
    fn from(job: jobs::Model) -> JobDto {
        JobDto {
            id: job.id,
            name: job.name,
            state: job.state,
            file_id: job.file_id,
            user_id: job.user_id,
            can_be_printed: job.can_be_printed,
            priority_index: job.priority_index,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            retries: job.retries,
            succeeded: job.succeeded,
            interrupted: job.interrupted,
            analyzed: job.analyzed,
            progress: job.progress,
            estimated_time_left: job.estimated_time_left,
            assigned_printer_id: job.assigned_printer_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub estimated_time: Option<f64>,
    pub estimated_material: Option<f64>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

impl From<files::Model> for FileDto {
    fn from(file: files::Model) -> FileDto {
        FileDto {
            id: file.id,
            user_id: file.user_id,
            name: file.name,
            estimated_time: file.estimated_time,
            estimated_material: file.estimated_material,
            created_at: file.created_at,
            updated_at: file.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MaterialDto {
    pub id: i32,
    pub material_type: String,
    pub color: Option<String>,
    pub brand: Option<String>,
    pub guid: Option<String>,
    pub print_temp: i32,
    pub bed_temp: i32,
}

impl From<materials::Model> for MaterialDto {
    fn from(m: materials::Model) -> MaterialDto {
        MaterialDto {
            id: m.id,
            material_type: m.material_type,
            color: m.color,
            brand: m.brand,
            guid: m.guid,
            print_temp: m.print_temp,
            bed_temp: m.bed_temp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExtruderTypeDto {
    pub id: i32,
    pub brand: String,
    pub nozzle_diameter: f64,
}

impl From<extruder_types::Model> for ExtruderTypeDto {
    fn from(t: extruder_types::Model) -> ExtruderTypeDto {
        ExtruderTypeDto {
            id: t.id,
            brand: t.brand,
            nozzle_diameter: t.nozzle_diameter,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PrinterExtruderDto {
    pub index: i32,
    pub extruder_type_id: Option<i32>,
    pub material_id: Option<i32>,
}

impl From<printer_extruders::Model> for PrinterExtruderDto {
    fn from(e: printer_extruders::Model) -> PrinterExtruderDto {
        PrinterExtruderDto {
            index: e.index,
            extruder_type_id: e.extruder_type_id,
            material_id: e.material_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PrinterDto {
    pub id: Uuid,
    pub name: String,
    pub serial: String,
    pub state: String,
    pub ip: Option<String>,
    pub current_job_id: Option<Uuid>,
    pub connected: bool,
    pub total_success_prints: i64,
    pub total_failed_prints: i64,
    pub total_printing_seconds: f64,
    pub extruders: Vec<PrinterExtruderDto>,
}

/// Assemble the wire view of a printer: state name from the catalog plus
/// its extruder rows.
pub async fn printer_dto<C: ConnectionTrait>(
    conn: &C,
    catalog: &StateCatalog,
    printer: printers::Model,
) -> Result<PrinterDto, Error> {
    let extruders = repo::printers::extruders_of(conn, printer.id).await?;
    Ok(PrinterDto {
        id: printer.id,
        name: printer.name,
        serial: printer.serial,
        state: catalog.state_of(printer.state_id).as_str().to_string(),
        ip: printer.ip,
        current_job_id: printer.current_job_id,
        connected: printer.session_id.is_some(),
        total_success_prints: printer.total_success_prints,
        total_failed_prints: printer.total_failed_prints,
        total_printing_seconds: printer.total_printing_seconds,
        extruders: extruders.into_iter().map(PrinterExtruderDto::from).collect(),
    })
}
