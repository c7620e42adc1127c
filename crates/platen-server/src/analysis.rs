use std::sync::Arc;

use platen_core::Error;
use platen_core::analysis::{AnalyzerError, FileAnalysis, FileAnalyzer};
use platen_core::feasibility::JobRequirements;
use platen_core::states::JobState;
use platen_db::entities::{extruder_types, jobs, materials};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use uuid::Uuid;

use crate::repo::{self, map_db_err};
use crate::storage::FileStore;
use crate::transitions;

/// Run the analyzer on a job's file and persist the outcome: allowed
/// materials and extruder types per position, per-extruder mass estimates,
/// and the file-level totals. On analyzer failure the job simply stays
/// `analyzed = false`.
pub async fn analyze_job(
    db: &DatabaseConnection,
    store: &FileStore,
    analyzer: &Arc<dyn FileAnalyzer>,
    job_id: Uuid,
) -> Result<jobs::Model, Error> {
    let job = repo::jobs::get(db, job_id).await?;
    if transitions::state_of(&job) != JobState::Created {
        return Err(Error::invalid_parameter(
            "job_id",
            "only a job that is not yet enqueued can be analyzed",
        ));
    }
    let file = repo::files::get(db, job.file_id).await?;

    let path = store.path_of(&file.storage_path);
    let analysis = analyzer.analyze(&path).await?;

    let txn = db.begin().await.map_err(map_db_err)?;
    let (requirements, extruder_data) = resolve_analysis(&txn, &analysis).await?;
    repo::jobs::replace_requirements(&txn, job.id, &requirements, &extruder_data).await?;
    repo::files::set_estimates(
        &txn,
        file,
        analysis.print_seconds,
        analysis.total_mass_g(),
        serde_json::to_value(&analysis)
            .map_err(|e| Error::Repository(format!("metadata encoding failed: {e}")))?,
    )
    .await?;

    let mut active: jobs::ActiveModel = job.into();
    active.analyzed = Set(true);
    active.updated_at = Set(chrono::Utc::now().into());
    let job = active.update(&txn).await.map_err(map_db_err)?;
    txn.commit().await.map_err(map_db_err)?;

    tracing::info!(%job_id, "job analyzed");
    Ok(job)
}

/// Turn analyzer output into catalog-backed requirement rows. A material
/// type or nozzle diameter the catalog does not know is invalid file data:
/// silently dropping it would turn a constraint into "anything goes".
async fn resolve_analysis<C: ConnectionTrait>(
    conn: &C,
    analysis: &FileAnalysis,
) -> Result<(JobRequirements, Vec<repo::jobs::ExtruderDataRow>), Error> {
    let mut requirements = JobRequirements::default();
    let mut extruder_data = Vec::new();

    for extruder in analysis.enabled_extruders() {
        let mut used_material_id = None;
        if let Some(material_type) = &extruder.material_type {
            let matches = materials::Entity::find()
                .filter(materials::Column::MaterialType.eq(material_type.clone()))
                .all(conn)
                .await
                .map_err(map_db_err)?;
            if matches.is_empty() {
                return Err(AnalyzerError::InvalidFileData(format!(
                    "unknown material type {material_type:?}"
                ))
                .into());
            }
            used_material_id = Some(matches[0].id);
            for material in matches {
                requirements
                    .allowed_materials
                    .push((extruder.index, material.id));
            }
        }

        let mut used_extruder_type_id = None;
        if let Some(diameter) = extruder.nozzle_diameter {
            let matches = extruder_types::Entity::find()
                .filter(extruder_types::Column::NozzleDiameter.eq(diameter))
                .all(conn)
                .await
                .map_err(map_db_err)?;
            if matches.is_empty() {
                return Err(AnalyzerError::InvalidFileData(format!(
                    "unknown nozzle diameter {diameter}"
                ))
                .into());
            }
            used_extruder_type_id = Some(matches[0].id);
            for extruder_type in matches {
                requirements
                    .allowed_extruder_types
                    .push((extruder.index, extruder_type.id));
            }
        }

        extruder_data.push(repo::jobs::ExtruderDataRow {
            extruder_index: extruder.index,
            used_material_id,
            used_extruder_type_id,
            estimated_material_weight: extruder.estimated_mass_g().unwrap_or(0.0),
        });
    }

    Ok((requirements, extruder_data))
}
