use platen_core::Error;
use platen_core::states::PrinterState;
use platen_db::entities::{extruder_types, materials, printer_models, printer_states, printers};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use sha2::Digest;
use uuid::Uuid;

use crate::repo;
use crate::repo::printers::StateCatalog;

/// Catalog seed data. Seeds are plain data applied by `run` exactly once on
/// an empty database; nothing is seeded as a side effect of other writes.
const MATERIAL_SEEDS: &[(&str, i32, i32)] = &[
    ("PLA", 205, 60),
    ("PETG", 240, 80),
    ("ABS", 250, 100),
    ("TPU", 228, 50),
    ("CPE", 250, 85),
    ("Nylon", 255, 70),
];

const EXTRUDER_TYPE_SEEDS: &[(&str, f64)] = &[
    ("Standard", 0.25),
    ("Standard", 0.4),
    ("Standard", 0.6),
    ("Standard", 0.8),
];

const PRINTER_MODEL_SEEDS: &[(&str, f64, f64, f64)] = &[
    ("Generic Dual 300", 300.0, 300.0, 350.0),
    ("Generic Single 220", 220.0, 220.0, 250.0),
];

pub fn hash_api_key(raw: &str) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// One-time seeding of the static catalogs, plus optional idempotent
/// printer provisioning from the environment. Returns the state catalog the
/// dispatcher keeps for id/state mapping.
pub async fn run<C: ConnectionTrait>(conn: &C) -> Result<StateCatalog, Error> {
    seed_printer_states(conn).await?;
    seed_materials(conn).await?;
    seed_extruder_types(conn).await?;
    seed_printer_models(conn).await?;
    seed_admin_user(conn).await?;

    let catalog = StateCatalog::load(conn).await?;
    provision_printer_from_env(conn, &catalog).await?;

    // Sessions do not survive a restart; anything still marked online is
    // stale state from before the shutdown.
    reset_stale_sessions(conn, &catalog).await?;

    Ok(catalog)
}

async fn seed_printer_states<C: ConnectionTrait>(conn: &C) -> Result<(), Error> {
    if printer_states::Entity::find()
        .count(conn)
        .await
        .map_err(repo::map_db_err)?
        > 0
    {
        return Ok(());
    }
    let rows = PrinterState::ALL.iter().map(|state| printer_states::ActiveModel {
        name: Set(state.as_str().to_string()),
        is_operational: Set(state.is_operational()),
        ..Default::default()
    });
    printer_states::Entity::insert_many(rows)
        .exec(conn)
        .await
        .map_err(repo::map_db_err)?;
    Ok(())
}

async fn seed_materials<C: ConnectionTrait>(conn: &C) -> Result<(), Error> {
    if materials::Entity::find()
        .count(conn)
        .await
        .map_err(repo::map_db_err)?
        > 0
    {
        return Ok(());
    }
    let rows = MATERIAL_SEEDS
        .iter()
        .map(|(material_type, print_temp, bed_temp)| materials::ActiveModel {
            material_type: Set(material_type.to_string()),
            color: Set(None),
            brand: Set(None),
            guid: Set(None),
            print_temp: Set(*print_temp),
            bed_temp: Set(*bed_temp),
            ..Default::default()
        });
    materials::Entity::insert_many(rows)
        .exec(conn)
        .await
        .map_err(repo::map_db_err)?;
    Ok(())
}

async fn seed_extruder_types<C: ConnectionTrait>(conn: &C) -> Result<(), Error> {
    if extruder_types::Entity::find()
        .count(conn)
        .await
        .map_err(repo::map_db_err)?
        > 0
    {
        return Ok(());
    }
    let rows = EXTRUDER_TYPE_SEEDS
        .iter()
        .map(|(brand, nozzle_diameter)| extruder_types::ActiveModel {
            brand: Set(brand.to_string()),
            nozzle_diameter: Set(*nozzle_diameter),
            ..Default::default()
        });
    extruder_types::Entity::insert_many(rows)
        .exec(conn)
        .await
        .map_err(repo::map_db_err)?;
    Ok(())
}

async fn seed_printer_models<C: ConnectionTrait>(conn: &C) -> Result<(), Error> {
    if printer_models::Entity::find()
        .count(conn)
        .await
        .map_err(repo::map_db_err)?
        > 0
    {
        return Ok(());
    }
    let rows = PRINTER_MODEL_SEEDS
        .iter()
        .map(|(name, width, depth, height)| printer_models::ActiveModel {
            name: Set(name.to_string()),
            width: Set(*width),
            depth: Set(*depth),
            height: Set(*height),
            ..Default::default()
        });
    printer_models::Entity::insert_many(rows)
        .exec(conn)
        .await
        .map_err(repo::map_db_err)?;
    Ok(())
}

async fn seed_admin_user<C: ConnectionTrait>(conn: &C) -> Result<(), Error> {
    let username = std::env::var("PLATEN_ADMIN_USER").unwrap_or_else(|_| "admin".to_string());
    if repo::users::find_by_username(conn, &username).await?.is_some() {
        return Ok(());
    }
    repo::users::insert(conn, Uuid::new_v4(), &username, true).await?;
    Ok(())
}

/// `PLATEN_PROVISION_PRINTER=name,serial,api_key[,model]` upserts a printer
/// so a single-printer install works without a provisioning tool.
async fn provision_printer_from_env<C: ConnectionTrait>(
    conn: &C,
    catalog: &StateCatalog,
) -> Result<(), Error> {
    let Ok(raw) = std::env::var("PLATEN_PROVISION_PRINTER") else {
        return Ok(());
    };
    let parts: Vec<&str> = raw.split(',').map(|s| s.trim()).collect();
    if parts.len() < 3 || parts.iter().take(3).any(|p| p.is_empty()) {
        tracing::warn!("PLATEN_PROVISION_PRINTER is malformed, expected name,serial,api_key[,model]");
        return Ok(());
    }
    let (name, serial, api_key) = (parts[0], parts[1], parts[2]);

    let model = match parts.get(3) {
        Some(model_name) => printer_models::Entity::find()
            .filter(printer_models::Column::Name.eq(*model_name))
            .one(conn)
            .await
            .map_err(repo::map_db_err)?,
        None => printer_models::Entity::find()
            .one(conn)
            .await
            .map_err(repo::map_db_err)?,
    };
    let Some(model) = model else {
        tracing::warn!("PLATEN_PROVISION_PRINTER: no printer model available");
        return Ok(());
    };

    let now = chrono::Utc::now();
    let row = printers::ActiveModel {
        id: Set(Uuid::new_v4()),
        model_id: Set(model.id),
        state_id: Set(catalog.id_of(PrinterState::Offline)?),
        name: Set(name.to_string()),
        serial: Set(serial.to_string()),
        ip: Set(None),
        api_key_hash: Set(hash_api_key(api_key)),
        current_job_id: Set(None),
        session_id: Set(None),
        total_success_prints: Set(0),
        total_failed_prints: Set(0),
        total_printing_seconds: Set(0.0),
        last_seen_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    printers::Entity::insert(row)
        .on_conflict(
            OnConflict::column(printers::Column::Serial)
                .update_columns([
                    printers::Column::Name,
                    printers::Column::ApiKeyHash,
                    printers::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(conn)
        .await
        .map_err(repo::map_db_err)?;
    Ok(())
}

async fn reset_stale_sessions<C: ConnectionTrait>(
    conn: &C,
    catalog: &StateCatalog,
) -> Result<(), Error> {
    use sea_orm::sea_query::Expr;
    let offline = catalog.id_of(PrinterState::Offline)?;
    printers::Entity::update_many()
        .col_expr(printers::Column::SessionId, Expr::value(Option::<Uuid>::None))
        .col_expr(printers::Column::StateId, Expr::value(offline))
        .filter(printers::Column::SessionId.is_not_null())
        .exec(conn)
        .await
        .map_err(repo::map_db_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_hash_is_stable_sha256_hex() {
        let h = hash_api_key("secret-key");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_api_key("secret-key"));
        assert_ne!(h, hash_api_key("other-key"));
    }

    #[test]
    fn every_printer_state_is_seeded() {
        assert_eq!(PrinterState::ALL.len(), 8);
        assert!(PrinterState::ALL.contains(&PrinterState::PrintFinished));
    }
}
