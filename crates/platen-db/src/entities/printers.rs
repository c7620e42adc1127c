use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "printers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub model_id: i32,
    pub state_id: i32,
    pub name: String,
    pub serial: String,
    pub ip: Option<String>,
    /// sha256 hex of the provisioning api key; the raw key is never stored.
    pub api_key_hash: String,
    pub current_job_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub total_success_prints: i64,
    pub total_failed_prints: i64,
    pub total_printing_seconds: f64,
    pub last_seen_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::printer_models::Entity",
        from = "Column::ModelId",
        to = "super::printer_models::Column::Id"
    )]
    PrinterModels,
    #[sea_orm(
        belongs_to = "super::printer_states::Entity",
        from = "Column::StateId",
        to = "super::printer_states::Column::Id"
    )]
    PrinterStates,
    #[sea_orm(has_many = "super::printer_extruders::Entity")]
    PrinterExtruders,
}

impl Related<super::printer_models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PrinterModels.def()
    }
}

impl Related<super::printer_states::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PrinterStates.def()
    }
}

impl Related<super::printer_extruders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PrinterExtruders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
