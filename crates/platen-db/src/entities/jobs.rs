use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// Wire-visible state name; `platen_core::states::JobState` parses it.
    pub state: String,
    pub file_id: Uuid,
    pub user_id: Uuid,
    pub can_be_printed: Option<bool>,
    /// Defined iff state = Waiting; lower = higher priority.
    pub priority_index: Option<i64>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub retries: i32,
    pub succeeded: Option<bool>,
    pub interrupted: bool,
    pub analyzed: bool,
    /// 0.0 ..= 100.0
    pub progress: f64,
    /// Seconds, as last reported by the printer.
    pub estimated_time_left: Option<f64>,
    pub assigned_printer_id: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::files::Entity",
        from = "Column::FileId",
        to = "super::files::Column::Id"
    )]
    Files,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(
        belongs_to = "super::printers::Entity",
        from = "Column::AssignedPrinterId",
        to = "super::printers::Column::Id"
    )]
    Printers,
}

impl Related<super::files::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Files.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
