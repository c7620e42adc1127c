use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "printer_extruders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub printer_id: Uuid,
    /// 0-based position; (printer_id, index) is unique.
    pub index: i32,
    pub extruder_type_id: Option<i32>,
    pub material_id: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::printers::Entity",
        from = "Column::PrinterId",
        to = "super::printers::Column::Id"
    )]
    Printers,
    #[sea_orm(
        belongs_to = "super::extruder_types::Entity",
        from = "Column::ExtruderTypeId",
        to = "super::extruder_types::Column::Id"
    )]
    ExtruderTypes,
    #[sea_orm(
        belongs_to = "super::materials::Entity",
        from = "Column::MaterialId",
        to = "super::materials::Column::Id"
    )]
    Materials,
}

impl Related<super::printers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Printers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
