use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "materials")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Material family as slicers report it: PLA, ABS, PETG, ...
    pub material_type: String,
    pub color: Option<String>,
    pub brand: Option<String>,
    pub guid: Option<String>,
    /// Celsius.
    pub print_temp: i32,
    pub bed_temp: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
