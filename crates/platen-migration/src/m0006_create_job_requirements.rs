use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JobAllowedMaterials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobAllowedMaterials::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobAllowedMaterials::JobId).uuid().not_null())
                    .col(
                        ColumnDef::new(JobAllowedMaterials::MaterialId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JobAllowedMaterials::ExtruderIndex)
                            .integer()
                            .not_null(),
                    )
                    .index(
                        Index::create()
                            .name("idx_job_allowed_materials_unique")
                            .table(JobAllowedMaterials::Table)
                            .col(JobAllowedMaterials::JobId)
                            .col(JobAllowedMaterials::MaterialId)
                            .col(JobAllowedMaterials::ExtruderIndex)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_allowed_materials_job")
                            .from(JobAllowedMaterials::Table, JobAllowedMaterials::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_allowed_materials_material")
                            .from(JobAllowedMaterials::Table, JobAllowedMaterials::MaterialId)
                            .to(Materials::Table, Materials::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JobAllowedExtruders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobAllowedExtruders::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobAllowedExtruders::JobId).uuid().not_null())
                    .col(
                        ColumnDef::new(JobAllowedExtruders::ExtruderTypeId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JobAllowedExtruders::ExtruderIndex)
                            .integer()
                            .not_null(),
                    )
                    .index(
                        Index::create()
                            .name("idx_job_allowed_extruders_unique")
                            .table(JobAllowedExtruders::Table)
                            .col(JobAllowedExtruders::JobId)
                            .col(JobAllowedExtruders::ExtruderTypeId)
                            .col(JobAllowedExtruders::ExtruderIndex)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_allowed_extruders_job")
                            .from(JobAllowedExtruders::Table, JobAllowedExtruders::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_allowed_extruders_type")
                            .from(JobAllowedExtruders::Table, JobAllowedExtruders::ExtruderTypeId)
                            .to(ExtruderTypes::Table, ExtruderTypes::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JobExtruderData::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobExtruderData::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobExtruderData::JobId).uuid().not_null())
                    .col(
                        ColumnDef::new(JobExtruderData::ExtruderIndex)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JobExtruderData::UsedMaterialId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(JobExtruderData::UsedExtruderTypeId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(JobExtruderData::EstimatedMaterialWeight)
                            .double()
                            .not_null()
                            .default(0),
                    )
                    .index(
                        Index::create()
                            .name("idx_job_extruder_data_unique")
                            .table(JobExtruderData::Table)
                            .col(JobExtruderData::JobId)
                            .col(JobExtruderData::ExtruderIndex)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_extruder_data_job")
                            .from(JobExtruderData::Table, JobExtruderData::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobExtruderData::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(JobAllowedExtruders::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(JobAllowedMaterials::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Materials {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum ExtruderTypes {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum JobAllowedMaterials {
    Table,
    Id,
    JobId,
    MaterialId,
    ExtruderIndex,
}

#[derive(DeriveIden)]
enum JobAllowedExtruders {
    Table,
    Id,
    JobId,
    ExtruderTypeId,
    ExtruderIndex,
}

#[derive(DeriveIden)]
enum JobExtruderData {
    Table,
    Id,
    JobId,
    ExtruderIndex,
    UsedMaterialId,
    UsedExtruderTypeId,
    EstimatedMaterialWeight,
}
