use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PrinterModels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PrinterModels::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PrinterModels::Name).string().not_null())
                    .col(ColumnDef::new(PrinterModels::Width).double().not_null())
                    .col(ColumnDef::new(PrinterModels::Depth).double().not_null())
                    .col(ColumnDef::new(PrinterModels::Height).double().not_null())
                    .index(
                        Index::create()
                            .name("idx_printer_models_name_unique")
                            .table(PrinterModels::Table)
                            .col(PrinterModels::Name)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PrinterStates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PrinterStates::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PrinterStates::Name).string().not_null())
                    .col(
                        ColumnDef::new(PrinterStates::IsOperational)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .index(
                        Index::create()
                            .name("idx_printer_states_name_unique")
                            .table(PrinterStates::Table)
                            .col(PrinterStates::Name)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExtruderTypes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExtruderTypes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ExtruderTypes::Brand).string().not_null())
                    .col(
                        ColumnDef::new(ExtruderTypes::NozzleDiameter)
                            .double()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Materials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Materials::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Materials::MaterialType).string().not_null())
                    .col(ColumnDef::new(Materials::Color).string().null())
                    .col(ColumnDef::new(Materials::Brand).string().null())
                    .col(ColumnDef::new(Materials::Guid).string().null())
                    .col(ColumnDef::new(Materials::PrintTemp).integer().not_null())
                    .col(ColumnDef::new(Materials::BedTemp).integer().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Materials::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExtruderTypes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PrinterStates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PrinterModels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PrinterModels {
    Table,
    Id,
    Name,
    Width,
    Depth,
    Height,
}

#[derive(DeriveIden)]
enum PrinterStates {
    Table,
    Id,
    Name,
    IsOperational,
}

#[derive(DeriveIden)]
enum ExtruderTypes {
    Table,
    Id,
    Brand,
    NozzleDiameter,
}

#[derive(DeriveIden)]
enum Materials {
    Table,
    Id,
    MaterialType,
    Color,
    Brand,
    Guid,
    PrintTemp,
    BedTemp,
}
