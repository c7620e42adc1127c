use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Printers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Printers::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Printers::ModelId).integer().not_null())
                    .col(ColumnDef::new(Printers::StateId).integer().not_null())
                    .col(ColumnDef::new(Printers::Name).string().not_null())
                    .col(ColumnDef::new(Printers::Serial).string().not_null())
                    .col(ColumnDef::new(Printers::Ip).string().null())
                    .col(ColumnDef::new(Printers::ApiKeyHash).string().not_null())
                    .col(ColumnDef::new(Printers::CurrentJobId).uuid().null())
                    .col(ColumnDef::new(Printers::SessionId).uuid().null())
                    .col(
                        ColumnDef::new(Printers::TotalSuccessPrints)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Printers::TotalFailedPrints)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Printers::TotalPrintingSeconds)
                            .double()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Printers::LastSeenAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Printers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Printers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .index(
                        Index::create()
                            .name("idx_printers_name_unique")
                            .table(Printers::Table)
                            .col(Printers::Name)
                            .unique(),
                    )
                    .index(
                        Index::create()
                            .name("idx_printers_serial_unique")
                            .table(Printers::Table)
                            .col(Printers::Serial)
                            .unique(),
                    )
                    .index(
                        Index::create()
                            .name("idx_printers_api_key_hash_unique")
                            .table(Printers::Table)
                            .col(Printers::ApiKeyHash)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_printers_model")
                            .from(Printers::Table, Printers::ModelId)
                            .to(PrinterModels::Table, PrinterModels::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_printers_state")
                            .from(Printers::Table, Printers::StateId)
                            .to(PrinterStates::Table, PrinterStates::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PrinterExtruders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PrinterExtruders::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PrinterExtruders::PrinterId).uuid().not_null())
                    .col(ColumnDef::new(PrinterExtruders::Index).integer().not_null())
                    .col(
                        ColumnDef::new(PrinterExtruders::ExtruderTypeId)
                            .integer()
                            .null(),
                    )
                    .col(ColumnDef::new(PrinterExtruders::MaterialId).integer().null())
                    .index(
                        Index::create()
                            .name("idx_printer_extruders_printer_index_unique")
                            .table(PrinterExtruders::Table)
                            .col(PrinterExtruders::PrinterId)
                            .col(PrinterExtruders::Index)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_printer_extruders_printer")
                            .from(PrinterExtruders::Table, PrinterExtruders::PrinterId)
                            .to(Printers::Table, Printers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PrinterExtruders::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Printers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PrinterModels {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum PrinterStates {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Printers {
    Table,
    Id,
    ModelId,
    StateId,
    Name,
    Serial,
    Ip,
    ApiKeyHash,
    CurrentJobId,
    SessionId,
    TotalSuccessPrints,
    TotalFailedPrints,
    TotalPrintingSeconds,
    LastSeenAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PrinterExtruders {
    Table,
    Id,
    PrinterId,
    Index,
    ExtruderTypeId,
    MaterialId,
}
