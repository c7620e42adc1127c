use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Jobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Jobs::Name).string().not_null())
                    .col(ColumnDef::new(Jobs::State).string().not_null())
                    .col(ColumnDef::new(Jobs::FileId).uuid().not_null())
                    .col(ColumnDef::new(Jobs::UserId).uuid().not_null())
                    .col(ColumnDef::new(Jobs::CanBePrinted).boolean().null())
                    .col(ColumnDef::new(Jobs::PriorityIndex).big_integer().null())
                    .col(
                        ColumnDef::new(Jobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Jobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Jobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Jobs::Retries).integer().not_null().default(0))
                    .col(ColumnDef::new(Jobs::Succeeded).boolean().null())
                    .col(
                        ColumnDef::new(Jobs::Interrupted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Jobs::Analyzed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Jobs::Progress).double().not_null().default(0))
                    .col(ColumnDef::new(Jobs::EstimatedTimeLeft).double().null())
                    .col(ColumnDef::new(Jobs::AssignedPrinterId).uuid().null())
                    .index(
                        Index::create()
                            .name("idx_jobs_name_unique")
                            .table(Jobs::Table)
                            .col(Jobs::Name)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_jobs_file")
                            .from(Jobs::Table, Jobs::FileId)
                            .to(Files::Table, Files::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_jobs_user")
                            .from(Jobs::Table, Jobs::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_jobs_assigned_printer")
                            .from(Jobs::Table, Jobs::AssignedPrinterId)
                            .to(Printers::Table, Printers::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // The waiting-queue scan orders by (state, priority_index) and the
        // dispatcher filters on can_be_printed; keep that path indexed.
        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_state_priority_index")
                    .table(Jobs::Table)
                    .col(Jobs::State)
                    .col(Jobs::PriorityIndex)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_file_id")
                    .table(Jobs::Table)
                    .col(Jobs::FileId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_jobs_file_id")
                    .table(Jobs::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_jobs_state_priority_index")
                    .table(Jobs::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Jobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Files {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Printers {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    Name,
    State,
    FileId,
    UserId,
    CanBePrinted,
    PriorityIndex,
    CreatedAt,
    UpdatedAt,
    StartedAt,
    Retries,
    Succeeded,
    Interrupted,
    Analyzed,
    Progress,
    EstimatedTimeLeft,
    AssignedPrinterId,
}
