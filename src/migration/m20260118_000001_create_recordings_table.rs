use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Recordings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Recordings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Recordings::SourceKind).string().not_null())
                    .col(ColumnDef::new(Recordings::SourceId).string().not_null())
                    .col(ColumnDef::new(Recordings::Owner).string().not_null())
                    .col(ColumnDef::new(Recordings::ProfileId).string().null())
                    .col(ColumnDef::new(Recordings::Title).string().not_null())
                    .col(
                        ColumnDef::new(Recordings::ScheduleType)
                            .string()
                            .not_null()
                            .default("once"),
                    )
                    .col(
                        ColumnDef::new(Recordings::Status)
                            .string()
                            .not_null()
                            .default("scheduled"),
                    )
                    .col(
                        ColumnDef::new(Recordings::ScheduledStartTs)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Recordings::ScheduledEndTs)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Recordings::PrePaddingSeconds)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Recordings::PostPaddingSeconds)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Recordings::ActualStartTs).big_integer().null())
                    .col(ColumnDef::new(Recordings::ActualEndTs).big_integer().null())
                    .col(ColumnDef::new(Recordings::OutputPath).string().null())
                    .col(ColumnDef::new(Recordings::FileSizeBytes).big_integer().null())
                    .col(ColumnDef::new(Recordings::DurationSeconds).big_integer().null())
                    .col(
                        ColumnDef::new(Recordings::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Recordings::MaxRetries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(ColumnDef::new(Recordings::LastError).text().null())
                    .col(ColumnDef::new(Recordings::LastRetryTs).big_integer().null())
                    .col(ColumnDef::new(Recordings::Metadata).text().null())
                    .col(ColumnDef::new(Recordings::DeletedTs).big_integer().null())
                    .col(
                        ColumnDef::new(Recordings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Recordings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_recordings_status_start")
                    .table(Recordings::Table)
                    .col(Recordings::Status)
                    .col(Recordings::ScheduledStartTs)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_recordings_owner")
                    .table(Recordings::Table)
                    .col(Recordings::Owner)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Recordings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Recordings {
    Table,
    Id,
    SourceKind,
    SourceId,
    Owner,
    ProfileId,
    Title,
    ScheduleType,
    Status,
    ScheduledStartTs,
    ScheduledEndTs,
    PrePaddingSeconds,
    PostPaddingSeconds,
    ActualStartTs,
    ActualEndTs,
    OutputPath,
    FileSizeBytes,
    DurationSeconds,
    RetryCount,
    MaxRetries,
    LastError,
    LastRetryTs,
    Metadata,
    DeletedTs,
    CreatedAt,
    UpdatedAt,
}
