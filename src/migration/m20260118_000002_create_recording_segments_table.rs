use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RecordingSegments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RecordingSegments::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RecordingSegments::RecordingId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecordingSegments::SequenceNumber)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecordingSegments::FilePath)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecordingSegments::StartedTs)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RecordingSegments::EndedTs).big_integer().null())
                    .col(
                        ColumnDef::new(RecordingSegments::FileSizeBytes)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RecordingSegments::Status)
                            .string()
                            .not_null()
                            .default("recording"),
                    )
                    .col(ColumnDef::new(RecordingSegments::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(RecordingSegments::CreatedAt)
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
                    .name("idx_recording_segments_sequence")
                    .table(RecordingSegments::Table)
                    .col(RecordingSegments::RecordingId)
                    .col(RecordingSegments::SequenceNumber)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RecordingSegments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RecordingSegments {
    Table,
    Id,
    RecordingId,
    SequenceNumber,
    FilePath,
    StartedTs,
    EndedTs,
    FileSizeBytes,
    Status,
    ErrorMessage,
    CreatedAt,
}
