use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RegenerationJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RegenerationJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RegenerationJobs::EntityType).string().not_null())
                    .col(ColumnDef::new(RegenerationJobs::SizeTemplate).string().not_null())
                    .col(ColumnDef::new(RegenerationJobs::EntityIds).json().not_null())
                    .col(ColumnDef::new(RegenerationJobs::Status).string().not_null())
                    .col(ColumnDef::new(RegenerationJobs::TotalCount).integer().not_null().default(0))
                    .col(ColumnDef::new(RegenerationJobs::ProcessedCount).integer().not_null().default(0))
                    .col(ColumnDef::new(RegenerationJobs::FailedCount).integer().not_null().default(0))
                    .col(ColumnDef::new(RegenerationJobs::ErrorMessage).text())
                    .col(ColumnDef::new(RegenerationJobs::StartedAt).timestamp())
                    .col(ColumnDef::new(RegenerationJobs::CompletedAt).timestamp())
                    .col(ColumnDef::new(RegenerationJobs::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(RegenerationJobs::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_regeneration_jobs_status_created")
                    .table(RegenerationJobs::Table)
                    .col(RegenerationJobs::Status)
                    .col(RegenerationJobs::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RegenerationJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RegenerationJobs {
    Table,
    Id,
    EntityType,
    SizeTemplate,
    EntityIds,
    Status,
    TotalCount,
    ProcessedCount,
    FailedCount,
    ErrorMessage,
    StartedAt,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}
