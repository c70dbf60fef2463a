use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ImageFiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImageFiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ImageFiles::EntityType).string().not_null())
                    .col(ColumnDef::new(ImageFiles::EntityId).string().not_null())
                    .col(ColumnDef::new(ImageFiles::SizeTemplate).string().not_null())
                    .col(ColumnDef::new(ImageFiles::UploadId).string().not_null())
                    .col(ColumnDef::new(ImageFiles::OriginalFilename).string().not_null())
                    .col(ColumnDef::new(ImageFiles::OriginalPath).string().not_null())
                    .col(ColumnDef::new(ImageFiles::OriginalMimeType).string().not_null())
                    .col(ColumnDef::new(ImageFiles::OriginalSize).big_integer().not_null())
                    .col(ColumnDef::new(ImageFiles::OriginalWidth).integer().not_null())
                    .col(ColumnDef::new(ImageFiles::OriginalHeight).integer().not_null())
                    .col(ColumnDef::new(ImageFiles::GeneratedPath).string().not_null())
                    .col(ColumnDef::new(ImageFiles::GeneratedSize).big_integer().not_null())
                    .col(ColumnDef::new(ImageFiles::GeneratedWidth).integer().not_null())
                    .col(ColumnDef::new(ImageFiles::GeneratedHeight).integer().not_null())
                    .col(ColumnDef::new(ImageFiles::GeneratedAt).timestamp().not_null())
                    .col(ColumnDef::new(ImageFiles::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(ImageFiles::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // One current row per slot.
        manager
            .create_index(
                Index::create()
                    .name("idx_image_files_slot")
                    .table(ImageFiles::Table)
                    .col(ImageFiles::EntityType)
                    .col(ImageFiles::EntityId)
                    .col(ImageFiles::SizeTemplate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_image_files_upload_id")
                    .table(ImageFiles::Table)
                    .col(ImageFiles::UploadId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ImageFiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ImageFiles {
    Table,
    Id,
    EntityType,
    EntityId,
    SizeTemplate,
    UploadId,
    OriginalFilename,
    OriginalPath,
    OriginalMimeType,
    OriginalSize,
    OriginalWidth,
    OriginalHeight,
    GeneratedPath,
    GeneratedSize,
    GeneratedWidth,
    GeneratedHeight,
    GeneratedAt,
    CreatedAt,
    UpdatedAt,
}
