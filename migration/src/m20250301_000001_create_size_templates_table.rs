use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SizeTemplates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SizeTemplates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SizeTemplates::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(SizeTemplates::DisplayName).string().not_null())
                    .col(ColumnDef::new(SizeTemplates::EntityType).string().not_null())
                    .col(ColumnDef::new(SizeTemplates::Width).integer().not_null())
                    .col(ColumnDef::new(SizeTemplates::Height).integer().not_null())
                    .col(ColumnDef::new(SizeTemplates::FitMode).string().not_null())
                    .col(ColumnDef::new(SizeTemplates::Quality).integer().not_null())
                    .col(ColumnDef::new(SizeTemplates::Format).string().not_null())
                    .col(ColumnDef::new(SizeTemplates::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(SizeTemplates::SortOrder).integer().not_null().default(0))
                    .col(ColumnDef::new(SizeTemplates::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(SizeTemplates::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_size_templates_entity_type")
                    .table(SizeTemplates::Table)
                    .col(SizeTemplates::EntityType)
                    .col(SizeTemplates::SortOrder)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SizeTemplates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SizeTemplates {
    Table,
    Id,
    Name,
    DisplayName,
    EntityType,
    Width,
    Height,
    FitMode,
    Quality,
    Format,
    IsActive,
    SortOrder,
    CreatedAt,
    UpdatedAt,
}
